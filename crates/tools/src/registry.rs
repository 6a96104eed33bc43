//! Tool registry and dispatcher.
//!
//! The registry is built once at startup from static [`ToolDefinition`]s and is immutable
//! afterwards. [`ToolRegistry::dispatch`] is the single boundary where internal failures become
//! user-visible tool failures: every call yields exactly one [`ToolResult`].

use crate::client::KimaiClient;
use crate::error::{Result, ToolError};
use crate::semantics::annotations_for;
use async_trait::async_trait;
use reqwest::Method;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Declared type of a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    #[must_use]
    pub fn required(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: None,
            description,
        }
    }

    #[must_use]
    pub fn optional(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: None,
            description,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Static description of one exposed tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Upstream HTTP method; drives the MCP annotations.
    pub method: Method,
    pub params: Vec<ParamSpec>,
}

impl ToolDefinition {
    /// JSON Schema for the tool's arguments.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<&str> = Vec::new();

        for param in &self.params {
            let mut prop = json!({
                "type": param.ty.json_type(),
                "description": param.description,
            });
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            properties.insert(param.name.to_string(), prop);

            if param.required && param.default.is_none() {
                required.push(param.name);
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    #[must_use]
    pub fn to_tool(&self) -> Tool {
        let schema_obj = self
            .input_schema()
            .as_object()
            .cloned()
            .unwrap_or_else(JsonObject::new);
        let mut tool = Tool::new(self.name, self.description, Arc::new(schema_obj));
        tool.annotations = Some(annotations_for(&self.method, self.title));
        tool
    }
}

/// Validated and coerced arguments handed to a handler.
///
/// Every value present here has already been coerced to its declared [`ParamType`], so the
/// accessors only fail for arguments that were never supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// A required, non-blank string argument.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.str(name)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::invalid(name))
    }

    pub fn require_int(&self, name: &str) -> Result<i64> {
        self.int(name).ok_or_else(|| ToolError::invalid(name))
    }
}

impl From<Map<String, Value>> for ToolArgs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One incoming invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments: match arguments {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

/// The envelope every dispatch produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub ok: bool,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResult {
    #[must_use]
    pub fn success(payload: Value) -> Self {
        Self {
            ok: true,
            payload,
            error_message: None,
        }
    }

    #[must_use]
    pub fn failure(error: &ToolError) -> Self {
        Self {
            ok: false,
            payload: Value::Null,
            error_message: Some(error.to_string()),
        }
    }
}

impl From<ToolResult> for CallToolResult {
    fn from(result: ToolResult) -> Self {
        if !result.ok {
            return CallToolResult {
                content: vec![Content::text(result.error_message.unwrap_or_default())],
                structured_content: None,
                is_error: Some(true),
                meta: None,
            };
        }

        // Some MCP clients only render `content`, so the payload goes out both ways.
        let text =
            serde_json::to_string(&result.payload).unwrap_or_else(|_| result.payload.to_string());
        CallToolResult {
            content: vec![Content::text(text)],
            structured_content: Some(json!({ "body": result.payload })),
            is_error: Some(false),
            meta: None,
        }
    }
}

/// One logical Kimai operation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value>;
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Name-indexed set of tools. Append-only during startup, read-only while serving.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] if a tool with the same name is already registered.
    pub fn register<H>(&mut self, definition: ToolDefinition, handler: H) -> Result<()>
    where
        H: ToolHandler + 'static,
    {
        if self.by_name.contains_key(definition.name) {
            return Err(ToolError::Config(format!(
                "duplicate tool name '{}'",
                definition.name
            )));
        }
        self.by_name.insert(definition.name, self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name.get(name).map(|&i| &self.tools[i].definition)
    }

    /// MCP tool descriptors in registration order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.definition.to_tool()).collect()
    }

    /// Resolve, validate, invoke. Never fails: errors become `ok: false` results.
    pub async fn dispatch(&self, client: &KimaiClient, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.by_name.get(call.name.as_str()).map(|&i| &self.tools[i]) else {
            warn!(tool = %call.name, "unknown tool requested");
            return ToolResult::failure(&ToolError::UnknownTool(call.name.clone()));
        };

        let args = match coerce_args(&tool.definition.params, &call.arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(tool = %call.name, error = %e, "rejected tool arguments");
                return ToolResult::failure(&e);
            }
        };

        match tool.handler.call(client, &args).await {
            Ok(payload) => {
                debug!(tool = %call.name, "tool call succeeded");
                ToolResult::success(payload)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool call failed");
                ToolResult::failure(&e)
            }
        }
    }
}

fn coerce_args(params: &[ParamSpec], raw: &Map<String, Value>) -> Result<ToolArgs> {
    for name in raw.keys() {
        if !params.iter().any(|p| p.name == name.as_str()) {
            debug!(argument = %name, "dropping undeclared argument");
        }
    }

    let mut out = Map::new();
    for param in params {
        let supplied = raw.get(param.name).filter(|v| !is_absent(v, param.ty));
        match supplied.or(param.default.as_ref()) {
            Some(value) => {
                let coerced = coerce(value, param.ty).ok_or_else(|| ToolError::invalid(param.name))?;
                out.insert(param.name.to_string(), coerced);
            }
            None if param.required => return Err(ToolError::invalid(param.name)),
            None => {}
        }
    }
    Ok(ToolArgs(out))
}

fn is_absent(value: &Value, ty: ParamType) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => ty != ParamType::String && s.trim().is_empty(),
        _ => false,
    }
}

fn coerce(value: &Value, ty: ParamType) -> Option<Value> {
    match ty {
        ParamType::String => match value {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        ParamType::Integer => match value {
            Value::Number(n) => n.as_i64().or_else(|| integral_f64(n.as_f64()?)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .map(Value::from),
        ParamType::Boolean => match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Some(true),
                "0" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
        .map(Value::Bool),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral_f64(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

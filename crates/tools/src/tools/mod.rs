//! The built-in Kimai tool set and the [`KimaiTools`] facade the server talks to.

mod entities;
mod system;
mod timesheets;

use crate::client::KimaiClient;
use crate::config::KimaiConfig;
use crate::error::{Result, ToolError};
use crate::registry::{ToolArgs, ToolCall, ToolRegistry, ToolResult};
use rmcp::model::{CallToolResult, Tool};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Build the registry holding every built-in tool.
///
/// # Errors
///
/// Returns [`ToolError::Config`] if two tools share a name.
pub fn builtin_registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    system::register(&mut registry)?;
    entities::register(&mut registry)?;
    timesheets::register(&mut registry)?;
    Ok(registry)
}

/// Registry plus client: everything needed to serve `tools/list` and `tools/call`.
///
/// Cheap to clone; both halves are shared and immutable.
#[derive(Clone)]
pub struct KimaiTools {
    registry: Arc<ToolRegistry>,
    client: KimaiClient,
}

impl KimaiTools {
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] if the HTTP client cannot be built.
    pub fn new(config: KimaiConfig) -> Result<Self> {
        Self::with_client(KimaiClient::new(config)?)
    }

    /// # Errors
    ///
    /// Returns [`ToolError::Config`] if the built-in registry is inconsistent.
    pub fn with_client(client: KimaiClient) -> Result<Self> {
        Ok(Self {
            registry: Arc::new(builtin_registry()?),
            client,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.registry.list_tools()
    }

    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        self.registry.dispatch(&self.client, call).await
    }

    /// `tools/call` entry point: dispatch and convert to the MCP result shape.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> CallToolResult {
        self.dispatch(&ToolCall::new(name, arguments)).await.into()
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ToolError::Normalization(format!("failed to serialize payload: {e}")))
}

/// An optional id or reference argument; when present it must be a positive integer.
fn positive_id(args: &ToolArgs, name: &str) -> Result<Option<i64>> {
    match args.int(name) {
        Some(id) if id <= 0 => Err(ToolError::invalid(name)),
        other => Ok(other),
    }
}

fn require_positive_id(args: &ToolArgs, name: &str) -> Result<i64> {
    positive_id(args, name)?.ok_or_else(|| ToolError::invalid(name))
}

/// Kimai's visibility filter codes: `1` visible, `2` hidden.
fn visibility_filter(visible: bool) -> &'static str {
    if visible { "1" } else { "2" }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::KimaiTools;
    use crate::config::{Credentials, KimaiConfig};
    use kimai_test_support::MockUpstream;
    use std::time::Duration;

    pub(crate) fn tools_for(upstream: &MockUpstream) -> KimaiTools {
        let mut config = KimaiConfig::new(Credentials::bearer(upstream.base_url(), "test-token"));
        config.retry.backoff = Duration::from_millis(10);
        KimaiTools::new(config).expect("tools")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn args(v: Value) -> ToolArgs {
        match v {
            Value::Object(map) => ToolArgs::from(map),
            _ => ToolArgs::from(Map::new()),
        }
    }

    #[test]
    fn builtin_registry_has_unique_names() {
        let registry = builtin_registry().expect("registry");
        assert_eq!(registry.len(), 18);
        for name in [
            "kimai_ping",
            "kimai_version",
            "kimai_list_activities",
            "kimai_get_activity",
            "kimai_create_activity",
            "kimai_update_activity",
            "kimai_set_activity_meta",
            "kimai_list_projects",
            "kimai_get_project",
            "kimai_create_project",
            "kimai_update_project",
            "kimai_set_project_meta",
            "kimai_list_customers",
            "kimai_list_timesheets",
            "kimai_get_timesheet",
            "kimai_create_timesheet",
            "kimai_update_timesheet",
            "kimai_list_recent_timesheets",
        ] {
            assert!(registry.definition(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn ids_must_be_positive() {
        assert_eq!(positive_id(&args(json!({"id": 3})), "id"), Ok(Some(3)));
        assert_eq!(positive_id(&args(json!({})), "id"), Ok(None));
        assert_eq!(
            positive_id(&args(json!({"id": 0})), "id"),
            Err(ToolError::invalid("id"))
        );
        assert_eq!(
            require_positive_id(&args(json!({})), "project"),
            Err(ToolError::invalid("project"))
        );
    }

    #[test]
    fn visibility_codes() {
        assert_eq!(visibility_filter(true), "1");
        assert_eq!(visibility_filter(false), "2");
    }
}

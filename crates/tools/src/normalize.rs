//! Response normalization.
//!
//! Kimai serializes the same logical entity differently depending on endpoint, version and
//! serializer group: bare objects, objects wrapped under a key, references as raw integers or as
//! embedded objects. Every shape is classified into a known variant in a fixed priority order and
//! anything unrecognized fails closed with [`ToolError::Normalization`].

use crate::error::{Result, ToolError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

const RAW_PREVIEW_MAX_CHARS: usize = 512;
const LIST_WRAPPER_KEYS: [&str; 3] = ["data", "items", "results"];

/// Entity types that share the canonical [`Entity`] shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Activity,
    Project,
    Customer,
}

impl EntityKind {
    #[must_use]
    pub fn singular(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Project => "project",
            Self::Customer => "customer",
        }
    }

    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Self::Activity => "activities",
            Self::Project => "projects",
            Self::Customer => "customers",
        }
    }

    /// Upstream collection path, e.g. `/api/activities`.
    #[must_use]
    pub fn collection_path(self) -> String {
        format!("/api/{}", self.plural())
    }

    /// The upstream field naming this entity's parent, if it has one.
    #[must_use]
    pub fn parent_field(self) -> Option<&'static str> {
        match self {
            Self::Activity => Some("project"),
            Self::Project => Some("customer"),
            Self::Customer => None,
        }
    }
}

/// Canonical activity/project/customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    pub visible: bool,
    pub meta_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timesheet {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// How a single entity arrived.
enum ObjectShape<'a> {
    Bare(&'a Map<String, Value>),
    /// Wrapped one level under a keyed field (`{"activity": {...}}`, `{"data": {...}}`).
    Wrapped(&'a Map<String, Value>),
}

impl<'a> ObjectShape<'a> {
    fn fields(&self) -> &'a Map<String, Value> {
        match self {
            Self::Bare(fields) | Self::Wrapped(fields) => *fields,
        }
    }
}

/// How a collection arrived.
enum ListShape<'a> {
    Empty,
    Items(&'a [Value]),
    Single(&'a Value),
}

/// How an identifier or reference arrived.
#[derive(Debug, PartialEq, Eq)]
enum RefShape {
    Absent,
    Scalar(i64),
    Embedded(i64),
    Unrecognized,
}

impl RefShape {
    fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::Number(n)) => n.as_i64().map_or(Self::Unrecognized, Self::Scalar),
            Some(Value::Object(o)) => o
                .get("id")
                .and_then(Value::as_i64)
                .map_or(Self::Unrecognized, Self::Embedded),
            Some(_) => Self::Unrecognized,
        }
    }

    fn id(&self) -> Option<i64> {
        match self {
            Self::Scalar(id) | Self::Embedded(id) => Some(*id),
            Self::Absent | Self::Unrecognized => None,
        }
    }
}

/// Normalize one activity/project/customer.
///
/// # Errors
///
/// Returns [`ToolError::Normalization`] when no known shape matches or a required field is
/// missing or mistyped.
pub fn normalize_entity(raw: &Value, kind: EntityKind) -> Result<Entity> {
    let result = classify_object(raw, kind.singular())
        .ok_or_else(|| unrecognized(kind.singular()))
        .and_then(|shape| extract_entity(shape.fields(), kind));
    log_failure(kind.singular(), raw, &result);
    result
}

/// Normalize a collection of activities/projects/customers. Zero matches yield an empty list.
///
/// # Errors
///
/// Returns [`ToolError::Normalization`] if the collection shape or any item is unrecognized.
pub fn normalize_list(raw: &Value, kind: EntityKind) -> Result<Vec<Entity>> {
    match classify_list(raw, kind.singular(), kind.plural()) {
        Some(ListShape::Empty) => Ok(Vec::new()),
        Some(ListShape::Items(items)) => items
            .iter()
            .map(|item| normalize_entity(item, kind))
            .collect(),
        Some(ListShape::Single(item)) => Ok(vec![normalize_entity(item, kind)?]),
        None => {
            let result = Err(unrecognized(kind.plural()));
            log_failure(kind.plural(), raw, &result);
            result
        }
    }
}

/// Extract a version string from whatever `/api/version` returned.
///
/// # Errors
///
/// Returns [`ToolError::Normalization`] if no version string can be found.
pub fn normalize_version(raw: &Value) -> Result<Version> {
    let result = extract_version(raw, true)
        .map(|version| Version { version })
        .ok_or_else(|| unrecognized("version"));
    log_failure("version", raw, &result);
    result
}

/// Normalize one timesheet record.
///
/// # Errors
///
/// Returns [`ToolError::Normalization`] on an unrecognized shape.
pub fn normalize_timesheet(raw: &Value) -> Result<Timesheet> {
    let result = classify_object(raw, "timesheet")
        .ok_or_else(|| unrecognized("timesheet"))
        .and_then(|shape| extract_timesheet(shape.fields()));
    log_failure("timesheet", raw, &result);
    result
}

/// Normalize a collection of timesheets.
///
/// # Errors
///
/// Returns [`ToolError::Normalization`] if the collection shape or any item is unrecognized.
pub fn normalize_timesheet_list(raw: &Value) -> Result<Vec<Timesheet>> {
    match classify_list(raw, "timesheet", "timesheets") {
        Some(ListShape::Empty) => Ok(Vec::new()),
        Some(ListShape::Items(items)) => items.iter().map(normalize_timesheet).collect(),
        Some(ListShape::Single(item)) => Ok(vec![normalize_timesheet(item)?]),
        None => {
            let result = Err(unrecognized("timesheets"));
            log_failure("timesheets", raw, &result);
            result
        }
    }
}

fn classify_object<'a>(raw: &'a Value, singular: &str) -> Option<ObjectShape<'a>> {
    let obj = raw.as_object()?;
    if obj.contains_key("id") {
        return Some(ObjectShape::Bare(obj));
    }
    [singular, "data"].into_iter().find_map(|key| match obj.get(key) {
        Some(Value::Object(inner)) if inner.contains_key("id") => {
            Some(ObjectShape::Wrapped(inner))
        }
        _ => None,
    })
}

fn classify_list<'a>(
    raw: &'a Value,
    singular: &'static str,
    plural: &'static str,
) -> Option<ListShape<'a>> {
    match raw {
        Value::Null => Some(ListShape::Empty),
        Value::Array(items) => Some(ListShape::Items(items)),
        Value::Object(obj) => {
            let nested = LIST_WRAPPER_KEYS
                .into_iter()
                .chain(std::iter::once(plural))
                .find_map(|key| obj.get(key).and_then(Value::as_array));
            if let Some(items) = nested {
                return Some(ListShape::Items(items));
            }
            classify_object(raw, singular).map(|_| ListShape::Single(raw))
        }
        _ => None,
    }
}

fn extract_entity(fields: &Map<String, Value>, kind: EntityKind) -> Result<Entity> {
    let id = required_id(fields, "id", kind.singular())?;
    let name = match fields.get("name") {
        Some(Value::String(name)) => name.clone(),
        _ => {
            return Err(ToolError::Normalization(format!(
                "{} {id} has no string 'name'",
                kind.singular()
            )));
        }
    };

    let parent = match kind.parent_field() {
        Some(field) => optional_ref(fields, field, kind.singular())?,
        None => None,
    };

    Ok(Entity {
        id,
        name,
        project_id: if kind == EntityKind::Activity { parent } else { None },
        customer_id: if kind == EntityKind::Project { parent } else { None },
        visible: extract_visible(fields.get("visible"), kind.singular())?,
        meta_fields: extract_meta_fields(fields, kind.singular())?,
    })
}

fn extract_timesheet(fields: &Map<String, Value>) -> Result<Timesheet> {
    const KIND: &str = "timesheet";
    Ok(Timesheet {
        id: required_id(fields, "id", KIND)?,
        activity_id: optional_ref(fields, "activity", KIND)?,
        project_id: optional_ref(fields, "project", KIND)?,
        begin: optional_string(fields, "begin", KIND)?,
        end: optional_string(fields, "end", KIND)?,
        duration: match RefShape::of(fields.get("duration")) {
            RefShape::Absent => None,
            RefShape::Scalar(d) => Some(d),
            _ => return Err(field_error(KIND, "duration")),
        },
        description: optional_string(fields, "description", KIND)?,
    })
}

fn required_id(fields: &Map<String, Value>, field: &str, kind: &str) -> Result<i64> {
    RefShape::of(fields.get(field))
        .id()
        .ok_or_else(|| field_error(kind, field))
}

fn optional_ref(fields: &Map<String, Value>, field: &str, kind: &str) -> Result<Option<i64>> {
    match RefShape::of(fields.get(field)) {
        RefShape::Absent => Ok(None),
        RefShape::Scalar(id) | RefShape::Embedded(id) => Ok(Some(id)),
        RefShape::Unrecognized => Err(field_error(kind, field)),
    }
}

fn optional_string(fields: &Map<String, Value>, field: &str, kind: &str) -> Result<Option<String>> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(field_error(kind, field)),
    }
}

fn extract_visible(value: Option<&Value>, kind: &str) -> Result<bool> {
    match value {
        None | Some(Value::Null) => Ok(true),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(field_error(kind, "visible")),
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(field_error(kind, "visible")),
        },
        Some(_) => Err(field_error(kind, "visible")),
    }
}

fn extract_meta_fields(fields: &Map<String, Value>, kind: &str) -> Result<BTreeMap<String, String>> {
    let raw = fields.get("metaFields").or_else(|| fields.get("meta_fields"));
    let mut out = BTreeMap::new();
    match raw {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let name = item
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| field_error(kind, "metaFields"))?;
                let value = scalar_to_string(item.get("value").unwrap_or(&Value::Null))
                    .ok_or_else(|| field_error(kind, "metaFields"))?;
                out.insert(name.to_string(), value);
            }
        }
        Some(Value::Object(map)) => {
            for (name, value) in map {
                let value = scalar_to_string(value).ok_or_else(|| field_error(kind, "metaFields"))?;
                out.insert(name.clone(), value);
            }
        }
        Some(_) => return Err(field_error(kind, "metaFields")),
    }
    Ok(out)
}

fn extract_version(raw: &Value, descend: bool) -> Option<String> {
    match raw {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => ["version", "semver"]
            .into_iter()
            .find_map(|key| obj.get(key).and_then(|v| extract_version(v, false)))
            .or_else(|| {
                if descend {
                    obj.get("data").and_then(|v| extract_version(v, false))
                } else {
                    None
                }
            }),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn field_error(kind: &str, field: &str) -> ToolError {
    ToolError::Normalization(format!("{kind} field '{field}' has an unrecognized shape"))
}

fn unrecognized(what: &str) -> ToolError {
    ToolError::Normalization(format!("unrecognized {what} response shape"))
}

fn log_failure<T>(what: &str, raw: &Value, result: &Result<T>) {
    if let Err(e) = result {
        warn!(kind = what, error = %e, raw = %preview(raw), "unrecognized upstream shape");
    }
}

fn preview(raw: &Value) -> String {
    let rendered = raw.to_string();
    if rendered.chars().count() <= RAW_PREVIEW_MAX_CHARS {
        return rendered;
    }
    let mut out: String = rendered.chars().take(RAW_PREVIEW_MAX_CHARS).collect();
    out.push('…');
    out
}

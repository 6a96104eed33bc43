//! Timesheet tools.

use super::{positive_id, require_positive_id, to_payload};
use crate::client::{KimaiClient, QueryParams};
use crate::error::{Result, ToolError};
use crate::normalize::{normalize_timesheet, normalize_timesheet_list};
use crate::registry::{ParamSpec, ParamType, ToolArgs, ToolDefinition, ToolHandler, ToolRegistry};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use reqwest::Method;
use serde_json::{Map, Value, json};

const MAX_PAGE_SIZE: i64 = 500;
const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];
const DATETIME_HELP: &str = "RFC 3339 or local YYYY-MM-DDTHH:MM[:SS]";

pub(super) fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDefinition {
            name: "kimai_list_timesheets",
            title: "List timesheets",
            description: "List Kimai timesheet records, optionally filtered by project, activity and time range.",
            method: Method::GET,
            params: vec![
                ParamSpec::optional("project", ParamType::Integer, "Only records of this project id"),
                ParamSpec::optional("activity", ParamType::Integer, "Only records of this activity id"),
                ParamSpec::optional("begin", ParamType::String, DATETIME_HELP),
                ParamSpec::optional("end", ParamType::String, DATETIME_HELP),
                ParamSpec::optional("size", ParamType::Integer, "Page size, 1 to 500"),
            ],
        },
        ListTimesheets,
    )?;
    registry.register(
        ToolDefinition {
            name: "kimai_get_timesheet",
            title: "Get timesheet",
            description: "Fetch one Kimai timesheet record by id.",
            method: Method::GET,
            params: vec![ParamSpec::required("id", ParamType::Integer, "Record id")],
        },
        GetTimesheet,
    )?;
    registry.register(
        ToolDefinition {
            name: "kimai_create_timesheet",
            title: "Create timesheet",
            description: "Record time in Kimai. Without an end the record is started as a running timer.",
            method: Method::POST,
            params: vec![
                ParamSpec::required("activity", ParamType::Integer, "Activity id"),
                ParamSpec::required("project", ParamType::Integer, "Project id"),
                ParamSpec::required("begin", ParamType::String, DATETIME_HELP),
                ParamSpec::optional("end", ParamType::String, DATETIME_HELP),
                ParamSpec::optional("description", ParamType::String, "Free-text description"),
            ],
        },
        CreateTimesheet,
    )?;
    registry.register(
        ToolDefinition {
            name: "kimai_update_timesheet",
            title: "Update timesheet",
            description: "Change an existing Kimai timesheet record. Only the supplied fields are sent.",
            method: Method::PATCH,
            params: vec![
                ParamSpec::required("id", ParamType::Integer, "Record id"),
                ParamSpec::optional("activity", ParamType::Integer, "Activity id"),
                ParamSpec::optional("project", ParamType::Integer, "Project id"),
                ParamSpec::optional("begin", ParamType::String, DATETIME_HELP),
                ParamSpec::optional("end", ParamType::String, DATETIME_HELP),
                ParamSpec::optional("description", ParamType::String, "Free-text description"),
            ],
        },
        UpdateTimesheet,
    )?;
    registry.register(
        ToolDefinition {
            name: "kimai_list_recent_timesheets",
            title: "List recent timesheets",
            description: "List the current user's most recent Kimai timesheet records.",
            method: Method::GET,
            params: vec![
                ParamSpec::optional("begin", ParamType::String, "Only records since this moment"),
                ParamSpec::optional("size", ParamType::Integer, "Number of records, 1 to 500"),
            ],
        },
        ListRecentTimesheets,
    )
}

/// A datetime argument in one of the forms Kimai accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Moment {
    Zoned(DateTime<FixedOffset>),
    Local(NaiveDateTime),
}

fn parse_moment(name: &str, raw: &str) -> Result<Moment> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Moment::Zoned(dt));
    }
    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(Moment::Local)
        .ok_or_else(|| ToolError::invalid(name))
}

/// Parse the optional `begin`/`end` pair, rejecting an `end` before `begin` when both use the
/// same form. Mixed forms cannot be compared without the server's timezone.
fn time_range<'a>(args: &'a ToolArgs) -> Result<(Option<&'a str>, Option<&'a str>)> {
    let begin = args.str("begin").filter(|s| !s.trim().is_empty());
    let end = args.str("end").filter(|s| !s.trim().is_empty());
    let parsed_begin = begin.map(|b| parse_moment("begin", b)).transpose()?;
    let parsed_end = end.map(|e| parse_moment("end", e)).transpose()?;

    let reversed = match (parsed_begin, parsed_end) {
        (Some(Moment::Zoned(b)), Some(Moment::Zoned(e))) => e < b,
        (Some(Moment::Local(b)), Some(Moment::Local(e))) => e < b,
        _ => false,
    };
    if reversed {
        return Err(ToolError::invalid("end"));
    }
    Ok((begin, end))
}

fn push_size(args: &ToolArgs, query: &mut QueryParams) -> Result<()> {
    if let Some(size) = args.int("size") {
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(ToolError::invalid("size"));
        }
        query.push(("size", size.to_string()));
    }
    Ok(())
}

struct ListTimesheets;

#[async_trait]
impl ToolHandler for ListTimesheets {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let (begin, end) = time_range(args)?;

        let mut query = QueryParams::new();
        if let Some(project) = positive_id(args, "project")? {
            query.push(("project", project.to_string()));
        }
        if let Some(activity) = positive_id(args, "activity")? {
            query.push(("activity", activity.to_string()));
        }
        if let Some(begin) = begin {
            query.push(("begin", begin.trim().to_string()));
        }
        if let Some(end) = end {
            query.push(("end", end.trim().to_string()));
        }
        push_size(args, &mut query)?;

        let raw = client.get("/api/timesheets", &query).await?;
        to_payload(&normalize_timesheet_list(&raw)?)
    }
}

struct GetTimesheet;

#[async_trait]
impl ToolHandler for GetTimesheet {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let id = require_positive_id(args, "id")?;
        let raw = client
            .get(&format!("/api/timesheets/{id}"), &QueryParams::new())
            .await?;
        to_payload(&normalize_timesheet(&raw)?)
    }
}

struct CreateTimesheet;

#[async_trait]
impl ToolHandler for CreateTimesheet {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let activity = require_positive_id(args, "activity")?;
        let project = require_positive_id(args, "project")?;
        let (begin, end) = time_range(args)?;
        let begin = begin.ok_or_else(|| ToolError::invalid("begin"))?;

        let mut body = Map::new();
        body.insert("activity".into(), json!(activity));
        body.insert("project".into(), json!(project));
        body.insert("begin".into(), json!(begin.trim()));
        if let Some(end) = end {
            body.insert("end".into(), json!(end.trim()));
        }
        if let Some(description) = args.str("description") {
            body.insert("description".into(), json!(description));
        }

        let raw = client.post("/api/timesheets", &Value::Object(body)).await?;
        to_payload(&normalize_timesheet(&raw)?)
    }
}

struct UpdateTimesheet;

#[async_trait]
impl ToolHandler for UpdateTimesheet {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let id = require_positive_id(args, "id")?;
        let (begin, end) = time_range(args)?;

        let mut body = Map::new();
        for field in ["activity", "project"] {
            if let Some(reference) = positive_id(args, field)? {
                body.insert(field.into(), json!(reference));
            }
        }
        if let Some(begin) = begin {
            body.insert("begin".into(), json!(begin.trim()));
        }
        if let Some(end) = end {
            body.insert("end".into(), json!(end.trim()));
        }
        if let Some(description) = args.str("description") {
            body.insert("description".into(), json!(description));
        }
        if body.is_empty() {
            return Err(ToolError::invalid(
                "at least one of activity, project, begin, end, description",
            ));
        }

        let raw = client
            .patch(&format!("/api/timesheets/{id}"), &Value::Object(body))
            .await?;
        to_payload(&normalize_timesheet(&raw)?)
    }
}

struct ListRecentTimesheets;

#[async_trait]
impl ToolHandler for ListRecentTimesheets {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let (begin, _) = time_range(args)?;

        let mut query = QueryParams::new();
        if let Some(begin) = begin {
            query.push(("begin", begin.trim().to_string()));
        }
        push_size(args, &mut query)?;

        let raw = client.get("/api/timesheets/recent", &query).await?;
        to_payload(&normalize_timesheet_list(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::tools_for;
    use super::{Moment, parse_moment};
    use crate::registry::ToolCall;
    use kimai_test_support::{MockUpstream, Reply};
    use serde_json::json;

    #[test]
    fn accepts_rfc3339_and_local_datetimes() {
        assert!(matches!(
            parse_moment("begin", "2024-05-01T09:00:00+02:00"),
            Ok(Moment::Zoned(_))
        ));
        assert!(matches!(
            parse_moment("begin", "2024-05-01T09:00"),
            Ok(Moment::Local(_))
        ));
        assert!(matches!(
            parse_moment("begin", "2024-05-01T09:00:30"),
            Ok(Moment::Local(_))
        ));
        assert!(parse_moment("begin", "yesterday").is_err());
    }

    #[tokio::test]
    async fn create_timesheet_posts_the_supplied_fields() {
        let upstream = MockUpstream::start(|_| {
            Reply::json(json!({
                "id": 55,
                "activity": {"id": 3},
                "project": 4,
                "begin": "2024-05-01T09:00:00+0200",
                "end": "2024-05-01T10:30:00+0200",
                "duration": 5400,
                "description": "planning"
            }))
        })
        .await;
        let tools = tools_for(&upstream);

        let result = tools
            .dispatch(&ToolCall::new(
                "kimai_create_timesheet",
                json!({
                    "activity": 3,
                    "project": "4",
                    "begin": "2024-05-01T09:00",
                    "end": "2024-05-01T10:30",
                    "description": "planning"
                }),
            ))
            .await;

        assert!(result.ok, "{result:?}");
        assert_eq!(result.payload["id"], 55);
        assert_eq!(result.payload["activityId"], 3);
        assert_eq!(result.payload["duration"], 5400);

        let requests = upstream.requests();
        assert_eq!(requests[0].path, "/api/timesheets");
        assert_eq!(
            requests[0].body,
            Some(json!({
                "activity": 3,
                "project": 4,
                "begin": "2024-05-01T09:00",
                "end": "2024-05-01T10:30",
                "description": "planning"
            }))
        );
    }

    #[tokio::test]
    async fn end_before_begin_is_rejected_locally() {
        let upstream = MockUpstream::start(|_| Reply::json(json!({}))).await;
        let tools = tools_for(&upstream);

        let result = tools
            .dispatch(&ToolCall::new(
                "kimai_create_timesheet",
                json!({
                    "activity": 3,
                    "project": 4,
                    "begin": "2024-05-01T10:00",
                    "end": "2024-05-01T09:00"
                }),
            ))
            .await;

        assert_eq!(result.error_message.as_deref(), Some("invalid argument: end"));
        assert_eq!(upstream.request_count(), 0);
    }

    #[tokio::test]
    async fn list_timesheets_passes_only_supplied_filters() {
        let upstream = MockUpstream::start(|_| {
            Reply::json(json!([{"id": 1, "activity": 2, "project": 3, "begin": "2024-05-01T09:00:00+0000"}]))
        })
        .await;
        let tools = tools_for(&upstream);

        let result = tools
            .dispatch(&ToolCall::new(
                "kimai_list_timesheets",
                json!({"project": 3, "size": "10"}),
            ))
            .await;

        assert!(result.ok, "{result:?}");
        assert_eq!(result.payload[0]["projectId"], 3);
        let requests = upstream.requests();
        assert_eq!(requests[0].query_keys(), vec!["project", "size"]);
        assert_eq!(requests[0].query_value("size"), Some("10"));
    }

    #[tokio::test]
    async fn page_size_is_bounded() {
        let upstream = MockUpstream::start(|_| Reply::json(json!([]))).await;
        let tools = tools_for(&upstream);

        for size in [0, 501] {
            let result = tools
                .dispatch(&ToolCall::new("kimai_list_timesheets", json!({"size": size})))
                .await;
            assert_eq!(result.error_message.as_deref(), Some("invalid argument: size"));
        }
        assert_eq!(upstream.request_count(), 0);
    }

    #[tokio::test]
    async fn get_timesheet_unwraps_the_record() {
        let upstream = MockUpstream::start(|_| {
            Reply::json(json!({"timesheet": {"id": 8, "activity": 1, "project": 2}}))
        })
        .await;
        let tools = tools_for(&upstream);

        let result = tools
            .dispatch(&ToolCall::new("kimai_get_timesheet", json!({"id": 8})))
            .await;

        assert!(result.ok, "{result:?}");
        assert_eq!(result.payload["id"], 8);
        assert_eq!(upstream.requests()[0].path, "/api/timesheets/8");
    }

    #[tokio::test]
    async fn update_timesheet_sends_only_supplied_fields() {
        let upstream = MockUpstream::start(|req| {
            let mut record = json!({
                "id": 8,
                "activity": 1,
                "project": 2,
                "begin": "2024-05-01T09:00:00+0200",
                "description": "old"
            });
            if let Some(body) = &req.body {
                for (key, value) in body.as_object().into_iter().flatten() {
                    record[key.as_str()] = value.clone();
                }
            }
            Reply::json(record)
        })
        .await;
        let tools = tools_for(&upstream);

        let result = tools
            .dispatch(&ToolCall::new(
                "kimai_update_timesheet",
                json!({"id": 8, "end": "2024-05-01T11:00:00+02:00"}),
            ))
            .await;

        assert!(result.ok, "{result:?}");
        assert_eq!(result.payload["description"], "old");
        assert_eq!(result.payload["end"], "2024-05-01T11:00:00+02:00");

        let requests = upstream.requests();
        assert_eq!(requests[0].method, "PATCH");
        assert_eq!(requests[0].path, "/api/timesheets/8");
        assert_eq!(requests[0].body, Some(json!({"end": "2024-05-01T11:00:00+02:00"})));
    }

    #[tokio::test]
    async fn update_timesheet_without_fields_makes_no_request() {
        let upstream = MockUpstream::start(|_| Reply::json(json!({}))).await;
        let tools = tools_for(&upstream);

        let result = tools
            .dispatch(&ToolCall::new("kimai_update_timesheet", json!({"id": 8})))
            .await;

        assert!(!result.ok);
        assert!(
            result
                .error_message
                .as_deref()
                .is_some_and(|m| m.starts_with("invalid argument: at least one of"))
        );

        let reversed = tools
            .dispatch(&ToolCall::new(
                "kimai_update_timesheet",
                json!({"id": 8, "begin": "2024-05-01T10:00", "end": "2024-05-01T09:00"}),
            ))
            .await;
        assert_eq!(reversed.error_message.as_deref(), Some("invalid argument: end"));
        assert_eq!(upstream.request_count(), 0);
    }

    #[tokio::test]
    async fn recent_timesheets_use_the_recent_endpoint() {
        let upstream = MockUpstream::start(|_| {
            Reply::json(json!([
                {"id": 21, "activity": {"id": 4}, "project": {"id": 5}},
                {"id": 20, "activity": 4, "project": 5}
            ]))
        })
        .await;
        let tools = tools_for(&upstream);

        let result = tools
            .dispatch(&ToolCall::new("kimai_list_recent_timesheets", json!({"size": 2})))
            .await;

        assert!(result.ok, "{result:?}");
        assert_eq!(result.payload[0]["id"], 21);
        assert_eq!(result.payload[0]["activityId"], 4);
        assert_eq!(result.payload[1]["projectId"], 5);

        let requests = upstream.requests();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/api/timesheets/recent");
        assert_eq!(requests[0].query_keys(), vec!["size"]);
    }
}

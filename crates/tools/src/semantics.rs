//! MCP `ToolAnnotations` derived from the upstream HTTP method a tool issues.
//!
//! Kimai tools only ever use GET, POST and PATCH, but any method maps to a sensible set of hints.

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Annotations for a Kimai-backed tool. Every tool talks to an external system, so
/// `openWorldHint` is always set.
#[must_use]
pub fn annotations_for(method: &Method, title: &str) -> ToolAnnotations {
    let (read_only, destructive, idempotent) =
        if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
            (Some(true), Some(false), Some(true))
        } else if method == Method::POST {
            // Creating a record never overwrites one.
            (Some(false), Some(false), Some(false))
        } else if method == Method::PUT || method == Method::DELETE {
            (Some(false), Some(true), Some(true))
        } else if method == Method::PATCH {
            // Kimai PATCH bodies replace only the supplied fields; the upstream makes no promise
            // about repeating one.
            (Some(false), Some(true), None)
        } else {
            (None, None, None)
        };

    ToolAnnotations {
        title: Some(title.to_string()),
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}

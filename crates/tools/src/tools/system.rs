//! Connectivity tools: `kimai_ping` and `kimai_version`.

use super::to_payload;
use crate::client::{KimaiClient, QueryParams};
use crate::error::Result;
use crate::normalize::normalize_version;
use crate::registry::{ToolArgs, ToolDefinition, ToolHandler, ToolRegistry};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDefinition {
            name: "kimai_ping",
            title: "Ping Kimai",
            description: "Check that the Kimai API is reachable and accepts the configured credentials.",
            method: Method::GET,
            params: Vec::new(),
        },
        Ping,
    )?;
    registry.register(
        ToolDefinition {
            name: "kimai_version",
            title: "Kimai version",
            description: "Return the version of the connected Kimai server.",
            method: Method::GET,
            params: Vec::new(),
        },
        Version,
    )
}

struct Ping;

#[async_trait]
impl ToolHandler for Ping {
    async fn call(&self, client: &KimaiClient, _args: &ToolArgs) -> Result<Value> {
        // Any 2xx is enough; the body differs between Kimai releases.
        client.get("/api/ping", &QueryParams::new()).await?;
        Ok(json!({ "reachable": true }))
    }
}

struct Version;

#[async_trait]
impl ToolHandler for Version {
    async fn call(&self, client: &KimaiClient, _args: &ToolArgs) -> Result<Value> {
        let raw = client.get("/api/version", &QueryParams::new()).await?;
        to_payload(&normalize_version(&raw)?)
    }
}

//! Kimai tool registry, REST client adapter and response normalizer.
//!
//! This crate is used by the `kimai-mcp` stdio server. It holds no transport logic: callers hand
//! it a tool name plus arguments and get back exactly one result.

pub mod client;
pub mod config;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod semantics;
pub mod tools;

pub use client::KimaiClient;
pub use config::{KimaiConfig, resolve_config};
pub use error::{Result, ToolError};
pub use registry::{ToolCall, ToolResult};
pub use tools::{KimaiTools, builtin_registry};

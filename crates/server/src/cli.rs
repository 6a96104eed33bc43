use clap::{Parser, ValueEnum};
use kimai_mcp_tools::config::{
    ENV_BASE_URL, ENV_RETRY_BACKOFF_MS, ENV_TIMEOUT_SECS, ENV_TOKEN, ENV_USER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Expose the Kimai time-tracking API as MCP tools over stdio.
#[derive(Debug, Parser)]
#[command(name = "kimai-mcp", version, about)]
pub struct Cli {
    /// Kimai base URL
    #[arg(long, env = "KIMAI_BASE_URL")]
    pub base_url: Option<String>,

    /// API token. Alone it is sent as a bearer token; with --user as X-AUTH-TOKEN.
    /// `KIMAI_API_TOKEN` is accepted as an alias.
    #[arg(long, env = "KIMAI_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username for legacy X-AUTH-USER/X-AUTH-TOKEN authentication
    #[arg(long, env = "KIMAI_USER")]
    pub user: Option<String>,

    /// Per-request timeout in seconds (clamped to 1..=60)
    #[arg(long, env = "KIMAI_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Delay before the single retry of a failed read
    #[arg(long, env = "KIMAI_RETRY_BACKOFF_MS")]
    pub retry_backoff_ms: Option<u64>,

    /// Maximum number of tool calls executing at once
    #[arg(long, env = "KIMAI_MCP_MAX_CONCURRENT_CALLS", default_value_t = 8)]
    pub max_concurrent_calls: usize,

    /// Log filter directive; overrides `RUST_LOG`
    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Configuration lookup: flags (and the env vars clap already folded into them) first, then
    /// the raw process environment for keys without a flag.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let from_flag = match key {
            ENV_BASE_URL => self.base_url.clone(),
            ENV_TOKEN => self.token.clone(),
            ENV_USER => self.user.clone(),
            ENV_TIMEOUT_SECS => self.timeout_secs.map(|v| v.to_string()),
            ENV_RETRY_BACKOFF_MS => self.retry_backoff_ms.map(|v| v.to_string()),
            _ => None,
        };
        from_flag.or_else(|| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_take_precedence_in_lookup() {
        let cli = Cli::try_parse_from([
            "kimai-mcp",
            "--base-url",
            "https://kimai.example.com",
            "--token",
            "flag-token",
            "--timeout-secs",
            "3",
        ])
        .expect("parse");

        assert_eq!(
            cli.lookup(ENV_BASE_URL).as_deref(),
            Some("https://kimai.example.com")
        );
        assert_eq!(cli.lookup(ENV_TOKEN).as_deref(), Some("flag-token"));
        assert_eq!(cli.lookup(ENV_TIMEOUT_SECS).as_deref(), Some("3"));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn log_format_accepts_json() {
        let cli = Cli::try_parse_from([
            "kimai-mcp",
            "--log-format",
            "json",
            "--max-concurrent-calls",
            "2",
        ])
        .expect("parse");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.max_concurrent_calls, 2);
    }
}

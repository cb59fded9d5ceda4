use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to contact the server {server}: {message}")]
    ServerUnreachable { server: String, message: String },

    #[error("The rule requested doesn't exist on the server: {0}")]
    RuleNotFound(String),

    #[error("Server {server} answered {status} for {endpoint}")]
    ServerStatus {
        server: String,
        endpoint: String,
        status: u16,
    },

    #[error("Rule '{rule}' is larger than {limit} bytes")]
    RuleTooLarge { rule: String, limit: u64 },

    #[error("Invalid server address '{server}': {message}")]
    InvalidServer { server: String, message: String },

    #[error("Rule '{rule}' failed to compile: {message}")]
    RuleCompile { rule: String, message: String },

    #[error("Failed to report match to {endpoint}: {message}")]
    Report { endpoint: String, message: String },

    #[error("Unreadable archive {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    #[error("Process {0} no longer exists")]
    ProcessGone(u32),

    #[error("Access to process {pid} denied: {message}")]
    ProcessAccess { pid: u32, message: String },

    #[error("No readable memory in process {0}")]
    MemoryUnreadable(u32),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AgentError {
    /// Whether this error ends the whole invocation rather than a single target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ServerUnreachable { .. }
                | Self::RuleNotFound(_)
                | Self::ServerStatus { .. }
                | Self::RuleTooLarge { .. }
                | Self::InvalidServer { .. }
                | Self::RuleCompile { .. }
                | Self::Config(_)
                | Self::Toml(_)
        )
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}

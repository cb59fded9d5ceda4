use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Port the rule server listens on unless told otherwise.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rastrea.toml";

const FALLBACK_HOSTNAME: &str = "unknown-host";

/// Top-level configuration from `rastrea.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port used when the server argument carries none.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Applies to every request: rule fetch and match reports.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Host identifier sent with every report.
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Archive members bigger than this are skipped.
    #[serde(default = "default_max_member_size")]
    pub max_member_size: u64,
    /// Process memory regions bigger than this are skipped.
    #[serde(default = "default_max_region_size")]
    pub max_region_size: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_max_member_size() -> u64 {
    100 * 1024 * 1024
}

fn default_max_region_size() -> u64 {
    256 * 1024 * 1024
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_member_size: default_max_member_size(),
            max_region_size: default_max_region_size(),
            follow_symlinks: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the host identifier once, at startup.
    ///
    /// Order: explicit override, `[agent] hostname`, `COMPUTERNAME`,
    /// `HOSTNAME`, `/etc/hostname`.
    pub fn resolve_hostname(&self, cli_override: Option<&str>) -> String {
        let non_blank = |h: String| {
            let h = h.trim().to_string();
            (!h.is_empty()).then_some(h)
        };
        let from_env = |key: &str| std::env::var(key).ok().and_then(non_blank);

        cli_override
            .map(str::to_string)
            .and_then(non_blank)
            .or_else(|| self.agent.hostname.clone().and_then(non_blank))
            .or_else(|| from_env("COMPUTERNAME"))
            .or_else(|| from_env("HOSTNAME"))
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .and_then(non_blank)
            })
            .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string())
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# rastrea agent configuration

[server]
# Port of the rule server when the server argument doesn't carry one.
port = 8080
# Seconds before a rule fetch or a match report is abandoned.
timeout_secs = 30

[agent]
# Host identifier sent with every report. Defaults to COMPUTERNAME/HOSTNAME.
# hostname = "WKS-0042"

[scan]
# Archive members larger than this many bytes are not scanned.
max_member_size = 104857600
# Process memory regions larger than this many bytes are not scanned.
max_region_size = 268435456
# Follow symbolic links while walking directories.
follow_symlinks = false
"#
    }
}

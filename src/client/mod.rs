//! Talking to the rule server.
//!
//! Plain HTTP, form-encoded POST bodies, one request per operation:
//! `/getrule` to pull a rule, `/putfile` and `/putpid` to report matches.

pub mod report;
pub mod rules;

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{AgentError, Result};

pub use report::{HttpReporter, MatchReporter};
pub use rules::{RuleClient, RuleSource};

/// Base address of a rule server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    base: Url,
}

impl ServerEndpoint {
    /// Parse `host`, `host:port` or a full `http://` URL. A missing port is
    /// filled with `default_port`.
    pub fn parse(server: &str, default_port: u16) -> Result<Self> {
        let invalid = |message: String| AgentError::InvalidServer {
            server: server.to_string(),
            message,
        };

        let raw = if server.contains("://") {
            server.to_string()
        } else {
            format!("http://{}", server)
        };
        let mut base = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
        if base.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".into()));
        }
        if base.port().is_none() && !has_explicit_port(server) {
            base.set_port(Some(default_port))
                .map_err(|_| invalid("cannot carry a port".into()))?;
        }
        Ok(Self { base })
    }

    /// Full URL of an endpoint path such as `/getrule`.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| AgentError::InvalidServer {
                server: self.to_string(),
                message: e.to_string(),
            })
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port_or_known_default() {
            Some(port) => write!(f, "{}:{}", host, port),
            None => write!(f, "{}", host),
        }
    }
}

/// Whether the authority of `server` names a port. `Url` forgets a port
/// equal to the scheme default, so the raw text is checked.
fn has_explicit_port(server: &str) -> bool {
    let rest = server.split_once("://").map_or(server, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let after_host = match host_port.rfind(']') {
        Some(end) => &host_port[end + 1..],
        None => host_port,
    };
    after_host.contains(':')
}

/// HTTP agent shared by the fetch and report paths. `timeout` bounds each
/// request end to end.
pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(concat!("rastrea/", env!("CARGO_PKG_VERSION")))
        .build()
}

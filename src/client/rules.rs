use std::io::Read;
use std::time::Duration;

use super::{http_agent, ServerEndpoint};
use crate::error::{AgentError, Result};
use crate::matcher::Rule;

const GET_RULE_PATH: &str = "/getrule";

/// Largest rule body accepted from the server.
pub const MAX_RULE_SIZE: u64 = 10 * 1024 * 1024;

/// Where rules come from.
pub trait RuleSource: Send + Sync {
    /// Fetch the source text of rule `name`.
    fn fetch(&self, name: &str) -> Result<Rule>;
}

/// Fetches rules from the rule server. Nothing is cached.
pub struct RuleClient {
    endpoint: ServerEndpoint,
    agent: ureq::Agent,
}

impl RuleClient {
    pub fn new(endpoint: ServerEndpoint, timeout: Duration) -> Self {
        Self {
            endpoint,
            agent: http_agent(timeout),
        }
    }
}

impl RuleSource for RuleClient {
    fn fetch(&self, name: &str) -> Result<Rule> {
        let url = self.endpoint.url(GET_RULE_PATH)?;
        tracing::debug!(%url, rule = name, "fetching rule");

        let unreachable = |message: String| AgentError::ServerUnreachable {
            server: self.endpoint.to_string(),
            message,
        };

        let response = match self.agent.post(url.as_str()).send_form(&[("rulename", name)]) {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                return Err(AgentError::RuleNotFound(name.to_string()))
            }
            Err(ureq::Error::Status(status, _)) => {
                return Err(AgentError::ServerStatus {
                    server: self.endpoint.to_string(),
                    endpoint: GET_RULE_PATH.to_string(),
                    status,
                })
            }
            Err(e) => return Err(unreachable(e.to_string())),
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_RULE_SIZE + 1)
            .read_to_end(&mut body)
            .map_err(|e| unreachable(e.to_string()))?;
        if body.len() as u64 > MAX_RULE_SIZE {
            return Err(AgentError::RuleTooLarge {
                rule: name.to_string(),
                limit: MAX_RULE_SIZE,
            });
        }
        if body.is_empty() {
            return Err(AgentError::RuleNotFound(name.to_string()));
        }
        let source = String::from_utf8(body).map_err(|e| AgentError::RuleCompile {
            rule: name.to_string(),
            message: format!("rule text is not UTF-8: {}", e),
        })?;

        Ok(Rule::new(name, source))
    }
}

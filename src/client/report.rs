use std::time::Duration;

use super::{http_agent, ServerEndpoint};
use crate::error::{AgentError, Result};
use crate::scan::{MatchResult, MatchSubject};

/// Destination for match results.
pub trait MatchReporter: Send + Sync {
    /// Submit one match. Each call is independent of the others.
    fn report(&self, result: &MatchResult) -> Result<()>;
}

/// Posts matches to the rule server, tagged with this host's identifier.
pub struct HttpReporter {
    endpoint: ServerEndpoint,
    agent: ureq::Agent,
    hostname: String,
}

impl HttpReporter {
    pub fn new(endpoint: ServerEndpoint, hostname: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint,
            agent: http_agent(timeout),
            hostname: hostname.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl MatchReporter for HttpReporter {
    fn report(&self, result: &MatchResult) -> Result<()> {
        let path = result.module.report_path();
        let url = self.endpoint.url(path)?;
        let fields = form_fields(result, &self.hostname);
        tracing::info!(endpoint = path, payload = ?fields, "reporting match");

        let form: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.agent
            .post(url.as_str())
            .send_form(&form)
            .map_err(|e| AgentError::Report {
                endpoint: path.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Form body of a report. One `rulename` field per matched rule.
pub fn form_fields(result: &MatchResult, hostname: &str) -> Vec<(&'static str, String)> {
    let mut fields: Vec<(&'static str, String)> = result
        .rules
        .iter()
        .map(|rule| ("rulename", rule.clone()))
        .collect();

    match &result.subject {
        MatchSubject::File { path } => {
            fields.push(("filename", path.display().to_string()));
        }
        MatchSubject::Process { pid, path, .. } => {
            let path = path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            fields.push(("processpath", path));
            fields.push(("processpid", pid.to_string()));
        }
    }

    fields.push(("module", result.module.wire_name().to_string()));
    fields.push(("hostname", hostname.to_string()));
    fields
}

//! HTTP client for the text-generation endpoint.
//!
//! The request body is the user's prompt template with the `{{text}}`
//! placeholder substituted. The endpoint may answer with one JSON document
//! carrying the whole generation, or with newline-delimited JSON fragments
//! that end at `"done": true`; both shapes are accepted.

use serde::Deserialize;
use std::io::Read;
use std::time::Duration;

pub const PLACEHOLDER: &str = "{{text}}";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("endpoint must start with http:// or https://, got '{0}'")]
    InvalidEndpoint(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to read response body: {0}")]
    Body(#[from] std::io::Error),
    #[error("response contained no parseable fragment")]
    Unparseable,
}

/// Substitute every occurrence of the literal `{{text}}` placeholder.
/// The replacement is verbatim; no escaping is applied to `text`.
pub fn render_template(template: &str, text: &str) -> String {
    template.replace(PLACEHOLDER, text)
}

#[derive(Deserialize)]
struct Fragment {
    response: String,
    #[serde(default)]
    done: bool,
}

pub struct GenerationClient {
    agent: ureq::Agent,
}

impl GenerationClient {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    /// POST `body` to `endpoint` and accumulate the generated text.
    pub fn generate(&self, endpoint: &str, body: &str) -> Result<String, GenerateError> {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(GenerateError::InvalidEndpoint(endpoint.to_string()));
        }

        tracing::debug!(endpoint, bytes = body.len(), "sending generation request");
        let response = self
            .agent
            .post(endpoint)
            .set("Content-Type", "application/json")
            .send_string(body)
            .map_err(|e| match e {
                ureq::Error::Status(status, resp) => GenerateError::Status {
                    status,
                    body: resp.into_string().unwrap_or_default(),
                },
                ureq::Error::Transport(t) => GenerateError::Transport(t.to_string()),
            })?;

        let mut raw = String::new();
        response.into_reader().read_to_string(&mut raw)?;
        parse_response(&raw)
    }
}

impl Default for GenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the generated text from a response body of either shape.
///
/// A whole-body parse handles the single-document shape (which may span
/// lines when pretty-printed). Otherwise each line is treated as its own
/// document: fragments are concatenated in arrival order, a fragment marked
/// `done` ends accumulation, and malformed lines are skipped. A body in
/// which nothing parses is an error, never an empty success.
pub fn parse_response(raw: &str) -> Result<String, GenerateError> {
    if let Ok(fragment) = serde_json::from_str::<Fragment>(raw.trim()) {
        return Ok(fragment.response);
    }

    let mut accumulated = String::new();
    let mut parsed_any = false;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Fragment>(line) {
            Ok(fragment) => {
                parsed_any = true;
                accumulated.push_str(&fragment.response);
                if fragment.done {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(%err, "skipping unparseable response line");
            }
        }
    }

    if !parsed_any {
        return Err(GenerateError::Unparseable);
    }
    Ok(accumulated)
}

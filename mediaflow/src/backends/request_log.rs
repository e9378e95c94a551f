//! Redacted request logs and response summaries.

use super::BackendCall;
use crate::core::Artifact;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

/// Config keys whose name contains one of these (case-insensitive) never
/// reach a log.
const SECRET_MARKERS: [&str; 5] = ["key", "token", "secret", "password", "authorization"];

/// Config keys holding the endpoint, logged separately.
const ENDPOINT_KEYS: [&str; 2] = ["apiUrl", "api_url"];

const PROMPT_PREVIEW_CHARS: usize = 200;
const URL_PREVIEW_CHARS: usize = 120;

/// The request log of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestLog {
    /// Built by the generic extractor.
    Generic(GenericRequestLog),
    /// Built by the backend's own formatter.
    Custom(Value),
}

impl RequestLog {
    /// Returns the generic log, if this is one.
    #[must_use]
    pub fn as_generic(&self) -> Option<&GenericRequestLog> {
        match self {
            Self::Generic(log) => Some(log),
            Self::Custom(_) => None,
        }
    }

    /// Converts to JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Redacted view of a backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericRequestLog {
    /// Backend id.
    pub backend: String,
    /// Endpoint without query string or credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Connector configuration with secrets and the endpoint removed.
    pub parameters: Map<String, Value>,
    /// Generation parameters with secrets removed.
    pub options: Map<String, Value>,
    /// Leading part of the prompt.
    pub prompt: String,
    /// Full prompt length in characters.
    pub prompt_length: usize,
    /// Names of the input files.
    pub files: Vec<String>,
}

impl GenericRequestLog {
    /// Extracts a redacted log from a call.
    #[must_use]
    pub fn from_call(backend: &str, call: &BackendCall) -> Self {
        let config = call.config.as_object();
        let endpoint = config.and_then(|config| {
            ENDPOINT_KEYS
                .iter()
                .find_map(|key| config.get(*key).and_then(Value::as_str))
                .map(strip_query)
        });

        let parameters = config
            .map(|config| {
                let mut cleaned = sanitize_map(config);
                for key in ENDPOINT_KEYS {
                    cleaned.remove(key);
                }
                cleaned
            })
            .unwrap_or_default();

        Self {
            backend: backend.to_string(),
            endpoint,
            parameters,
            options: sanitize_map(&call.parameters),
            prompt: truncate(&call.prompt, PROMPT_PREVIEW_CHARS),
            prompt_length: call.prompt.chars().count(),
            files: call.files.iter().map(|f| f.filename.clone()).collect(),
        }
    }
}

fn is_secret(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| !is_secret(key))
        .map(|(key, value)| (key.clone(), sanitize_value(value)))
        .collect()
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

/// Removes the query string, fragment and credentials from an endpoint.
#[must_use]
pub fn strip_query(endpoint: &str) -> String {
    match Url::parse(endpoint) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            // Both only fail for URLs that cannot carry credentials.
            url.set_username("").ok();
            url.set_password(None).ok();
            url.to_string()
        }
        Err(_) => endpoint
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Summarises generated artifacts for logging.
#[must_use]
pub fn generic_response_log(output: &[Artifact]) -> Value {
    let mut kinds: Vec<String> = Vec::new();
    for kind in output.iter().map(|a| a.kind.to_string()) {
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    let artifacts: Vec<Value> = output
        .iter()
        .map(|artifact| {
            let mut entry = Map::new();
            entry.insert("kind".to_string(), json!(artifact.kind));
            if let Some(ref url) = artifact.url {
                entry.insert("url".to_string(), json!(truncate(url, URL_PREVIEW_CHARS)));
            }
            if let Some(ref content) = artifact.content {
                entry.insert(
                    "content".to_string(),
                    json!(truncate(content, PROMPT_PREVIEW_CHARS)),
                );
            }
            if let Some(ref mime) = artifact.mime {
                entry.insert("mime".to_string(), json!(mime));
            }
            Value::Object(entry)
        })
        .collect();

    json!({
        "count": output.len(),
        "kinds": kinds,
        "artifacts": artifacts,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactKind, InputFile};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_secrets_removed_from_parameters() {
        let call = BackendCall::new("a cat").with_config(json!({
            "apiKey": "sk-live-123",
            "model": "x",
        }));

        let log = GenericRequestLog::from_call("openai", &call);

        assert_eq!(Value::Object(log.parameters), json!({"model": "x"}));
        assert_eq!(log.endpoint, None);
    }

    #[test]
    fn test_every_secret_marker_is_case_insensitive() {
        let call = BackendCall::new("p").with_config(json!({
            "API_KEY": "a",
            "accessToken": "b",
            "clientSecret": "c",
            "Password": "d",
            "Authorization": "e",
            "nested": {"refresh_token": "f", "size": 512},
            "steps": 20,
        }));

        let log = GenericRequestLog::from_call("sd", &call);

        assert_eq!(
            Value::Object(log.parameters),
            json!({"nested": {"size": 512}, "steps": 20})
        );
    }

    #[test]
    fn test_endpoint_logged_without_query() {
        let call = BackendCall::new("p").with_config(json!({
            "apiUrl": "https://api.example.com/v1/images?key=abc&x=1#frag",
            "model": "x",
        }));

        let log = GenericRequestLog::from_call("img", &call);

        assert_eq!(log.endpoint.as_deref(), Some("https://api.example.com/v1/images"));
        assert!(!log.parameters.contains_key("apiUrl"));
    }

    #[test]
    fn test_snake_case_endpoint_key() {
        let call = BackendCall::new("p").with_config(json!({"api_url": "http://10.0.0.2:7860/run?t=1"}));
        let log = GenericRequestLog::from_call("sd", &call);

        assert_eq!(log.endpoint.as_deref(), Some("http://10.0.0.2:7860/run"));
        assert!(log.parameters.is_empty());
    }

    #[test]
    fn test_strip_query_removes_credentials() {
        assert_eq!(
            strip_query("https://user:pw@host.example/path?q=1"),
            "https://host.example/path"
        );
    }

    #[test]
    fn test_strip_query_fallback_for_relative_endpoints() {
        assert_eq!(strip_query("/v1/run?token=abc"), "/v1/run");
        assert_eq!(strip_query("no-query"), "no-query");
    }

    #[test]
    fn test_options_are_sanitized_and_prompt_truncated() {
        let mut parameters = Map::new();
        parameters.insert("seed".to_string(), json!(7));
        parameters.insert("session_token".to_string(), json!("t"));
        let long_prompt = "x".repeat(500);
        let call = BackendCall::new(long_prompt)
            .with_parameters(parameters)
            .with_files(vec![InputFile::new("ref.png", "image/png", vec![0; 4])]);

        let log = GenericRequestLog::from_call("sd", &call);

        assert_eq!(Value::Object(log.options), json!({"seed": 7}));
        assert_eq!(log.prompt_length, 500);
        assert_eq!(log.prompt.len(), PROMPT_PREVIEW_CHARS + 3);
        assert_eq!(log.files, vec!["ref.png"]);
    }

    #[test]
    fn test_request_log_serializes_untagged() {
        let custom = RequestLog::Custom(json!({"route": "custom"}));
        assert_eq!(custom.to_value(), json!({"route": "custom"}));
        assert!(custom.as_generic().is_none());
    }

    #[test]
    fn test_generic_response_log() {
        let output = vec![
            Artifact::from_url(ArtifactKind::Image, format!("data:image/png;base64,{}", "A".repeat(400))),
            Artifact::text("caption"),
        ];

        let log = generic_response_log(&output);

        assert_eq!(log["count"], 2);
        assert_eq!(log["kinds"], json!(["image", "text"]));
        assert!(log["artifacts"][0]["url"].as_str().unwrap().len() < 130);
        assert_eq!(log["artifacts"][1]["content"], "caption");
    }

    #[test]
    fn test_response_log_kinds_are_unique() {
        let output = vec![
            Artifact::from_url(ArtifactKind::Image, "https://cdn.example.com/a.png"),
            Artifact::text("caption"),
            Artifact::from_url(ArtifactKind::Image, "https://cdn.example.com/b.png"),
        ];

        let log = generic_response_log(&output);

        assert_eq!(log["count"], 3);
        assert_eq!(log["kinds"], json!(["image", "text"]));
    }
}

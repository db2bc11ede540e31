// Location Discovery - Generation service client + lenient line decoder
//
// The generation service is asked for "Name :: Address" lines. Whatever it
// returns is decoded line by line; lines without that shape are dropped.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::DiscoveryConfig;
use crate::report::Location;

/// Separator between name and address in a discovery line
pub const LINE_SEPARATOR: &str = "::";

/// Upstream error bodies are logged up to this many characters
const ERROR_BODY_LOG_CHARS: usize = 512;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("generation service request failed: {0}")]
    Transport(String),

    #[error("generation service timed out after {0}s")]
    Timeout(u64),

    #[error("generation service returned HTTP {status}")]
    Status { status: u16 },

    #[error("malformed generation service response: {0}")]
    Malformed(String),
}

// ============================================================================
// PORT
// ============================================================================

/// Free-text generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send one prompt, return the generated text
    async fn generate(&self, prompt: &str) -> Result<String, DiscoveryError>;
}

/// Prompt asking for candidate locations near `term`
pub fn discovery_prompt(term: &str) -> String {
    format!(
        "Please find ATMs near pincode {}. Provide a list where each ATM is on a new line, \
         formatted exactly as: Name {} Address",
        term, LINE_SEPARATOR
    )
}

// ============================================================================
// LINE DECODER
// ============================================================================

/// Decode one `Name :: Address` line.
///
/// Splits at the first separator and trims both halves; a missing separator
/// or an empty half yields `None`.
pub fn parse_location_line(line: &str) -> Option<Location> {
    let (name, address) = line.split_once(LINE_SEPARATOR)?;
    let name = name.trim();
    let address = address.trim();

    if name.is_empty() || address.is_empty() {
        return None;
    }

    Some(Location::new(name, address))
}

/// Lazily decode every usable line of a discovery response, in order
pub fn parse_locations(text: &str) -> impl Iterator<Item = Location> + '_ {
    text.lines().filter_map(parse_location_line)
}

// ============================================================================
// GEMINI CLIENT
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<GenerateContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GenerateContent<'a> {
    parts: Vec<GeneratePart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeneratePart<'a> {
    text: &'a str,
}

/// Pull the generated text out of a `generateContent` payload.
///
/// Reads `candidates[0].content.parts[*].text`, then falls back to
/// `candidates[0].output`, top-level `output_text`, and top-level `text`.
pub fn extract_generated_text(payload: &Value) -> Option<String> {
    if let Some(first) = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
    {
        let parts: Vec<&str> = first
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if !parts.is_empty() {
            return Some(parts.concat());
        }

        if let Some(output) = first.get("output").and_then(Value::as_str) {
            return Some(output.to_string());
        }
    }

    ["output_text", "text"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// At most `max_chars` characters of `body`, cut on a char boundary
fn body_excerpt(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

/// Gemini `generateContent` client
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DiscoveryError::Client(e.to_string()))?;

        if config.api_key.is_none() {
            warn!("GEMINI_API_KEY not set; generation service calls will likely be rejected");
        }

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, DiscoveryError> {
        let body = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart { text: prompt }],
            }],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-goog-api-key", key);
        }

        debug!(endpoint = %self.endpoint, "sending generation request");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DiscoveryError::Timeout(self.timeout_secs)
            } else {
                DiscoveryError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                DiscoveryError::Timeout(self.timeout_secs)
            } else {
                DiscoveryError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            error!(
                status = status.as_u16(),
                body = body_excerpt(&text, ERROR_BODY_LOG_CHARS),
                "generation service error"
            );
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
            });
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| DiscoveryError::Malformed(format!("invalid JSON: {}", e)))?;

        let generated = extract_generated_text(&payload)
            .ok_or_else(|| DiscoveryError::Malformed("no generated text in payload".to_string()))?;

        info!(chars = generated.len(), "generation request completed");
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_drops_malformed_lines() {
        let text = "A :: 1 Main St\ngarbage\n";
        let locations: Vec<_> = parse_locations(text).collect();
        assert_eq!(locations, vec![Location::new("A", "1 Main St")]);
    }

    #[test]
    fn test_parse_preserves_order_and_case() {
        let text = "SBI ATM :: 12 MG Road, 600001\r\n\r\nHDFC Bank :: 5 Beach Rd\n";
        let locations: Vec<_> = parse_locations(text).collect();
        assert_eq!(
            locations,
            vec![
                Location::new("SBI ATM", "12 MG Road, 600001"),
                Location::new("HDFC Bank", "5 Beach Rd"),
            ]
        );
    }

    #[test]
    fn test_parse_splits_at_first_separator() {
        let location = parse_location_line("Axis :: Block B :: Floor 2").unwrap();
        assert_eq!(location.name, "Axis");
        assert_eq!(location.address, "Block B :: Floor 2");
    }

    #[test]
    fn test_parse_rejects_empty_halves() {
        assert!(parse_location_line(" :: 1 Main St").is_none());
        assert!(parse_location_line("A ::   ").is_none());
        assert!(parse_location_line("").is_none());
    }

    #[test]
    fn test_parse_empty_response() {
        assert_eq!(parse_locations("").count(), 0);
        assert_eq!(parse_locations("Sorry, I can't browse maps.").count(), 0);
    }

    #[test]
    fn test_prompt_mentions_term_and_format() {
        let prompt = discovery_prompt("600001");
        assert!(prompt.contains("600001"));
        assert!(prompt.contains("Name :: Address"));
    }

    #[test]
    fn test_extract_from_candidate_parts() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "A :: 1 Main St\n" }, { "text": "B :: 2 Main St" }] }
            }]
        });
        assert_eq!(
            extract_generated_text(&payload).as_deref(),
            Some("A :: 1 Main St\nB :: 2 Main St")
        );
    }

    #[test]
    fn test_extract_fallback_fields() {
        let output = json!({ "candidates": [{ "output": "A :: 1 Main St" }] });
        assert_eq!(extract_generated_text(&output).as_deref(), Some("A :: 1 Main St"));

        let top_level = json!({ "output_text": "B :: 2 Main St" });
        assert_eq!(extract_generated_text(&top_level).as_deref(), Some("B :: 2 Main St"));

        let text = json!({ "text": "C :: 3 Main St" });
        assert_eq!(extract_generated_text(&text).as_deref(), Some("C :: 3 Main St"));
    }

    #[test]
    fn test_body_excerpt_cuts_on_char_boundary() {
        assert_eq!(body_excerpt("short", 512), "short");
        assert_eq!(body_excerpt("ééééé", 2), "éé");
    }

    #[test]
    fn test_status_error_does_not_carry_upstream_body() {
        let err = DiscoveryError::Status { status: 500 };
        assert_eq!(err.to_string(), "generation service returned HTTP 500");
    }

    #[test]
    fn test_extract_missing_text() {
        assert!(extract_generated_text(&json!({ "candidates": [] })).is_none());
        assert!(extract_generated_text(&json!({ "error": { "code": 400 } })).is_none());
    }
}

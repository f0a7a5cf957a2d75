//! Client for the external phishing scorer. Classification is supplementary
//! to reading mail: every failure here is a typed "scan failed" outcome that
//! callers render as a degraded state, never a reason to hide the message.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const CLASSIFIER_URL_ENV: &str = "LUREBOX_CLASSIFIER_URL";
const DEFAULT_CLASSIFIER_URL: &str = "http://localhost:8000";

/// Contract constant: text is truncated to this many characters before
/// submission, bounding both request size and model input.
pub const MAX_CLASSIFIER_INPUT_CHARS: usize = 4000;

/// Classification can run a model pass, so it gets a longer timeout than
/// mailbox metadata calls.
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Phishing,
    Safe,
    Unknown,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Phishing => write!(f, "phishing"),
            Self::Safe => write!(f, "safe"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Ephemeral scoring outcome; never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassificationVerdict {
    pub verdict: Verdict,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    prediction: String,
    confidence: f64,
}

pub struct ClassifierClient {
    http: Client,
    base_url: String,
}

impl ClassifierClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn from_env(http: Client) -> Self {
        let base_url = std::env::var(CLASSIFIER_URL_ENV)
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CLASSIFIER_URL.to_string());
        Self::new(http, base_url)
    }

    /// One request, one response, no retry. The scorer is a black box: only
    /// its label/confidence contract is assumed.
    pub async fn classify(&self, text: &str) -> Result<ClassificationVerdict, PipelineError> {
        let truncated = truncate_chars(text, MAX_CLASSIFIER_INPUT_CHARS);
        let url = format!("{}/predict", self.base_url);

        let response = self
            .http
            .post(&url)
            .timeout(CLASSIFY_TIMEOUT)
            .json(&ScoreRequest { text: truncated })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::UpstreamTimeout("classifier".to_string())
                } else {
                    PipelineError::ScanFailed(format!("classifier request: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ScanFailed(format!(
                "classifier returned status {status}"
            )));
        }

        let payload: ScoreResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ScanFailed(format!("decode classifier response: {e}")))?;

        Ok(map_prediction(&payload.prediction, payload.confidence))
    }
}

fn map_prediction(label: &str, confidence: f64) -> ClassificationVerdict {
    let (verdict, details) = match label.trim().to_ascii_lowercase().as_str() {
        "phishing" => (Verdict::Phishing, None),
        "legitimate" | "safe" => (Verdict::Safe, None),
        _ => (
            Verdict::Unknown,
            Some(format!("unrecognized prediction label '{label}'")),
        ),
    };

    ClassificationVerdict {
        verdict,
        confidence: confidence.clamp(0.0, 1.0),
        details,
    }
}

/// Collapses a reconstructed (possibly HTML) body into whitespace-normalized
/// plain text suitable for the scorer.
pub fn classifier_input(body: &str) -> String {
    let text = std::panic::catch_unwind(|| html2text::from_read(body.as_bytes(), 120))
        .unwrap_or_else(|_| body.to_string());

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, MAX_CLASSIFIER_INPUT_CHARS).to_string()
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        classifier_input, map_prediction, truncate_chars, ClassifierClient, Verdict,
        MAX_CLASSIFIER_INPUT_CHARS,
    };
    use crate::error::PipelineError;

    #[test]
    fn prediction_labels_map_to_verdicts() {
        assert_eq!(map_prediction("Phishing", 0.97).verdict, Verdict::Phishing);
        assert_eq!(map_prediction("Legitimate", 0.8).verdict, Verdict::Safe);
        assert_eq!(map_prediction("safe", 0.8).verdict, Verdict::Safe);

        let odd = map_prediction("Suspicious", 0.5);
        assert_eq!(odd.verdict, Verdict::Unknown);
        assert!(odd.details.expect("details").contains("Suspicious"));
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        assert_eq!(map_prediction("Phishing", 1.7).confidence, 1.0);
        assert_eq!(map_prediction("Phishing", -0.2).confidence, 0.0);
    }

    #[test]
    fn classifier_input_strips_html_and_collapses_whitespace() {
        let input = classifier_input("<p>Urgent!</p>\n\n<p>Verify   your\taccount</p>");
        assert!(input.contains("Urgent!"));
        assert!(input.contains("Verify your account"));
        assert!(!input.contains('<'));
        assert!(!input.contains("  "));
    }

    #[test]
    fn classifier_input_is_bounded() {
        let long_body = "word ".repeat(5000);
        let input = classifier_input(&long_body);
        assert!(input.chars().count() <= MAX_CLASSIFIER_INPUT_CHARS);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld".repeat(500);
        let truncated = truncate_chars(&s, MAX_CLASSIFIER_INPUT_CHARS);
        assert_eq!(truncated.chars().count(), MAX_CLASSIFIER_INPUT_CHARS);
    }

    #[tokio::test]
    async fn unreachable_scorer_is_a_typed_scan_failure() {
        // Closed localhost port: the connection is refused immediately.
        let client = ClassifierClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let result = client.classify("some text").await;
        assert!(matches!(
            result,
            Err(PipelineError::ScanFailed(_)) | Err(PipelineError::UpstreamTimeout(_))
        ));
    }
}

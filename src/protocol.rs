//! Worker line protocol decoding
//!
//! Workers write UTF-8 text to standard output, one JSON object per line,
//! with no other framing. [`LineDecoder`] incrementally reassembles raw byte
//! chunks into complete lines and classifies each into a [`WorkerMessage`].
//!
//! The worker is untrusted regarding its output formatting: lines may be
//! split arbitrarily across chunks (including mid-way through a multi-byte
//! UTF-8 sequence), may be empty, or may not be JSON at all. A malformed
//! line is logged and skipped and never aborts decoding of subsequent
//! lines.

use serde_json::Value;

use crate::types::{Outcome, Release};

/// How many bytes of a garbage line are included in the skip log
const LOGGED_GARBAGE_LIMIT: usize = 256;

/// One decoded unit from a worker's output stream
///
/// Classified from the `type` field of the parsed JSON object. Shapes that
/// parse as JSON but match nothing here become [`WorkerMessage::Unrecognized`];
/// the router logs and discards those without forwarding them.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerMessage {
    /// A stage progress update (`download`, `conversion`, `patch`, ...)
    Progress {
        /// Identifier the message applies to, if the worker included one
        identifier: Option<String>,
        /// The reporting stage (the message's `type` field)
        phase: String,
        /// Stage-specific status (e.g. "started", "completed", "extracting_ipa")
        status: String,
        /// Numeric progress (0.0 to 100.0), if reported
        percent: Option<f32>,
    },

    /// Conversion found a tweak instead of an app and paused for input
    TweakDetected {
        /// Identifier the message applies to, if the worker included one
        identifier: Option<String>,
        /// Download URL of the tweak package
        download_url: String,
        /// Path to the extracted tweak data
        tweak_path: String,
    },

    /// The authoritative outcome of the running operation
    OperationResult {
        /// Identifier the message applies to, if the worker included one
        identifier: Option<String>,
        /// Reported outcome
        outcome: Outcome,
        /// Error text accompanying a failure
        error: Option<String>,
    },

    /// The release list produced by a fetch operation
    GithubReleases {
        /// Whether the fetch succeeded
        outcome: Outcome,
        /// Releases carrying `.deb` assets (empty on failure)
        releases: Vec<Release>,
        /// Error text accompanying a failure
        error: Option<String>,
    },

    /// A JSON object that matched no known shape
    Unrecognized {
        /// The raw line as received
        raw: String,
    },
}

/// Incremental decoder for the newline-delimited worker protocol
///
/// Feed raw byte chunks as they arrive from the worker's stdout; each call
/// returns every message completed by that chunk, in stream order. A
/// trailing partial line is buffered until the next feed.
///
/// # Examples
///
/// ```
/// use debforge::protocol::LineDecoder;
///
/// let mut decoder = LineDecoder::new();
/// // A message split across two reads decodes once the newline arrives
/// assert!(decoder.feed(b"{\"type\":\"operation\",\"sta").is_empty());
/// let messages = decoder.feed(b"tus\":\"completed\"}\n");
/// assert_eq!(messages.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Create a new decoder with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes awaiting a terminating newline
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Append a chunk and decode every line it completes
    ///
    /// Empty lines are skipped. Lines that fail JSON parsing are logged and
    /// produce nothing; decoding always continues with the next line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<WorkerMessage> {
        self.buf.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=newline).collect();
            line.pop(); // the newline itself
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }

            // Lossy decode: binary noise must not wedge the stream
            let text = String::from_utf8_lossy(&line);
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => messages.push(classify(&value, &text)),
                Err(error) => {
                    tracing::warn!(
                        %error,
                        line = %truncate_for_log(&text),
                        "Skipping unparseable worker output line"
                    );
                }
            }
        }

        messages
    }
}

/// Map a parsed JSON value onto the closed [`WorkerMessage`] variants
fn classify(value: &Value, raw: &str) -> WorkerMessage {
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return WorkerMessage::Unrecognized {
            raw: raw.to_string(),
        };
    };

    match kind {
        "operation" | "fatal_error" => WorkerMessage::OperationResult {
            identifier: routable_identifier(value),
            outcome: outcome_from_status(value),
            error: string_field(value, "error"),
        },
        "github_releases" | "github" => WorkerMessage::GithubReleases {
            outcome: outcome_from_status(value),
            releases: value
                .get("releases")
                .cloned()
                .map(|v| serde_json::from_value(v).unwrap_or_default())
                .unwrap_or_default(),
            error: string_field(value, "error"),
        },
        "tweak_detected" => {
            match (
                string_field(value, "download_url"),
                string_field(value, "tweak_path"),
            ) {
                (Some(download_url), Some(tweak_path)) => WorkerMessage::TweakDetected {
                    identifier: routable_identifier(value),
                    download_url,
                    tweak_path,
                },
                _ => WorkerMessage::Unrecognized {
                    raw: raw.to_string(),
                },
            }
        }
        _ => match string_field(value, "status") {
            Some(status) => WorkerMessage::Progress {
                identifier: routable_identifier(value),
                phase: kind.to_string(),
                status,
                percent: value
                    .get("progress")
                    .and_then(Value::as_f64)
                    .map(|p| p as f32),
            },
            None => WorkerMessage::Unrecognized {
                raw: raw.to_string(),
            },
        },
    }
}

/// Extract the identifier a message should be routed by
///
/// Workers report per-item identifiers as `identifier` or, in older message
/// shapes, as `download_url`. Messages carrying neither are routed by the
/// job's own key instead.
fn routable_identifier(value: &Value) -> Option<String> {
    string_field(value, "identifier").or_else(|| string_field(value, "download_url"))
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn outcome_from_status(value: &Value) -> Outcome {
    match value.get("status").and_then(Value::as_str) {
        Some("completed") => Outcome::Completed,
        _ => Outcome::Failed,
    }
}

fn truncate_for_log(text: &str) -> &str {
    match text.char_indices().nth(LOGGED_GARBAGE_LIMIT) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

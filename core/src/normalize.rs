//! # Output Normalizer
//!
//! Tries, in order:
//! 1. JSON, decoded by the probe's structured decoder.
//! 2. The probe's text patterns, producing the same field names.
//! 3. Verbatim passthrough.
//!
//! A stage that yields no fields counts as a miss. Normalization itself never
//! fails.

use netprobe_common::{NormalizedResult, Payload};
use serde_json::Value;
use tracing::debug;

/// Tool-specific decoding of one program's output.
pub trait OutputParser: Send + Sync {
    /// Maps a JSON document to semantic fields.
    fn parse_structured(&self, _document: &Value) -> Option<Payload> {
        None
    }

    /// Recovers the same semantic fields from human-readable text.
    fn extract_patterns(&self, text: &str) -> Option<Payload>;
}

pub fn normalize(output: &str, parser: &dyn OutputParser) -> NormalizedResult {
    let trimmed: &str = output.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(document) = serde_json::from_str::<Value>(trimmed) {
            match parser.parse_structured(&document).filter(|fields| !fields.is_empty()) {
                Some(fields) => {
                    return NormalizedResult::Structured {
                        fields,
                        derived_from_text: false,
                    };
                }
                None => debug!("json output had no usable fields"),
            }
        }
    }

    if let Some(fields) = parser.extract_patterns(output).filter(|fields| !fields.is_empty()) {
        return NormalizedResult::Structured {
            fields,
            derived_from_text: true,
        };
    }

    NormalizedResult::RawText {
        output: output.to_string(),
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

// src/parser.rs
// THE OUTPUT REPAIR PIPELINE
// The model is prompted to emit exactly one JSON object but is not 100%
// reliable about surrounding narration or fence markers. This module first
// reduces whatever the agent produced to a single plain string, then decodes
// it through staged fallbacks whose terminal stage cannot fail.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// Fallback summaries are clipped to this many characters (plus an ellipsis).
const SUMMARY_CHAR_BUDGET: usize = 5000;

/// The one entity this service produces. All four fields are present and
/// correctly typed in every response, including degraded ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchResult {
    pub topic: String,
    pub summary: String,
    pub sources: Vec<String>,
    pub tools_used: Vec<String>,
}

/// Which decode stage produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    /// The whole normalized string was a valid ResearchResult.
    Direct,
    /// A JSON object embedded in surrounding prose was sliced out and decoded.
    Extracted,
    /// Nothing decoded; the result was synthesized from the raw text.
    Fallback,
}

/// Reduces the raw agent output to a single plain string.
///
/// Handles the shapes the agent loop is known to hand back: a bare string,
/// a content-block list whose first element carries the answer, or a mapping
/// with a "text" field. Stable under re-application.
pub fn normalize_output(raw: &Value) -> String {
    // Unwrap a single-element sequence first
    let value = match raw {
        Value::Array(items) => items
            .first()
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())),
        other => other.clone(),
    };

    // Structured chunks carry the answer in a "text" field
    let text = match &value {
        Value::Object(map) => match map.get("text") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => value.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    // Strip code fences, then re-trim whatever they were wrapping
    let text = text.trim().replace("```json", "").replace("```", "");
    text.trim().to_string()
}

/// Decodes the normalized output into a ResearchResult, reporting which
/// stage succeeded. Stages run in strict order and the terminal stage
/// performs no parsing, so this never fails.
pub fn decode_response(normalized: &str, query: &str) -> (ResearchResult, DecodeStage) {
    if let Ok(parsed) = serde_json::from_str::<ResearchResult>(normalized) {
        return (parsed, DecodeStage::Direct);
    }

    if let Some(extracted) = extract_embedded_json(normalized) {
        return (extracted, DecodeStage::Extracted);
    }

    (fallback_result(normalized, query), DecodeStage::Fallback)
}

/// Slices from the first '{' to the last '}' and decodes the slice.
/// Known gap: stray braces in the surrounding prose can corrupt the slice;
/// the decode failure then lands in the terminal fallback.
fn extract_embedded_json(normalized: &str) -> Option<ResearchResult> {
    let start = normalized.find('{')?;
    let end = normalized.rfind('}')?;
    if end <= start {
        return None;
    }

    let candidate = &normalized[start..=end];
    let data: Value = serde_json::from_str(candidate).ok()?;
    serde_json::from_value(data).ok()
}

fn fallback_result(normalized: &str, query: &str) -> ResearchResult {
    ResearchResult {
        topic: title_case(query),
        summary: clip_summary(normalized),
        sources: vec!["Research completed".to_string()],
        tools_used: vec!["langchain".to_string(), "claude-ai".to_string()],
    }
}

fn clip_summary(text: &str) -> String {
    if text.chars().count() < SUMMARY_CHAR_BUDGET {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(SUMMARY_CHAR_BUDGET).collect();
    clipped.push_str("...");
    clipped
}

/// Title-cases a query for use as a fallback topic: the first letter of
/// every word is uppercased, the rest lowercased.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_alpha = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_unwraps_first_list_element() {
        let raw = json!([{"type": "text", "text": "hello world"}, {"type": "text", "text": "ignored"}]);
        assert_eq!(normalize_output(&raw), "hello world");
    }

    #[test]
    fn normalize_empty_list_is_empty_string() {
        assert_eq!(normalize_output(&json!([])), "");
    }

    #[test]
    fn normalize_map_without_text_uses_string_form() {
        let raw = json!({"type": "tool_use", "name": "search"});
        let normalized = normalize_output(&raw);
        assert!(normalized.contains("tool_use"));
    }

    #[test]
    fn normalize_strips_code_fences_and_whitespace() {
        let raw = json!("  ```json\n{\"topic\":\"X\"}\n```  ");
        assert_eq!(normalize_output(&raw), "{\"topic\":\"X\"}");
    }

    #[test]
    fn normalize_is_idempotent() {
        let raw = json!("```json\n  {\"a\": 1}  \n```");
        let once = normalize_output(&raw);
        let twice = normalize_output(&json!(once.clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn direct_decode_wins_for_clean_json() {
        let normalized = r#"{"topic":"X","summary":"Y","sources":["s"],"tools_used":["t"]}"#;
        let (result, stage) = decode_response(normalized, "ignored query");
        assert_eq!(stage, DecodeStage::Direct);
        assert_eq!(result.topic, "X");
        assert_eq!(result.summary, "Y");
        assert_eq!(result.sources, vec!["s"]);
        assert_eq!(result.tools_used, vec!["t"]);
    }

    #[test]
    fn embedded_json_is_extracted_from_prose() {
        let normalized = "Here is the result: {\"topic\":\"X\",\"summary\":\"Y\",\"sources\":[],\"tools_used\":[]} Thanks!";
        let (result, stage) = decode_response(normalized, "ignored query");
        assert_eq!(stage, DecodeStage::Extracted);
        assert_eq!(result.topic, "X");
        assert!(result.sources.is_empty());
    }

    #[test]
    fn missing_fields_in_embedded_json_fall_through() {
        // The object decodes as generic JSON but lacks required fields.
        let normalized = "prefix {\"topic\":\"X\"} suffix";
        let (result, stage) = decode_response(normalized, "rust async");
        assert_eq!(stage, DecodeStage::Fallback);
        assert_eq!(result.topic, "Rust Async");
    }

    #[test]
    fn plain_prose_hits_terminal_fallback() {
        let (result, stage) = decode_response("just plain prose", "rust async runtimes");
        assert_eq!(stage, DecodeStage::Fallback);
        assert_eq!(result.topic, "Rust Async Runtimes");
        assert_eq!(result.summary, "just plain prose");
        assert_eq!(result.sources, vec!["Research completed"]);
        assert_eq!(result.tools_used, vec!["langchain", "claude-ai"]);
    }

    #[test]
    fn long_prose_is_clipped_with_ellipsis() {
        let prose = "a".repeat(5001);
        let (result, stage) = decode_response(&prose, "q's");
        assert_eq!(stage, DecodeStage::Fallback);
        assert_eq!(result.summary.chars().count(), 5003);
        assert!(result.summary.ends_with("..."));
    }

    #[test]
    fn prose_under_the_budget_is_kept_whole() {
        let prose = "b".repeat(4999);
        let (result, _) = decode_response(&prose, "query");
        assert_eq!(result.summary, prose);
    }

    #[test]
    fn title_case_uppercases_word_starts() {
        assert_eq!(title_case("rust ASYNC runtimes"), "Rust Async Runtimes");
        assert_eq!(title_case("what is rust?"), "What Is Rust?");
        assert_eq!(title_case(""), "");
    }
}

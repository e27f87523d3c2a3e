// Workflow output recovery
//
// The engine's output arrives in whatever state the gateway left it in:
// a structured value, a JSON string, or a corrupted string with unterminated
// objects, bare numeric timestamps, trailing commas or embedded control
// characters. This module turns any of those into a canonical
// `ExecutionResult` through an ordered chain of recovery stages, first
// success wins. It never panics and never returns an error: the last stage
// always produces a `Failure` carrying a bounded excerpt of the input.
//
// Stages, in order:
//   1. structured value, validated against the envelope shape
//   2. cleaned text (control characters stripped, whitespace collapsed),
//      strict JSON parse
//   3. targeted textual repairs (trailing commas, empty `details`, bare
//      numeric `started_at`), strict parse again
//   4. lenient JSON5 parse of the repaired text
//   5. error-marker detection: synthesize a generic failure
//   6. regex scavenging of `conversation_id` / `conversation_history`
//   7. failure with a <=200 char excerpt of the original payload

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::result::{ExecutionResult, SuccessDetails};

/// Raw output of a workflow transport, before normalization
#[derive(Debug, Clone)]
pub enum RawOutput {
    /// Already-decoded JSON value
    Structured(serde_json::Value),
    /// Response body text, possibly corrupted
    Text(String),
}

/// Maximum excerpt length carried by a synthesized failure
const EXCERPT_LEN: usize = 200;

/// Normalize raw workflow output into a canonical result. Pure transform:
/// the only side effect is advisory logging.
pub fn normalize(raw: RawOutput) -> ExecutionResult {
    match raw {
        RawOutput::Structured(value) => {
            if let Ok(result) = serde_json::from_value::<ExecutionResult>(value.clone()) {
                return result;
            }
            debug!("structured output failed envelope validation, retrying as text");
            normalize_text(&value.to_string())
        }
        RawOutput::Text(text) => normalize_text(&text),
    }
}

fn normalize_text(original: &str) -> ExecutionResult {
    let cleaned = clean(original);

    if let Ok(result) = parse_strict(&cleaned) {
        return result;
    }

    let repaired = repair(&cleaned);
    if let Ok(result) = parse_strict(&repaired) {
        debug!("recovered workflow output via textual repair");
        return result;
    }

    if let Ok(result) = json5::from_str::<ExecutionResult>(&repaired) {
        debug!("recovered workflow output via lenient parse");
        return result;
    }

    if error_marker().is_match(&cleaned) {
        debug!("unparseable output carries an error marker, synthesizing failure");
        return ExecutionResult::failure(
            "workflow execution reported an error",
            Some("unparseable error envelope".to_string()),
        );
    }

    if let Some(result) = scavenge(&cleaned) {
        debug!("recovered workflow output via regex extraction");
        return result;
    }

    ExecutionResult::failure(
        "unrecognized workflow output",
        Some(excerpt(original)),
    )
}

fn parse_strict(text: &str) -> Result<ExecutionResult, serde_json::Error> {
    serde_json::from_str::<ExecutionResult>(text)
}

/// Strip control characters entirely (tabs and newlines included, matching
/// the gateway's observed corruption mode) and collapse runs of spaces.
fn clean(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !c.is_control()).collect();
    let collapsed = whitespace_run().replace_all(stripped.trim(), " ");
    collapsed.into_owned()
}

/// Targeted repairs for the known corruption shapes
fn repair(text: &str) -> String {
    let fixed = trailing_comma().replace_all(text, "$1");
    let fixed = empty_details().replace_all(&fixed, "\"details\": {}$1");
    let fixed = bare_started_at().replace_all(&fixed, "$1\"$2\"");
    fixed.into_owned()
}

/// Last structured resort: pull the conversation id and history out of the
/// wreckage and synthesize a minimal success.
fn scavenge(text: &str) -> Option<ExecutionResult> {
    let id = conversation_id_pattern()
        .captures(text)?
        .get(1)?
        .as_str()
        .to_string();

    let history = conversation_history_pattern()
        .captures(text)
        .and_then(|caps| {
            let raw = caps.get(1)?.as_str().replace("\\\"", "\"");
            serde_json::from_str::<Vec<String>>(&raw).ok()
        })
        .unwrap_or_default();

    Some(ExecutionResult::Success(SuccessDetails {
        conversation_id: id,
        client: None,
        bot: None,
        cellphone: None,
        history,
        stage: None,
        execution_ref: None,
        started_at: None,
    }))
}

/// First `EXCERPT_LEN` characters of the payload, never the whole thing
fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_LEN {
        text.to_string()
    } else {
        let head: String = text.chars().take(EXCERPT_LEN).collect();
        format!("{head}...")
    }
}

// Compiled patterns. The literals are infallible, so the expects cannot fire.
fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn trailing_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid regex"))
}

fn empty_details() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""details"\s*:\s*([}\],])"#).expect("valid regex"))
}

fn bare_started_at() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"("started_at"\s*:\s*)([0-9][0-9eE+.]*)"#).expect("valid regex"))
}

fn error_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""status"\s*:\s*"error""#).expect("valid regex"))
}

fn conversation_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""conversation_id"\s*:\s*"([^"]+)""#).expect("valid regex"))
}

fn conversation_history_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""conversation_history"\s*:\s*(\[[^\]]*\])"#).expect("valid regex"))
}

//! Lenient recovery of a JSON object from free-text model output.
//!
//! Models asked for "only JSON" still wrap it in markdown fences or add a
//! sentence before or after it. Several candidate slices are tried in turn:
//! the whole reply, then the body of each fenced block (`json`-tagged first),
//! then the reply with stray fence markers removed. Each candidate keeps
//! everything from its first `{` to its last `}`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::study::{StudyError, StudyResult};

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)`{3,}([A-Za-z]*)[ \t]*\r?\n?(.*?)`{3,}").unwrap()
    })
}

fn stray_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^`+(?:json)?|`+$").unwrap())
}

/// Bodies of the complete fenced blocks, `json`-tagged blocks first.
pub fn fenced_bodies(raw: &str) -> Vec<&str> {
    let mut tagged = Vec::new();
    let mut untagged = Vec::new();
    for caps in fenced_block().captures_iter(raw) {
        let (Some(tag), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if tag.as_str().eq_ignore_ascii_case("json") {
            tagged.push(body.as_str().trim());
        } else {
            untagged.push(body.as_str().trim());
        }
    }
    tagged.extend(untagged);
    tagged
}

/// Drops a lone opening or closing fence marker at either end of the reply.
pub fn strip_stray_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let start = stray_fence()
        .find(trimmed)
        .filter(|m| m.start() == 0)
        .map_or(0, |m| m.end());
    let rest = &trimmed[start..];
    let end = stray_fence()
        .find_iter(rest)
        .last()
        .filter(|m| m.end() == rest.len() && m.start() > 0)
        .map_or(rest.len(), |m| m.start());
    rest[..end].trim()
}

/// The inclusive slice from the first `{` to the last `}`.
pub fn brace_slice(text: &str) -> StudyResult<&str> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        (Some(_), Some(_)) => Err(StudyError::MalformedResponse(
            "closing brace appears before the first opening brace".to_string(),
        )),
        _ => Err(StudyError::MalformedResponse(
            "no JSON object found in the completion".to_string(),
        )),
    }
}

fn candidates(raw: &str) -> Vec<&str> {
    let trimmed = raw.trim();
    let mut candidates = vec![trimmed];
    candidates.extend(fenced_bodies(trimmed));
    candidates.push(strip_stray_fences(trimmed));
    candidates
}

/// Decodes the first candidate slice that holds valid JSON.
///
/// When none decodes, the error comes from the first candidate that had a
/// brace pair at all, so a truncated object reads as a decode failure rather
/// than "no JSON object".
pub fn parse_json(raw: &str) -> StudyResult<Value> {
    let mut first_error: Option<StudyError> = None;
    let mut decode_error: Option<StudyError> = None;

    for candidate in candidates(raw) {
        let sliced = match brace_slice(candidate) {
            Ok(sliced) => sliced,
            Err(err) => {
                first_error.get_or_insert(err);
                continue;
            }
        };
        match serde_json::from_str(sliced) {
            Ok(value) => return Ok(value),
            Err(err) => {
                decode_error.get_or_insert(StudyError::MalformedResponse(err.to_string()));
            }
        }
    }

    Err(decode_error
        .or(first_error)
        .unwrap_or_else(|| StudyError::MalformedResponse("empty completion".to_string())))
}

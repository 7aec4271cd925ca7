//! Pulling a JSON object out of free-form model output.

use lazy_static::lazy_static;
use regex_lite::Regex;

lazy_static! {
    static ref TRAILING_COMMA: Regex = Regex::new(r",\s*([}\]])").expect("valid regex");
}

/// Extract the JSON payload from a model reply.
///
/// Strips markdown code fences, keeps the outermost `{...}` span, and drops
/// trailing commas before a closing brace or bracket.
pub(crate) fn extract_json(text: &str) -> String {
    let text = strip_code_fence(text);
    let body = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    };
    TRAILING_COMMA.replace_all(body, "$1").into_owned()
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();

    // ```json ... ```
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // ``` ... ```
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

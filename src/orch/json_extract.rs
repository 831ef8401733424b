//! Three-tier JSON extraction used by the Analyzer, Specialist Verifier, and
//! Presenter to recover a structured payload from noisy LLM prose.
//!
//! Tier 1: parse the whole response as JSON. Tier 2: find a fenced ```json
//! code block and parse its contents. Tier 3: find the first `{` and the
//! last `}` in the response and parse the substring between them. All three
//! return the first successfully-parsed `serde_json::Value`; callers never
//! see which tier succeeded, only the eventual `None`.

/// Attempt all three extraction tiers in order, returning the first
/// successfully-parsed JSON value.
pub fn extract_json(response: &str) -> Option<serde_json::Value> {
    tier1_direct(response)
        .or_else(|| tier2_fenced_block(response))
        .or_else(|| tier3_brace_span(response))
}

fn tier1_direct(response: &str) -> Option<serde_json::Value> {
    serde_json::from_str(response.trim()).ok()
}

fn tier2_fenced_block(response: &str) -> Option<serde_json::Value> {
    let start_marker = "```json";
    let start = response.find(start_marker)? + start_marker.len();
    let rest = &response[start..];
    let end = rest.find("```")?;
    serde_json::from_str(rest[..end].trim()).ok()
}

fn tier3_brace_span(response: &str) -> Option<serde_json::Value> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&response[start..=end]).ok()
}

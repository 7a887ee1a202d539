//! JSON plan extraction from free-form model replies.
//!
//! Models wrap their plan in prose, fenced code blocks, or nothing at all.
//! Extraction prefers a fenced ```json block, then any fenced block, then
//! the first brace-balanced object. Invalid JSON degrades to the empty plan
//! so the caller falls back to taking no action.

use std::sync::OnceLock;

use regex::Regex;

use orc_domain::Plan;

fn fenced_json() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)```json\s*(\{.*?\})\s*```").expect("static regex compiles")
    })
}

fn fenced_any() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\s*(\{.*?\})\s*```").expect("static regex compiles"))
}

/// Extract the first JSON object from the text, or `None`.
pub fn extract_json_block(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    if let Some(captures) = fenced_json().captures(text) {
        return Some(captures[1].to_owned());
    }
    if let Some(captures) = fenced_any().captures(text) {
        return Some(captures[1].to_owned());
    }

    // Brace matching for the first complete object.
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_owned());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a plan out of a model reply. Anything that fails to extract or
/// deserialize is the empty plan.
pub fn parse_plan(text: &str) -> Plan {
    let Some(block) = extract_json_block(text) else {
        return Plan::default();
    };
    match serde_json::from_str::<serde_json::Value>(&block) {
        Ok(value) => Plan::from_value(value),
        Err(err) => {
            tracing::warn!(error = %err, "plan JSON failed to parse; treating as empty plan");
            Plan::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_domain::PlanAction;

    #[test]
    fn prefers_fenced_json_blocks() {
        let text = "Thinking...\n```json\n{\"actions\": []}\n```\nand also {\"x\": 1}";
        assert_eq!(extract_json_block(text).unwrap(), "{\"actions\": []}");
    }

    #[test]
    fn falls_back_to_any_fence_then_braces() {
        let fenced = "```\n{\"actions\": [1]}\n```";
        assert_eq!(extract_json_block(fenced).unwrap(), "{\"actions\": [1]}");

        let bare = "I will do this: {\"actions\": [{\"type\": \"get_assigned_essays\"}]} ok?";
        let block = extract_json_block(bare).unwrap();
        assert!(block.starts_with('{') && block.ends_with('}'));
    }

    #[test]
    fn nested_braces_are_balanced() {
        let text = "{\"a\": {\"b\": {\"c\": 1}}} trailing";
        assert_eq!(extract_json_block(text).unwrap(), "{\"a\": {\"b\": {\"c\": 1}}}");
    }

    #[test]
    fn no_object_means_none() {
        assert!(extract_json_block("no json here").is_none());
        assert!(extract_json_block("").is_none());
        assert!(extract_json_block("{never closed").is_none());
    }

    #[test]
    fn parse_plan_extracts_actions() {
        let text = "```json\n{\"actions\": [{\"type\": \"submit_vote\", \"candidate_name\": \"X\"}]}\n```";
        let plan = parse_plan(text);
        assert_eq!(plan.actions.len(), 1);
        assert!(matches!(&plan.actions[0], PlanAction::SubmitVote { candidate_name } if candidate_name == "X"));
    }

    #[test]
    fn invalid_json_is_the_empty_plan() {
        assert!(parse_plan("{\"actions\": [").is_empty());
        assert!(parse_plan("nothing at all").is_empty());
    }
}

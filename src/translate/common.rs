//! Shared pieces of the inbound/outbound translators: collapsing consecutive same-role history
//! entries, and the streaming-chunk id/model wrapper every protocol's output needs.

use kiro_schema::kiro::HistoryEntry;

/// Merges adjacent `User`/`Assistant` entries of the same kind, concatenating their text with a
/// newline and, for assistant entries, appending tool-use lists. `ToolResult` entries never merge
/// with a neighbour — each upstream tool result stays a distinct history turn.
pub fn collapse_consecutive(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut collapsed: Vec<HistoryEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match (collapsed.last_mut(), entry) {
            (Some(HistoryEntry::User { content: prev }), HistoryEntry::User { content: next }) => {
                prev.push('\n');
                prev.push_str(&next);
            }
            (
                Some(HistoryEntry::Assistant { content: prev, tool_uses: prev_uses }),
                HistoryEntry::Assistant { content: next, tool_uses: next_uses },
            ) => {
                prev.push('\n');
                prev.push_str(&next);
                prev_uses.extend(next_uses);
            }
            (_, entry) => collapsed.push(entry),
        }
    }
    collapsed
}

/// Prepends `{system}\n\n` onto the first `User` entry's content, or inserts a new leading `User`
/// entry holding only the system text if the request has no user turn at all. Used by the OpenAI
/// and Gemini translators, which have no dedicated system slot once the request reaches the
/// upstream (unlike Anthropic, which passes `system` through as its own top-level field).
pub fn inline_system_prefix(entries: &mut Vec<HistoryEntry>, system: String) {
    if let Some(HistoryEntry::User { content }) = entries.iter_mut().find(|entry| matches!(entry, HistoryEntry::User { .. })) {
        *content = format!("{system}\n\n{content}");
    } else {
        entries.insert(0, HistoryEntry::User { content: system });
    }
}

/// A streaming response id, shared by every protocol's first chunk (`chatcmpl-...`/`msg_...`).
pub fn generate_stream_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Maps the upstream's `stop_reason` (Anthropic's own vocabulary, since Kiro speaks
/// Claude-family models) to OpenAI's `finish_reason` strings.
pub fn openai_finish_reason(stop_reason: Option<&str>) -> Option<String> {
    Some(
        match stop_reason? {
            "tool_use" => "tool_calls",
            "max_tokens" => "length",
            "stop_sequence" => "stop",
            _ => "stop",
        }
        .to_string(),
    )
}

/// Maps the upstream's `stop_reason` to Gemini's `finishReason` enum values.
pub fn gemini_finish_reason(stop_reason: Option<&str>) -> Option<kiro_schema::gemini::FinishReason> {
    use kiro_schema::gemini::FinishReason;
    Some(match stop_reason? {
        "max_tokens" => FinishReason::MaxTokens,
        "end_turn" | "stop_sequence" | "tool_use" => FinishReason::Stop,
        _ => FinishReason::Other,
    })
}

/// Maps the upstream's `stop_reason` straight through to Anthropic's own `StopReason` enum.
pub fn anthropic_stop_reason(stop_reason: Option<&str>) -> Option<kiro_schema::anthropic::StopReason> {
    use kiro_schema::anthropic::StopReason;
    Some(match stop_reason? {
        "max_tokens" => StopReason::MaxTokens,
        "tool_use" => StopReason::ToolUse,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    })
}

/// Rough token estimate (4 characters per token) for `/v1/messages/count_tokens`. The upstream
/// exposes no tokenizer endpoint of its own, only `/conversation`, so this avoids spending a real
/// generation call just to answer a metadata question.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4).max(if text.is_empty() { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_adjacent_user_entries() {
        let entries = vec![
            HistoryEntry::User { content: "a".into() },
            HistoryEntry::User { content: "b".into() },
        ];
        let collapsed = collapse_consecutive(entries);
        assert_eq!(collapsed.len(), 1);
        assert!(matches!(&collapsed[0], HistoryEntry::User { content } if content == "a\nb"));
    }

    #[test]
    fn does_not_merge_across_a_tool_result() {
        let entries = vec![
            HistoryEntry::User { content: "a".into() },
            HistoryEntry::ToolResult { tool_use_id: "t1".into(), content: "72F".into() },
            HistoryEntry::User { content: "b".into() },
        ];
        assert_eq!(collapse_consecutive(entries).len(), 3);
    }

    #[test]
    fn estimate_tokens_is_roughly_four_chars_per_token() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("hi"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(40)), 10);
    }
}

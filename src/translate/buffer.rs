//! Reassembles the upstream's fragmented tool-call events into one JSON value per `toolUseId`.
//!
//! The upstream streams a tool call's `input` as successive partial-JSON-string fragments under
//! the same `toolUseId`, terminated by a fragment with `stop: true`. Every protocol needs the
//! fully concatenated string at that point — OpenAI and Anthropic forward it as incremental text
//! regardless, but Gemini's `functionCall` part is atomic, so it can only be emitted once
//! complete. Centralizing the concatenation here keeps that invariant (never hand a protocol
//! adapter a value that isn't valid JSON) in one place instead of three.

use serde_json::Value;
use std::collections::HashMap;

pub struct ToolCallBuffer {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

struct Entry {
    index: u32,
    name: String,
    input: String,
}

/// What to do with a tool-use fragment once it's been folded into the buffer.
pub enum ToolCallStep {
    /// The call is still accumulating; `index` is its stable position for protocols (OpenAI)
    /// that key deltas by array index.
    InProgress { index: u32, is_first: bool },
    /// `stop: true` arrived. `input` is the fully concatenated argument string, already
    /// validated as JSON (falling back to `{}` if the upstream ever sends malformed JSON).
    /// `is_first` is true when this is also the call's only fragment.
    Finished { index: u32, name: String, input: Value, is_first: bool },
}

impl ToolCallBuffer {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn push(&mut self, tool_use_id: &str, name: &str, input_fragment: &str, stop: bool) -> ToolCallStep {
        let is_first = !self.entries.contains_key(tool_use_id);
        if is_first {
            self.order.push(tool_use_id.to_string());
        }
        let index = self.order.iter().position(|id| id == tool_use_id).expect("just inserted") as u32;

        let entry = self.entries.entry(tool_use_id.to_string()).or_insert_with(|| Entry {
            index,
            name: name.to_string(),
            input: String::new(),
        });
        entry.input.push_str(input_fragment);

        if !stop {
            return ToolCallStep::InProgress { index, is_first };
        }

        let input = serde_json::from_str(&entry.input).unwrap_or(Value::Object(Default::default()));
        ToolCallStep::Finished {
            index,
            name: entry.name.clone(),
            input,
            is_first,
        }
    }
}

impl Default for ToolCallBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_fragments_across_calls_and_validates_json() {
        let mut buffer = ToolCallBuffer::new();
        assert!(matches!(
            buffer.push("t1", "get_weather", "{\"city\":", false),
            ToolCallStep::InProgress { index: 0, is_first: true }
        ));
        match buffer.push("t1", "get_weather", "\"sf\"}", true) {
            ToolCallStep::Finished { index, name, input, .. } => {
                assert_eq!(index, 0);
                assert_eq!(name, "get_weather");
                assert_eq!(input, serde_json::json!({"city": "sf"}));
            }
            _ => panic!("expected Finished"),
        }
    }

    #[test]
    fn malformed_json_falls_back_to_empty_object_instead_of_erroring() {
        let mut buffer = ToolCallBuffer::new();
        match buffer.push("t1", "broken", "{not json", true) {
            ToolCallStep::Finished { input, .. } => assert_eq!(input, serde_json::json!({})),
            _ => panic!("expected Finished"),
        }
    }

    #[test]
    fn interleaved_tool_calls_keep_separate_indices() {
        let mut buffer = ToolCallBuffer::new();
        buffer.push("a", "f1", "{}", false);
        buffer.push("b", "f2", "{}", false);
        match buffer.push("a", "f1", "", true) {
            ToolCallStep::Finished { index, .. } => assert_eq!(index, 0),
            _ => panic!("expected Finished"),
        }
        match buffer.push("b", "f2", "", true) {
            ToolCallStep::Finished { index, .. } => assert_eq!(index, 1),
            _ => panic!("expected Finished"),
        }
    }
}

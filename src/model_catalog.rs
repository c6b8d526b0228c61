//! Client-model → upstream-model mapping table (spec §6) and the static `/v1/models` list.

/// The four upstream models this proxy ever sends. Order matches the spec's mapping table.
pub const UPSTREAM_MODELS: &[&str] = &[
    "claude-sonnet-4",
    "claude-haiku-4.5",
    "claude-opus-4.5",
    "claude-sonnet-4.5",
];

/// Maps a client-supplied model name to the upstream model name, per the spec's table.
/// `claude-sonnet-4*` matches any `claude-sonnet-4` prefix that isn't `claude-sonnet-4.5`
/// (which has its own, more specific, row).
pub fn map_to_upstream(client_model: &str) -> &'static str {
    match client_model {
        "claude-sonnet-4.5" => "claude-sonnet-4.5",
        "gpt-4o" | "gpt-4" => "claude-sonnet-4",
        "gpt-4o-mini" | "gpt-3.5-turbo" | "claude-haiku-4.5" => "claude-haiku-4.5",
        "o1" | "o1-preview" | "claude-opus-4.5" => "claude-opus-4.5",
        other if other.starts_with("claude-sonnet-4") => "claude-sonnet-4",
        _ => "claude-sonnet-4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_rows_map_as_specified() {
        assert_eq!(map_to_upstream("gpt-4o"), "claude-sonnet-4");
        assert_eq!(map_to_upstream("gpt-4"), "claude-sonnet-4");
        assert_eq!(map_to_upstream("gpt-4o-mini"), "claude-haiku-4.5");
        assert_eq!(map_to_upstream("gpt-3.5-turbo"), "claude-haiku-4.5");
        assert_eq!(map_to_upstream("claude-haiku-4.5"), "claude-haiku-4.5");
        assert_eq!(map_to_upstream("o1"), "claude-opus-4.5");
        assert_eq!(map_to_upstream("o1-preview"), "claude-opus-4.5");
        assert_eq!(map_to_upstream("claude-opus-4.5"), "claude-opus-4.5");
        assert_eq!(map_to_upstream("claude-sonnet-4.5"), "claude-sonnet-4.5");
    }

    #[test]
    fn sonnet_4_wildcard_does_not_swallow_sonnet_4_5() {
        assert_eq!(map_to_upstream("claude-sonnet-4-20250101"), "claude-sonnet-4");
        assert_eq!(map_to_upstream("claude-sonnet-4.5"), "claude-sonnet-4.5");
    }

    #[test]
    fn unknown_model_falls_back_to_sonnet_4() {
        assert_eq!(map_to_upstream("unknown-model"), "claude-sonnet-4");
    }
}

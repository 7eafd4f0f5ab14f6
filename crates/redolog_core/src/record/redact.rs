//! Redaction helpers for record descriptions.

use crate::types::ItemId;

/// Longest free-text value printed verbatim.
const MAX_TEXT: usize = 32;

/// Characters of a uuid kept in descriptions.
const UUID_PREFIX: usize = 8;

/// Item ids listed before eliding the rest.
const MAX_IDS: usize = 8;

/// Quotes free text, clipping long values.
pub(crate) fn text(value: &str) -> String {
    if value.chars().count() <= MAX_TEXT {
        format!("{value:?}")
    } else {
        let clipped: String = value.chars().take(MAX_TEXT).collect();
        format!("{clipped:?}...")
    }
}

/// Shortens a uuid to its first characters.
pub(crate) fn uuid(value: Option<&str>) -> String {
    match value {
        None => "-".to_string(),
        Some(v) if v.chars().count() <= UUID_PREFIX => v.to_string(),
        Some(v) => {
            let prefix: String = v.chars().take(UUID_PREFIX).collect();
            format!("{prefix}~")
        }
    }
}

/// Lists item ids, eliding long lists.
pub(crate) fn ids(ids: &[ItemId]) -> String {
    let shown: Vec<String> = ids.iter().take(MAX_IDS).map(|id| id.as_i32().to_string()).collect();
    if ids.len() > MAX_IDS {
        format!("[{},+{}]", shown.join(","), ids.len() - MAX_IDS)
    } else {
        format!("[{}]", shown.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_quoted() {
        assert_eq!(text("Shared"), "\"Shared\"");
    }

    #[test]
    fn long_text_is_clipped() {
        let long = "x".repeat(40);
        let out = text(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.matches('x').count(), MAX_TEXT);
    }

    #[test]
    fn long_id_lists_are_elided() {
        let list: Vec<ItemId> = (1..=10).map(ItemId::new).collect();
        assert_eq!(ids(&list), "[1,2,3,4,5,6,7,8,+2]");
        assert_eq!(ids(&list[..2]), "[1,2]");
    }

    #[test]
    fn uuids_are_shortened() {
        assert_eq!(uuid(None), "-");
        assert_eq!(uuid(Some("u-42")), "u-42");
        assert_eq!(
            uuid(Some("3f2b8c1e-9a4d-4c2e-8f1a-0b9e7d6c5a4f")),
            "3f2b8c1e~"
        );
    }
}

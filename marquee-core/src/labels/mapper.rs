use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::LabelSet;
use crate::error::MappingError;

pub const DEFAULT_MAX_LABELS: usize = 50;
pub const DEFAULT_MAX_LABEL_LENGTH: usize = 128;

/// Tunables for [`LabelMapper`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelRules {
    pub max_labels: usize,
    pub max_label_length: usize,
    /// Labels that are never written.
    pub deny: Vec<String>,
    /// When non-empty, only these labels are written.
    pub allow: Vec<String>,
}

impl Default for LabelRules {
    fn default() -> Self {
        Self {
            max_labels: DEFAULT_MAX_LABELS,
            max_label_length: DEFAULT_MAX_LABEL_LENGTH,
            deny: Vec::new(),
            allow: Vec::new(),
        }
    }
}

/// Pure transformation from raw provider keywords to a [`LabelSet`].
#[derive(Clone, Debug)]
pub struct LabelMapper {
    max_labels: usize,
    max_label_length: usize,
    deny: HashSet<String>,
    allow: Option<HashSet<String>>,
}

impl Default for LabelMapper {
    fn default() -> Self {
        Self::new(LabelRules::default())
    }
}

impl LabelMapper {
    pub fn new(rules: LabelRules) -> Self {
        let max_label_length = rules.max_label_length.max(1);
        let normalize_list = |list: &[String]| -> HashSet<String> {
            list.iter()
                .filter(|entry| !entry.chars().any(char::is_control))
                .map(|entry| normalize_keyword(entry, max_label_length))
                .filter(|entry| !entry.is_empty())
                .collect()
        };

        let allow = normalize_list(&rules.allow);
        Self {
            max_labels: rules.max_labels,
            max_label_length,
            deny: normalize_list(&rules.deny),
            allow: (!allow.is_empty()).then_some(allow),
        }
    }

    /// Maps keywords in input order. Deterministic and idempotent:
    /// feeding the output back in yields the same set.
    pub fn map<S: AsRef<str>>(
        &self,
        keywords: &[S],
    ) -> Result<LabelSet, MappingError> {
        let mut seen = HashSet::with_capacity(keywords.len());
        let mut labels = Vec::with_capacity(keywords.len().min(self.max_labels));

        for (index, keyword) in keywords.iter().enumerate() {
            let keyword = keyword.as_ref();
            if keyword.chars().any(char::is_control) {
                return Err(MappingError::ControlCharacters { index });
            }

            let label = normalize_keyword(keyword, self.max_label_length);
            if label.is_empty() {
                continue;
            }
            if let Some(allow) = &self.allow
                && !allow.contains(&label)
            {
                continue;
            }
            if self.deny.contains(&label) {
                continue;
            }
            if labels.len() < self.max_labels && seen.insert(label.clone()) {
                labels.push(label);
            }
        }

        Ok(LabelSet::from_normalized(labels))
    }
}

/// Lowercases, strips everything but alphanumerics, whitespace and `-`,
/// collapses whitespace and truncates to `max_chars` characters.
pub fn normalize_keyword(raw: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else if ch.is_alphanumeric() || ch == '-' {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
        out.truncate(out.trim_end().len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(mapper: &LabelMapper, input: &[&str]) -> Vec<String> {
        mapper.map(input).unwrap().into_inner()
    }

    #[test]
    fn lowercases_and_preserves_input_order() {
        let mapper = LabelMapper::default();
        assert_eq!(
            map(&mapper, &["prison", "friendship", "Escape"]),
            vec!["prison", "friendship", "escape"]
        );
    }

    #[test]
    fn strips_markup_and_collapses_whitespace() {
        let mapper = LabelMapper::default();
        assert_eq!(
            map(&mapper, &["  <b>Coming-of-Age</b>  ", "time   travel", "\"quoted\";"]),
            vec!["bcoming-of-ageb", "time travel", "quoted"]
        );
    }

    #[test]
    fn drops_empty_and_duplicates() {
        let mapper = LabelMapper::default();
        assert_eq!(
            map(&mapper, &["", "   ", "<>", "Heist", "heist", "HEIST "]),
            vec!["heist"]
        );
    }

    #[test]
    fn empty_input_maps_to_empty_set() {
        let mapper = LabelMapper::default();
        let empty: [&str; 0] = [];
        assert!(mapper.map(&empty).unwrap().is_empty());
    }

    #[test]
    fn rejects_control_characters() {
        let mapper = LabelMapper::default();
        assert_eq!(
            mapper.map(&["fine", "bad\u{0007}"]),
            Err(MappingError::ControlCharacters { index: 1 })
        );
    }

    #[test]
    fn caps_to_first_max_labels() {
        let mapper = LabelMapper::new(LabelRules {
            max_labels: 2,
            ..LabelRules::default()
        });
        assert_eq!(map(&mapper, &["a", "b", "c"]), vec!["a", "b"]);
    }

    #[test]
    fn truncates_long_labels_by_character() {
        let mapper = LabelMapper::new(LabelRules {
            max_label_length: 5,
            ..LabelRules::default()
        });
        assert_eq!(map(&mapper, &["ééééééé", "abcd efgh"]), vec!["ééééé", "abcd"]);
    }

    #[test]
    fn applies_allow_then_deny_lists() {
        let mapper = LabelMapper::new(LabelRules {
            allow: vec!["Heist".into(), "Prison".into(), "Escape".into()],
            deny: vec!["ESCAPE".into()],
            ..LabelRules::default()
        });
        assert_eq!(
            map(&mapper, &["escape", "prison", "friendship", "heist"]),
            vec!["prison", "heist"]
        );
    }
}

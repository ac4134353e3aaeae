use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::data::records::TagRecord;

pub const DEFAULT_TAG_TYPE: &str = "regular";

/// Classifies raw tag keys and cleans address-like values. Owns its compiled
/// regexes and expansion tables; nothing here is process-wide state.
pub struct TagCleaner {
    problem_chars: Regex,
    lower_colon: Regex,
    letters: Regex,
    double_space: Regex,
    street_suffix: Regex,
    suffix_expansions: HashMap<&'static str, &'static str>,
    prefix_expansions: HashMap<&'static str, &'static str>,
}

impl TagCleaner {
    pub fn new() -> TagCleaner {
        TagCleaner {
            problem_chars: Regex::new(r#"[=+/&<>;'"?%#$@,. \t\r\n]"#).unwrap(),
            lower_colon: Regex::new(r"^([a-z]|_)+:([a-z]|_)+").unwrap(),
            letters: Regex::new(r"[a-zA-Z]").unwrap(),
            double_space: Regex::new(r"  ").unwrap(),
            street_suffix: Regex::new(r"\S+\.?$").unwrap(),
            suffix_expansions: HashMap::from([
                ("St", "Street"),
                ("St.", "Street"),
                ("Rd", "Road"),
                ("Rd.", "Road"),
                ("RD", "Road"),
                ("Ave", "Avenue"),
                ("Ave.", "Avenue"),
                ("Blvd", "Boulevard"),
                ("Blvd.", "Boulevard"),
                ("Ln", "Lane"),
                ("Ln.", "Lane"),
                ("Dr", "Drive"),
            ]),
            prefix_expansions: HashMap::from([
                ("N.", "North"),
                ("N", "North"),
                ("S.", "South"),
                ("S", "South"),
                ("W.", "West"),
                ("W", "West"),
                ("E.", "East"),
                ("E", "East"),
            ]),
        }
    }

    /// Classifies one raw tag and cleans its value. Returns `None` when the
    /// key contains a forbidden character; such tags produce no record.
    pub fn clean_tag(&self, owner_id: &str, key: &str, value: &str) -> Option<TagRecord> {
        if self.problem_chars.is_match(key) {
            return None;
        }
        if self.lower_colon.is_match(key) {
            // Namespaced key: split at the first colon.
            let (tag_type, short_key) = key.split_once(':')?;
            let value = if key == "addr:street" {
                self.update_street_name(value)
            } else if key.contains("post") {
                self.update_post_code(value)
            } else {
                value.to_string()
            };
            Some(TagRecord {
                id: owner_id.to_string(),
                key: short_key.to_string(),
                value,
                tag_type: tag_type.to_string(),
            })
        } else {
            Some(TagRecord {
                id: owner_id.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                tag_type: DEFAULT_TAG_TYPE.to_string(),
            })
        }
    }

    /// Expands abbreviated street suffixes and directional prefixes and
    /// capitalizes the leading token.
    ///
    /// Replacement is whole-string substring replacement of the matched token
    /// text, so a token recurring inside a longer word elsewhere in the name
    /// is rewritten too. That matches the observed behavior of the dataset's
    /// existing cleaning run and is kept deliberately.
    pub fn update_street_name(&self, name: &str) -> String {
        let mut cleaned = name.to_string();
        let mut first = true;
        let words: Vec<String> = name.split_whitespace().map(str::to_string).collect();
        for mut word in words {
            if first && !word.contains("Mc") && !word.contains("ID") {
                let capitalized = capitalize(&word);
                cleaned = cleaned.replace(&word, &capitalized);
                word = capitalized;
                first = false;
            }
            if let Some(expansion) = self.suffix_expansions.get(word.as_str()) {
                cleaned = cleaned.replace(&word, expansion);
            } else if word.len() <= 2 {
                if let Some(expansion) = self.prefix_expansions.get(word.as_str()) {
                    cleaned = cleaned.replace(&word, expansion);
                }
            }
        }
        cleaned.replace('.', "")
    }

    /// Reduces a free-form postal value to its leading numeric code.
    pub fn update_post_code(&self, code: &str) -> String {
        let code = self.letters.replace_all(code, "");
        let code = self.problem_chars.replace_all(&code, " ");
        let code = self.double_space.replace_all(&code, " ");
        let code = code.trim();
        match code.split_once('-') {
            Some((before_hyphen, _)) => before_hyphen.to_string(),
            None => code.to_string(),
        }
    }

    /// Groups street names by their trailing suffix token, for eyeballing
    /// which abbreviations a new export actually uses.
    pub fn audit_streets<'a, I>(&self, street_names: I) -> HashMap<String, HashSet<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut street_types: HashMap<String, HashSet<String>> = HashMap::new();
        for name in street_names {
            if let Some(suffix) = self.street_suffix.find(name) {
                street_types
                    .entry(suffix.as_str().to_string())
                    .or_default()
                    .insert(name.to_string());
            }
        }
        street_types
    }
}

impl Default for TagCleaner {
    fn default() -> TagCleaner {
        TagCleaner::new()
    }
}

/// Uppercases the first character and lowercases the rest.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(head) => head
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WordListEntry {
    pub label: &'static str,
    pub slug: &'static str,
    pub title: &'static str,
    pub words: &'static [&'static str],
}

include!(concat!(env!("OUT_DIR"), "/word_catalog.rs"));

impl WordListEntry {
    /// Comma separated form, as the moderator form expects it.
    pub fn joined(&self) -> String {
        self.words.join(",")
    }
}

pub fn default_word_list() -> &'static WordListEntry {
    &WORD_LIST_CATALOG[DEFAULT_WORD_LIST_INDEX]
}

pub fn word_list_by_slug(slug: &str) -> Option<&'static WordListEntry> {
    let trimmed = slug.trim();
    WORD_LIST_CATALOG
        .iter()
        .find(|entry| entry.slug.eq_ignore_ascii_case(trimmed))
}

pub fn word_list_by_label(label: &str) -> Option<&'static WordListEntry> {
    let trimmed = label.trim();
    WORD_LIST_CATALOG
        .iter()
        .find(|entry| entry.label.eq_ignore_ascii_case(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_matches_slug() {
        assert_eq!(default_word_list().slug, DEFAULT_WORD_LIST_SLUG);
    }

    #[test]
    fn lookups_ignore_case() {
        let entry = word_list_by_slug(" Fruit ").expect("fruit list");
        assert!(entry.words.contains(&"MANGO"));
        assert_eq!(word_list_by_label("planets").map(|e| e.slug), Some("planets"));
        assert!(word_list_by_slug("missing").is_none());
    }

    #[test]
    fn catalog_words_are_upper_case() {
        for entry in WORD_LIST_CATALOG {
            assert!(entry.words.len() >= 2, "{} too short", entry.slug);
            for word in entry.words {
                assert_eq!(*word, word.to_uppercase());
            }
        }
    }
}

use std::collections::HashSet;

/// Snapshot of the engine's word list, taken after successful top-level
/// interpretations that leave the engine in interpret mode.
///
/// It is only ever replaced wholesale, so between checkpoints it may lag
/// behind the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordDictionary {
    words: Vec<String>,
}

impl WordDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with the names in a whitespace-separated
    /// listing, keeping first occurrences in order.
    pub fn replace_from_listing(&mut self, listing: &str) {
        let mut seen = HashSet::new();
        self.words = listing
            .split_whitespace()
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect();
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn contains(&self, name: &str) -> bool {
        self.words.iter().any(|w| w == name)
    }

    pub fn starting_with<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.words
            .iter()
            .map(String::as_str)
            .filter(move |w| w.starts_with(prefix))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_is_deduplicated_in_order() {
        let mut dict = WordDictionary::new();
        dict.replace_from_listing("SQUARE DUP SQUARE\nDROP  DUP\n");
        assert_eq!(dict.words(), ["SQUARE", "DUP", "DROP"]);
    }

    #[test]
    fn replace_is_wholesale() {
        let mut dict = WordDictionary::new();
        dict.replace_from_listing("A B C");
        dict.replace_from_listing("D");
        assert_eq!(dict.len(), 1);
        assert!(dict.contains("D"));
        assert!(!dict.contains("A"));
    }

    #[test]
    fn prefix_filter() {
        let mut dict = WordDictionary::new();
        dict.replace_from_listing("SQUARE SWAP DUP SQRT");
        let matches: Vec<&str> = dict.starting_with("SQ").collect();
        assert_eq!(matches, vec!["SQUARE", "SQRT"]);
    }
}

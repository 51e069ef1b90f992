use std::collections::HashSet;

use forthkernel_common::protocol::{CompleteReply, JsonMap, ReplyStatus};

use crate::dictionary::WordDictionary;

/// Words whose next token names a new dictionary entry.
pub(crate) const DEFINING_WORDS: [&str; 4] = [":", "CONSTANT", "VARIABLE", "CREATE"];

/// Words that consume the following text up to a delimiter.
const PARSING_WORDS: [(&str, char); 7] = [
    ("(", ')'),
    (".(", ')'),
    (".\"", '"'),
    ("S\"", '"'),
    ("C\"", '"'),
    ("ABORT\"", '"'),
    ("\\", '\n'),
];

/// The delimiter ending the text consumed by `word`, if it is a parsing
/// word. Any word ending in `"` (`LOG"`, `INCLUDE"`) reads a string literal.
pub(crate) fn parsing_delimiter(word: &str) -> Option<char> {
    PARSING_WORDS
        .iter()
        .find(|(name, _)| word.eq_ignore_ascii_case(name))
        .map(|(_, delim)| *delim)
        .or_else(|| (word.len() > 1 && word.ends_with('"')).then_some('"'))
}

/// Whitespace tokenizer over a code buffer that steps over comments and
/// string literals.
struct Tokens {
    chars: Vec<char>,
    pos: usize,
}

impl Tokens {
    fn new(code: &str) -> Self {
        Self {
            chars: code.chars().collect(),
            pos: 0,
        }
    }

    fn word(&mut self) -> Option<String> {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
        let start = self.pos;
        while self.chars.get(self.pos).is_some_and(|c| !c.is_whitespace()) {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    fn skip_past(&mut self, delim: char) {
        while let Some(c) = self.chars.get(self.pos) {
            self.pos += 1;
            if *c == delim {
                break;
            }
        }
    }
}

impl Iterator for Tokens {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let word = self.word()?;
            match parsing_delimiter(&word) {
                Some(delim) => self.skip_past(delim),
                None => return Some(word),
            }
        }
    }
}

/// Names introduced by defining words in `code`, in order of appearance.
pub fn defined_names(code: &str) -> Vec<String> {
    let mut tokens = Tokens::new(code);
    let mut names = Vec::new();
    while let Some(token) = tokens.next() {
        if DEFINING_WORDS.iter().any(|w| token.eq_ignore_ascii_case(w)) {
            if let Some(name) = tokens.word() {
                names.push(name);
            }
        }
    }
    names
}

/// Answer a completion query from the dictionary snapshot and the names
/// being defined in the buffer itself.
///
/// `cursor_pos` and the returned span are in Unicode scalar values. The
/// partial word runs from just after the last whitespace before the cursor.
pub fn complete(dictionary: &WordDictionary, code: &str, cursor_pos: usize) -> CompleteReply {
    let chars: Vec<char> = code.chars().collect();
    let cursor = cursor_pos.min(chars.len());
    let start = chars[..cursor]
        .iter()
        .rposition(|c| c.is_whitespace())
        .map_or(0, |i| i + 1);
    let partial: String = chars[start..cursor].iter().collect();

    // The partial word itself is not a local definition.
    let rest: String = chars[..start].iter().chain(&chars[cursor..]).collect();
    let local = defined_names(&rest);

    let mut seen = HashSet::new();
    let local_matches = local
        .iter()
        .map(String::as_str)
        .filter(|name| name.starts_with(partial.as_str()));
    let matches = dictionary
        .starting_with(&partial)
        .chain(local_matches)
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect();

    CompleteReply {
        matches,
        cursor_start: start,
        cursor_end: cursor,
        metadata: JsonMap::new(),
        status: ReplyStatus::Ok,
    }
}

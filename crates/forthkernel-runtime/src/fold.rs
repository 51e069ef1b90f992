//! Case folding of cell source.

use crate::completion::{parsing_delimiter, DEFINING_WORDS};

/// Words whose next token is taken as a name, never as a parsing word.
const NAME_WORDS: [&str; 3] = ["POSTPONE", "'", "[']"];

/// Words whose next token is a character argument.
const CHAR_WORDS: [&str; 2] = ["CHAR", "[CHAR]"];

#[derive(Clone, Copy, PartialEq)]
enum Next {
    Word,
    Name,
    Char,
}

/// Upper-case the words of `code`.
///
/// Text consumed by parsing words (string literals, comments) and the
/// argument of `CHAR` keep their case. Whitespace is preserved.
pub fn fold_case(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    let mut next = Next::Word;

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            out.push(c);
            chars.next();
            continue;
        }

        let mut word = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
            word.push(c);
        }

        if next == Next::Char {
            out.push_str(&word);
            next = Next::Word;
            continue;
        }

        let folded = word.to_uppercase();
        out.push_str(&folded);

        if next == Next::Name {
            next = Next::Word;
            continue;
        }
        if let Some(delim) = parsing_delimiter(&folded) {
            for c in chars.by_ref() {
                out.push(c);
                if c == delim {
                    break;
                }
            }
        } else if CHAR_WORDS.contains(&folded.as_str()) {
            next = Next::Char;
        } else if DEFINING_WORDS.contains(&folded.as_str())
            || NAME_WORDS.contains(&folded.as_str())
        {
            next = Next::Name;
        }
    }
    out
}

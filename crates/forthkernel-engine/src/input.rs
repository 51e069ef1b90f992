/// Character reader over the source text of one interpretation.
///
/// The text interpreter and parsing words (`:`, `CHAR`, `."`, `PARSE` ...)
/// share the same position, so words can consume input that follows them.
pub(crate) struct Source {
    chars: Vec<char>,
    /// Index of the next character to be consumed.
    pos: usize,
}

impl Source {
    pub fn new(code: &str) -> Self {
        Self {
            chars: code.chars().collect(),
            pos: 0,
        }
    }

    /// Peek at the next character without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Consume and return the next character.
    pub fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    /// Consume characters while `predicate` returns true.
    pub fn eat_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if predicate(ch) {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Next whitespace-delimited name. The single delimiter following the
    /// name is consumed as well.
    pub fn parse_name(&mut self) -> Option<String> {
        self.eat_while(char::is_whitespace);
        let start = self.pos;
        self.eat_while(|c| !c.is_whitespace());
        if self.pos == start {
            return None;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        self.advance();
        Some(name)
    }

    /// Text up to (not including) `delim`. The delimiter is consumed.
    /// Returns `None` when input runs out before the delimiter.
    pub fn parse_until(&mut self, delim: char) -> Option<String> {
        let start = self.pos;
        self.eat_while(|c| c != delim);
        let text: String = self.chars[start..self.pos].iter().collect();
        self.advance().map(|_| text)
    }

    /// Like [`parse_until`](Self::parse_until) but accepts a missing
    /// delimiter, returning the rest of the input.
    pub fn parse_lenient(&mut self, delim: char) -> String {
        let start = self.pos;
        self.eat_while(|c| c != delim);
        let text: String = self.chars[start..self.pos].iter().collect();
        self.advance();
        text
    }

    /// Skip to the end of the current line.
    pub fn skip_line(&mut self) {
        self.eat_while(|c| c != '\n');
    }
}

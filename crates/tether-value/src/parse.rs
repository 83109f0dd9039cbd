//! JSON text parser
//!
//! Recursive descent over the input bytes. Parsing never panics: malformed
//! input yields a [`ParseError`] whose message carries no string indices.

use crate::tree::{Array, Node, Object, ValueTree};

/// Maximum container nesting accepted by the parser
pub const MAX_DEPTH: usize = 200;

/// Largest number of characters (sign included) parsed as Int
const INT_DIGITS: usize = 9;

/// Parser dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseStrategy {
    /// Plain JSON
    #[default]
    Standard,
    /// JSON plus `//` line and `/* */` block comments
    Comments,
}

/// Parse failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("exceeded maximum nesting depth")]
    MaxDepth,
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected end of input in string")]
    UnterminatedString,
    #[error("unexpected end of input after start of comment")]
    DanglingSlash,
    #[error("unexpected end of input inside comment")]
    UnterminatedComment,
    #[error("malformed comment")]
    MalformedComment,
    #[error("unescaped control character in string")]
    UnescapedControl,
    #[error("bad \\u escape")]
    BadUnicodeEscape,
    #[error("invalid escape character")]
    InvalidEscape,
    #[error("leading 0s not permitted in numbers")]
    LeadingZeros,
    #[error("invalid number")]
    InvalidNumber,
    #[error("at least one digit required in fractional part")]
    FractionDigits,
    #[error("at least one digit required in exponent")]
    ExponentDigits,
    #[error("expected {0}")]
    ExpectedLiteral(&'static str),
    #[error("expected ',' in list")]
    ListSeparator,
    #[error("expected ',' in object")]
    ObjectSeparator,
    #[error("expected ':' in object")]
    MissingColon,
    #[error("expected '\"' in object")]
    MissingKey,
    #[error("expected value")]
    ExpectedValue,
    #[error("unexpected trailing input")]
    TrailingInput,
}

/// Result of [`ValueTree::parse_multi`]
#[derive(Debug, Clone, Default)]
pub struct MultiParse {
    /// Values parsed before the first failure
    pub values: Vec<ValueTree>,
    /// Byte offset where parsing stopped
    pub stop_pos: usize,
    pub error: Option<ParseError>,
}

impl ValueTree {
    /// Parse a single JSON document
    pub fn parse(text: &str, strategy: ParseStrategy) -> Result<ValueTree, ParseError> {
        let mut parser = Parser::new(text, strategy);
        let value = parser.parse_value(0)?;
        parser.skip_garbage()?;
        if parser.pos != parser.src.len() {
            return Err(ParseError::TrailingInput);
        }
        Ok(value)
    }

    /// Parse consecutive top-level documents
    pub fn parse_multi(text: &str, strategy: ParseStrategy) -> MultiParse {
        let mut parser = Parser::new(text, strategy);
        let mut out = MultiParse::default();
        loop {
            match parser.skip_garbage() {
                Ok(()) if parser.pos == parser.src.len() => break,
                Ok(()) => {}
                Err(err) => {
                    out.error = Some(err);
                    break;
                }
            }
            match parser.parse_value(0) {
                Ok(value) => {
                    out.values.push(value);
                    out.stop_pos = parser.pos;
                }
                Err(err) => {
                    out.error = Some(err);
                    break;
                }
            }
        }
        out
    }
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    strategy: ParseStrategy,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, strategy: ParseStrategy) -> Self {
        Self { src: text.as_bytes(), pos: 0, strategy }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\r' | b'\n' | b'\t') = self.peek() {
            self.pos += 1;
        }
    }

    /// Returns true when a comment was consumed
    fn skip_comment(&mut self) -> Result<bool, ParseError> {
        if self.peek() != Some(b'/') {
            return Ok(false);
        }
        self.pos += 1;
        match self.peek() {
            None => Err(ParseError::DanglingSlash),
            Some(b'/') => {
                self.pos += 1;
                while let Some(ch) = self.peek() {
                    if ch == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(true)
            }
            Some(b'*') => {
                self.pos += 1;
                let rest = &self.src[self.pos..];
                match rest.windows(2).position(|w| w == b"*/") {
                    Some(end) => {
                        self.pos += end + 2;
                        Ok(true)
                    }
                    None => Err(ParseError::UnterminatedComment),
                }
            }
            Some(_) => Err(ParseError::MalformedComment),
        }
    }

    fn skip_garbage(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.strategy == ParseStrategy::Comments {
            while self.skip_comment()? {
                self.skip_whitespace();
            }
        }
        Ok(())
    }

    fn next_token(&mut self) -> Result<u8, ParseError> {
        self.skip_garbage()?;
        let ch = self.peek().ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(ch)
    }

    fn expect(&mut self, literal: &'static str, value: Node) -> Result<ValueTree, ParseError> {
        // the first byte was already consumed by next_token
        let start = self.pos - 1;
        let end = start + literal.len();
        if self.src.get(start..end) == Some(literal.as_bytes()) {
            self.pos = end;
            Ok(ValueTree::from_node(value))
        } else {
            Err(ParseError::ExpectedLiteral(literal))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<ValueTree, ParseError> {
        let ch = self.next_token()?;
        match ch {
            b'-' | b'0'..=b'9' => {
                self.pos -= 1;
                self.parse_number()
            }
            b't' => self.expect("true", Node::Bool(true)),
            b'f' => self.expect("false", Node::Bool(false)),
            b'n' => self.expect("null", Node::Null),
            b'"' => Ok(ValueTree::from_node(Node::String(self.parse_string()?))),
            b'{' => {
                if depth >= MAX_DEPTH {
                    return Err(ParseError::MaxDepth);
                }
                self.parse_object(depth)
            }
            b'[' => {
                if depth >= MAX_DEPTH {
                    return Err(ParseError::MaxDepth);
                }
                self.parse_array(depth)
            }
            _ => Err(ParseError::ExpectedValue),
        }
    }

    fn parse_object(&mut self, depth: usize) -> Result<ValueTree, ParseError> {
        let mut items = Object::new();
        let mut ch = self.next_token()?;
        if ch == b'}' {
            return Ok(items.into());
        }
        loop {
            if ch != b'"' {
                return Err(ParseError::MissingKey);
            }
            let key = self.parse_string()?;
            if self.next_token()? != b':' {
                return Err(ParseError::MissingColon);
            }
            let value = self.parse_value(depth + 1)?;
            items.insert(key, value);

            ch = self.next_token()?;
            if ch == b'}' {
                break;
            }
            if ch != b',' {
                return Err(ParseError::ObjectSeparator);
            }
            ch = self.next_token()?;
        }
        Ok(items.into())
    }

    fn parse_array(&mut self, depth: usize) -> Result<ValueTree, ParseError> {
        let mut items = Array::new();
        self.skip_garbage()?;
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(items.into());
        }
        loop {
            items.push(self.parse_value(depth + 1)?);
            match self.next_token()? {
                b']' => break,
                b',' => {}
                _ => return Err(ParseError::ListSeparator),
            }
        }
        Ok(items.into())
    }

    fn parse_number(&mut self) -> Result<ValueTree, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => {
                self.pos += 1;
                if matches!(self.peek(), Some(b'0'..=b'9')) {
                    return Err(ParseError::LeadingZeros);
                }
            }
            Some(b'1'..=b'9') => self.skip_digits(),
            _ => return Err(ParseError::InvalidNumber),
        }

        let integral = !matches!(self.peek(), Some(b'.' | b'e' | b'E'));
        if integral && self.pos - start <= INT_DIGITS {
            let text = self.slice(start);
            return text.parse::<i32>().map(ValueTree::from).map_err(|_| ParseError::InvalidNumber);
        }

        if self.peek() == Some(b'.') {
            self.pos += 1;
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(ParseError::FractionDigits);
            }
            self.skip_digits();
        }
        if let Some(b'e' | b'E') = self.peek() {
            self.pos += 1;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(ParseError::ExponentDigits);
            }
            self.skip_digits();
        }
        self.slice(start)
            .parse::<f64>()
            .map(ValueTree::from)
            .map_err(|_| ParseError::InvalidNumber)
    }

    fn skip_digits(&mut self) {
        while let Some(b'0'..=b'9') = self.peek() {
            self.pos += 1;
        }
    }

    fn slice(&self, start: usize) -> &str {
        // number characters are ASCII
        std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default()
    }

    fn read_hex4(&mut self) -> Result<u32, ParseError> {
        let digits = self.src.get(self.pos..self.pos + 4).ok_or(ParseError::BadUnicodeEscape)?;
        let text = std::str::from_utf8(digits).map_err(|_| ParseError::BadUnicodeEscape)?;
        if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::BadUnicodeEscape);
        }
        let cp = u32::from_str_radix(text, 16).map_err(|_| ParseError::BadUnicodeEscape)?;
        self.pos += 4;
        Ok(cp)
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        let mut out: Vec<u8> = Vec::new();
        loop {
            let ch = self.peek().ok_or(ParseError::UnterminatedString)?;
            self.pos += 1;
            match ch {
                b'"' => break,
                0x00..=0x1f => return Err(ParseError::UnescapedControl),
                b'\\' => {
                    let esc = self.peek().ok_or(ParseError::UnterminatedString)?;
                    self.pos += 1;
                    let decoded = match esc {
                        b'b' => '\u{08}',
                        b'f' => '\u{0c}',
                        b'n' => '\n',
                        b'r' => '\r',
                        b't' => '\t',
                        b'"' | b'\\' | b'/' => esc as char,
                        b'u' => self.parse_unicode_escape()?,
                        _ => return Err(ParseError::InvalidEscape),
                    };
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
                }
                _ => out.push(ch),
            }
        }
        // input was valid UTF-8 and escapes are encoded as chars
        Ok(String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    fn parse_unicode_escape(&mut self) -> Result<char, ParseError> {
        let cp = self.read_hex4()?;
        if (0xD800..=0xDBFF).contains(&cp) && self.src.get(self.pos..self.pos + 2) == Some(b"\\u") {
            let save = self.pos;
            self.pos += 2;
            let low = self.read_hex4()?;
            if (0xDC00..=0xDFFF).contains(&low) {
                let combined = 0x10000 + ((cp - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(combined).unwrap_or('\u{FFFD}'));
            }
            self.pos = save;
        }
        Ok(char::from_u32(cp).unwrap_or('\u{FFFD}'))
    }
}

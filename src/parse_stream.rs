use crate::error::{MalformedKind, MalformedSpecError};
use crate::source_location::SourceSpan;

/// How sizes and alignment of PEP 3118 type codes are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// `@`: native sizes and native alignment.
    NativeAligned,
    /// `^`: native sizes, packed.
    NativeUnaligned,
    /// `=`: standard sizes in host byte order.
    StandardNative,
    /// `<`: standard sizes, little-endian.
    Little,
    /// `>` or `!`: standard sizes, big-endian.
    Big,
}

impl Mode {
    pub fn from_char(c: char) -> Option<Mode> {
        match c {
            '@' => Some(Mode::NativeAligned),
            '^' => Some(Mode::NativeUnaligned),
            '=' => Some(Mode::StandardNative),
            '<' => Some(Mode::Little),
            '>' | '!' => Some(Mode::Big),
            _ => None,
        }
    }

    pub fn uses_native_sizes(self) -> bool {
        matches!(self, Mode::NativeAligned | Mode::NativeUnaligned)
    }

    pub fn is_aligned(self) -> bool {
        self == Mode::NativeAligned
    }
}

/// A cursor over one spec string. Lives for a single parse call.
pub struct ParseStream<'a> {
    source: &'a str,
    offset: usize,
    pub mode: Mode,
}

impl<'a> ParseStream<'a> {
    pub fn new(source: &'a str) -> Self {
        ParseStream {
            source,
            offset: 0,
            mode: Mode::NativeAligned,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.source.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn advance(&mut self) -> Option<(usize, char)> {
        let c = self.peek()?;
        let offset = self.offset;

        self.offset += c.len_utf8();

        Some((offset, c))
    }

    /// Eats `s` if the stream starts with it.
    pub fn consume(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.offset += s.len();
            return true;
        }

        false
    }

    /// Returns the text up to `c` and eats the delimiter too.
    /// Leaves the stream untouched when `c` never occurs.
    pub fn consume_until(&mut self, c: char) -> Option<(SourceSpan, &'a str)> {
        let len = self.rest().find(c)?;
        let start = self.offset;
        let text = &self.source[start..start + len];

        self.offset += len + c.len_utf8();

        Some((SourceSpan::new(start, start + len), text))
    }

    pub fn read_while<P: Fn(char) -> bool>(&mut self, predicate: P) -> (SourceSpan, &'a str) {
        let start = self.offset;

        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }

            self.advance();
        }

        (
            SourceSpan::new(start, self.offset),
            &self.source[start..self.offset],
        )
    }

    pub fn skip_whitespace(&mut self) {
        self.read_while(char::is_whitespace);
    }

    pub fn error(&self, kind: MalformedKind, span: SourceSpan) -> MalformedSpecError {
        MalformedSpecError::new(kind, span, self.source)
    }

    /// An error pointing at the current position.
    pub fn error_here(&self, kind: MalformedKind) -> MalformedSpecError {
        let span = match self.peek() {
            Some(c) => SourceSpan::new(self.offset, self.offset + c.len_utf8()),
            None => SourceSpan::new(self.offset, self.offset),
        };

        self.error(kind, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_consumes_the_expected_pieces() {
        let mut stream = ParseStream::new("(2,3)12i:name:");

        assert!(stream.consume("("));
        let (span, shape) = stream.consume_until(')').unwrap();
        assert_eq!(shape, "2,3");
        assert_eq!(span, SourceSpan::new(1, 4));

        let (_, digits) = stream.read_while(|c| c.is_ascii_digit());
        assert_eq!(digits, "12");

        assert_eq!(stream.advance(), Some((7, 'i')));
        assert!(!stream.consume("T{"));
        assert!(stream.consume(":"));
        assert_eq!(stream.consume_until(':').unwrap().1, "name");
        assert!(stream.is_empty());
    }

    #[test]
    fn consume_until_missing_delimiter_leaves_the_stream() {
        let mut stream = ParseStream::new("abc");

        assert!(stream.consume_until(':').is_none());
        assert_eq!(stream.rest(), "abc");
    }
}

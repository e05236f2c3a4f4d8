//! Lexer/Scanner for Sable source code.
//!
//! Source is processed line by line. At each position a fixed list of
//! recognizers is tried in priority order and the first match wins.

use crate::error::LexerError;
use crate::lexer::pool::StringPool;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

type Recognized = Option<(TokenKind, usize)>;

const LITERAL_KEYWORDS: &[(&str, TokenKind)] = &[
    ("true", TokenKind::BoolLiteral(true)),
    ("false", TokenKind::BoolLiteral(false)),
    ("null", TokenKind::Null),
];

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("continue", TokenKind::Continue),
    ("return", TokenKind::Return),
    ("break", TokenKind::Break),
    ("while", TokenKind::While),
    ("func", TokenKind::Func),
    ("type", TokenKind::Type),
    ("elif", TokenKind::Elif),
    ("else", TokenKind::Else),
    ("let", TokenKind::Let),
    ("if", TokenKind::If),
];

// Longest spelling first so `<<=` is not read as `<<` then `=`.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::ShiftLeftEqual),
    (">>=", TokenKind::ShiftRightEqual),
    ("==", TokenKind::EqualEqual),
    ("!=", TokenKind::BangEqual),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    ("<<", TokenKind::ShiftLeft),
    (">>", TokenKind::ShiftRight),
    ("+=", TokenKind::PlusEqual),
    ("-=", TokenKind::MinusEqual),
    ("*=", TokenKind::StarEqual),
    ("/=", TokenKind::SlashEqual),
    ("%=", TokenKind::PercentEqual),
    ("&=", TokenKind::AmpersandEqual),
    ("|=", TokenKind::PipeEqual),
    ("^=", TokenKind::CaretEqual),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&", TokenKind::Ampersand),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("~", TokenKind::Tilde),
    ("!", TokenKind::Bang),
    ("<", TokenKind::Less),
    (">", TokenKind::Greater),
    ("=", TokenKind::Equal),
];

/// The lexer transforms source code into a stream of tokens and a string pool.
pub struct Scanner<'a> {
    source: &'a str,
    pool: StringPool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pool: StringPool::new(),
        }
    }

    /// Scan all tokens from the source. The last token is always `Eof`.
    pub fn scan_tokens(mut self) -> Result<(Vec<Token>, StringPool), LexerError> {
        let mut tokens = Vec::new();
        let mut offset = 0;
        let mut line_no = 1;
        let mut last_len = 0;

        for (index, raw) in self.source.split('\n').enumerate() {
            line_no = index + 1;
            let text = raw.strip_suffix('\r').unwrap_or(raw);
            self.scan_line(text, offset, line_no, &mut tokens)?;
            last_len = text.len();
            offset += raw.len() + 1;
        }

        tokens.push(Token::eof(self.source.len(), line_no, last_len + 1));
        log::debug!(
            "scanned {} tokens, {} pooled strings",
            tokens.len(),
            self.pool.len()
        );
        Ok((tokens, self.pool))
    }

    fn scan_line(
        &mut self,
        text: &str,
        offset: usize,
        line: usize,
        tokens: &mut Vec<Token>,
    ) -> Result<(), LexerError> {
        let mut column = 0;

        while let Some(c) = text[column..].chars().next() {
            if c.is_whitespace() {
                column += c.len_utf8();
                continue;
            }
            if c == '#' {
                break;
            }

            let at = Span::new(offset + column, offset + column, line, column + 1);
            let (kind, len) = self.recognize(&text[column..], at, c)?;
            tokens.push(Token::new(
                kind,
                Span::new(at.start, at.start + len, line, column + 1),
            ));
            column += len;
        }

        Ok(())
    }

    fn recognize(
        &mut self,
        rest: &str,
        at: Span,
        c: char,
    ) -> Result<(TokenKind, usize), LexerError> {
        // Match priority.
        let recognizers: [fn(&mut Self, &str, Span) -> Result<Recognized, LexerError>; 12] = [
            Self::literal_keyword,
            Self::keyword,
            Self::operator,
            Self::float,
            Self::hex_int,
            Self::int,
            Self::hex_uint,
            Self::uint,
            Self::char_literal,
            Self::string_literal,
            Self::identifier,
            Self::separator,
        ];

        for recognizer in recognizers {
            if let Some(hit) = recognizer(self, rest, at)? {
                return Ok(hit);
            }
        }
        Err(LexerError::unexpected_char(c, at))
    }

    // ===== Recognizers =====

    fn literal_keyword(&mut self, rest: &str, _at: Span) -> Result<Recognized, LexerError> {
        Ok(match_word(rest, LITERAL_KEYWORDS))
    }

    fn keyword(&mut self, rest: &str, _at: Span) -> Result<Recognized, LexerError> {
        if let Some(hit) = match_word(rest, KEYWORDS) {
            return Ok(Some(hit));
        }
        if rest.starts_with("->") {
            return Ok(Some((TokenKind::Arrow, 2)));
        }
        Ok(None)
    }

    fn operator(&mut self, rest: &str, _at: Span) -> Result<Recognized, LexerError> {
        Ok(OPERATORS
            .iter()
            .find(|(spelling, _)| rest.starts_with(spelling))
            .map(|(spelling, kind)| (*kind, spelling.len())))
    }

    fn float(&mut self, rest: &str, at: Span) -> Result<Recognized, LexerError> {
        let bytes = rest.as_bytes();
        let int_end = run(bytes, 0, |b| b.is_ascii_digit());
        if int_end == 0 {
            return Ok(None);
        }

        let mut end = int_end;
        let mut fraction = false;
        if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
            end = run(bytes, end + 1, |b| b.is_ascii_digit());
            fraction = true;
        }
        let suffixed = bytes.get(end) == Some(&b'f');
        if !fraction && !suffixed {
            return Ok(None);
        }

        let len = end + usize::from(suffixed);
        if !at_boundary(bytes, len) {
            return Ok(None);
        }

        let digits = &rest[..end];
        match digits.parse::<f32>() {
            Ok(value) if value.is_finite() => Ok(Some((TokenKind::FloatLiteral(value), len))),
            _ => Err(LexerError::number_out_of_range(&rest[..len], at)),
        }
    }

    fn hex_int(&mut self, rest: &str, at: Span) -> Result<Recognized, LexerError> {
        let Some(end) = hex_digits_end(rest) else {
            return Ok(None);
        };
        let bytes = rest.as_bytes();
        if bytes.get(end) == Some(&b'u') || !at_boundary(bytes, end) {
            return Ok(None);
        }
        i32::from_str_radix(&rest[2..end], 16)
            .map(|n| Some((TokenKind::IntLiteral(n), end)))
            .map_err(|_| LexerError::number_out_of_range(&rest[..end], at))
    }

    fn int(&mut self, rest: &str, at: Span) -> Result<Recognized, LexerError> {
        let bytes = rest.as_bytes();
        let end = run(bytes, 0, |b| b.is_ascii_digit());
        if end == 0 || bytes.get(end) == Some(&b'u') || !at_boundary(bytes, end) {
            return Ok(None);
        }
        rest[..end]
            .parse::<i32>()
            .map(|n| Some((TokenKind::IntLiteral(n), end)))
            .map_err(|_| LexerError::number_out_of_range(&rest[..end], at))
    }

    fn hex_uint(&mut self, rest: &str, at: Span) -> Result<Recognized, LexerError> {
        let Some(end) = hex_digits_end(rest) else {
            return Ok(None);
        };
        let bytes = rest.as_bytes();
        if bytes.get(end) != Some(&b'u') || !at_boundary(bytes, end + 1) {
            return Ok(None);
        }
        u32::from_str_radix(&rest[2..end], 16)
            .map(|n| Some((TokenKind::UIntLiteral(n), end + 1)))
            .map_err(|_| LexerError::number_out_of_range(&rest[..=end], at))
    }

    fn uint(&mut self, rest: &str, at: Span) -> Result<Recognized, LexerError> {
        let bytes = rest.as_bytes();
        let end = run(bytes, 0, |b| b.is_ascii_digit());
        if end == 0 || bytes.get(end) != Some(&b'u') || !at_boundary(bytes, end + 1) {
            return Ok(None);
        }
        rest[..end]
            .parse::<u32>()
            .map(|n| Some((TokenKind::UIntLiteral(n), end + 1)))
            .map_err(|_| LexerError::number_out_of_range(&rest[..=end], at))
    }

    fn char_literal(&mut self, rest: &str, at: Span) -> Result<Recognized, LexerError> {
        let mut chars = rest.chars();
        if chars.next() != Some('\'') {
            return Ok(None);
        }

        let (value, body_len) = match chars.next() {
            Some('\\') => {
                let escaped = chars.next().ok_or_else(|| LexerError::invalid_char(at))?;
                (unescape(escaped, at)?, 1 + escaped.len_utf8())
            }
            Some(c) if c.is_ascii() && c != '\'' => (c, 1),
            _ => return Err(LexerError::invalid_char(at)),
        };

        if chars.next() != Some('\'') {
            return Err(LexerError::invalid_char(at));
        }
        Ok(Some((TokenKind::CharLiteral(value as u8), body_len + 2)))
    }

    fn string_literal(&mut self, rest: &str, at: Span) -> Result<Recognized, LexerError> {
        if !rest.starts_with('"') {
            return Ok(None);
        }

        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    let symbol = self.pool.intern(&value);
                    return Ok(Some((TokenKind::StringLiteral(symbol), i + 1)));
                }
                '\\' => {
                    let (_, escaped) = chars
                        .next()
                        .ok_or_else(|| LexerError::unterminated_string(at))?;
                    value.push(unescape(escaped, at)?);
                }
                c => value.push(c),
            }
        }

        Err(LexerError::unterminated_string(at))
    }

    fn identifier(&mut self, rest: &str, _at: Span) -> Result<Recognized, LexerError> {
        let bytes = rest.as_bytes();
        if !bytes.first().is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
            return Ok(None);
        }
        let end = run(bytes, 0, is_ident_byte);
        let symbol = self.pool.intern(&rest[..end]);
        Ok(Some((TokenKind::Identifier(symbol), end)))
    }

    fn separator(&mut self, rest: &str, _at: Span) -> Result<Recognized, LexerError> {
        let kind = match rest.as_bytes().first() {
            Some(b'(') => TokenKind::LeftParen,
            Some(b')') => TokenKind::RightParen,
            Some(b'{') => TokenKind::LeftBrace,
            Some(b'}') => TokenKind::RightBrace,
            Some(b'[') => TokenKind::LeftBracket,
            Some(b']') => TokenKind::RightBracket,
            Some(b'.') => TokenKind::Dot,
            Some(b',') => TokenKind::Comma,
            Some(b';') => TokenKind::Semicolon,
            Some(b':') => TokenKind::Colon,
            _ => return Ok(None),
        };
        Ok(Some((kind, 1)))
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// True when nothing identifier-like follows position `len`.
fn at_boundary(bytes: &[u8], len: usize) -> bool {
    bytes.get(len).map_or(true, |b| !is_ident_byte(*b))
}

fn run(bytes: &[u8], start: usize, pred: impl Fn(u8) -> bool) -> usize {
    let mut end = start;
    while end < bytes.len() && pred(bytes[end]) {
        end += 1;
    }
    end
}

fn hex_digits_end(rest: &str) -> Option<usize> {
    if !(rest.starts_with("0x") || rest.starts_with("0X")) {
        return None;
    }
    let end = run(rest.as_bytes(), 2, |b| b.is_ascii_hexdigit());
    (end > 2).then_some(end)
}

fn match_word(rest: &str, table: &[(&str, TokenKind)]) -> Recognized {
    table
        .iter()
        .find(|(word, _)| rest.starts_with(word) && at_boundary(rest.as_bytes(), word.len()))
        .map(|(word, kind)| (*kind, word.len()))
}

fn unescape(c: char, at: Span) -> Result<char, LexerError> {
    match c {
        'n' => Ok('\n'),
        't' => Ok('\t'),
        '\\' => Ok('\\'),
        '"' => Ok('"'),
        '\'' => Ok('\''),
        other => Err(LexerError::invalid_escape(other, at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, _) = Scanner::new(source).scan_tokens().unwrap();
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keyword_boundary() {
        let (tokens, pool) = Scanner::new("if iffy").scan_tokens().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::If);
        match tokens[1].kind {
            TokenKind::Identifier(sym) => assert_eq!(pool.get(sym), Some("iffy")),
            other => panic!("Expected identifier, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_keywords_before_identifiers() {
        let (tokens, pool) = Scanner::new("true nullable null").scan_tokens().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::BoolLiteral(true));
        assert!(matches!(tokens[1].kind, TokenKind::Identifier(_)));
        assert_eq!(tokens[2].kind, TokenKind::Null);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(
            kinds("12 0x1F 7u 0xFFu 1.5 2f"),
            vec![
                TokenKind::IntLiteral(12),
                TokenKind::IntLiteral(31),
                TokenKind::UIntLiteral(7),
                TokenKind::UIntLiteral(255),
                TokenKind::FloatLiteral(1.5),
                TokenKind::FloatLiteral(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_out_of_range_is_fatal() {
        let err = Scanner::new("let x = 4294967296;").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::NumberOutOfRange(ref s, _) if s == "4294967296"));

        let err = Scanner::new("5000000000u").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::NumberOutOfRange(..)));
    }

    #[test]
    fn test_arrow_beats_minus() {
        assert_eq!(
            kinds("-> - -="),
            vec![
                TokenKind::Arrow,
                TokenKind::Minus,
                TokenKind::MinusEqual,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(
            kinds("a <<= 1 << 2 <= 3"),
            vec![
                TokenKind::Identifier(0),
                TokenKind::ShiftLeftEqual,
                TokenKind::IntLiteral(1),
                TokenKind::ShiftLeft,
                TokenKind::IntLiteral(2),
                TokenKind::LessEqual,
                TokenKind::IntLiteral(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes_and_interning() {
        let (tokens, pool) = Scanner::new(r#""a\tb\n" "a\tb\n" x"#)
            .scan_tokens()
            .unwrap();
        let TokenKind::StringLiteral(first) = tokens[0].kind else {
            panic!("Expected string literal");
        };
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral(first));
        assert_eq!(pool.get(first), Some("a\tb\n"));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_char_literals() {
        assert_eq!(
            kinds(r"'a' '\n' '\''"),
            vec![
                TokenKind::CharLiteral(b'a'),
                TokenKind::CharLiteral(b'\n'),
                TokenKind::CharLiteral(b'\''),
                TokenKind::Eof,
            ]
        );
        assert!(matches!(
            Scanner::new("'ab'").scan_tokens(),
            Err(LexerError::InvalidChar(_))
        ));
    }

    #[test]
    fn test_comments_and_positions() {
        let source = "let a = 1; # trailing\n  print(a);";
        let (tokens, _) = Scanner::new(source).scan_tokens().unwrap();
        assert_eq!(tokens.len(), 11);
        let print = tokens[5];
        assert_eq!((print.span.line, print.span.column), (2, 3));
        assert_eq!(&source[print.span.start..print.span.end], "print");
    }

    #[test]
    fn test_unexpected_char_position() {
        let err = Scanner::new("let a = 1;\nlet $b = 2;")
            .scan_tokens()
            .unwrap_err();
        match err {
            LexerError::UnexpectedChar('$', span) => {
                assert_eq!((span.line, span.column), (2, 5));
            }
            other => panic!("Expected unexpected char, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            Scanner::new("\"open\nclose\"").scan_tokens(),
            Err(LexerError::UnterminatedString(_))
        ));
    }
}

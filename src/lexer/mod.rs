use crate::lexer::cursor::Cursor;
use crate::symbol::{Span, SrcOffset};

pub mod cursor;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    /// Covers the whole token, including any `>`, `:` or `"` sigils
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    /// Span of the word following a one-character sigil.
    pub fn name_span(&self) -> Span {
        match self.kind {
            TokenKind::LabelDef | TokenKind::Prefixed => {
                Span::new(SrcOffset(self.span.offs() + 1), self.span.len() - 1)
            }
            _ => self.span,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Keyword or anything else made of identifier characters
    Word,
    /// `>name`
    LabelDef,
    /// `:name`, either a label reference, a keyword or a literal value
    Prefixed,
    Str { terminated: bool },
    Comment,
    /// Also includes commas
    Whitespace,
    Unknown,
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenKind::Word => "word",
            TokenKind::LabelDef => "label definition",
            TokenKind::Prefixed => "prefixed value",
            TokenKind::Str { .. } => "string literal",
            TokenKind::Comment => "comment",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Unknown => "unknown",
            TokenKind::Eof => "end of file",
        };
        f.write_str(name)
    }
}

/// Lex the whole input, leaving out the final `Eof`.
pub fn tokenize(input: &str) -> impl Iterator<Item = Token> + '_ {
    let mut cursor = Cursor::new(input);
    std::iter::from_fn(move || {
        let token = cursor.advance_token();
        if token.kind != TokenKind::Eof {
            Some(token)
        } else {
            None
        }
    })
}

/// Test if a character is considered to be whitespace.
pub(crate) fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\t' | '\r' | ',')
}

/// Test if a character can be part of a word.
pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

impl Cursor<'_> {
    pub fn advance_token(&mut self) -> Token {
        let first_char = match self.bump() {
            Some(c) => c,
            None => {
                return Token::new(TokenKind::Eof, Span::new(SrcOffset(self.token_start()), 0))
            }
        };
        let kind = match first_char {
            '#' => {
                self.take_while(|c| c != '\n');
                TokenKind::Comment
            }
            c if is_whitespace(c) => {
                self.take_while(is_whitespace);
                TokenKind::Whitespace
            }
            '>' => {
                self.take_while(is_id);
                TokenKind::LabelDef
            }
            ':' => {
                self.take_while(is_id);
                TokenKind::Prefixed
            }
            '"' => {
                self.take_while(|c| c != '"' && c != '\n');
                let terminated = self.first() == '"' && !self.is_eof();
                if terminated {
                    self.bump();
                }
                TokenKind::Str { terminated }
            }
            c if is_id(c) => {
                self.take_while(is_id);
                TokenKind::Word
            }
            _ => TokenKind::Unknown,
        };
        let span = Span::new(SrcOffset(self.token_start()), self.pos_in_token());
        self.reset_pos();
        Token::new(kind, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).map(|tok| tok.kind).collect()
    }

    fn text<'a>(src: &'a str, tok: &Token) -> &'a str {
        &src[std::ops::Range::from(tok.span)]
    }

    #[test]
    fn words_and_sigils() {
        let src = ">loop add :RG1 DI:5";
        let toks: Vec<_> = tokenize(src).collect();
        let non_ws: Vec<_> = toks
            .iter()
            .filter(|tok| tok.kind != TokenKind::Whitespace)
            .map(|tok| (tok.kind, text(src, tok)))
            .collect();
        assert_eq!(
            non_ws,
            [
                (TokenKind::LabelDef, ">loop"),
                (TokenKind::Word, "add"),
                (TokenKind::Prefixed, ":RG1"),
                (TokenKind::Word, "DI"),
                (TokenKind::Prefixed, ":5"),
            ]
        );
    }

    #[test]
    fn name_span_skips_sigil() {
        let src = ":target";
        let tok = tokenize(src).next().unwrap();
        assert_eq!(&src[std::ops::Range::from(tok.name_span())], "target");
    }

    #[test]
    fn comments_run_to_newline() {
        assert_eq!(
            kinds("# comment \"not a string\nEND"),
            [TokenKind::Comment, TokenKind::Whitespace, TokenKind::Word]
        );
        assert_eq!(
            kinds("END # trailing"),
            [TokenKind::Word, TokenKind::Whitespace, TokenKind::Comment]
        );
    }

    #[test]
    fn crlf_is_whitespace() {
        assert_eq!(
            kinds("END\r\nEND,END"),
            [
                TokenKind::Word,
                TokenKind::Whitespace,
                TokenKind::Word,
                TokenKind::Whitespace,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn string_literals() {
        let src = "\"hi there\"";
        let toks: Vec<_> = tokenize(src).collect();
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Str { terminated: true });
        assert_eq!(toks[0].span.len(), src.len());

        assert_eq!(kinds("\"open"), [TokenKind::Str { terminated: false }]);
        assert_eq!(
            kinds("\"open\nEND"),
            [
                TokenKind::Str { terminated: false },
                TokenKind::Whitespace,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn unknown_characters() {
        assert_eq!(kinds("END;"), [TokenKind::Word, TokenKind::Unknown]);
        assert_eq!(kinds("-5"), [TokenKind::Unknown, TokenKind::Word]);
    }
}

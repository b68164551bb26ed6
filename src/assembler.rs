use std::iter::Peekable;
use std::ops::Range;
use std::vec::IntoIter;

use miette::{Report, Result};

use crate::error;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::opcode::{DataFormat, Keyword};
use crate::symbol::{LabelTable, PendingRef, Span};

/// Output of a successful assembly.
#[derive(Debug)]
pub struct Assembly {
    image: Vec<u8>,
    labels: LabelTable,
    /// Non-fatal diagnostics, such as redefined labels
    warnings: Vec<Report>,
}

impl Assembly {
    /// Flat bytecode, byte `i` loads at memory offset `i`.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn into_image(self) -> Vec<u8> {
        self.image
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn warnings(&self) -> &[Report] {
        &self.warnings
    }
}

/// Assemble source text into a bytecode image.
pub fn assemble(src: &str) -> Result<Assembly> {
    Assembler::new(src).assemble()
}

/// Compiles VM1 mnemonic source in a single left-to-right pass.
///
/// Label references that precede their definition are emitted as `0x0000` placeholders
/// and patched once the whole source has been scanned.
pub struct Assembler<'a> {
    /// Reference to the source file
    src: &'a str,
    /// Tokens without whitespace and comments
    toks: Peekable<IntoIter<Token>>,
    image: Vec<u8>,
    labels: LabelTable,
    pending: Vec<PendingRef>,
    warnings: Vec<Report>,
}

impl<'a> Assembler<'a> {
    pub fn new(src: &'a str) -> Self {
        let toks: Vec<Token> = tokenize(src)
            .filter(|tok| !matches!(tok.kind, TokenKind::Whitespace | TokenKind::Comment))
            .collect();
        Assembler {
            src,
            toks: toks.into_iter().peekable(),
            image: Vec::new(),
            labels: LabelTable::new(),
            pending: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn get_span(&self, span: Span) -> &'a str {
        &self.src[Range::from(span)]
    }

    /// Consume the source and produce the patched image.
    pub fn assemble(mut self) -> Result<Assembly> {
        while let Some(tok) = self.toks.next() {
            match tok.kind {
                TokenKind::Word => self.parse_word(tok)?,
                TokenKind::Prefixed => self.parse_prefixed(tok)?,
                TokenKind::LabelDef => self.define_label(tok)?,
                TokenKind::Str { terminated: true } => {
                    // Bytes between the quotes, copied verbatim
                    let raw = self.get_span(tok.span);
                    self.image.extend_from_slice(&raw.as_bytes()[1..raw.len() - 1]);
                }
                TokenKind::Str { terminated: false } => {
                    return Err(error::syntax_unclosed_str(tok.span, self.src))
                }
                TokenKind::Unknown => return Err(error::lex_unknown(tok.span, self.src)),
                // Filtered out in `new`
                TokenKind::Whitespace | TokenKind::Comment | TokenKind::Eof => unreachable!(),
            }
        }
        self.backpatch()?;

        Ok(Assembly {
            image: self.image,
            labels: self.labels,
            warnings: self.warnings,
        })
    }

    /// Bare words can only be keywords.
    fn parse_word(&mut self, tok: Token) -> Result<()> {
        let word = self.get_span(tok.span);
        match Keyword::lookup(word) {
            Some(keyword) => self.emit_keyword(keyword, tok),
            None => Err(error::lex_unsupported_keyword(tok.span, self.src, word)),
        }
    }

    /// `:NAME` is a keyword if one matches, otherwise a label reference.
    fn parse_prefixed(&mut self, tok: Token) -> Result<()> {
        let name_span = tok.name_span();
        let name = self.get_span(name_span);
        if name.is_empty() {
            return Err(error::syntax_missing_value(tok.span, self.src));
        }
        match Keyword::lookup(name) {
            Some(keyword) => self.emit_keyword(keyword, tok),
            None => {
                self.reference(name.to_ascii_uppercase(), name_span);
                Ok(())
            }
        }
    }

    fn emit_keyword(&mut self, keyword: Keyword, tok: Token) -> Result<()> {
        match keyword {
            Keyword::Data(fmt) => self.parse_literal(fmt, tok),
            _ => {
                if let Some(byte) = keyword.byte() {
                    self.image.push(byte);
                }
                Ok(())
            }
        }
    }

    /// Data formats demand a `:value` operand, truncated to the format's width.
    fn parse_literal(&mut self, fmt: DataFormat, format_tok: Token) -> Result<()> {
        let value_tok = match self.toks.peek() {
            Some(tok) if tok.kind == TokenKind::Prefixed => *tok,
            _ => return Err(error::syntax_value_prefix(format_tok.span, self.src)),
        };
        self.toks.next();

        let digits_span = value_tok.name_span();
        let digits = self.get_span(digits_span);
        if digits.is_empty() {
            return Err(error::syntax_missing_value(value_tok.span, self.src));
        }
        let val = parse_wrapping(digits, fmt.radix())
            .ok_or_else(|| error::syntax_bad_lit(digits_span, self.src, fmt.radix()))?;

        let bytes = val.to_le_bytes();
        self.image.extend_from_slice(&bytes[..fmt.width()]);
        Ok(())
    }

    fn define_label(&mut self, tok: Token) -> Result<()> {
        let name_span = tok.name_span();
        let name = self.get_span(name_span);
        if name.is_empty() {
            return Err(error::syntax_label_name(tok.span, self.src));
        }
        if Keyword::lookup(name).is_some() {
            return Err(error::lex_reserved_label(name_span, self.src, name));
        }
        let addr = u16::try_from(self.image.len())
            .map_err(|_| error::asm_too_large(tok.span, self.src, self.image.len()))?;

        let name = name.to_ascii_uppercase();
        if let Some(old) = self.labels.define(&name, addr) {
            let warning = error::warn_redefined_label(tok.span, self.src, &name, old, addr);
            self.warnings.push(warning);
        }
        Ok(())
    }

    /// Emit a known address, or a placeholder to be filled by `backpatch`.
    fn reference(&mut self, name: String, span: Span) {
        match self.labels.get(&name) {
            Some(addr) => self.image.extend_from_slice(&addr.to_le_bytes()),
            None => {
                self.pending.push(PendingRef {
                    name,
                    site: self.image.len(),
                    span,
                });
                self.image.extend_from_slice(&[0, 0]);
            }
        }
    }

    /// Use labels filled during parsing to resolve forward references
    fn backpatch(&mut self) -> Result<()> {
        for pending in self.pending.drain(..) {
            let Some(addr) = self.labels.get(&pending.name) else {
                return Err(error::asm_unresolved_label(
                    pending.span,
                    self.src,
                    &pending.name,
                ));
            };
            self.image[pending.site..pending.site + 2].copy_from_slice(&addr.to_le_bytes());
        }
        Ok(())
    }
}

/// Parse digits in `radix`, keeping only the low 16 bits. Hex may carry a `0x` prefix.
fn parse_wrapping(digits: &str, radix: u32) -> Option<u16> {
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(digits)
    } else {
        digits
    };
    digits.chars().try_fold(0u16, |acc, c| {
        let digit = c.to_digit(radix)? as u16;
        Some(acc.wrapping_mul(radix as u16).wrapping_add(digit))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(report: &Report) -> String {
        report.code().map(|c| c.to_string()).unwrap_or_default()
    }

    fn image(src: &str) -> Vec<u8> {
        assemble(src).unwrap().into_image()
    }

    #[test]
    fn adds_two_registers() {
        let src = "SRV :RG1 :DI :5  SRV :RG2 :DI :3  ADD :RG1 :RG2  END";
        assert_eq!(image(src), [9, 0, 5, 0, 9, 1, 3, 0, 4, 0, 1, 0]);
    }

    #[test]
    fn colon_is_optional_for_keywords() {
        assert_eq!(
            image("SRV RG1 DI:5\nSRV RG2 DI:3\nADD RG1 RG2\nEND"),
            image("SRV :RG1 :DI :5  SRV :RG2 :DI :3  ADD :RG1 :RG2  END"),
        );
    }

    #[test]
    fn case_insensitive_long_forms() {
        assert_eq!(
            image("set_register_value register1 double_int:5 end"),
            image("SRV RG1 DI:5 END"),
        );
        assert_eq!(
            image(">top pbr zero :top\nnbr MORE_OR_EQUAL_TO :top"),
            [2, 0, 0, 0, 3, 7, 0, 0]
        );
        assert_eq!(image("put rg4 si:3"), [18, 3, 3]);
    }

    #[test]
    fn forward_and_backward_references_agree() {
        let img = image("JMP :target >target END JMP :target");
        assert_eq!(img, [1, 3, 0, 0, 1, 3, 0]);
        assert_eq!(img[1..3], img[5..7]);
    }

    #[test]
    fn label_at_zero_resolves() {
        assert_eq!(image(">start JMP :start"), [1, 0, 0]);
        assert_eq!(image("JMP :start >start"), [1, 3, 0]);
    }

    #[test]
    fn labels_are_case_insensitive() {
        let asm = assemble(">Loop END jmp :LOOP").unwrap();
        assert_eq!(asm.image(), [0, 1, 0, 0]);
        assert_eq!(asm.labels().get("LOOP"), Some(0));
    }

    #[test]
    fn unresolved_label() {
        let err = assemble("JMP :nowhere END").unwrap_err();
        assert_eq!(code(&err), "asm::unresolved_label");
        assert!(err.to_string().contains("NOWHERE"));
    }

    #[test]
    fn redefinition_uses_latest_for_pending() {
        // Pending references see the last definition
        let asm = assemble("JMP :a >a END >a END").unwrap();
        assert_eq!(asm.image(), [1, 4, 0, 0, 0]);
        assert_eq!(asm.warnings().len(), 1);
        // Immediate references see the definition known at that point
        assert_eq!(image(">a END JMP :a >a END"), [0, 1, 0, 0, 0]);
    }

    #[test]
    fn data_formats_truncate() {
        assert_eq!(image("SI:300"), [44]);
        assert_eq!(image("DI:70000"), [0x70, 0x11]);
        assert_eq!(image("SX:1FF"), [0xFF]);
        assert_eq!(image("DX:12345"), [0x45, 0x23]);
        assert_eq!(image("DX:0x10"), [0x10, 0x00]);
        assert_eq!(image("dx:beef"), [0xEF, 0xBE]);
        assert_eq!(image("SI :7"), [7]);
    }

    #[test]
    fn data_format_needs_value() {
        let err = assemble("SRV RG1 DI 5").unwrap_err();
        assert_eq!(code(&err), "syntax::value_prefix");
        let err = assemble("SRV RG1 DI").unwrap_err();
        assert_eq!(code(&err), "syntax::value_prefix");
        let err = assemble("SRV RG1 DI:").unwrap_err();
        assert_eq!(code(&err), "syntax::missing_value");
        let err = assemble("SRV RG1 DI:12AB").unwrap_err();
        assert_eq!(code(&err), "syntax::bad_lit");
        let err = assemble("SX:XYZ").unwrap_err();
        assert_eq!(code(&err), "syntax::bad_lit");
    }

    #[test]
    fn strings_are_copied_verbatim() {
        assert_eq!(image("\"AB\" END"), [65, 66, 0]);
        assert_eq!(image("\"a#b \\n\""), b"a#b \\n");
        assert_eq!(image("\"\""), Vec::<u8>::new());
    }

    #[test]
    fn unterminated_string() {
        let err = assemble("\"open\nEND").unwrap_err();
        assert_eq!(code(&err), "syntax::unclosed_str");
        let err = assemble("END \"open").unwrap_err();
        assert_eq!(code(&err), "syntax::unclosed_str");
    }

    #[test]
    fn comments_and_whitespace_are_ignored() {
        let src = "# header\r\n  SRV RG1 DI:1 # set\r\n\tEND\n# done";
        assert_eq!(image(src), [9, 0, 1, 0, 0]);
    }

    #[test]
    fn unsupported_keyword() {
        let err = assemble("SRV RG1 DI:1 frobnicate").unwrap_err();
        assert_eq!(code(&err), "lex::keyword");
        assert!(err.to_string().contains("frobnicate"));
        // Numbers are not keywords either
        let err = assemble("5").unwrap_err();
        assert_eq!(code(&err), "lex::keyword");
    }

    #[test]
    fn unsupported_token() {
        let err = assemble("END;").unwrap_err();
        assert_eq!(code(&err), "lex::unknown");
    }

    #[test]
    fn bad_label_definitions() {
        let err = assemble("> END").unwrap_err();
        assert_eq!(code(&err), "syntax::label_name");
        let err = assemble(">rg1 END").unwrap_err();
        assert_eq!(code(&err), "lex::reserved");
        let err = assemble("JMP :").unwrap_err();
        assert_eq!(code(&err), "syntax::missing_value");
    }

    #[test]
    fn label_past_address_space() {
        let src = format!("\"{}\" >far", "x".repeat(0x10001));
        let err = assemble(&src).unwrap_err();
        assert_eq!(code(&err), "asm::too_large");
        // The last addressable byte is fine
        let src = format!("\"{}\" >edge JMP :edge", "x".repeat(0xFFFF));
        let img = image(&src);
        assert_eq!(img[0xFFFF..], [1, 0xFF, 0xFF]);
    }

    #[test]
    fn wrapping_parse() {
        assert_eq!(parse_wrapping("65535", 10), Some(0xFFFF));
        assert_eq!(parse_wrapping("65536", 10), Some(0));
        assert_eq!(parse_wrapping("ffff", 16), Some(0xFFFF));
        assert_eq!(parse_wrapping("0x", 16), None);
        assert_eq!(parse_wrapping("1_0", 10), None);
    }
}

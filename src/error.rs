use miette::{miette, LabeledSpan, Report, Severity};

use crate::symbol::Span;

// Lexer errors

pub fn lex_unknown(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "only words, `>label`, `:value`, \"strings\" and # comments are allowed",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unsupported token",
    )
    .with_source_code(src.to_string())
}

pub fn lex_unsupported_keyword(span: Span, src: &str, word: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::keyword",
        help = "check the list of mnemonics, registers and flags in the documentation.",
        labels = vec![LabeledSpan::at(span, "unsupported keyword")],
        "Unsupported keyword {word}",
    )
    .with_source_code(src.to_string())
}

pub fn lex_reserved_label(span: Span, src: &str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::reserved",
        help = format!("`:{name}` would always refer to the keyword; pick another name"),
        labels = vec![LabeledSpan::at(span, "reserved name")],
        "Cannot define a label named after the keyword {name}",
    )
    .with_source_code(src.to_string())
}

// Syntax errors

pub fn syntax_unclosed_str(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::unclosed_str",
        help = "make sure to close string literals with a \" character on the same line.",
        labels = vec![LabeledSpan::at(span, "unterminated literal")],
        "Encountered an unterminated string literal.",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_value_prefix(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::value_prefix",
        help = "write values as `DI:42` or `DX:2A`",
        labels = vec![LabeledSpan::at(span, "expected `:value` after this")],
        "You need to give ':' before the value",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_missing_value(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::missing_value",
        help = "a `:` must be directly followed by a label name or a value",
        labels = vec![LabeledSpan::at(span, "empty value")],
        "Expected a label name or value after ':'",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_bad_lit(span: Span, src: &str, radix: u32) -> Report {
    let kind = if radix == 16 { "hex" } else { "decimal" };
    miette!(
        severity = Severity::Error,
        code = "syntax::bad_lit",
        help = "`SI`/`DI` take decimal digits, `SX`/`DX` take hex digits",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid {kind} literal",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_label_name(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::label_name",
        help = "label definitions look like `>loop`",
        labels = vec![LabeledSpan::at(span, "missing name")],
        "Expected a label name after '>'",
    )
    .with_source_code(src.to_string())
}

// Assembler errors

pub fn asm_unresolved_label(span: Span, src: &str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unresolved_label",
        help = format!("define the label somewhere in the file with `>{name}`"),
        labels = vec![LabeledSpan::at(span, "unresolved reference")],
        "There isn't memory location specified for \"{name}\"",
    )
    .with_source_code(src.to_string())
}

pub fn asm_too_large(span: Span, src: &str, addr: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::too_large",
        help = "labels can only address the first 65,536 bytes of the image",
        labels = vec![LabeledSpan::at(span, "label out of range")],
        "Label address {addr} does not fit in 16 bits",
    )
    .with_source_code(src.to_string())
}

// Warnings

pub fn warn_redefined_label(span: Span, src: &str, name: &str, old: u16, new: u16) -> Report {
    miette!(
        severity = Severity::Warning,
        code = "asm::redefined_label",
        help = "references after this point and unresolved earlier ones use the new address",
        labels = vec![LabeledSpan::at(span, "redefined here")],
        "Label {name} moved from {old} to {new}",
    )
    .with_source_code(src.to_string())
}

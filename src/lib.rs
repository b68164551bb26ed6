// Assembling
mod lexer;
pub use lexer::{tokenize, Token, TokenKind};
mod opcode;
pub use opcode::{DataFormat, Keyword, Opcode, Operand};
mod assembler;
pub use assembler::{assemble, Assembler, Assembly};
mod error;

// Running
mod runtime;
pub use runtime::{RunError, RunState, Status};
pub mod output;
pub use output::PutFormat;

// Inspecting
mod disasm;
pub use disasm::{decode_at, disassemble, Line};

mod symbol;
pub use symbol::{Flag, LabelTable, Register, Span};

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;

/// File extension of assembled images.
pub const IMAGE_EXT: &str = "vbc";

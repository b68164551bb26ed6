use std::ops::Range;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

// Symbol table of LABEL -> memory address
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Represents the CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(u8)]
pub enum Register {
    R1 = 0,
    R2,
    R3,
    R4,
}

impl Register {
    pub const ALL: [Register; 4] = [Register::R1, Register::R2, Register::R3, Register::R4];
    pub const COUNT: usize = Self::ALL.len();

    pub fn spellings(self) -> &'static [&'static str] {
        match self {
            Register::R1 => &["RG1", "REGISTER1"],
            Register::R2 => &["RG2", "REGISTER2"],
            Register::R3 => &["RG3", "REGISTER3"],
            Register::R4 => &["RG4", "REGISTER4"],
        }
    }

    pub fn name(self) -> &'static str {
        self.spellings()[0]
    }
}

impl TryFrom<u8> for Register {
    type Error = ();

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Register::ALL.get(id as usize).copied().ok_or(())
    }
}

/// Condition bits. The first three describe the last value written to a register,
/// the rest hold the outcome of the last comparison.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Flag {
    Zero = 0,
    Positive,
    Negative,
    Equal,
    LessThan,
    MoreThan,
    LessOrEqual,
    MoreOrEqual,
}

impl Flag {
    pub const ALL: [Flag; 8] = [
        Flag::Zero,
        Flag::Positive,
        Flag::Negative,
        Flag::Equal,
        Flag::LessThan,
        Flag::MoreThan,
        Flag::LessOrEqual,
        Flag::MoreOrEqual,
    ];
    pub const COUNT: usize = Self::ALL.len();

    pub fn spellings(self) -> &'static [&'static str] {
        match self {
            Flag::Zero => &["ZRO", "ZERO"],
            Flag::Positive => &["POS", "POSITIVE"],
            Flag::Negative => &["NEG", "NEGATIVE"],
            Flag::Equal => &["EQL", "EQUAL"],
            Flag::LessThan => &["LTH", "LESS_THAN"],
            Flag::MoreThan => &["MTH", "MORE_THAN"],
            Flag::LessOrEqual => &["LQT", "LESS_OR_EQUAL", "LESS_OR_EQUAL_TO"],
            Flag::MoreOrEqual => &["MQT", "MORE_OR_EQUAL", "MORE_OR_EQUAL_TO"],
        }
    }

    pub fn name(self) -> &'static str {
        self.spellings()[0]
    }
}

impl TryFrom<u8> for Flag {
    type Error = ();

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Flag::ALL.get(id as usize).copied().ok_or(())
    }
}

/// Label definitions, in the order they were first defined.
#[derive(Debug, Default)]
pub struct LabelTable {
    table: FxMap<String, u16>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine a label. Returns the previous address if one was set.
    pub fn define(&mut self, name: &str, addr: u16) -> Option<u16> {
        self.table.insert(name.to_string(), addr)
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.table.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.table.iter().map(|(name, addr)| (name.as_str(), *addr))
    }
}

/// Use of a label before its definition, waiting to be patched.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PendingRef {
    pub name: String,
    /// Offset of the two placeholder bytes inside the image
    pub site: usize,
    pub span: Span,
}

use std::fmt;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use lazy_static::lazy_static;

use crate::symbol::{Flag, Register};

/// Every instruction understood by the VM, numbered by its encoding.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    End = 0,
    Jump,
    PositiveBranch,
    NegativeBranch,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    SetRegVal,
    SetRegReg,
    SetRegMem,
    SetMemReg,
    IsEqual,
    IsLessThan,
    IsMoreThan,
    IsLessOrEqual,
    IsMoreOrEqual,
    Put,
}

/// Kind of a single operand following an opcode byte.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand {
    Reg,
    Flag,
    /// `PUT` output format, one byte
    Format,
    Imm16,
    Addr,
}

impl Operand {
    /// Encoded size in bytes.
    pub fn size(self) -> usize {
        match self {
            Operand::Reg | Operand::Flag | Operand::Format => 1,
            Operand::Imm16 | Operand::Addr => 2,
        }
    }
}

impl Opcode {
    /// Ordered so that `ALL[op as usize] == op`.
    pub const ALL: [Opcode; 19] = [
        Opcode::End,
        Opcode::Jump,
        Opcode::PositiveBranch,
        Opcode::NegativeBranch,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Rem,
        Opcode::SetRegVal,
        Opcode::SetRegReg,
        Opcode::SetRegMem,
        Opcode::SetMemReg,
        Opcode::IsEqual,
        Opcode::IsLessThan,
        Opcode::IsMoreThan,
        Opcode::IsLessOrEqual,
        Opcode::IsMoreOrEqual,
        Opcode::Put,
    ];

    /// Canonical short mnemonic.
    pub fn mnemonic(self) -> &'static str {
        self.spellings()[0]
    }

    /// Accepted spellings, short form first.
    fn spellings(self) -> &'static [&'static str] {
        match self {
            Opcode::End => &["END"],
            Opcode::Jump => &["JMP", "JUMP"],
            Opcode::PositiveBranch => &["PBR", "POSITIVE_BRANCH"],
            Opcode::NegativeBranch => &["NBR", "NEGATIVE_BRANCH"],
            Opcode::Add => &["ADD", "ADDITION"],
            Opcode::Sub => &["SUB", "SUBTRACT", "SUBTRACTION"],
            Opcode::Mul => &["MUL", "MULTIPLY", "MULTIPLICATION"],
            Opcode::Div => &["DIV", "DIVIDE", "DIVISION"],
            Opcode::Rem => &["REM", "REMAINDER", "REMINDER"],
            Opcode::SetRegVal => &["SRV", "SET_REG_VAL", "SET_REGISTER_VALUE"],
            Opcode::SetRegReg => &["SRR", "SET_REG_REG", "SET_REGISTER_REGISTER"],
            Opcode::SetRegMem => &["SRM", "SET_REG_MEM", "SET_REGISTER_MEMORY"],
            Opcode::SetMemReg => &["SMR", "SET_MEM_REG", "SET_MEMORY_REGISTER"],
            Opcode::IsEqual => &["IEQ", "IS_EQUAL"],
            Opcode::IsLessThan => &["ILT", "IS_LESS_THAN"],
            Opcode::IsMoreThan => &["IMT", "IS_MORE_THAN"],
            Opcode::IsLessOrEqual => &["ILQ", "IS_LESS_OR_EQUAL", "IS_LESS_OR_EQUAL_TO"],
            Opcode::IsMoreOrEqual => &["IMQ", "IS_MORE_OR_EQUAL", "IS_MORE_OR_EQUAL_TO"],
            Opcode::Put => &["OUT", "PUT", "OUTPUT"],
        }
    }

    /// Operand shape, in encoding order.
    pub fn operands(self) -> &'static [Operand] {
        use Operand as O;
        match self {
            Opcode::End => &[],
            Opcode::Jump => &[O::Addr],
            Opcode::PositiveBranch | Opcode::NegativeBranch => &[O::Flag, O::Addr],
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::SetRegReg
            | Opcode::IsEqual
            | Opcode::IsLessThan
            | Opcode::IsMoreThan
            | Opcode::IsLessOrEqual
            | Opcode::IsMoreOrEqual => &[O::Reg, O::Reg],
            Opcode::SetRegVal => &[O::Reg, O::Imm16],
            Opcode::SetRegMem => &[O::Reg, O::Addr],
            Opcode::SetMemReg => &[O::Addr, O::Reg],
            Opcode::Put => &[O::Reg, O::Format],
        }
    }

    /// Total encoded length including the opcode byte.
    pub fn encoded_len(self) -> usize {
        1 + self.operands().iter().map(|op| op.size()).sum::<usize>()
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL.get(byte as usize).copied().ok_or(())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Inline literal formats, written as `SI:12` or `DX:FF00`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataFormat {
    SingleHex,
    DoubleHex,
    SingleInt,
    DoubleInt,
}

impl DataFormat {
    const ALL: [DataFormat; 4] = [
        DataFormat::SingleHex,
        DataFormat::DoubleHex,
        DataFormat::SingleInt,
        DataFormat::DoubleInt,
    ];

    fn spellings(self) -> &'static [&'static str] {
        match self {
            DataFormat::SingleHex => &["SX", "SINGLE_HEX"],
            DataFormat::DoubleHex => &["DX", "DOUBLE_HEX"],
            DataFormat::SingleInt => &["SI", "SINGLE_INT"],
            DataFormat::DoubleInt => &["DI", "DOUBLE_INT"],
        }
    }

    pub fn radix(self) -> u32 {
        match self {
            DataFormat::SingleHex | DataFormat::DoubleHex => 16,
            DataFormat::SingleInt | DataFormat::DoubleInt => 10,
        }
    }

    /// Amount of bytes emitted for the literal.
    pub fn width(self) -> usize {
        match self {
            DataFormat::SingleHex | DataFormat::SingleInt => 1,
            DataFormat::DoubleHex | DataFormat::DoubleInt => 2,
        }
    }
}

/// Anything a bare word can resolve to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Keyword {
    Op(Opcode),
    Reg(Register),
    Flag(Flag),
    Data(DataFormat),
}

impl Keyword {
    /// Byte written to the image for this keyword. Data formats emit their literal instead.
    pub fn byte(self) -> Option<u8> {
        match self {
            Keyword::Op(op) => Some(op as u8),
            Keyword::Reg(reg) => Some(reg as u8),
            Keyword::Flag(flag) => Some(flag as u8),
            Keyword::Data(_) => None,
        }
    }

    /// Case-insensitive lookup over every accepted spelling.
    pub fn lookup(word: &str) -> Option<Keyword> {
        KEYWORDS.get(word.to_ascii_uppercase().as_str()).copied()
    }
}

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

lazy_static! {
    static ref KEYWORDS: FxMap<&'static str, Keyword> = {
        let mut map = FxMap::default();
        for op in Opcode::ALL {
            for name in op.spellings() {
                map.insert(*name, Keyword::Op(op));
            }
        }
        for reg in Register::ALL {
            for name in reg.spellings() {
                map.insert(*name, Keyword::Reg(reg));
            }
        }
        for flag in Flag::ALL {
            for name in flag.spellings() {
                map.insert(*name, Keyword::Flag(flag));
            }
        }
        for fmt in DataFormat::ALL {
            for name in fmt.spellings() {
                map.insert(*name, Keyword::Data(fmt));
            }
        }
        map
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_matches_encoding() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(Opcode::try_from(i as u8), Ok(*op));
        }
        assert!(Opcode::try_from(19).is_err());
        assert!(Opcode::try_from(0xFF).is_err());
    }

    #[test]
    fn short_and_long_forms_agree() {
        assert_eq!(Keyword::lookup("srv"), Some(Keyword::Op(Opcode::SetRegVal)));
        assert_eq!(
            Keyword::lookup("Set_Register_Value"),
            Some(Keyword::Op(Opcode::SetRegVal))
        );
        assert_eq!(Keyword::lookup("out"), Keyword::lookup("PUT"));
        assert_eq!(Keyword::lookup("register3"), Some(Keyword::Reg(Register::R3)));
        assert_eq!(Keyword::lookup("MQT"), Some(Keyword::Flag(Flag::MoreOrEqual)));
        assert_eq!(
            Keyword::lookup("double_int"),
            Some(Keyword::Data(DataFormat::DoubleInt))
        );
        assert_eq!(Keyword::lookup("nope"), None);
    }

    #[test]
    fn spellings_do_not_collide() {
        let total = Opcode::ALL.iter().map(|op| op.spellings().len()).sum::<usize>()
            + Register::ALL.iter().map(|r| r.spellings().len()).sum::<usize>()
            + Flag::ALL.iter().map(|f| f.spellings().len()).sum::<usize>()
            + DataFormat::ALL.iter().map(|d| d.spellings().len()).sum::<usize>();
        assert_eq!(KEYWORDS.len(), total);
    }

    #[test]
    fn encoded_lengths() {
        assert_eq!(Opcode::End.encoded_len(), 1);
        assert_eq!(Opcode::Jump.encoded_len(), 3);
        assert_eq!(Opcode::PositiveBranch.encoded_len(), 4);
        assert_eq!(Opcode::Add.encoded_len(), 3);
        assert_eq!(Opcode::SetRegVal.encoded_len(), 4);
        assert_eq!(Opcode::SetMemReg.encoded_len(), 4);
        assert_eq!(Opcode::Put.encoded_len(), 3);
    }
}

use std::fmt;

use crate::opcode::{Opcode, Operand};
use crate::symbol::{Flag, Register};

/// One decoded instruction, or a single byte that could not be decoded.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Line {
    pub addr: usize,
    pub bytes: Vec<u8>,
    /// Mnemonic text which assembles back into `bytes`
    pub text: String,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: Vec<String> = self.bytes.iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "{:04x}  {:<12} {}", self.addr, bytes.join(" "), self.text)
    }
}

/// Decode the whole image front to back.
pub fn disassemble(image: &[u8]) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut addr = 0;
    while addr < image.len() {
        let line = decode_at(image, addr);
        addr += line.bytes.len();
        lines.push(line);
    }
    lines
}

/// Decode the instruction starting at `addr`.
///
/// Unknown opcodes and instructions cut off by the end of the image come out as a single
/// `SX` data byte, so decoding can resume at the next address.
pub fn decode_at(image: &[u8], addr: usize) -> Line {
    let Some(&byte) = image.get(addr) else {
        return Line {
            addr,
            bytes: Vec::new(),
            text: String::from("<end of memory>"),
        };
    };
    let raw_byte = || Line {
        addr,
        bytes: vec![byte],
        text: format!("SX:{:02X}", byte),
    };

    let Ok(op) = Opcode::try_from(byte) else {
        return raw_byte();
    };
    let end = addr + op.encoded_len();
    if end > image.len() {
        return raw_byte();
    }

    let mut text = String::from(op.mnemonic());
    let mut pos = addr + 1;
    for operand in op.operands() {
        text.push(' ');
        text.push_str(&operand_text(*operand, &image[pos..]));
        pos += operand.size();
    }
    Line {
        addr,
        bytes: image[addr..end].to_vec(),
        text,
    }
}

fn operand_text(operand: Operand, bytes: &[u8]) -> String {
    let byte = bytes[0];
    match operand {
        Operand::Reg => match Register::try_from(byte) {
            Ok(reg) => reg.name().to_string(),
            Err(()) => format!("SI:{}", byte),
        },
        Operand::Flag => match Flag::try_from(byte) {
            Ok(flag) => flag.name().to_string(),
            Err(()) => format!("SI:{}", byte),
        },
        Operand::Format => format!("SI:{}", byte),
        Operand::Imm16 => format!("DI:{}", u16::from_le_bytes([bytes[0], bytes[1]])),
        Operand::Addr => format!("DX:{:04X}", u16::from_le_bytes([bytes[0], bytes[1]])),
    }
}

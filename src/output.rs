use std::cell::RefCell;
use std::io::{self, Write};

use colored::Colorize;

use crate::runtime::RunState;
use crate::symbol::{Flag, Register};

/// Formats accepted by the `PUT` instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PutFormat {
    /// All 16 bits, most significant first
    Binary = 0,
    /// Lowercase, no prefix
    Hex = 1,
    /// Signed 16-bit decimal
    Decimal = 2,
    /// Low byte written raw
    Ascii = 3,
}

impl TryFrom<u8> for PutFormat {
    type Error = ();

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(PutFormat::Binary),
            1 => Ok(PutFormat::Hex),
            2 => Ok(PutFormat::Decimal),
            3 => Ok(PutFormat::Ascii),
            _ => Err(()),
        }
    }
}

impl PutFormat {
    pub fn write(self, out: &mut dyn Write, value: u16) -> io::Result<()> {
        match self {
            PutFormat::Binary => write!(out, "{:016b}", value),
            PutFormat::Hex => write!(out, "{:x}", value),
            PutFormat::Decimal => write!(out, "{}", value as i16),
            PutFormat::Ascii => out.write_all(&[value as u8]),
        }
    }
}

thread_local! {
    static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
}

/// Produce plain, uncolored reports suited for blackbox tests. May be called multiple times.
pub fn set_minimal(new_value: bool) -> bool {
    IS_MINIMAL.with(|value| value.replace(new_value))
}

pub fn is_minimal() -> bool {
    IS_MINIMAL.with(|value| *value.borrow())
}

/// Report registers and flags after a run.
pub fn print_state(out: &mut impl Write, state: &RunState) -> io::Result<()> {
    if is_minimal() {
        return print_state_minimal(out, state);
    }

    writeln!(out, "\x1b[2m┌────────────────────────────────────┐\x1b[0m")?;
    writeln!(
        out,
        "\x1b[2m│        \x1b[3mhex     int    uint    char\x1b[0m\x1b[2m │\x1b[0m"
    )?;
    for reg in Register::ALL {
        let value = state.reg(reg);
        write!(out, "\x1b[2m│\x1b[0m \x1b[1m{}\x1b[0m ", reg.name())?;
        write!(out, "0x{:04x}  {:-6}  {:-6}", value, value as i16, value)?;
        writeln!(out, "   {} \x1b[2m│\x1b[0m", char_display(value))?;
    }
    writeln!(out, "\x1b[2m│\x1b[0m \x1b[1mPC\x1b[0m  0x{:04x}{:>24}\x1b[2m│\x1b[0m", state.pc(), "")?;
    writeln!(out, "\x1b[2m└────────────────────────────────────┘\x1b[0m")?;

    let flags: Vec<String> = Flag::ALL
        .iter()
        .map(|flag| {
            if state.flag(*flag) {
                flag.name().green().bold().to_string()
            } else {
                flag.name().dimmed().to_string()
            }
        })
        .collect();
    writeln!(out, " Flags  {}", flags.join(" "))
}

fn print_state_minimal(out: &mut impl Write, state: &RunState) -> io::Result<()> {
    let regs: Vec<String> = Register::ALL
        .iter()
        .map(|reg| state.reg(*reg).to_string())
        .collect();
    let flags: Vec<String> = Flag::ALL
        .iter()
        .map(|flag| format!("{} {}", flag.name(), state.flag(*flag) as u8))
        .collect();
    writeln!(
        out,
        "Registers [{}] Flags [{}]",
        regs.join(","),
        flags.join(",")
    )
}

/// Three columns wide.
fn char_display(value: u16) -> String {
    match value {
        // ASCII control characters which are arbitrarily considered significant
        0x00 => "NUL".to_string(),
        0x09 => "HT ".to_string(),
        0x0a => "LF ".to_string(),
        0x0d => "CR ".to_string(),
        0x1b => "ESC".to_string(),
        0x7f => "DEL".to_string(),
        0x20 => "[_]".to_string(),
        0x21..=0x7e => format!("{:<3}", value as u8 as char),
        // Any ASCII character not already matched (unimportant control characters)
        0x00..=0x7f => "\x1b[2m───\x1b[0m".to_string(),
        0x0080.. => "\x1b[2m┄┄┄\x1b[0m".to_string(),
    }
}

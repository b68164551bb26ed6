use std::fmt;
use std::io::{self, Write};

use colored::Colorize;

use crate::disasm;
use crate::opcode::Opcode;
use crate::output::PutFormat;
use crate::symbol::{Flag, Register};

/// Whether the machine can keep executing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Running,
    /// Reached only through `END`
    Halted,
}

/// Fatal fault raised while executing an image. There is no way to resume after one.
#[derive(Debug)]
pub enum RunError {
    NonExistingRegister { id: u8, addr: usize },
    NonExistingFlag { id: u8, addr: usize },
    /// Fetch or explicit access at or past the end of memory
    EndOfMemory { addr: usize, len: usize },
    UnsupportedOperation { opcode: u8, addr: usize },
    DivisionByZero { addr: usize },
    /// `PUT` could not write its output
    Output(io::Error),
}

impl std::error::Error for RunError {}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonExistingRegister { id, addr } => {
                write!(f, "Non existing register {} (instruction at 0x{:04x})", id, addr)
            }
            Self::NonExistingFlag { id, addr } => {
                write!(f, "Non existing flag {} (instruction at 0x{:04x})", id, addr)
            }
            Self::EndOfMemory { addr, len } => {
                write!(f, "End of memory: address 0x{:04x} with {} bytes loaded", addr, len)
            }
            Self::UnsupportedOperation { opcode, addr } => {
                write!(f, "Unsupported operation {} at 0x{:04x}", opcode, addr)
            }
            Self::DivisionByZero { addr } => {
                write!(f, "Division by zero (instruction at 0x{:04x})", addr)
            }
            Self::Output(e) => write!(f, "Failed to write output: {}", e),
        }
    }
}

type Op = fn(&mut RunState, &mut dyn Write) -> Result<(), RunError>;

/// Represents complete program state during runtime.
pub struct RunState {
    /// Sized to the loaded image
    mem: Vec<u8>,
    /// Program counter
    pc: usize,
    /// Address of the instruction being executed, for error reports
    instr_addr: usize,
    /// 4x 16-bit registers
    reg: [u16; Register::COUNT],
    flags: [bool; Flag::COUNT],
    status: Status,
    /// Print every instruction to stderr before executing it
    trace: bool,
}

impl RunState {
    pub fn new(image: Vec<u8>) -> RunState {
        RunState {
            mem: image,
            pc: 0,
            instr_addr: 0,
            reg: [0; Register::COUNT],
            flags: [false; Flag::COUNT],
            status: Status::Running,
            trace: false,
        }
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn reg(&self, reg: Register) -> u16 {
        self.reg[reg as usize]
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.flags[flag as usize]
    }

    pub fn flags(&self) -> &[bool; Flag::COUNT] {
        &self.flags
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn memory(&self) -> &[u8] {
        &self.mem
    }

    const OP_TABLE: [Op; Opcode::ALL.len()] = [
        Self::end,               // 0x00
        Self::jump,              // 0x01
        Self::positive_branch,   // 0x02
        Self::negative_branch,   // 0x03
        Self::add,               // 0x04
        Self::sub,               // 0x05
        Self::mul,               // 0x06
        Self::div,               // 0x07
        Self::rem,               // 0x08
        Self::set_reg_val,       // 0x09
        Self::set_reg_reg,       // 0x0A
        Self::set_reg_mem,       // 0x0B
        Self::set_mem_reg,       // 0x0C
        Self::is_equal,          // 0x0D
        Self::is_less_than,      // 0x0E
        Self::is_more_than,      // 0x0F
        Self::is_less_or_equal,  // 0x10
        Self::is_more_or_equal,  // 0x11
        Self::put,               // 0x12
    ];

    /// Run until `END` or a fatal error, writing `PUT` output to `out`.
    pub fn run(&mut self, out: &mut dyn Write) -> Result<(), RunError> {
        while self.step(out)? == Status::Running {}
        Ok(())
    }

    /// Run with `PUT` output going to stdout.
    pub fn run_stdout(&mut self) -> Result<(), RunError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        let res = self.run(&mut lock);
        lock.flush().map_err(RunError::Output)?;
        res
    }

    /// Fetch, decode and execute one instruction. Does nothing once halted.
    pub fn step(&mut self, out: &mut dyn Write) -> Result<Status, RunError> {
        if self.status == Status::Halted {
            return Ok(Status::Halted);
        }
        self.instr_addr = self.pc;
        let opcode = self.fetch_u8()?;
        let Ok(op) = Opcode::try_from(opcode) else {
            return Err(RunError::UnsupportedOperation {
                opcode,
                addr: self.instr_addr,
            });
        };
        if self.trace {
            self.trace_instr();
        }
        Self::OP_TABLE[op as usize](self, out)?;
        Ok(self.status)
    }

    fn trace_instr(&self) {
        let line = disasm::decode_at(&self.mem, self.instr_addr);
        let regs: Vec<String> = self.reg.iter().map(|r| r.to_string()).collect();
        eprintln!(
            "{:>12} {:04x}  {:<20} [{}]",
            "Executing".cyan(),
            line.addr,
            line.text,
            regs.join(",")
        );
    }

    fn fetch_u8(&mut self) -> Result<u8, RunError> {
        let byte = self.read_mem(self.pc)?;
        self.pc += 1;
        Ok(byte)
    }

    /// Little-endian
    fn fetch_u16(&mut self) -> Result<u16, RunError> {
        let low = self.fetch_u8()?;
        let high = self.fetch_u8()?;
        Ok(u16::from_le_bytes([low, high]))
    }

    fn read_mem(&self, addr: usize) -> Result<u8, RunError> {
        self.mem.get(addr).copied().ok_or(RunError::EndOfMemory {
            addr,
            len: self.mem.len(),
        })
    }

    fn write_mem(&mut self, addr: usize, val: u8) -> Result<(), RunError> {
        let len = self.mem.len();
        let cell = self
            .mem
            .get_mut(addr)
            .ok_or(RunError::EndOfMemory { addr, len })?;
        *cell = val;
        Ok(())
    }

    fn check_reg(&self, id: u8) -> Result<usize, RunError> {
        match Register::try_from(id) {
            Ok(reg) => Ok(reg as usize),
            Err(()) => Err(RunError::NonExistingRegister {
                id,
                addr: self.instr_addr,
            }),
        }
    }

    fn check_flag(&self, id: u8) -> Result<usize, RunError> {
        match Flag::try_from(id) {
            Ok(flag) => Ok(flag as usize),
            Err(()) => Err(RunError::NonExistingFlag {
                id,
                addr: self.instr_addr,
            }),
        }
    }

    /// Both ids are fetched before either is validated.
    fn fetch_reg_pair(&mut self) -> Result<(usize, usize), RunError> {
        let id1 = self.fetch_u8()?;
        let id2 = self.fetch_u8()?;
        Ok((self.check_reg(id1)?, self.check_reg(id2)?))
    }

    fn reset_flags(&mut self) {
        self.flags = [false; Flag::COUNT];
    }

    /// Derive the value flags from a freshly written register.
    #[inline]
    fn set_flags(&mut self, val: u16) {
        self.reset_flags();
        // Positive is tested first, so a set sign bit still reads as positive
        let flag = if val > 0 {
            Flag::Positive
        } else if val == 0 {
            Flag::Zero
        } else {
            Flag::Negative
        };
        self.flags[flag as usize] = true;
    }

    fn end(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.status = Status::Halted;
        Ok(())
    }

    fn jump(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.pc = self.fetch_u16()? as usize;
        Ok(())
    }

    fn branch(&mut self, when_set: bool) -> Result<(), RunError> {
        let id = self.fetch_u8()?;
        let addr = self.fetch_u16()?;
        let flag = self.check_flag(id)?;
        if self.flags[flag] == when_set {
            self.pc = addr as usize;
        }
        Ok(())
    }

    fn positive_branch(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.branch(true)
    }

    fn negative_branch(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.branch(false)
    }

    /// `reg1 := reg1 op reg2`. `None` from `op` means division by zero.
    fn arith(&mut self, op: fn(u16, u16) -> Option<u16>) -> Result<(), RunError> {
        let (r1, r2) = self.fetch_reg_pair()?;
        let val = op(self.reg[r1], self.reg[r2]).ok_or(RunError::DivisionByZero {
            addr: self.instr_addr,
        })?;
        self.reg[r1] = val;
        self.set_flags(val);
        Ok(())
    }

    fn add(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.arith(|a, b| Some(a.wrapping_add(b)))
    }

    fn sub(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.arith(|a, b| Some(a.wrapping_sub(b)))
    }

    fn mul(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.arith(|a, b| Some(a.wrapping_mul(b)))
    }

    fn div(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.arith(u16::checked_div)
    }

    fn rem(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.arith(u16::checked_rem)
    }

    fn set_reg_val(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        let id = self.fetch_u8()?;
        let val = self.fetch_u16()?;
        let reg = self.check_reg(id)?;
        self.reg[reg] = val;
        self.set_flags(val);
        Ok(())
    }

    fn set_reg_reg(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        let (r1, r2) = self.fetch_reg_pair()?;
        self.reg[r1] = self.reg[r2];
        self.set_flags(self.reg[r1]);
        Ok(())
    }

    fn set_reg_mem(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        let id = self.fetch_u8()?;
        let addr = self.fetch_u16()?;
        let reg = self.check_reg(id)?;
        let val = self.read_mem(addr as usize)? as u16;
        self.reg[reg] = val;
        self.set_flags(val);
        Ok(())
    }

    fn set_mem_reg(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        let addr = self.fetch_u16()?;
        let id = self.fetch_u8()?;
        let reg = self.check_reg(id)?;
        let val = self.reg[reg];
        self.write_mem(addr as usize, val as u8)?;
        self.set_flags(val);
        Ok(())
    }

    /// Clear every flag, then set `flag` if the test holds.
    fn compare(&mut self, flag: Flag, test: fn(&u16, &u16) -> bool) -> Result<(), RunError> {
        let (r1, r2) = self.fetch_reg_pair()?;
        self.reset_flags();
        if test(&self.reg[r1], &self.reg[r2]) {
            self.flags[flag as usize] = true;
        }
        Ok(())
    }

    fn is_equal(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.compare(Flag::Equal, u16::eq)
    }

    fn is_less_than(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.compare(Flag::LessThan, u16::lt)
    }

    fn is_more_than(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.compare(Flag::MoreThan, u16::gt)
    }

    fn is_less_or_equal(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.compare(Flag::LessOrEqual, u16::le)
    }

    fn is_more_or_equal(&mut self, _out: &mut dyn Write) -> Result<(), RunError> {
        self.compare(Flag::MoreOrEqual, u16::ge)
    }

    fn put(&mut self, out: &mut dyn Write) -> Result<(), RunError> {
        let id = self.fetch_u8()?;
        let format = self.fetch_u8()?;
        let reg = self.check_reg(id)?;
        // Unknown formats print nothing
        if let Ok(format) = PutFormat::try_from(format) {
            format.write(out, self.reg[reg]).map_err(RunError::Output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    fn load(src: &str) -> RunState {
        RunState::new(assemble(src).unwrap().into_image())
    }

    fn run(src: &str) -> (RunState, String) {
        let mut state = load(src);
        let mut out = Vec::new();
        state.run(&mut out).unwrap();
        (state, String::from_utf8(out).unwrap())
    }

    fn run_err(image: Vec<u8>) -> RunError {
        RunState::new(image).run(&mut io::sink()).unwrap_err()
    }

    fn set_flags(state: &RunState) -> Vec<Flag> {
        Flag::ALL
            .into_iter()
            .filter(|flag| state.flag(*flag))
            .collect()
    }

    #[test]
    fn adds_two_registers() {
        let (state, _) = run("SRV :RG1 :DI :5  SRV :RG2 :DI :3  ADD :RG1 :RG2  END");
        assert_eq!(state.reg(Register::R1), 8);
        assert_eq!(state.reg(Register::R2), 3);
        assert_eq!(set_flags(&state), [Flag::Positive]);
        assert_eq!(state.status(), Status::Halted);
    }

    #[test]
    fn end_stops_fetching() {
        // The byte after END is not a valid opcode
        let mut state = RunState::new(vec![0, 0xFF]);
        state.run(&mut io::sink()).unwrap();
        assert_eq!(state.pc(), 1);
        assert_eq!(state.step(&mut io::sink()).unwrap(), Status::Halted);
        assert_eq!(state.pc(), 1);
    }

    #[test]
    fn arithmetic_wraps() {
        let (state, _) = run(
            "SRV RG1 DI:0 SRV RG2 DI:1 SUB RG1 RG2
             SRV RG3 DI:300 MUL RG3 RG3
             SRV RG4 DI:65535 ADD RG4 RG2
             END",
        );
        assert_eq!(state.reg(Register::R1), 0xFFFF);
        assert_eq!(state.reg(Register::R3), 24464);
        assert_eq!(state.reg(Register::R4), 0);
        assert_eq!(set_flags(&state), [Flag::Zero]);
    }

    #[test]
    fn sign_bit_reads_positive() {
        let (state, _) = run("SRV RG1 DX:8000 END");
        assert_eq!(set_flags(&state), [Flag::Positive]);
    }

    #[test]
    fn division_and_remainder() {
        let (state, _) = run("SRV RG1 DI:17 SRV RG2 DI:5 SRR RG3 RG1 DIV RG1 RG2 REM RG3 RG2 END");
        assert_eq!(state.reg(Register::R1), 3);
        assert_eq!(state.reg(Register::R3), 2);

        let err = run_err(assemble("SRV RG1 DI:4 DIV RG1 RG2 END").unwrap().into_image());
        assert!(matches!(err, RunError::DivisionByZero { addr: 4 }));
        let err = run_err(assemble("REM RG1 RG2 END").unwrap().into_image());
        assert!(matches!(err, RunError::DivisionByZero { addr: 0 }));
    }

    #[test]
    fn moves_derive_value_flags() {
        let (state, _) = run("SRV RG1 DI:3 SRV RG2 DI:5 ILT RG1 RG2 SRR RG1 RG3 END");
        assert_eq!(state.reg(Register::R1), 0);
        assert_eq!(set_flags(&state), [Flag::Zero]);
    }

    #[test]
    fn comparisons_set_one_flag() {
        let cases = [
            ("IEQ", 3, 3, Some(Flag::Equal)),
            ("IEQ", 3, 4, None),
            ("ILT", 3, 4, Some(Flag::LessThan)),
            ("ILT", 4, 4, None),
            ("IMT", 5, 4, Some(Flag::MoreThan)),
            ("ILQ", 4, 4, Some(Flag::LessOrEqual)),
            ("IMQ", 4, 4, Some(Flag::MoreOrEqual)),
            ("IMQ", 3, 4, None),
        ];
        for (op, a, b, expected) in cases {
            let (state, _) = run(&format!("SRV RG1 DI:{a} SRV RG2 DI:{b} {op} RG1 RG2 END"));
            let expected: Vec<Flag> = expected.into_iter().collect();
            assert_eq!(set_flags(&state), expected, "{op} {a} {b}");
        }
    }

    #[test]
    fn loops_with_branches() {
        let (state, _) = run(
            "SRV RG1 DI:0
             SRV RG2 DI:1
             SRV RG3 DI:5
             >loop
             ADD RG1 RG2
             IEQ RG1 RG3
             NBR EQL :loop
             END",
        );
        assert_eq!(state.reg(Register::R1), 5);
        assert_eq!(set_flags(&state), [Flag::Equal]);

        let (state, _) = run(
            "SRV RG1 DI:0
             PBR ZRO :skip
             SRV RG1 DI:9
             >skip
             END",
        );
        assert_eq!(state.reg(Register::R1), 0);
    }

    #[test]
    fn memory_access() {
        let (state, out) =
            run("SRM RG1 :data PUT RG1 SI:3 SMR :data RG2 SRM RG3 :data END >data SI:65");
        assert_eq!(out, "A");
        assert_eq!(state.reg(Register::R1), 65);
        assert_eq!(state.reg(Register::R3), 0);
        assert_eq!(*state.memory().last().unwrap(), 0);
    }

    #[test]
    fn store_keeps_low_byte() {
        let (state, _) = run("SRV RG1 DX:1234 SMR :d RG1 END >d SI:0");
        assert_eq!(*state.memory().last().unwrap(), 0x34);
        assert_eq!(state.reg(Register::R1), 0x1234);
        assert_eq!(set_flags(&state), [Flag::Positive]);
    }

    #[test]
    fn memory_bounds() {
        // Image is 5 bytes long
        let err = run_err(assemble("SRM RG1 DX:5 END").unwrap().into_image());
        assert!(matches!(err, RunError::EndOfMemory { addr: 5, len: 5 }));
        let err = run_err(assemble("SMR DX:FFFF RG1 END").unwrap().into_image());
        assert!(matches!(err, RunError::EndOfMemory { addr: 0xFFFF, .. }));
        // Running off the end
        let err = run_err(vec![9, 0, 1, 0]);
        assert!(matches!(err, RunError::EndOfMemory { addr: 4, .. }));
        let err = run_err(vec![]);
        assert!(matches!(err, RunError::EndOfMemory { addr: 0, len: 0 }));
        let err = run_err(assemble("JMP DX:100").unwrap().into_image());
        assert!(matches!(err, RunError::EndOfMemory { addr: 100, .. }));
    }

    #[test]
    fn invalid_ids() {
        let err = run_err(vec![4, 0, 4, 0]);
        assert!(matches!(err, RunError::NonExistingRegister { id: 4, addr: 0 }));
        let err = run_err(vec![0x12, 7, 0, 0]);
        assert!(matches!(err, RunError::NonExistingRegister { id: 7, .. }));
        let err = run_err(vec![2, 8, 0, 0, 0]);
        assert!(matches!(err, RunError::NonExistingFlag { id: 8, addr: 0 }));
        let err = run_err(vec![19]);
        assert!(matches!(err, RunError::UnsupportedOperation { opcode: 19, addr: 0 }));
    }

    #[test]
    fn put_formats() {
        let (_, out) = run(
            "SRV RG1 DI:65 PUT RG1 SI:3 PUT RG1 SI:2 PUT RG1 SI:1 PUT RG1 SI:0 PUT RG1 SI:9 END",
        );
        assert_eq!(out, "A65410000000001000001");
        let (_, out) = run("SRV RG1 DX:FFFF PUT RG1 SI:2 END");
        assert_eq!(out, "-1");
    }
}

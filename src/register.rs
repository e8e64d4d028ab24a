//! Banked register storage: sixteen logical registers, CPSR/SPSR, and
//! the mode-indexed indirection table that makes r8..r14 bank-switched
//! while r0..r7 and r15 stay fixed.

use crate::constants::{self, MODE_MASK};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum ProcessorMode {
    User = 0b10000,
    Fiq = 0b10001,
    Irq = 0b10010,
    Supervisor = 0b10011,
    Abort = 0b10111,
    Undefined = 0b11011,
    System = 0b11111,
}

impl ProcessorMode {
    pub fn from_bits(bits: u32) -> Option<ProcessorMode> {
        FromPrimitive::from_u32(bits & MODE_MASK)
    }

    pub fn has_spsr(self) -> bool {
        self != ProcessorMode::User && self != ProcessorMode::System
    }

    /// Index of this mode's private r13/r14 bank, or `None` for the
    /// banks that share the user/system cells (User, System).
    fn bank_index(self) -> usize {
        match self {
            ProcessorMode::User | ProcessorMode::System => 0,
            ProcessorMode::Fiq => 1,
            ProcessorMode::Irq => 2,
            ProcessorMode::Supervisor => 3,
            ProcessorMode::Abort => 4,
            ProcessorMode::Undefined => 5,
        }
    }
}

const BANK_COUNT: usize = 6;

/// r/w breakpoint bits, same octal scheme as memory's bit1=write/bit2=read
/// but without an execute bit (a register cannot be fetched-from).
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct RegBreakpoint(pub u8);

impl RegBreakpoint {
    pub fn read(self) -> bool {
        self.0 & 0b100 != 0
    }
    pub fn write(self) -> bool {
        self.0 & 0b010 != 0
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Flags {
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
    pub irq_disable: bool,
    pub fiq_disable: bool,
    pub mode: u32,
}

impl Flags {
    pub fn from_word(word: u32) -> Flags {
        Flags {
            n: word & constants::FLAG_N_BIT != 0,
            z: word & constants::FLAG_Z_BIT != 0,
            c: word & constants::FLAG_C_BIT != 0,
            v: word & constants::FLAG_V_BIT != 0,
            irq_disable: word & constants::FLAG_I_BIT != 0,
            fiq_disable: word & constants::FLAG_F_BIT != 0,
            mode: word & MODE_MASK,
        }
    }

    pub fn to_word(self) -> u32 {
        let mut word = self.mode & MODE_MASK;
        if self.n {
            word |= constants::FLAG_N_BIT;
        }
        if self.z {
            word |= constants::FLAG_Z_BIT;
        }
        if self.c {
            word |= constants::FLAG_C_BIT;
        }
        if self.v {
            word |= constants::FLAG_V_BIT;
        }
        if self.irq_disable {
            word |= constants::FLAG_I_BIT;
        }
        if self.fiq_disable {
            word |= constants::FLAG_F_BIT;
        }
        word
    }

    pub fn mode(&self) -> Option<ProcessorMode> {
        ProcessorMode::from_bits(self.mode)
    }

    /// Get a flag by its one-letter name (`N`, `Z`, `C`, `V`, `I`, `F`).
    pub fn get(&self, name: char) -> Option<bool> {
        match name.to_ascii_uppercase() {
            'N' => Some(self.n),
            'Z' => Some(self.z),
            'C' => Some(self.c),
            'V' => Some(self.v),
            'I' => Some(self.irq_disable),
            'F' => Some(self.fiq_disable),
            _ => None,
        }
    }

    pub fn set(&mut self, name: char, value: bool) {
        match name.to_ascii_uppercase() {
            'N' => self.n = value,
            'Z' => self.z = value,
            'C' => self.c = value,
            'V' => self.v = value,
            'I' => self.irq_disable = value,
            'F' => self.fiq_disable = value,
            _ => {}
        }
    }

    pub fn all(&self) -> Vec<(char, bool)> {
        vec![
            ('N', self.n),
            ('Z', self.z),
            ('C', self.c),
            ('V', self.v),
            ('I', self.irq_disable),
            ('F', self.fiq_disable),
        ]
    }
}

#[derive(Clone, Debug)]
pub struct RegisterBank {
    /// r0..r7 plus r15 (indices 0..7 used, 15 stored separately).
    unbanked: [u32; 8],
    pc: u32,
    /// r13,r14 per bank (User/System, FIQ, IRQ, Supervisor, Abort, Undefined).
    banked: [[u32; 2]; BANK_COUNT],
    /// r8..r12 have a private FIQ bank and a shared bank for everyone else.
    fiq_high: [u32; 5],
    other_high: [u32; 5],
    cpsr: Flags,
    spsr: [Flags; BANK_COUNT],
    reg_breakpoints: [RegBreakpoint; constants::REGISTER_COUNT],
    flag_breakpoints: [RegBreakpoint; 6],
    changed_registers: Vec<usize>,
    mode_transitioned: Option<ProcessorMode>,
}

impl Default for RegisterBank {
    fn default() -> Self {
        RegisterBank {
            unbanked: [0; 8],
            pc: 0,
            banked: [[0; 2]; BANK_COUNT],
            fiq_high: [0; 5],
            other_high: [0; 5],
            cpsr: Flags {
                mode: ProcessorMode::Supervisor as u32,
                ..Flags::default()
            },
            spsr: [Flags::default(); BANK_COUNT],
            reg_breakpoints: [RegBreakpoint::default(); constants::REGISTER_COUNT],
            flag_breakpoints: [RegBreakpoint::default(); 6],
            changed_registers: Vec::new(),
            mode_transitioned: None,
        }
    }
}

impl RegisterBank {
    pub fn new() -> RegisterBank {
        RegisterBank::default()
    }

    pub fn mode(&self) -> ProcessorMode {
        self.cpsr.mode().unwrap_or(ProcessorMode::Supervisor)
    }

    pub fn read(&self, index: usize) -> u32 {
        self.read_raw(index, self.mode())
    }

    /// Read a logical register through the User-mode bank regardless of the
    /// currently active mode, for LDM/STM's `^` (user-bank transfer) suffix.
    pub fn read_user(&self, index: usize) -> u32 {
        self.read_raw(index, ProcessorMode::User)
    }

    fn read_raw(&self, index: usize, mode: ProcessorMode) -> u32 {
        match index {
            0..=7 => self.unbanked[index],
            8..=12 => {
                if mode == ProcessorMode::Fiq {
                    self.fiq_high[index - 8]
                } else {
                    self.other_high[index - 8]
                }
            }
            13 | 14 => self.banked[mode.bank_index()][index - 13],
            15 => self.pc,
            _ => panic!("register index out of range: {}", index),
        }
    }

    /// Write a logical register. `may_trigger_bkpt=false` is used for
    /// programmatic sets (front-end initialization) that should not
    /// surface as a breakpoint hit.
    pub fn write(&mut self, index: usize, value: u32, may_trigger_bkpt: bool) -> bool {
        let triggered = may_trigger_bkpt && self.reg_breakpoints[index].write();
        self.write_raw(index, value, self.mode());
        triggered
    }

    /// Write a logical register through the User-mode bank regardless of the
    /// currently active mode, for LDM/STM's `^` (user-bank transfer) suffix.
    pub fn write_user(&mut self, index: usize, value: u32) {
        self.write_raw(index, value, ProcessorMode::User);
    }

    fn write_raw(&mut self, index: usize, value: u32, mode: ProcessorMode) {
        match index {
            0..=7 => self.unbanked[index] = value,
            8..=12 => {
                if mode == ProcessorMode::Fiq {
                    self.fiq_high[index - 8] = value;
                } else {
                    self.other_high[index - 8] = value;
                }
            }
            13 | 14 => {
                self.banked[mode.bank_index()][index - 13] = value;
            }
            15 => self.pc = value,
            _ => panic!("register index out of range: {}", index),
        }
        if !self.changed_registers.contains(&index) {
            self.changed_registers.push(index);
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, value: u32) {
        self.write(constants::PC, value, false);
    }

    pub fn cpsr(&self) -> Flags {
        self.cpsr
    }

    pub fn set_cpsr(&mut self, flags: Flags) {
        let old_mode = self.mode();
        self.cpsr = flags;
        let new_mode = self.mode();
        if old_mode != new_mode {
            self.mode_transitioned = Some(new_mode);
        }
    }

    pub fn spsr(&self) -> Option<Flags> {
        if self.mode().has_spsr() {
            Some(self.spsr[self.mode().bank_index()])
        } else {
            None
        }
    }

    pub fn set_spsr(&mut self, flags: Flags) {
        if self.mode().has_spsr() {
            let bank = self.mode().bank_index();
            self.spsr[bank] = flags;
        }
    }

    pub fn set_register_breakpoint(&mut self, index: usize, mode: u8) {
        self.reg_breakpoints[index] = RegBreakpoint(mode);
    }

    pub fn set_flag_breakpoint(&mut self, flag: char, mode: u8) {
        if let Some(i) = flag_index(flag) {
            self.flag_breakpoints[i] = RegBreakpoint(mode);
        }
    }

    pub fn flag_breakpoint(&self, flag: char) -> RegBreakpoint {
        flag_index(flag)
            .map(|i| self.flag_breakpoints[i])
            .unwrap_or_default()
    }

    pub fn all_registers(&self) -> [u32; constants::REGISTER_COUNT] {
        let mut out = [0u32; constants::REGISTER_COUNT];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.read_raw(i, self.mode());
        }
        out
    }

    /// Returns (changed register indices + values, bank transition if any),
    /// consumed on read.
    pub fn take_changes(&mut self) -> (Vec<(usize, u32)>, Option<ProcessorMode>) {
        let regs = std::mem::take(&mut self.changed_registers)
            .into_iter()
            .map(|i| (i, self.read(i)))
            .collect();
        (regs, self.mode_transitioned.take())
    }
}

fn flag_index(flag: char) -> Option<usize> {
    match flag.to_ascii_uppercase() {
        'N' => Some(0),
        'Z' => Some(1),
        'C' => Some(2),
        'V' => Some(3),
        'I' => Some(4),
        'F' => Some(5),
        _ => None,
    }
}

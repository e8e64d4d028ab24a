//! The stable façade a front-end drives: `step`/`run`, breakpoint
//! management across lines/memory/registers/flags, interrupt
//! configuration, and introspection. Everything here is modeled
//! directly on the reference debugger backend this simulator grew out
//! of — the method names below are the Rust spelling of that API, not
//! an independent redesign.

use crate::constants::*;
use crate::error::Error;
use crate::executor::{self, Branched, PcBehavior};
use crate::history::History;
use crate::image::{AddressMap, Image};
use crate::instruction;
use crate::memory::{BreakpointHit, Memory};
use crate::register::{Flags, ProcessorMode, RegisterBank};
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepMode {
    Into,
    Over,
    Out,
    Run,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptKind {
    Irq,
    Fiq,
}

#[derive(Clone, Debug, Default)]
pub struct InterruptConfig {
    pub active: bool,
    pub kind: Option<InterruptKind>,
    pub before: u64,
    pub period: u64,
    pub epoch: u64,
    last_fired: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StopReason {
    Register { index: usize, mode: u8 },
    Memory { addr: u32, mode: u8 },
    Flag { name: char, mode: u8 },
    Assert { line: u32, message: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub pc_behavior: PcBehavior,
    pub max_history: usize,
    pub fill_value: u8,
}

impl Default for Config {
    fn default() -> Config {
        Config { pc_behavior: PcBehavior::PlusEight, max_history: 1000, fill_value: 0 }
    }
}

#[derive(Default, Debug, Clone)]
pub struct Changes {
    pub bank: Option<ProcessorMode>,
    pub registers: Vec<(usize, u32)>,
    pub memory: Vec<(u32, Option<u8>)>,
}

pub struct Interpreter {
    memory: Memory,
    registers: RegisterBank,
    history: History,
    cycle_count: u64,
    config: Config,
    addr_map: AddressMap,
    assert_info: std::collections::HashMap<u32, String>,
    line_breakpoints: Vec<u32>,
    old_line_breakpoints: Option<HashSet<u32>>,
    step_mode: StepMode,
    call_depth: i32,
    interrupt: InterruptConfig,
    current_breakpoint: Option<StopReason>,
    image: Image,
}

impl Interpreter {
    pub fn new(image: Image, addr_map: AddressMap, config: Config) -> Interpreter {
        Interpreter::with_assertions(image, addr_map, config, std::collections::HashMap::new())
    }

    /// `assert_info` maps an instruction address to a message; if the
    /// interpreter ever fetches from that address, `step` stops with
    /// `StopReason::Assert` instead of executing it.
    pub fn with_assertions(
        image: Image,
        addr_map: AddressMap,
        config: Config,
        assert_info: std::collections::HashMap<u32, String>,
    ) -> Interpreter {
        let mut interp = Interpreter {
            memory: Memory::new(),
            registers: RegisterBank::new(),
            history: History::new(config.max_history),
            cycle_count: 0,
            config,
            addr_map,
            assert_info,
            line_breakpoints: Vec::new(),
            old_line_breakpoints: None,
            step_mode: StepMode::Into,
            call_depth: 0,
            interrupt: InterruptConfig::default(),
            current_breakpoint: None,
            image,
        };
        interp.reset();
        interp
    }

    fn pc_behavior(&self) -> PcBehavior {
        self.config.pc_behavior
    }

    pub fn reset(&mut self) {
        self.memory = Memory::new();
        self.memory.load(self.image.intvec.base, &self.image.intvec.bytes);
        self.memory.load(self.image.code.base, &self.image.code.bytes);
        self.memory.load(self.image.data.base, &self.image.data.bytes);
        self.registers = RegisterBank::new();
        self.registers.set_pc(self.image.code.base);
        self.history.clear();
        self.cycle_count = 0;
        self.call_depth = 0;
        self.current_breakpoint = None;
    }

    // ---- line breakpoints -------------------------------------------------

    pub fn breakpoint_instr(&mut self, diff: bool) -> Vec<u32> {
        let result = if diff {
            if let Some(old) = &self.old_line_breakpoints {
                let current: HashSet<u32> = self.line_breakpoints.iter().copied().collect();
                current.symmetric_difference(old).copied().collect()
            } else {
                self.line_breakpoints.clone()
            }
        } else {
            self.line_breakpoints.clone()
        };
        self.old_line_breakpoints = Some(self.line_breakpoints.iter().copied().collect());
        result
    }

    pub fn set_breakpoint_instr(&mut self, lines: &[u32]) {
        let prior_addrs: Vec<u32> = self
            .line_breakpoints
            .iter()
            .filter_map(|l| self.addr_map.line_to_addr.get(l).copied())
            .collect();
        self.memory.remove_execute_breakpoints(&prior_addrs);

        self.line_breakpoints.clear();
        for &line in lines {
            if let Some(&addr) = self.addr_map.line_to_addr.get(&line) {
                self.memory.set_breakpoint(addr, 0b001);
                let mut next_line = line + 1;
                while self.addr_map.line_to_addr.get(&next_line) == Some(&addr) {
                    next_line += 1;
                }
                self.line_breakpoints.push(next_line - 1);
            }
        }
    }

    // ---- memory breakpoints ------------------------------------------------

    pub fn memory_breakpoints(&self) -> (Vec<u32>, Vec<u32>, Vec<u32>, Vec<u32>) {
        self.memory.breakpoints_by_mode()
    }

    pub fn set_memory_breakpoint(&mut self, addr: u32, mode: &str) {
        self.memory.set_breakpoint(addr, crate::memory::MemBreakpoint::from_mode_str(mode).0);
    }

    pub fn toggle_memory_breakpoint(&mut self, addr: u32, mode: &str) {
        self.memory.toggle_breakpoint(addr, crate::memory::MemBreakpoint::from_mode_str(mode).0);
    }

    // ---- register / flag breakpoints ---------------------------------------

    pub fn set_register_breakpoint(&mut self, reg: usize, mode: &str) {
        let bits = mode_str_to_rw_bits(mode);
        self.registers.set_register_breakpoint(reg, bits);
    }

    pub fn set_flag_breakpoint(&mut self, flag: char, mode: &str) {
        let bits = mode_str_to_rw_bits(mode);
        self.registers.set_flag_breakpoint(flag, bits);
    }

    // ---- interrupts ---------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn set_interrupt(&mut self, kind: InterruptKind, clear: bool, before: u64, period: u64, epoch: i64) {
        self.interrupt.active = !clear;
        self.interrupt.kind = Some(kind);
        self.interrupt.before = before;
        self.interrupt.period = period;
        self.interrupt.epoch = if epoch >= 0 { epoch as u64 } else { self.cycle_count };
        self.interrupt.last_fired = None;
    }

    fn interrupt_due(&self) -> bool {
        if !self.interrupt.active {
            return false;
        }
        let start = self.interrupt.epoch + self.interrupt.before;
        if self.cycle_count < start {
            return false;
        }
        let due = if self.interrupt.period == 0 {
            self.cycle_count == start
        } else {
            (self.cycle_count - start) % self.interrupt.period == 0
        };
        due && self.interrupt.last_fired != Some(self.cycle_count)
    }

    fn inject_interrupt(&mut self) {
        let kind = match self.interrupt.kind {
            Some(k) => k,
            None => return,
        };
        if kind == InterruptKind::Fiq && self.registers.cpsr().fiq_disable {
            return;
        }
        if kind == InterruptKind::Irq && self.registers.cpsr().irq_disable {
            return;
        }
        self.interrupt.last_fired = Some(self.cycle_count);

        let mut step = Vec::new();
        let return_addr = self.registers.pc();
        step.push(crate::history::Delta::Register { index: LR, old: self.registers.read(LR) });
        self.registers.write(LR, return_addr, false);

        let (mode, vector) = match kind {
            InterruptKind::Irq => (ProcessorMode::Irq, VECTOR_IRQ),
            InterruptKind::Fiq => (ProcessorMode::Fiq, VECTOR_FIQ),
        };
        step.push(crate::history::Delta::Spsr { old: self.registers.spsr().unwrap_or_default() });
        let old_cpsr = self.registers.cpsr();
        step.push(crate::history::Delta::Cpsr { old: old_cpsr });
        step.push(crate::history::Delta::ModeTransition { old: self.registers.mode() });

        let mut flags = old_cpsr;
        flags.mode = mode as u32;
        self.registers.set_cpsr(flags);
        self.registers.set_spsr(old_cpsr);
        let mut flags = self.registers.cpsr();
        flags.irq_disable = true;
        if kind == InterruptKind::Fiq {
            flags.fiq_disable = true;
        }
        self.registers.set_cpsr(flags);

        step.push(crate::history::Delta::Register { index: PC, old: return_addr });
        self.registers.set_pc(vector);

        self.history.push(step);
    }

    // ---- stepping -----------------------------------------------------------

    pub fn should_stop(&self) -> bool {
        self.current_breakpoint.is_some()
    }

    pub fn current_breakpoint(&self) -> Option<&StopReason> {
        self.current_breakpoint.as_ref()
    }

    pub fn step(&mut self, mode: Option<StepMode>) -> Result<(), Error> {
        if let Some(mode) = mode {
            self.step_mode = mode;
        }
        self.current_breakpoint = None;

        if self.interrupt_due() {
            self.inject_interrupt();
        }

        let budget = match self.step_mode {
            StepMode::Into => 1,
            StepMode::Over | StepMode::Out => usize::MAX,
            StepMode::Run => usize::MAX,
        };

        let target_depth = match self.step_mode {
            StepMode::Over => self.call_depth,
            StepMode::Out => self.call_depth - 1,
            _ => i32::MIN,
        };

        for _ in 0..budget {
            self.memory.last_breakpoint = None;
            let pc_behavior = self.pc_behavior();
            let (step, branched) = executor::tick(&mut self.registers, &mut self.memory, pc_behavior, &mut self.cycle_count)?;
            self.history.push(step);

            if branched == Branched::Call {
                self.call_depth += 1;
            } else if branched == Branched::Plain && self.call_depth > 0 {
                self.call_depth -= 1;
            }

            if let Some(BreakpointHit { addr, mode }) = self.memory.last_breakpoint {
                self.current_breakpoint = Some(StopReason::Memory { addr, mode });
                break;
            }
            if let Some(line) = self.check_assert() {
                self.current_breakpoint = Some(line);
                break;
            }

            match self.step_mode {
                StepMode::Into => break,
                StepMode::Over | StepMode::Out => {
                    if self.call_depth <= target_depth {
                        break;
                    }
                }
                StepMode::Run => {
                    if self.should_stop() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_assert(&self) -> Option<StopReason> {
        let pc = self.current_instruction_address();
        self.assert_info.get(&pc).map(|message| {
            let line = self.addr_map.addr_to_lines.get(&pc).and_then(|l| l.last()).copied().unwrap_or(0);
            StopReason::Assert { line, message: message.clone() }
        })
    }

    pub fn step_back(&mut self, count: usize) -> Result<(), Error> {
        self.history.check_available(count)?;
        for _ in 0..count {
            if let Some(step) = self.history.pop() {
                executor::undo(&mut self.registers, &mut self.memory, &mut self.cycle_count, step);
            }
        }
        self.current_breakpoint = None;
        Ok(())
    }

    // ---- memory introspection -----------------------------------------------

    pub fn get_memory(&self) -> Vec<(u32, u8)> {
        self.memory.serialize()
    }

    pub fn get_memory_formatted(&self) -> String {
        self.memory
            .serialize()
            .iter()
            .map(|(addr, byte)| format!("{:08x}: {:02x}", addr, byte))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn set_memory(&mut self, addr: u32, value: u8) {
        if self.memory.peek_byte(addr).is_none() {
            return;
        }
        self.memory.write_byte(addr, value);
    }

    pub fn memory_changes(&mut self) -> Vec<(u32, Option<u8>)> {
        self.memory.take_changes()
    }

    // ---- register / flag introspection ---------------------------------------

    pub fn get_registers(&self) -> [u32; REGISTER_COUNT] {
        self.registers.all_registers()
    }

    pub fn set_registers(&mut self, values: &[(usize, u32)]) {
        for &(index, value) in values {
            self.registers.write(index, value, false);
        }
    }

    pub fn get_flags(&self) -> Vec<(String, bool)> {
        let mut out: Vec<(String, bool)> =
            self.registers.cpsr().all().into_iter().map(|(c, v)| (c.to_string(), v)).collect();
        if let Some(spsr) = self.registers.spsr() {
            out.extend(spsr.all().into_iter().map(|(c, v)| (format!("S{}", c), v)));
        }
        out
    }

    pub fn set_flags(&mut self, values: &[(String, bool)]) {
        let has_spsr = self.registers.spsr().is_some();
        let mut cpsr = self.registers.cpsr();
        let mut spsr = self.registers.spsr().unwrap_or_default();
        for (name, value) in values {
            if has_spsr && name.len() == 2 && name.starts_with('S') {
                spsr.set(name.chars().nth(1).unwrap(), *value);
            } else if name.len() == 1 {
                cpsr.set(name.chars().next().unwrap(), *value);
            }
        }
        self.registers.set_cpsr(cpsr);
        if has_spsr {
            self.registers.set_spsr(spsr);
        }
    }

    pub fn processor_mode(&self) -> ProcessorMode {
        self.registers.mode()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn register_changes(&mut self) -> Changes {
        let (registers, bank) = self.registers.take_changes();
        Changes { bank, registers, memory: self.memory.take_changes() }
    }

    fn raw_pc(&self) -> u32 {
        self.registers.pc()
    }

    fn reported_pc(&self) -> u32 {
        let pc = self.raw_pc();
        match self.config.pc_behavior {
            PcBehavior::PlusEight => pc.wrapping_sub(8),
            PcBehavior::PlusZero => pc,
        }
    }

    /// The address of the instruction about to execute, with the
    /// configured pipeline offset already removed — the only place that
    /// offset is ever applied.
    pub fn current_instruction_address(&self) -> u32 {
        self.reported_pc()
    }

    pub fn current_line(&self) -> Option<u32> {
        self.addr_map.addr_to_lines.get(&self.reported_pc()).and_then(|lines| lines.last().copied())
    }

    pub fn decode_at(&mut self, addr: u32) -> Option<instruction::InstructionRecord> {
        self.memory.read_word(addr).ok().and_then(|w| instruction::decode(w).ok())
    }
}

fn mode_str_to_rw_bits(mode: &str) -> u8 {
    let mut bits = 0u8;
    if mode.contains('r') {
        bits |= 0b100;
    }
    if mode.contains('w') {
        bits |= 0b010;
    }
    bits
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::image::Section;

    fn image_with_code(bytes: Vec<u8>) -> Image {
        Image::new(
            Section { base: BASE_ADDR_INTVEC, bytes: vec![] },
            Section { base: BASE_ADDR_CODE, bytes },
            Section { base: BASE_ADDR_DATA, bytes: vec![] },
        )
    }

    fn word(record: instruction::InstructionRecord) -> [u8; 4] {
        record.encode().to_le_bytes()
    }

    #[test]
    fn mov_mov_add_scenario_matches_literal_example() {
        use crate::instruction::{Condition, DataOpcode, InstructionRecord as I, RegisterShift, ShiftAmount, ShiftKind, ShifterOperand};
        let mut bytes = Vec::new();
        bytes.extend(word(I::DataProcessing {
            cond: Condition::Al, opcode: DataOpcode::Mov, s: false, rn: 0, rd: 0,
            operand2: ShifterOperand::Immediate { rotate: 0, imm8: 5 },
        }));
        bytes.extend(word(I::DataProcessing {
            cond: Condition::Al, opcode: DataOpcode::Mov, s: false, rn: 0, rd: 1,
            operand2: ShifterOperand::Immediate { rotate: 0, imm8: 3 },
        }));
        bytes.extend(word(I::DataProcessing {
            cond: Condition::Al, opcode: DataOpcode::Add, s: false, rn: 0, rd: 2,
            operand2: ShifterOperand::Register(RegisterShift {
                rm: 1, kind: ShiftKind::Lsl, amount: ShiftAmount::Immediate(0), rrx: false,
            }),
        }));

        let mut interp = Interpreter::new(image_with_code(bytes), AddressMap::default(), Config::default());
        for _ in 0..3 {
            interp.step(Some(StepMode::Into)).unwrap();
        }
        assert_eq!(interp.get_registers()[2], 8);
        assert!(!interp.get_flags().iter().any(|(n, v)| n == "Z" && *v));
    }

    #[test]
    fn reversibility_after_n_steps_and_n_stepbacks() {
        use crate::instruction::{Condition, DataOpcode, InstructionRecord as I, ShifterOperand};
        let mut bytes = Vec::new();
        for imm in [5u8, 3, 7] {
            bytes.extend(word(I::DataProcessing {
                cond: Condition::Al, opcode: DataOpcode::Mov, s: false, rn: 0, rd: 0,
                operand2: ShifterOperand::Immediate { rotate: 0, imm8: imm },
            }));
        }

        let mut interp = Interpreter::new(image_with_code(bytes), AddressMap::default(), Config::default());
        let before_regs = interp.get_registers();
        let before_cycles = interp.cycle_count();

        for _ in 0..3 {
            interp.step(Some(StepMode::Into)).unwrap();
        }
        interp.step_back(3).unwrap();

        assert_eq!(interp.get_registers(), before_regs);
        assert_eq!(interp.cycle_count(), before_cycles);
    }

    #[test]
    fn line_breakpoint_falls_forward_to_next_mapped_line() {
        let mut addr_map = AddressMap::default();
        addr_map.bind(10, BASE_ADDR_CODE);
        addr_map.bind(12, BASE_ADDR_CODE + 4);
        let mut interp = Interpreter::new(image_with_code(vec![0; 8]), addr_map, Config::default());
        interp.set_breakpoint_instr(&[11]);
        assert_eq!(interp.line_breakpoints, vec![12]);
    }
}

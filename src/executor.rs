//! The semantic core: `tick` executes one already-fetched instruction
//! against a register bank and memory, recording every mutation so the
//! caller can push the resulting [`Step`] onto [`History`].
//!
//! Free functions over explicit state, not methods on a God object —
//! each helper below snapshots the old value into the step before
//! mutating, which is the only rule the rest of this module has to obey.

use crate::constants::*;
use crate::error::Error;
use crate::history::{Delta, Step};
use crate::instruction::{self, AddressingMode, Condition, DataOpcode, InstructionRecord, MemOffset, ShifterOperand};
use crate::memory::Memory;
use crate::register::{Flags, ProcessorMode, RegisterBank};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PcBehavior {
    PlusZero,
    PlusEight,
}

/// What happened to control flow this tick; `Interpreter` uses this to
/// know whether a call was made (for step-over/out bookkeeping).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Branched {
    No,
    Call,
    Plain,
}

fn write_reg(regs: &mut RegisterBank, step: &mut Step, index: usize, value: u32) {
    let old = regs.read(index);
    step.push(Delta::Register { index, old });
    regs.write(index, value, true);
}

fn write_reg_user(regs: &mut RegisterBank, step: &mut Step, index: usize, value: u32) {
    let old = regs.read_user(index);
    step.push(Delta::UserRegister { index, old });
    regs.write_user(index, value);
}

fn write_cpsr(regs: &mut RegisterBank, step: &mut Step, flags: Flags) {
    step.push(Delta::Cpsr { old: regs.cpsr() });
    if regs.mode() != flags.mode().unwrap_or(regs.mode()) {
        step.push(Delta::ModeTransition { old: regs.mode() });
    }
    regs.set_cpsr(flags);
}

fn write_spsr(regs: &mut RegisterBank, step: &mut Step, flags: Flags) {
    if let Some(old) = regs.spsr() {
        step.push(Delta::Spsr { old });
        regs.set_spsr(flags);
    }
}

fn write_mem_byte(mem: &mut Memory, step: &mut Step, addr: u32, value: u8) {
    step.push(Delta::Memory { addr, old: mem.peek_byte(addr) });
    mem.write_byte(addr, value);
}

fn write_mem_size(mem: &mut Memory, step: &mut Step, addr: u32, byte: bool, value: u32) {
    if byte {
        write_mem_byte(mem, step, addr, value as u8);
    } else {
        for i in 0..WORD_BYTES {
            let shift = 8 * i;
            write_mem_byte(mem, step, addr + i, ((value >> shift) & 0xFF) as u8);
        }
    }
}

fn pc_operand_value(instr_addr: u32, pc_behavior: PcBehavior) -> u32 {
    match pc_behavior {
        PcBehavior::PlusZero => instr_addr,
        PcBehavior::PlusEight => instr_addr.wrapping_add(8),
    }
}

/// Execute the instruction at `regs`' current PC. Returns the step's
/// deltas (for `History`) and how control flow moved.
pub fn tick(
    regs: &mut RegisterBank,
    mem: &mut Memory,
    pc_behavior: PcBehavior,
    cycle_count: &mut u64,
) -> Result<(Step, Branched), Error> {
    let instr_addr = regs.pc();
    let mut step: Step = Vec::new();

    step.push(Delta::CycleCount { old: *cycle_count });
    *cycle_count += 1;

    let word = mem.read_word(instr_addr)?;
    mem.mark_executed(instr_addr);
    let record = instruction::decode(word)?;

    let cpsr = regs.cpsr();
    if !record.condition().holds(cpsr.n, cpsr.z, cpsr.c, cpsr.v) {
        write_reg(regs, &mut step, PC, instr_addr.wrapping_add(4));
        return Ok((step, Branched::No));
    }

    let pc_value = pc_operand_value(instr_addr, pc_behavior);
    let mut branched = Branched::No;

    match record {
        InstructionRecord::DataProcessing { opcode, s, rn, rd, operand2, .. } => {
            execute_data_processing(regs, &mut step, opcode, s, rn, rd, operand2, pc_value);
            if rd == PC {
                branched = Branched::Plain;
            }
        }
        InstructionRecord::SingleTransfer { load, byte, pre, up, writeback, rn, rd, offset, .. } => {
            execute_single_transfer(regs, mem, &mut step, load, byte, pre, up, writeback, rn, rd, offset, pc_value)?;
            if load && rd == PC {
                branched = Branched::Plain;
            }
        }
        InstructionRecord::BlockTransfer { load, mode, writeback, s, rn, reg_list, .. } => {
            execute_block_transfer(regs, mem, &mut step, load, mode, writeback, s, rn, reg_list)?;
            if load && reg_list & (1 << PC) != 0 {
                branched = Branched::Plain;
            }
        }
        InstructionRecord::Branch { link, offset, .. } => {
            if link {
                write_reg(regs, &mut step, LR, instr_addr.wrapping_add(4));
            }
            let target = (pc_value as i64 + offset as i64) as u32;
            write_reg(regs, &mut step, PC, target);
            branched = if link { Branched::Call } else { Branched::Plain };
        }
        InstructionRecord::Multiply { accumulate, s, rd, rn, rs, rm, .. } => {
            let product = regs.read(rm).wrapping_mul(regs.read(rs));
            let result = if accumulate { product.wrapping_add(regs.read(rn)) } else { product };
            write_reg(regs, &mut step, rd, result);
            if s {
                let flags = Flags { n: result & (1 << 31) != 0, z: result == 0, ..regs.cpsr() };
                write_cpsr(regs, &mut step, flags);
            }
        }
        InstructionRecord::MultiplyLong { unsigned, accumulate, s, rd_hi, rd_lo, rs, rm, .. } => {
            let (hi, lo) = if unsigned {
                let product = u64::from(regs.read(rm)) * u64::from(regs.read(rs));
                let acc = if accumulate {
                    product.wrapping_add((u64::from(regs.read(rd_hi)) << 32) | u64::from(regs.read(rd_lo)))
                } else {
                    product
                };
                ((acc >> 32) as u32, acc as u32)
            } else {
                let product = i64::from(regs.read(rm) as i32) * i64::from(regs.read(rs) as i32);
                let acc = if accumulate {
                    let prev = ((u64::from(regs.read(rd_hi)) << 32) | u64::from(regs.read(rd_lo))) as i64;
                    product.wrapping_add(prev)
                } else {
                    product
                };
                ((acc >> 32) as u32, acc as u32)
            };
            write_reg(regs, &mut step, rd_lo, lo);
            write_reg(regs, &mut step, rd_hi, hi);
            if s {
                let value = ((hi as u64) << 32) | lo as u64;
                let flags = Flags { n: hi & (1 << 31) != 0, z: value == 0, ..regs.cpsr() };
                write_cpsr(regs, &mut step, flags);
            }
        }
        InstructionRecord::Swap { byte, rn, rd, rm, .. } => {
            let addr = regs.read(rn);
            let loaded = mem.read_size(addr, byte)?;
            // Memory write happens before the register write, so that
            // rd == rm behaves correctly (the store uses rm's original
            // value, then rd is free to be overwritten with what used
            // to be at the address, even when rd and rm are the same
            // register).
            write_mem_size(mem, &mut step, addr, byte, regs.read(rm));
            write_reg(regs, &mut step, rd, loaded);
        }
        InstructionRecord::PsrTransferFrom { spsr, rd, .. } => {
            let value = if spsr { regs.spsr().unwrap_or_default().to_word() } else { regs.cpsr().to_word() };
            write_reg(regs, &mut step, rd, value);
        }
        InstructionRecord::PsrTransferTo { spsr, flags_only, operand, .. } => {
            let registers = regs.all_registers();
            let (value, _) = operand.evaluate(&registers, pc_value, regs.cpsr().c);
            let mut flags = if spsr { regs.spsr().unwrap_or_default() } else { regs.cpsr() };
            flags.n = value & FLAG_N_BIT != 0;
            flags.z = value & FLAG_Z_BIT != 0;
            flags.c = value & FLAG_C_BIT != 0;
            flags.v = value & FLAG_V_BIT != 0;
            if !flags_only {
                flags.irq_disable = value & FLAG_I_BIT != 0;
                flags.fiq_disable = value & FLAG_F_BIT != 0;
                flags.mode = value & MODE_MASK;
            }
            if spsr {
                write_spsr(regs, &mut step, flags);
            } else {
                write_cpsr(regs, &mut step, flags);
            }
        }
        InstructionRecord::SoftwareInterrupt { .. } => {
            // SPSR_svc must receive the pre-trap CPSR, but it lives in the
            // bank the mode switch is about to select — so the mode switch
            // happens first, then the saved value is written into the new
            // bank.
            write_reg(regs, &mut step, LR, instr_addr.wrapping_add(4));
            let old_cpsr = regs.cpsr();
            let mut flags = old_cpsr;
            flags.mode = ProcessorMode::Supervisor as u32;
            flags.irq_disable = true;
            write_cpsr(regs, &mut step, flags);
            write_spsr(regs, &mut step, old_cpsr);
            write_reg(regs, &mut step, PC, VECTOR_SWI);
            branched = Branched::Call;
        }
    }

    if branched == Branched::No {
        write_reg(regs, &mut step, PC, instr_addr.wrapping_add(4));
    }

    Ok((step, branched))
}

#[allow(clippy::too_many_arguments)]
fn execute_data_processing(
    regs: &mut RegisterBank,
    step: &mut Step,
    opcode: DataOpcode,
    s: bool,
    rn: usize,
    rd: usize,
    operand2: ShifterOperand,
    pc_value: u32,
) {
    let registers = regs.all_registers();
    let carry_in = regs.cpsr().c;
    let (op2, shifter_carry) = operand2.evaluate(&registers, pc_value, carry_in);
    let op1 = if rn == PC { pc_value } else { regs.read(rn) };

    let (result, carry, overflow): (u32, bool, bool) = match opcode {
        DataOpcode::And | DataOpcode::Tst => (op1 & op2, shifter_carry, regs.cpsr().v),
        DataOpcode::Eor | DataOpcode::Teq => (op1 ^ op2, shifter_carry, regs.cpsr().v),
        DataOpcode::Orr => (op1 | op2, shifter_carry, regs.cpsr().v),
        DataOpcode::Mov => (op2, shifter_carry, regs.cpsr().v),
        DataOpcode::Bic => (op1 & !op2, shifter_carry, regs.cpsr().v),
        DataOpcode::Mvn => (!op2, shifter_carry, regs.cpsr().v),
        DataOpcode::Sub | DataOpcode::Cmp => {
            let (r, borrow) = op1.overflowing_sub(op2);
            (r, !borrow, signed_sub_overflow(op1, op2, r))
        }
        DataOpcode::Rsb => {
            let (r, borrow) = op2.overflowing_sub(op1);
            (r, !borrow, signed_sub_overflow(op2, op1, r))
        }
        DataOpcode::Add | DataOpcode::Cmn => {
            let (r, carry) = op1.overflowing_add(op2);
            (r, carry, signed_add_overflow(op1, op2, r))
        }
        DataOpcode::Adc => {
            let c = regs.cpsr().c as u32;
            let (r1, c1) = op1.overflowing_add(op2);
            let (r, c2) = r1.overflowing_add(c);
            (r, c1 || c2, signed_add_overflow(op1, op2, r))
        }
        DataOpcode::Sbc => {
            let borrow_in = !regs.cpsr().c as u32;
            let (r1, b1) = op1.overflowing_sub(op2);
            let (r, b2) = r1.overflowing_sub(borrow_in);
            (r, !(b1 || b2), signed_sub_overflow(op1, op2, r))
        }
        DataOpcode::Rsc => {
            let borrow_in = !regs.cpsr().c as u32;
            let (r1, b1) = op2.overflowing_sub(op1);
            let (r, b2) = r1.overflowing_sub(borrow_in);
            (r, !(b1 || b2), signed_sub_overflow(op2, op1, r))
        }
    };

    if !opcode.is_comparison() {
        write_reg(regs, step, rd, result);
    }

    if s {
        if rd == PC && !opcode.is_comparison() {
            if let Some(spsr) = regs.spsr() {
                write_cpsr(regs, step, spsr);
            }
        } else {
            let is_logical = matches!(
                opcode,
                DataOpcode::And | DataOpcode::Eor | DataOpcode::Orr | DataOpcode::Mov
                    | DataOpcode::Bic | DataOpcode::Mvn | DataOpcode::Tst | DataOpcode::Teq
            );
            let flags = Flags {
                n: result & (1 << 31) != 0,
                z: result == 0,
                c: carry,
                v: if is_logical { regs.cpsr().v } else { overflow },
                ..regs.cpsr()
            };
            write_cpsr(regs, step, flags);
        }
    }
}

fn signed_add_overflow(a: u32, b: u32, result: u32) -> bool {
    let (a, b, r) = (a as i32, b as i32, result as i32);
    (a >= 0 && b >= 0 && r < 0) || (a < 0 && b < 0 && r >= 0)
}

fn signed_sub_overflow(a: u32, b: u32, result: u32) -> bool {
    let (a, b, r) = (a as i32, b as i32, result as i32);
    (a >= 0 && b < 0 && r < 0) || (a < 0 && b >= 0 && r >= 0)
}

#[allow(clippy::too_many_arguments)]
fn execute_single_transfer(
    regs: &mut RegisterBank,
    mem: &mut Memory,
    step: &mut Step,
    load: bool,
    byte: bool,
    pre: bool,
    up: bool,
    writeback: bool,
    rn: usize,
    rd: usize,
    offset: MemOffset,
    pc_value: u32,
) -> Result<(), Error> {
    let base = if rn == PC { pc_value } else { regs.read(rn) };
    let registers = regs.all_registers();
    let delta = match offset {
        MemOffset::Immediate(imm) => imm,
        MemOffset::Register(shift) => instruction::ShifterOperand::Register(shift).evaluate(&registers, pc_value, regs.cpsr().c).0,
    };
    let offset_addr = if up { base.wrapping_add(delta) } else { base.wrapping_sub(delta) };
    let effective = if pre { offset_addr } else { base };

    if load {
        let value = mem.read_size(effective, byte)?;
        write_reg(regs, step, rd, value);
    } else {
        let value = if rd == PC { pc_value.wrapping_add(4) } else { regs.read(rd) };
        write_mem_size(mem, step, effective, byte, value);
    }

    if !pre || writeback {
        write_reg(regs, step, rn, offset_addr);
    }
    Ok(())
}

fn execute_block_transfer(
    regs: &mut RegisterBank,
    mem: &mut Memory,
    step: &mut Step,
    load: bool,
    mode: AddressingMode,
    writeback: bool,
    s: bool,
    rn: usize,
    reg_list: u16,
) -> Result<(), Error> {
    let count = reg_list.count_ones().max(1);
    let base = regs.read(rn);
    // Registers are always transferred in ascending register order at
    // ascending addresses; only the starting address depends on mode.
    let mut addr = match mode {
        AddressingMode::Ia => base,
        AddressingMode::Ib => base.wrapping_add(WORD_BYTES),
        AddressingMode::Da => base.wrapping_sub(count * WORD_BYTES).wrapping_add(WORD_BYTES),
        AddressingMode::Db => base.wrapping_sub(count * WORD_BYTES),
    };

    let pc_in_list = reg_list & (1 << PC) != 0;
    // S-bit with R15 absent from the list accesses the User-mode bank
    // regardless of the currently active mode; S-bit with R15 present (LDM
    // only) instead restores CPSR from SPSR once the load has completed.
    let user_bank = s && !pc_in_list;

    for i in 0..REGISTER_COUNT {
        if reg_list & (1 << i) == 0 {
            continue;
        }
        if load {
            let value = mem.read_word(addr)?;
            if user_bank {
                write_reg_user(regs, step, i, value);
            } else {
                write_reg(regs, step, i, value);
            }
        } else {
            let value = if user_bank { regs.read_user(i) } else { regs.read(i) };
            write_mem_size(mem, step, addr, false, value);
        }
        addr = addr.wrapping_add(WORD_BYTES);
    }

    if writeback {
        let (_, up) = mode.bits();
        let new_base = if up { base.wrapping_add(count * WORD_BYTES) } else { base.wrapping_sub(count * WORD_BYTES) };
        write_reg(regs, step, rn, new_base);
    }

    if load && s && pc_in_list {
        if let Some(spsr) = regs.spsr() {
            write_cpsr(regs, step, spsr);
        }
    }
    Ok(())
}

/// Undo one step's deltas in reverse order.
pub fn undo(regs: &mut RegisterBank, mem: &mut Memory, cycle_count: &mut u64, step: Step) {
    for delta in step.into_iter().rev() {
        match delta {
            Delta::Register { index, old } => { regs.write(index, old, false); }
            Delta::UserRegister { index, old } => regs.write_user(index, old),
            Delta::Memory { addr, old } => mem.restore_byte(addr, old),
            Delta::Cpsr { old } => regs.set_cpsr(old),
            Delta::Spsr { old } => regs.set_spsr(old),
            Delta::ModeTransition { .. } => {}
            Delta::CycleCount { old } => *cycle_count = old,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instruction::{Condition, InstructionRecord};

    fn run_one(regs: &mut RegisterBank, mem: &mut Memory, addr: u32, record: InstructionRecord) {
        regs.set_pc(addr);
        mem.load(addr, &record.encode().to_le_bytes());
        let mut cycles = 0;
        tick(regs, mem, PcBehavior::PlusEight, &mut cycles).unwrap();
    }

    #[test]
    fn mov_and_add_scenario() {
        let mut regs = RegisterBank::new();
        let mut mem = Memory::new();
        run_one(&mut regs, &mut mem, 0x80, InstructionRecord::DataProcessing {
            cond: Condition::Al, opcode: DataOpcode::Mov, s: false, rn: 0, rd: 0,
            operand2: ShifterOperand::Immediate { rotate: 0, imm8: 5 },
        });
        run_one(&mut regs, &mut mem, 0x84, InstructionRecord::DataProcessing {
            cond: Condition::Al, opcode: DataOpcode::Mov, s: false, rn: 0, rd: 1,
            operand2: ShifterOperand::Immediate { rotate: 0, imm8: 3 },
        });
        run_one(&mut regs, &mut mem, 0x88, InstructionRecord::DataProcessing {
            cond: Condition::Al, opcode: DataOpcode::Add, s: false, rn: 0, rd: 2,
            operand2: ShifterOperand::Register(crate::instruction::RegisterShift {
                rm: 1, kind: crate::instruction::ShiftKind::Lsl,
                amount: crate::instruction::ShiftAmount::Immediate(0), rrx: false,
            }),
        });
        assert_eq!(regs.read(2), 8);
        assert!(!regs.cpsr().z);
        assert!(!regs.cpsr().n);
    }

    #[test]
    fn adds_of_min_signed_plus_itself_sets_z_c_v() {
        let mut regs = RegisterBank::new();
        let mut mem = Memory::new();
        regs.write(0, 0x8000_0000, false);
        run_one(&mut regs, &mut mem, 0x84, InstructionRecord::DataProcessing {
            cond: Condition::Al, opcode: DataOpcode::Add, s: true, rn: 0, rd: 1,
            operand2: ShifterOperand::Register(crate::instruction::RegisterShift {
                rm: 0, kind: crate::instruction::ShiftKind::Lsl,
                amount: crate::instruction::ShiftAmount::Immediate(0), rrx: false,
            }),
        });
        assert_eq!(regs.read(1), 0);
        assert!(regs.cpsr().z);
        assert!(regs.cpsr().c);
        assert!(regs.cpsr().v);
        assert!(!regs.cpsr().n);
    }

    #[test]
    fn swap_byte_orders_memory_write_before_register_write() {
        let mut regs = RegisterBank::new();
        let mut mem = Memory::new();
        mem.load(0x2000, &[0x11]);
        regs.write(1, 0x2000, false);
        regs.write(2, 0xAA, false);
        run_one(&mut regs, &mut mem, 0x80, InstructionRecord::Swap {
            cond: Condition::Al, byte: true, rn: 1, rd: 3, rm: 2,
        });
        assert_eq!(regs.read(3), 0x11);
        assert_eq!(mem.read_byte(0x2000), Ok(0xAA));
    }

    #[test]
    fn stm_with_s_bit_and_no_pc_stores_the_user_bank_register() {
        let mut regs = RegisterBank::new();
        let mut mem = Memory::new();
        regs.write_user(13, 0x1111_1111);
        regs.set_cpsr(Flags { mode: ProcessorMode::Irq as u32, ..Flags::default() });
        regs.write(13, 0x2222_2222, false);
        regs.write(0, 0x3000, false);
        run_one(&mut regs, &mut mem, 0x80, InstructionRecord::BlockTransfer {
            cond: Condition::Al, load: false, mode: AddressingMode::Ia, writeback: false,
            s: true, rn: 0, reg_list: 1 << 13,
        });
        assert_eq!(mem.read_word(0x3000), Ok(0x1111_1111));
    }

    #[test]
    fn ldm_with_s_bit_and_no_pc_loads_into_the_user_bank_register() {
        let mut regs = RegisterBank::new();
        let mut mem = Memory::new();
        mem.load(0x3000, &0x4444_4444u32.to_le_bytes());
        regs.set_cpsr(Flags { mode: ProcessorMode::Irq as u32, ..Flags::default() });
        regs.write(13, 0x2222_2222, false);
        regs.write(0, 0x3000, false);
        run_one(&mut regs, &mut mem, 0x80, InstructionRecord::BlockTransfer {
            cond: Condition::Al, load: true, mode: AddressingMode::Ia, writeback: false,
            s: true, rn: 0, reg_list: 1 << 13,
        });
        assert_eq!(regs.read_user(13), 0x4444_4444);
        assert_eq!(regs.read(13), 0x2222_2222);
    }

    #[test]
    fn ldm_of_pc_with_s_bit_restores_cpsr_from_spsr() {
        let mut regs = RegisterBank::new();
        let mut mem = Memory::new();
        regs.set_cpsr(Flags { mode: ProcessorMode::Irq as u32, ..Flags::default() });
        regs.set_spsr(Flags { mode: ProcessorMode::Supervisor as u32, ..Flags::default() });
        mem.load(0x3000, &0x9000u32.to_le_bytes());
        regs.write(0, 0x3000, false);
        run_one(&mut regs, &mut mem, 0x80, InstructionRecord::BlockTransfer {
            cond: Condition::Al, load: true, mode: AddressingMode::Ia, writeback: false,
            s: true, rn: 0, reg_list: 1 << PC,
        });
        assert_eq!(regs.pc(), 0x9000);
        assert_eq!(regs.mode(), ProcessorMode::Supervisor);
    }

    #[test]
    fn store_then_load_then_step_back_restores_uninitialized_memory() {
        let mut regs = RegisterBank::new();
        let mut mem = Memory::new();
        regs.write(0, 42, false);
        regs.write(1, 0x1000, false);
        let mut cycles = 0u64;
        let mut steps = Vec::new();

        regs.set_pc(0x80);
        mem.load(0x80, &InstructionRecord::SingleTransfer {
            cond: Condition::Al, load: false, byte: false, pre: true, up: true, writeback: false,
            rn: 1, rd: 0, offset: MemOffset::Immediate(0),
        }.encode().to_le_bytes());
        let (step, _) = tick(&mut regs, &mut mem, PcBehavior::PlusEight, &mut cycles).unwrap();
        steps.push(step);

        assert_eq!(mem.read_word(0x1000), Ok(42));

        while let Some(step) = steps.pop() {
            undo(&mut regs, &mut mem, &mut cycles, step);
        }
        assert_eq!(mem.read_byte(0x1000), Err(Error::UninitializedMemory(0x1000)));
    }

    #[test]
    fn branch_not_taken_advances_pc_by_four_without_other_state_change() {
        let mut regs = RegisterBank::new();
        let mut mem = Memory::new();
        regs.write(0, 1, false);
        regs.set_cpsr(Flags { z: false, ..regs.cpsr() });
        run_one(&mut regs, &mut mem, 0x80, InstructionRecord::Branch {
            cond: Condition::Eq, link: false, offset: 100,
        });
        assert_eq!(regs.pc(), 0x84);
    }
}

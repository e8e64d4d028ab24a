//! Token slice -> 32-bit instruction word. Operates on tokens that have
//! already been through label resolution, so every operand here is a
//! concrete register, immediate, memory access or register list.

use crate::error::Diagnostic;
use crate::mnemonic::{strip_base, strip_condition};
use crate::token::{MemOffsetToken, Operand, ParsedInstruction, RegShift};
use armvm::instruction::{
    AddressingMode, DataOpcode, InstructionRecord, MemOffset, RegisterShift, ShiftAmount,
    ShifterOperand,
};

const DATA_PROCESSING_BASES: &[(&str, DataOpcode)] = &[
    ("AND", DataOpcode::And),
    ("EOR", DataOpcode::Eor),
    ("SUB", DataOpcode::Sub),
    ("RSB", DataOpcode::Rsb),
    ("ADD", DataOpcode::Add),
    ("ADC", DataOpcode::Adc),
    ("SBC", DataOpcode::Sbc),
    ("RSC", DataOpcode::Rsc),
    ("TST", DataOpcode::Tst),
    ("TEQ", DataOpcode::Teq),
    ("CMP", DataOpcode::Cmp),
    ("CMN", DataOpcode::Cmn),
    ("ORR", DataOpcode::Orr),
    ("MOV", DataOpcode::Mov),
    ("BIC", DataOpcode::Bic),
    ("MVN", DataOpcode::Mvn),
];

/// Encodes one already-resolved instruction line into its 32-bit word.
pub fn encode(instr: &ParsedInstruction) -> Result<u32, Diagnostic> {
    Ok(decode_record(instr)?.encode())
}

fn decode_record(instr: &ParsedInstruction) -> Result<InstructionRecord, Diagnostic> {
    let bases: Vec<&'static str> = DATA_PROCESSING_BASES.iter().map(|(b, _)| *b).collect();
    if let Some((base, rest)) = strip_base(&instr.mnemonic, &bases) {
        return encode_data_processing(instr, base, rest);
    }
    if let Some((_, rest)) = strip_base(&instr.mnemonic, &["LDR", "STR"]) {
        let load = instr.mnemonic.starts_with("LDR");
        return encode_single_transfer(instr, load, rest);
    }
    if let Some((_, rest)) = strip_base(&instr.mnemonic, &["LDM", "STM"]) {
        let load = instr.mnemonic.starts_with("LDM");
        return encode_block_transfer(instr, load, rest);
    }
    if let Some((base, rest)) = strip_base(&instr.mnemonic, &["BL", "B"]) {
        return encode_branch(instr, base == "BL", rest);
    }
    if let Some((_, rest)) = strip_base(&instr.mnemonic, &["MLA", "MUL"]) {
        let accumulate = instr.mnemonic.starts_with("MLA");
        return encode_multiply(instr, accumulate, rest);
    }
    if let Some((base, rest)) =
        strip_base(&instr.mnemonic, &["UMULL", "UMLAL", "SMULL", "SMLAL"])
    {
        let unsigned = base.starts_with('U');
        let accumulate = base.ends_with("LAL");
        return encode_multiply_long(instr, unsigned, accumulate, rest);
    }
    if let Some((_, rest)) = strip_base(&instr.mnemonic, &["SWP"]) {
        return encode_swap(instr, rest);
    }
    if let Some((_, rest)) = strip_base(&instr.mnemonic, &["MRS"]) {
        return encode_mrs(instr, rest);
    }
    if let Some((_, rest)) = strip_base(&instr.mnemonic, &["MSR"]) {
        return encode_msr(instr, rest);
    }
    if let Some((_, rest)) = strip_base(&instr.mnemonic, &["SWI", "SVC"]) {
        return encode_swi(instr, rest);
    }
    Err(Diagnostic::invalid_instruction(instr.line, format!("unknown mnemonic `{}`", instr.mnemonic)))
}

fn reg(op: &Operand, line: u32) -> Result<usize, Diagnostic> {
    match op {
        Operand::Reg(RegShift { reg, shift: None }) => check_reg(*reg, line),
        Operand::RegWriteback(reg) => check_reg(*reg, line),
        _ => Err(Diagnostic::invalid_instruction(line, "expected a plain register operand")),
    }
}

fn check_reg(index: usize, line: u32) -> Result<usize, Diagnostic> {
    if index < 16 {
        Ok(index)
    } else {
        Err(Diagnostic::range(line, format!("register R{} does not exist", index)))
    }
}

fn shift_to_amount(regshift: &RegShift, line: u32) -> Result<RegisterShift, Diagnostic> {
    let rm = check_reg(regshift.reg, line)?;
    match regshift.shift {
        None => Ok(RegisterShift {
            rm,
            kind: armvm::instruction::ShiftKind::Lsl,
            amount: ShiftAmount::Immediate(0),
            rrx: false,
        }),
        Some((kind, amount, rrx)) => {
            let amount = match amount {
                ShiftAmount::Immediate(v) => {
                    if v > 31 {
                        return Err(Diagnostic::range(line, "shift amount out of 0..=31 range"));
                    }
                    ShiftAmount::Immediate(v)
                }
                ShiftAmount::Register(r) => ShiftAmount::Register(check_reg(r, line)?),
            };
            Ok(RegisterShift { rm, kind, amount, rrx })
        }
    }
}

fn encode_rotated_immediate(value: i64, line: u32) -> Result<(u8, u8), Diagnostic> {
    let value = value as i32 as u32;
    for half_rot in 0..16u32 {
        let rot = half_rot * 2;
        let candidate = value.rotate_left(rot);
        if candidate <= 0xFF {
            return Ok((half_rot as u8, candidate as u8));
        }
    }
    Err(Diagnostic::range(line, format!("0x{:X} cannot be expressed as a rotated 8-bit immediate", value)))
}

fn shifter_operand(op: &Operand, line: u32) -> Result<ShifterOperand, Diagnostic> {
    match op {
        Operand::Imm(v) => {
            let (rotate, imm8) = encode_rotated_immediate(*v, line)?;
            Ok(ShifterOperand::Immediate { rotate, imm8 })
        }
        Operand::Reg(rs) => Ok(ShifterOperand::Register(shift_to_amount(rs, line)?)),
        _ => Err(Diagnostic::invalid_instruction(line, "expected an immediate or register shifter operand")),
    }
}

fn encode_data_processing(
    instr: &ParsedInstruction,
    base: &str,
    rest: &str,
) -> Result<InstructionRecord, Diagnostic> {
    let opcode = DATA_PROCESSING_BASES.iter().find(|(b, _)| *b == base).unwrap().1;
    let (cond, suffix) = strip_condition(rest);
    let explicit_s = suffix.eq_ignore_ascii_case("S");
    if !explicit_s && !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let s = explicit_s || opcode.is_comparison();

    let (rn, rd, operand2) = if matches!(opcode, DataOpcode::Mov | DataOpcode::Mvn) {
        let rd = reg(instr.operands.get(0).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
        let operand2 = shifter_operand(instr.operands.get(1).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
        (0usize, rd, operand2)
    } else if opcode.is_comparison() {
        let rn = reg(instr.operands.get(0).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
        let operand2 = shifter_operand(instr.operands.get(1).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
        (rn, 0usize, operand2)
    } else {
        let rd = reg(instr.operands.get(0).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
        let rn = reg(instr.operands.get(1).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
        let operand2 = shifter_operand(instr.operands.get(2).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
        (rn, rd, operand2)
    };

    Ok(InstructionRecord::DataProcessing { cond, opcode, s, rn, rd, operand2 })
}

fn missing_operand(line: u32) -> Diagnostic {
    Diagnostic::syntax(line, "missing operand")
}

fn mem_offset(access: &crate::token::MemAccess, line: u32) -> Result<(bool, MemOffset), Diagnostic> {
    let up = !access.negative;
    let offset = match &access.offset {
        None => MemOffset::Immediate(0),
        Some(MemOffsetToken::Immediate(v)) => MemOffset::Immediate(v.unsigned_abs() as u32),
        Some(MemOffsetToken::Reg(rs)) => MemOffset::Register(shift_to_amount(rs, line)?),
    };
    Ok((up, offset))
}

fn encode_single_transfer(
    instr: &ParsedInstruction,
    load: bool,
    rest: &str,
) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    let byte = suffix.eq_ignore_ascii_case("B");
    if !byte && !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let rd = reg(instr.operands.get(0).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let mem = match instr.operands.get(1) {
        Some(Operand::Mem(m)) => m,
        _ => return Err(Diagnostic::invalid_instruction(instr.line, "expected a memory operand")),
    };
    let rn = check_reg(mem.base, instr.line)?;
    let (up, offset) = mem_offset(mem, instr.line)?;
    Ok(InstructionRecord::SingleTransfer {
        cond,
        load,
        byte,
        pre: mem.pre,
        up,
        writeback: mem.writeback,
        rn,
        rd,
        offset,
    })
}

fn encode_block_transfer(
    instr: &ParsedInstruction,
    load: bool,
    rest: &str,
) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    let mode = match suffix.to_ascii_uppercase().as_str() {
        "" | "IA" => AddressingMode::Ia,
        "IB" => AddressingMode::Ib,
        "DA" => AddressingMode::Da,
        "DB" => AddressingMode::Db,
        other => return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown addressing mode `{}`", other))),
    };
    let (rn, writeback) = match instr.operands.get(0) {
        Some(Operand::RegWriteback(r)) => (check_reg(*r, instr.line)?, true),
        Some(op) => (reg(op, instr.line)?, false),
        None => return Err(missing_operand(instr.line)),
    };
    let (reg_list, s) = match instr.operands.get(1) {
        Some(Operand::RegList(list, user_bank)) => {
            let mut mask: u16 = 0;
            for r in list {
                mask |= 1 << check_reg(*r, instr.line)?;
            }
            (mask, *user_bank)
        }
        _ => return Err(Diagnostic::invalid_instruction(instr.line, "expected a register list")),
    };
    Ok(InstructionRecord::BlockTransfer { cond, load, mode, writeback, s, rn, reg_list })
}

fn encode_branch(instr: &ParsedInstruction, link: bool, rest: &str) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    if !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let offset = match instr.operands.get(0) {
        Some(Operand::Imm(v)) => *v as i32,
        _ => return Err(Diagnostic::invalid_instruction(instr.line, "branch target did not resolve to an offset")),
    };
    if offset > 0x01FF_FFFC || offset < -0x0200_0000 {
        return Err(Diagnostic::range(instr.line, "branch target out of 24-bit word-offset range"));
    }
    Ok(InstructionRecord::Branch { cond, link, offset })
}

fn encode_multiply(instr: &ParsedInstruction, accumulate: bool, rest: &str) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    let s = suffix.eq_ignore_ascii_case("S");
    if !s && !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let rd = reg(instr.operands.get(0).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let rm = reg(instr.operands.get(1).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let rs = reg(instr.operands.get(2).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let rn = if accumulate {
        reg(instr.operands.get(3).ok_or_else(|| missing_operand(instr.line))?, instr.line)?
    } else {
        0
    };
    Ok(InstructionRecord::Multiply { cond, accumulate, s, rd, rn, rs, rm })
}

fn encode_multiply_long(
    instr: &ParsedInstruction,
    unsigned: bool,
    accumulate: bool,
    rest: &str,
) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    let s = suffix.eq_ignore_ascii_case("S");
    if !s && !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let rd_lo = reg(instr.operands.get(0).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let rd_hi = reg(instr.operands.get(1).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let rm = reg(instr.operands.get(2).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let rs = reg(instr.operands.get(3).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    Ok(InstructionRecord::MultiplyLong { cond, unsigned, accumulate, s, rd_hi, rd_lo, rs, rm })
}

fn encode_swap(instr: &ParsedInstruction, rest: &str) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    let byte = suffix.eq_ignore_ascii_case("B");
    if !byte && !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let rd = reg(instr.operands.get(0).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let rm = reg(instr.operands.get(1).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let rn = match instr.operands.get(2) {
        Some(Operand::Mem(m)) if m.offset.is_none() => check_reg(m.base, instr.line)?,
        _ => return Err(Diagnostic::invalid_instruction(instr.line, "SWP takes a bare [Rn] address operand")),
    };
    Ok(InstructionRecord::Swap { cond, byte, rn, rd, rm })
}

fn psr_ident(op: Option<&Operand>, line: u32) -> Result<(bool, String), Diagnostic> {
    match op {
        Some(Operand::Ident(name)) => {
            let upper = name.to_ascii_uppercase();
            if upper == "CPSR" || upper.starts_with("CPSR_") {
                Ok((false, upper))
            } else if upper == "SPSR" || upper.starts_with("SPSR_") {
                Ok((true, upper))
            } else {
                Err(Diagnostic::invalid_instruction(line, format!("expected CPSR or SPSR, found `{}`", name)))
            }
        }
        _ => Err(Diagnostic::invalid_instruction(line, "expected CPSR or SPSR")),
    }
}

fn encode_mrs(instr: &ParsedInstruction, rest: &str) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    if !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let rd = reg(instr.operands.get(0).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    let (spsr, _) = psr_ident(instr.operands.get(1), instr.line)?;
    Ok(InstructionRecord::PsrTransferFrom { cond, spsr, rd })
}

fn encode_msr(instr: &ParsedInstruction, rest: &str) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    if !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let (spsr, field) = psr_ident(instr.operands.get(0), instr.line)?;
    let flags_only = field.ends_with("_FLG") || field.ends_with("_F");
    let operand = shifter_operand(instr.operands.get(1).ok_or_else(|| missing_operand(instr.line))?, instr.line)?;
    Ok(InstructionRecord::PsrTransferTo { cond, spsr, flags_only, operand })
}

fn encode_swi(instr: &ParsedInstruction, rest: &str) -> Result<InstructionRecord, Diagnostic> {
    let (cond, suffix) = strip_condition(rest);
    if !suffix.is_empty() {
        return Err(Diagnostic::invalid_instruction(instr.line, format!("unknown suffix `{}`", suffix)));
    }
    let comment = match instr.operands.get(0) {
        Some(Operand::Imm(v)) => *v as u32 & 0x00FF_FFFF,
        None => 0,
        _ => return Err(Diagnostic::invalid_instruction(instr.line, "expected an immediate comment field")),
    };
    Ok(InstructionRecord::SoftwareInterrupt { cond, comment })
}

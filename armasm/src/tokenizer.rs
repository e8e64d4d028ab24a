//! Line -> token translation. One pest parse per line, so a syntax error
//! on one line never disturbs the lexing of the rest of the file.

use crate::error::Diagnostic;
use crate::token::{
    DeclarationKind, LineTokens, MemAccess, MemOffsetToken, Operand, ParsedDeclaration,
    ParsedInstruction, RegShift, Section, Token,
};
use armvm::instruction::{ShiftAmount, ShiftKind};
use pest::iterators::Pair;
use pest::Parser;

#[derive(pest_derive::Parser)]
#[grammar = "grammar.pest"]
struct LineParser;

pub fn tokenize_line(line: &str, line_no: u32) -> Result<LineTokens, Diagnostic> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(LineTokens::default());
    }

    let mut pairs = LineParser::parse(Rule::line, line)
        .map_err(|e| Diagnostic::syntax(line_no, e.to_string()))?;
    let line_pair = pairs.next().expect("line rule always produces a pair");

    let mut out = LineTokens::default();
    for pair in line_pair.into_inner() {
        match pair.as_rule() {
            Rule::label_line => {
                let ident = pair.into_inner().next().unwrap();
                out.label = Some(ident.as_str().to_string());
            }
            Rule::section_line => {
                let name = pair.into_inner().next().unwrap().as_str();
                let section = Section::from_name(name)
                    .ok_or_else(|| Diagnostic::syntax(line_no, format!("unknown section `{}`", name)))?;
                out.statement = Some(Token::Section(section));
            }
            Rule::declaration_line => {
                out.statement = Some(Token::Declaration(parse_declaration(pair, line_no)?));
            }
            Rule::instruction_line => {
                out.statement = Some(Token::Instruction(parse_instruction(pair, line_no)?));
            }
            Rule::assert_line => {
                let raw = pair.into_inner().next().unwrap().as_str();
                let message = raw[1..raw.len() - 1].to_string();
                out.statement = Some(Token::Assert(message));
            }
            Rule::EOI => {}
            other => unreachable!("unexpected top-level rule {:?}", other),
        }
    }
    Ok(out)
}

fn parse_int(s: &str) -> i64 {
    let (neg, s) = if let Some(rest) = s.strip_prefix('-') { (true, rest) } else { (false, s) };
    let value: i64 = if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(rest, 16).unwrap()
    } else if let Some(rest) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        i64::from_str_radix(rest, 8).unwrap()
    } else if let Some(rest) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        i64::from_str_radix(rest, 2).unwrap()
    } else {
        s.parse().unwrap()
    };
    if neg { -value } else { value }
}

fn parse_register(s: &str) -> usize {
    match s.to_ascii_uppercase().as_str() {
        "PC" => 15,
        "LR" => 14,
        "SP" => 13,
        other => other[1..].parse().expect("register rule guarantees a numeric suffix"),
    }
}

fn parse_shift_kind(s: &str) -> ShiftKind {
    match s.to_ascii_uppercase().as_str() {
        "LSL" => ShiftKind::Lsl,
        "LSR" => ShiftKind::Lsr,
        "ASR" => ShiftKind::Asr,
        "ROR" | "RRX" => ShiftKind::Ror,
        other => unreachable!("unexpected shift kind {}", other),
    }
}

/// Returns `(kind, amount, rrx)`.
fn parse_shift(pair: Pair<Rule>) -> (ShiftKind, ShiftAmount, bool) {
    let mut inner = pair.into_inner();
    let kind_str = inner.next().unwrap().as_str();
    let rrx = kind_str.eq_ignore_ascii_case("RRX");
    let kind = parse_shift_kind(kind_str);
    let amount = match inner.next() {
        None => ShiftAmount::Immediate(0),
        Some(p) if p.as_rule() == Rule::integer => {
            ShiftAmount::Immediate(parse_int(p.as_str()) as u8)
        }
        Some(p) if p.as_rule() == Rule::register => ShiftAmount::Register(parse_register(p.as_str())),
        Some(_) => unreachable!(),
    };
    (kind, amount, rrx)
}

fn parse_reg_shift(pair: Pair<Rule>) -> RegShift {
    let mut inner = pair.into_inner();
    let reg = parse_register(inner.next().unwrap().as_str());
    let shift = inner.next().map(parse_shift);
    RegShift { reg, shift }
}

fn parse_operand(pair: Pair<Rule>, line_no: u32) -> Result<Operand, Diagnostic> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::mem_operand => Ok(Operand::Mem(parse_mem_operand(inner, line_no)?)),
        Rule::reg_writeback => {
            let reg = parse_register(inner.into_inner().next().unwrap().as_str());
            Ok(Operand::RegWriteback(reg))
        }
        Rule::reglist => {
            let mut regs = Vec::new();
            let mut user_bank = false;
            for entry in inner.into_inner() {
                if entry.as_rule() == Rule::caret {
                    user_bank = true;
                    continue;
                }
                let mut it = entry.into_inner();
                let first = parse_register(it.next().unwrap().as_str());
                match it.next() {
                    None => regs.push(first),
                    Some(last) => {
                        let last = parse_register(last.as_str());
                        if last < first {
                            return Err(Diagnostic::syntax(
                                line_no,
                                "descending register range in list",
                            ));
                        }
                        regs.extend(first..=last);
                    }
                }
            }
            Ok(Operand::RegList(regs, user_bank))
        }
        Rule::shifter_operand => {
            let shifter = inner.into_inner().next().unwrap();
            match shifter.as_rule() {
                Rule::immediate => {
                    let lit = shifter.into_inner().next().unwrap().as_str();
                    Ok(Operand::Imm(parse_int(lit)))
                }
                Rule::reg_shift_operand => Ok(Operand::Reg(parse_reg_shift(shifter))),
                other => unreachable!("unexpected shifter alt {:?}", other),
            }
        }
        Rule::label_addr_ref => {
            let name = inner.as_str()[1..].to_string();
            Ok(Operand::LabelAddr(name))
        }
        Rule::label_ref => Ok(Operand::Ident(inner.as_str().to_string())),
        other => unreachable!("unexpected operand alt {:?}", other),
    }
}

fn parse_mem_operand(pair: Pair<Rule>, _line_no: u32) -> Result<MemAccess, Diagnostic> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::pre_indexed => {
            let writeback = inner.as_str().trim_end().ends_with('!');
            let mut it = inner.into_inner();
            let base = parse_register(it.next().unwrap().as_str());
            let mut negative = false;
            let offset = match it.next() {
                Some(p) if p.as_rule() == Rule::offset => {
                    let (neg, off) = parse_offset(p);
                    negative = neg;
                    Some(off)
                }
                _ => None,
            };
            Ok(MemAccess { base, pre: true, writeback, negative, offset })
        }
        Rule::post_indexed => {
            let mut it = inner.into_inner();
            let base = parse_register(it.next().unwrap().as_str());
            let off_pair = it.next().unwrap();
            let (negative, offset) = parse_offset(off_pair);
            Ok(MemAccess { base, pre: false, writeback: false, negative, offset: Some(offset) })
        }
        other => unreachable!("unexpected mem alt {:?}", other),
    }
}

fn parse_offset(pair: Pair<Rule>) -> (bool, MemOffsetToken) {
    let text = pair.as_str();
    let negative = text.starts_with('-');
    let mut inner = pair.into_inner();
    let first = inner.next().unwrap();
    match first.as_rule() {
        Rule::immediate => {
            let lit = first.into_inner().next().unwrap().as_str();
            (negative, MemOffsetToken::Immediate(parse_int(lit)))
        }
        Rule::register => {
            let reg = parse_register(first.as_str());
            let shift = inner.next().map(parse_shift);
            (negative, MemOffsetToken::Reg(RegShift { reg, shift }))
        }
        other => unreachable!("unexpected offset alt {:?}", other),
    }
}

fn parse_declaration(pair: Pair<Rule>, line_no: u32) -> Result<ParsedDeclaration, Diagnostic> {
    let mut inner = pair.into_inner();
    let kind_str = inner.next().unwrap().as_str().to_ascii_uppercase();
    let nbits: u8 = kind_str[2..].parse().unwrap();
    let kind = if kind_str.starts_with("DC") {
        DeclarationKind::Const(nbits)
    } else {
        DeclarationKind::Reserve(nbits)
    };
    let values: Vec<i64> = inner.map(|p| parse_int(p.as_str())).collect();
    if values.is_empty() {
        return Err(Diagnostic::syntax(line_no, "declaration with no values"));
    }
    Ok(ParsedDeclaration { kind, values, line: line_no })
}

fn parse_instruction(pair: Pair<Rule>, line_no: u32) -> Result<ParsedInstruction, Diagnostic> {
    let mut inner = pair.into_inner();
    let mnemonic = inner.next().unwrap().as_str().to_ascii_uppercase();
    let mut operands = Vec::new();
    if let Some(list) = inner.next() {
        for operand_pair in list.into_inner() {
            operands.push(parse_operand(operand_pair, line_no)?);
        }
    }
    Ok(ParsedInstruction { mnemonic, operands, line: line_no })
}

//! Typed tokens produced by the tokenizer and consumed by the layout,
//! resolution and encode passes of the assembler.

use armvm::instruction::{ShiftAmount, ShiftKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Intvec,
    Code,
    Data,
}

impl Section {
    pub fn base(self) -> u32 {
        match self {
            Section::Intvec => armvm::constants::BASE_ADDR_INTVEC,
            Section::Code => armvm::constants::BASE_ADDR_CODE,
            Section::Data => armvm::constants::BASE_ADDR_DATA,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Section::Intvec => "INTVEC",
            Section::Code => "CODE",
            Section::Data => "DATA",
        }
    }

    pub fn from_name(name: &str) -> Option<Section> {
        match name.to_ascii_uppercase().as_str() {
            "INTVEC" => Some(Section::Intvec),
            "CODE" => Some(Section::Code),
            "DATA" => Some(Section::Data),
            _ => None,
        }
    }
}

/// A register-and-optional-shift operand, e.g. `R3` or `R3, LSL #2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegShift {
    pub reg: usize,
    pub shift: Option<(ShiftKind, ShiftAmount, bool)>,
}

/// A `[Rn, offset]{!}` or `[Rn], offset` memory operand, still carrying a
/// label-relative offset marker if resolution hasn't run yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemAccess {
    pub base: usize,
    pub pre: bool,
    pub writeback: bool,
    pub negative: bool,
    pub offset: Option<MemOffsetToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemOffsetToken {
    Immediate(i64),
    Reg(RegShift),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(RegShift),
    /// Block-transfer base register written as `Rn!`.
    RegWriteback(usize),
    Imm(i64),
    /// `{r0,r4-r7}` plus the trailing `^` (user-bank/SPSR-restore transfer)
    /// LDM/STM accept after the closing brace.
    RegList(Vec<usize>, bool),
    Mem(MemAccess),
    /// A bare identifier: a branch-target label, or a PSR name (`CPSR`,
    /// `SPSR`, `CPSR_flg`, ...) for MRS/MSR.
    Ident(String),
    /// `=label`, a load-absolute-address reference.
    LabelAddr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub mnemonic: String,
    pub operands: Vec<Operand>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationKind {
    Const(u8),
    Reserve(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDeclaration {
    pub kind: DeclarationKind,
    pub values: Vec<i64>,
    pub line: u32,
}

/// A line's statement, i.e. everything after an optional leading label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Section(Section),
    Declaration(ParsedDeclaration),
    Instruction(ParsedInstruction),
    /// `ASSERT "message"`: binds to whichever instruction or declaration
    /// follows it, with no address of its own.
    Assert(String),
}

/// Output of tokenizing a single line: an optional leading label plus an
/// optional statement. Both are independently optional so a line can be
/// blank, a label alone, a label-plus-statement, or a statement alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineTokens {
    pub label: Option<String>,
    pub statement: Option<Token>,
}

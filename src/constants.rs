//! Bit-layout constants for the ARMv4-class instruction word and the
//! fixed memory sections this simulator targets.

pub const WORD_BYTES: u32 = 4;
pub const REGISTER_COUNT: usize = 16;

pub const SP: usize = 13;
pub const LR: usize = 14;
pub const PC: usize = 15;

/// Interrupt/exception vector table base.
pub const BASE_ADDR_INTVEC: u32 = 0x00;
/// Code section base.
pub const BASE_ADDR_CODE: u32 = 0x80;
/// Data section base.
pub const BASE_ADDR_DATA: u32 = 0x1000;

/// Address jumped to on SWI/SVC.
pub const VECTOR_SWI: u32 = 0x08;
pub const VECTOR_IRQ: u32 = 0x18;
pub const VECTOR_FIQ: u32 = 0x1C;

pub const COND_OFFSET: u32 = 28;
pub const COND_MASK: u32 = 0xF << COND_OFFSET;

/// Bits 27:26 select the broad instruction class (00 = data-processing
/// or multiply/swap, 01 = single data transfer, 10 = branch or block
/// transfer).
pub const CLASS_OFFSET: u32 = 26;
pub const CLASS_MASK: u32 = 0x3 << CLASS_OFFSET;

pub const IBIT_OFFSET: u32 = 25;
pub const IBIT_MASK: u32 = 1 << IBIT_OFFSET;

pub const OPCODE_OFFSET: u32 = 21;
pub const OPCODE_MASK: u32 = 0xF << OPCODE_OFFSET;

pub const SBIT_OFFSET: u32 = 20;
pub const SBIT_MASK: u32 = 1 << SBIT_OFFSET;

pub const RN_OFFSET: u32 = 16;
pub const RN_MASK: u32 = 0xF << RN_OFFSET;

pub const RD_OFFSET: u32 = 12;
pub const RD_MASK: u32 = 0xF << RD_OFFSET;

pub const RS_OFFSET: u32 = 8;
pub const RS_MASK: u32 = 0xF << RS_OFFSET;

pub const RM_MASK: u32 = 0xF;

pub const SHIFT_TYPE_OFFSET: u32 = 5;
pub const SHIFT_TYPE_MASK: u32 = 0x3 << SHIFT_TYPE_OFFSET;

pub const SHIFT_AMOUNT_OFFSET: u32 = 7;
pub const SHIFT_AMOUNT_MASK: u32 = 0x1F << SHIFT_AMOUNT_OFFSET;

pub const SHIFT_REG_BIT: u32 = 1 << 4;

pub const ROTATE_OFFSET: u32 = 8;
pub const ROTATE_MASK: u32 = 0xF << ROTATE_OFFSET;
pub const IMM8_MASK: u32 = 0xFF;

pub const PBIT: u32 = 1 << 24;
pub const UBIT: u32 = 1 << 23;
pub const BBIT: u32 = 1 << 22;
pub const WBIT: u32 = 1 << 21;
pub const LBIT: u32 = 1 << 20;

pub const BRANCH_LBIT: u32 = 1 << 24;
pub const BRANCH_OFFSET_MASK: u32 = 0x00FF_FFFF;
pub const BRANCH_SIGN_BIT: u32 = 1 << 23;

pub const REGLIST_MASK: u32 = 0xFFFF;

/// Multiply/multiply-long/swap group discriminator bits (bits 7:4 == 1001).
pub const MUL_DISCRIMINATOR_MASK: u32 = 0xF << 4;
pub const MUL_DISCRIMINATOR_VALUE: u32 = 0b1001 << 4;

pub const MUL_LONG_OPCODE_OFFSET: u32 = 21;
pub const MUL_ABIT: u32 = 1 << 21;
pub const MUL_SBIT: u32 = 1 << 20;
pub const MUL_UBIT: u32 = 1 << 22;

pub const SWI_COMMENT_MASK: u32 = 0x00FF_FFFF;

/// Processor mode field, CPSR/SPSR bits 4:0.
pub const MODE_MASK: u32 = 0x1F;
pub const FLAG_N_BIT: u32 = 1 << 31;
pub const FLAG_Z_BIT: u32 = 1 << 30;
pub const FLAG_C_BIT: u32 = 1 << 29;
pub const FLAG_V_BIT: u32 = 1 << 28;
pub const FLAG_I_BIT: u32 = 1 << 7;
pub const FLAG_F_BIT: u32 = 1 << 6;

pub const PSR_FIELD_OFFSET: u32 = 16;
pub const PSR_SPSR_BIT: u32 = 1 << 22;
pub const PSR_TOPSR_BIT: u32 = 1 << 21;
pub const PSR_FIELD_MASK: u32 = 0xF << PSR_FIELD_OFFSET;
/// Field-mask bit selecting just the flags byte (N/Z/C/V) of the PSR, as
/// opposed to control/extension/status — what `MSR <psr>_flg, Rm` sets.
pub const PSR_FIELD_MASK_FLAGS: u32 = 0b1000;

/// Byte-order used throughout the assembled image and memory words.
pub type Endian = byteorder::LittleEndian;

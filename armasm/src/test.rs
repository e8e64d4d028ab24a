use crate::{assemble, assemble_with_fill, ErrorKind};
use armvm::instruction::{decode, AddressingMode, Condition, DataOpcode, InstructionRecord, MemOffset, ShifterOperand};
use std::convert::TryInto;

fn code_words(source: &str) -> Vec<u32> {
    let out = assemble(source).expect("assembly should succeed");
    out.image
        .code
        .bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[test]
fn mov_mov_add_assembles_to_three_words_at_consecutive_addresses() {
    let source = "SECTION CODE\nMOV R0, #5\nMOV R1, #3\nADD R2, R0, R1\n";
    let out = assemble(source).unwrap();
    assert_eq!(out.image.code.base, 0x80);
    assert_eq!(out.image.code.bytes.len(), 12);
    assert_eq!(out.addr_map.line_to_addr[&2], 0x80);
    assert_eq!(out.addr_map.line_to_addr[&3], 0x84);
    assert_eq!(out.addr_map.line_to_addr[&4], 0x88);

    let words = code_words(source);
    match decode(words[2]).unwrap() {
        InstructionRecord::DataProcessing { cond, opcode, s, rn, rd, .. } => {
            assert_eq!(cond, Condition::Al);
            assert_eq!(opcode, DataOpcode::Add);
            assert!(!s);
            assert_eq!(rn, 0);
            assert_eq!(rd, 2);
        }
        other => panic!("expected data-processing record, got {:?}", other),
    }
}

#[test]
fn s_suffix_and_condition_survive_a_round_trip() {
    let words = code_words("SECTION CODE\nMOVS R0, #0x80000000\nADDSNE R1, R0, R0\n");
    match decode(words[1]).unwrap() {
        InstructionRecord::DataProcessing { cond, opcode, s, .. } => {
            assert_eq!(cond, Condition::Ne);
            assert_eq!(opcode, DataOpcode::Add);
            assert!(s);
        }
        other => panic!("expected data-processing record, got {:?}", other),
    }
}

#[test]
fn branch_loop_resolves_label_to_a_backward_pc_relative_offset() {
    let source = "SECTION CODE\nMOV R0, #3\nloop:\nSUBS R0, R0, #1\nBNE loop\n";
    let words = code_words(source);
    match decode(words[2]).unwrap() {
        InstructionRecord::Branch { cond, link, offset } => {
            assert_eq!(cond, Condition::Ne);
            assert!(!link);
            // BNE sits at 0x88; loop: (the SUBS) sits at 0x84.
            // offset = 0x84 - (0x88 + 8) = -0x0C.
            assert_eq!(offset, -0x0C);
        }
        other => panic!("expected branch record, got {:?}", other),
    }
}

#[test]
fn load_absolute_address_allocates_a_literal_pool_slot_at_section_end() {
    let source = "SECTION CODE\nLDR R0, =0xDEADBEEF\n";
    let out = assemble(source).unwrap();
    // one instruction word (4 bytes) then the pooled literal (4 bytes).
    assert_eq!(out.image.code.bytes.len(), 8);
    let literal = u32::from_le_bytes(out.image.code.bytes[4..8].try_into().unwrap());
    assert_eq!(literal, 0xDEADBEEF);

    let word = u32::from_le_bytes(out.image.code.bytes[0..4].try_into().unwrap());
    match decode(word).unwrap() {
        InstructionRecord::SingleTransfer { load, byte, pre, up, rn, rd, offset, .. } => {
            assert!(load);
            assert!(!byte);
            assert!(pre);
            assert!(up);
            assert_eq!(rn, 15);
            assert_eq!(rd, 0);
            assert_eq!(offset, MemOffset::Immediate(0));
        }
        other => panic!("expected single-transfer record, got {:?}", other),
    }
}

#[test]
fn store_then_load_round_trips_through_a_register_offset() {
    let source = "SECTION CODE\nMOV R1, #0x10\nSTR R0, [R1]\nLDR R2, [R1]\n";
    let words = code_words(source);
    match decode(words[1]).unwrap() {
        InstructionRecord::SingleTransfer { load, rn, rd, .. } => {
            assert!(!load);
            assert_eq!(rn, 1);
            assert_eq!(rd, 0);
        }
        other => panic!("expected single-transfer record, got {:?}", other),
    }
}

#[test]
fn swap_byte_assembles_with_memory_operand_as_the_base_register() {
    let words = code_words("SECTION CODE\nSWPB R3, R2, [R1]\n");
    match decode(words[0]).unwrap() {
        InstructionRecord::Swap { byte, rn, rd, rm, .. } => {
            assert!(byte);
            assert_eq!(rn, 1);
            assert_eq!(rd, 3);
            assert_eq!(rm, 2);
        }
        other => panic!("expected swap record, got {:?}", other),
    }
}

#[test]
fn block_transfer_with_writeback_and_addressing_suffix() {
    let words = code_words("SECTION CODE\nSTMDB R13!, {R0-R2, R14}\n");
    match decode(words[0]).unwrap() {
        InstructionRecord::BlockTransfer { load, mode, writeback, rn, reg_list, .. } => {
            assert!(!load);
            assert_eq!(mode, AddressingMode::Db);
            assert!(writeback);
            assert_eq!(rn, 13);
            assert_eq!(reg_list, 0b0100_0000_0000_0111);
        }
        other => panic!("expected block-transfer record, got {:?}", other),
    }
}

#[test]
fn block_transfer_with_caret_sets_the_s_bit_for_user_bank_access() {
    let words = code_words("SECTION CODE\nLDMIA R0, {R1-R3}^\n");
    match decode(words[0]).unwrap() {
        InstructionRecord::BlockTransfer { load, s, rn, reg_list, .. } => {
            assert!(load);
            assert!(s);
            assert_eq!(rn, 0);
            assert_eq!(reg_list, 0b0000_0000_0000_1110);
        }
        other => panic!("expected block-transfer record, got {:?}", other),
    }
}

#[test]
fn data_declarations_pack_little_endian_values_of_the_right_width() {
    let out = assemble("SECTION DATA\nDC8 1, -45, 0xFF\nDC32 0xABCD1234\n").unwrap();
    assert_eq!(out.image.data.bytes[0..3], [1, 211, 255]);
    assert_eq!(&out.image.data.bytes[3..7], &0xABCD1234u32.to_le_bytes());
}

#[test]
fn reserve_declaration_fills_with_the_configured_fill_value() {
    let out = assemble_with_fill("SECTION DATA\nDS8 4\n", 0xAA).unwrap();
    assert_eq!(out.image.data.bytes, vec![0xAA; 4]);
}

#[test]
fn assert_directive_binds_to_the_address_of_the_following_instruction() {
    let out = assemble("SECTION CODE\nASSERT \"r0 must be zero here\"\nMOV R0, #0\n").unwrap();
    assert_eq!(out.assert_info.get(&0x80).map(String::as_str), Some("r0 must be zero here"));
}

#[test]
fn unresolved_label_is_reported_as_a_link_error() {
    let errors = assemble("SECTION CODE\nB nowhere\n").unwrap_err();
    assert!(errors.iter().any(|d| d.kind == ErrorKind::Link));
}

#[test]
fn unknown_mnemonic_is_reported_as_an_invalid_instruction_error() {
    let errors = assemble("SECTION CODE\nFROB R0, R1\n").unwrap_err();
    assert!(errors.iter().any(|d| d.kind == ErrorKind::InvalidInstruction));
}

#[test]
fn immediate_outside_the_rotated_encoding_range_is_a_range_error() {
    let errors = assemble("SECTION CODE\nMOV R0, #0x101\n").unwrap_err();
    assert!(errors.iter().any(|d| d.kind == ErrorKind::Range));
}

#[test]
fn code_section_overflow_is_reported_without_panicking() {
    let mut source = String::from("SECTION CODE\n");
    for _ in 0..((0x1000 - 0x80) / 4 + 1) {
        source.push_str("MOV R0, #0\n");
    }
    let errors = assemble(&source).unwrap_err();
    assert!(errors.iter().any(|d| d.kind == ErrorKind::Link));
}

#[test]
fn mvn_uses_only_rd_and_operand2() {
    let shifter = ShifterOperand::Immediate { rotate: 0, imm8: 0xFF };
    let words = code_words("SECTION CODE\nMVN R5, #0xFF\n");
    match decode(words[0]).unwrap() {
        InstructionRecord::DataProcessing { opcode, rd, rn, operand2, .. } => {
            assert_eq!(opcode, DataOpcode::Mvn);
            assert_eq!(rd, 5);
            assert_eq!(rn, 0);
            assert_eq!(operand2, shifter);
        }
        other => panic!("expected data-processing record, got {:?}", other),
    }
}

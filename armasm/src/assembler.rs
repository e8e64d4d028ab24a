//! Four-pass orchestration: lex, lay out addresses, resolve labels and
//! literal pools, then encode. All four passes run over the whole file
//! even when earlier passes found problems, so a single `assemble` call
//! surfaces every diagnostic in the source rather than stopping at the
//! first.

use crate::encoder;
use crate::error::Diagnostic;
use crate::token::{
    DeclarationKind, LineTokens, MemAccess, MemOffsetToken, Operand, ParsedDeclaration, Section,
    Token,
};
use crate::tokenizer::tokenize_line;
use armvm::image::{AddressMap, Image, Section as ImageSection};
use std::collections::HashMap;

#[derive(Debug)]
pub struct AssembleOutput {
    pub image: Image,
    pub addr_map: AddressMap,
    pub assert_info: HashMap<u32, String>,
}

pub fn assemble(source: &str) -> Result<AssembleOutput, Vec<Diagnostic>> {
    assemble_with_fill(source, 0)
}

pub fn assemble_with_fill(source: &str, fill_value: u8) -> Result<AssembleOutput, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();

    let mut lines: Vec<LineTokens> = Vec::with_capacity(source.lines().count());
    for (i, raw_line) in source.lines().enumerate() {
        let line_no = i as u32 + 1;
        match tokenize_line(raw_line, line_no) {
            Ok(tokens) => lines.push(tokens),
            Err(diag) => {
                diagnostics.push(diag);
                lines.push(LineTokens::default());
            }
        }
    }

    let layout = run_layout(&lines, &mut diagnostics);
    let (assert_info, literal_pools) = resolve_labels(&mut lines, &layout, &mut diagnostics);
    let (sections, addr_map) = run_encode(&lines, &layout, &literal_pools, fill_value, &mut diagnostics);

    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let image = Image::new(
        sections.get(&Section::Intvec).cloned().unwrap_or_default(),
        sections.get(&Section::Code).cloned().unwrap_or_default(),
        sections.get(&Section::Data).cloned().unwrap_or_default(),
    );
    Ok(AssembleOutput { image, addr_map, assert_info })
}

struct Layout {
    labels: HashMap<String, u32>,
    assigned_addr: Vec<Option<u32>>,
    /// High-water mark per section after the instruction/declaration
    /// stream, i.e. where each section's literal pool begins.
    section_end: HashMap<Section, u32>,
    line_section: Vec<Option<Section>>,
    pending_assert: Vec<Option<String>>,
}

fn declaration_size(decl: &ParsedDeclaration) -> u32 {
    match decl.kind {
        DeclarationKind::Const(nbits) => (nbits as u32 / 8) * decl.values.len() as u32,
        DeclarationKind::Reserve(nbits) => (nbits as u32 / 8) * decl.values.get(0).copied().unwrap_or(0) as u32,
    }
}

fn run_layout(lines: &[LineTokens], diagnostics: &mut Vec<Diagnostic>) -> Layout {
    let mut labels = HashMap::new();
    let mut assigned_addr = vec![None; lines.len()];
    let mut section_end = HashMap::new();
    let mut line_section = vec![None; lines.len()];
    let mut pending_assert = vec![None; lines.len()];

    let mut current_section: Option<Section> = None;
    let mut current_addr: u32 = 0;
    let mut carried_assert: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        let line_no = i as u32 + 1;

        if let Some(Token::Section(section)) = &line.statement {
            if let Some(prev) = current_section {
                section_end.insert(prev, current_addr);
            }
            current_section = Some(*section);
            current_addr = section.base();
        }

        if let Some(name) = &line.label {
            match current_section {
                Some(_) => {
                    labels.insert(name.clone(), current_addr);
                }
                None => diagnostics.push(Diagnostic::syntax(line_no, "label defined outside of any section")),
            }
        }

        line_section[i] = current_section;

        match &line.statement {
            Some(Token::Declaration(decl)) => match current_section {
                Some(_) => {
                    assigned_addr[i] = Some(current_addr);
                    pending_assert[i] = carried_assert.take();
                    current_addr += declaration_size(decl);
                }
                None => diagnostics.push(Diagnostic::syntax(line_no, "declaration outside of any section")),
            },
            Some(Token::Instruction(_)) => match current_section {
                Some(_) => {
                    assigned_addr[i] = Some(current_addr);
                    pending_assert[i] = carried_assert.take();
                    current_addr += armvm::constants::WORD_BYTES;
                }
                None => diagnostics.push(Diagnostic::syntax(line_no, "instruction outside of any section")),
            },
            Some(Token::Assert(message)) => {
                carried_assert = Some(message.clone());
            }
            Some(Token::Section(_)) | None => {}
        }
    }
    if let Some(section) = current_section {
        section_end.insert(section, current_addr);
    }

    for (section, end) in [(Section::Intvec, Section::Code.base()), (Section::Code, Section::Data.base())] {
        if let Some(&actual_end) = section_end.get(&section) {
            if actual_end > end {
                diagnostics.push(Diagnostic::link(
                    0,
                    format!("{} section overran its boundary (ends at 0x{:X}, limit 0x{:X})", section.name(), actual_end, end),
                ));
            }
        }
    }

    Layout { labels, assigned_addr, section_end, line_section, pending_assert }
}

/// Rewrites label-referencing operands in place and returns the
/// instruction-address -> assertion-message map built from `ASSERT`
/// directives.
fn resolve_labels(
    lines: &mut [LineTokens],
    layout: &Layout,
    diagnostics: &mut Vec<Diagnostic>,
) -> (HashMap<u32, String>, HashMap<Section, Vec<u32>>) {
    let mut assert_info = HashMap::new();
    let mut literal_addr: HashMap<(Section, String), u32> = HashMap::new();
    let mut literal_values: HashMap<Section, Vec<u32>> = HashMap::new();
    let mut pool_cursor: HashMap<Section, u32> = layout.section_end.clone();

    for (i, line) in lines.iter_mut().enumerate() {
        let line_no = i as u32 + 1;
        let instr_addr = match layout.assigned_addr[i] {
            Some(a) => a,
            None => continue,
        };
        if let Some(message) = layout.pending_assert[i].clone() {
            assert_info.insert(instr_addr, message);
        }
        let section = match layout.line_section[i] {
            Some(s) => s,
            None => continue,
        };

        let instr = match &mut line.statement {
            Some(Token::Instruction(instr)) => instr,
            _ => continue,
        };
        if instr.mnemonic.starts_with("MRS") || instr.mnemonic.starts_with("MSR") {
            continue;
        }

        for operand in instr.operands.iter_mut() {
            match operand {
                Operand::Ident(name) => {
                    let target = match layout.labels.get(name) {
                        Some(&addr) => addr,
                        None => {
                            diagnostics.push(Diagnostic::link(line_no, format!("unresolved label `{}`", name)));
                            continue;
                        }
                    };
                    let diff = target as i64 - (instr_addr as i64 + 8);
                    *operand = Operand::Imm(diff);
                }
                Operand::LabelAddr(name) => {
                    let target = match layout.labels.get(name) {
                        Some(&addr) => addr,
                        None => {
                            diagnostics.push(Diagnostic::link(line_no, format!("unresolved label `{}`", name)));
                            continue;
                        }
                    };
                    let key = (section, name.clone());
                    let pool_addr = *literal_addr.entry(key).or_insert_with(|| {
                        let cursor = pool_cursor.entry(section).or_insert_with(|| section.base());
                        let addr = *cursor;
                        *cursor += armvm::constants::WORD_BYTES;
                        literal_values.entry(section).or_default().push(target);
                        addr
                    });
                    let diff = pool_addr as i64 - (instr_addr as i64 + 8);
                    *operand = Operand::Mem(MemAccess {
                        base: 15,
                        pre: true,
                        writeback: false,
                        negative: diff < 0,
                        offset: Some(MemOffsetToken::Immediate(diff.abs())),
                    });
                }
                _ => {}
            }
        }
    }

    for (section, _values) in &literal_values {
        let end = pool_cursor[section];
        let limit = match section {
            Section::Intvec => Section::Code.base(),
            Section::Code => Section::Data.base(),
            Section::Data => u32::MAX,
        };
        if end > limit {
            diagnostics.push(Diagnostic::link(
                0,
                format!("literal pool overran {} (ends at 0x{:X}, limit 0x{:X})", section.name(), end, limit),
            ));
        }
    }

    (assert_info, literal_values)
}

fn run_encode(
    lines: &[LineTokens],
    layout: &Layout,
    literal_pools: &HashMap<Section, Vec<u32>>,
    fill_value: u8,
    diagnostics: &mut Vec<Diagnostic>,
) -> (HashMap<Section, ImageSection>, AddressMap) {
    let mut buffers: HashMap<Section, Vec<u8>> = HashMap::new();
    let mut addr_map = AddressMap::default();

    for (i, line) in lines.iter().enumerate() {
        let (addr, section) = match (layout.assigned_addr[i], layout.line_section[i]) {
            (Some(a), Some(s)) => (a, s),
            _ => continue,
        };
        let line_no = i as u32 + 1;
        let buf = buffers.entry(section).or_insert_with(|| vec![0u8; (addr - section.base()) as usize]);

        let bytes: Vec<u8> = match &line.statement {
            Some(Token::Declaration(decl)) => encode_declaration(decl, fill_value, line_no, diagnostics),
            Some(Token::Instruction(instr)) => match encoder::encode(instr) {
                Ok(word) => word.to_le_bytes().to_vec(),
                Err(diag) => {
                    diagnostics.push(diag);
                    vec![0u8; 4]
                }
            },
            _ => continue,
        };

        addr_map.bind(line_no, addr);
        buf.extend_from_slice(&bytes);
    }

    for (&section, values) in literal_pools {
        let buf = buffers.entry(section).or_default();
        for value in values {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    let sections = buffers
        .into_iter()
        .map(|(section, bytes)| (section, ImageSection { base: section.base(), bytes }))
        .collect();
    (sections, addr_map)
}

fn encode_declaration(decl: &ParsedDeclaration, fill_value: u8, line_no: u32, diagnostics: &mut Vec<Diagnostic>) -> Vec<u8> {
    match decl.kind {
        DeclarationKind::Const(nbits) => {
            let mut bytes = Vec::with_capacity(decl.values.len() * (nbits as usize / 8));
            for &value in &decl.values {
                if !fits(value, nbits) {
                    diagnostics.push(Diagnostic::range(line_no, format!("{} does not fit in {} bits", value, nbits)));
                }
                match nbits {
                    8 => bytes.push(value as i8 as u8),
                    16 => bytes.extend_from_slice(&(value as i16 as u16).to_le_bytes()),
                    32 => bytes.extend_from_slice(&(value as i32 as u32).to_le_bytes()),
                    other => unreachable!("grammar only admits 8/16/32-bit declarations, got {}", other),
                }
            }
            bytes
        }
        DeclarationKind::Reserve(nbits) => {
            let count = decl.values.get(0).copied().unwrap_or(0).max(0) as usize;
            vec![fill_value; count * (nbits as usize / 8)]
        }
    }
}

fn fits(value: i64, nbits: u8) -> bool {
    let signed_min = -(1i64 << (nbits - 1));
    let unsigned_max = (1i64 << nbits) - 1;
    value >= signed_min && value <= unsigned_max
}

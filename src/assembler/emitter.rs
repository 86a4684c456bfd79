use crate::arena::Segment;
use crate::assembler::asm_error::{AsmError, AsmErrorKind};
use crate::assembler::lexer::{lex_line, parse_number, strip_comment, LexedLine, Token};
use crate::assembler::symbols::{is_register_name, register_index, SymbolTable};
use crate::cpu::opcodes;

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub name: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub strategy: Option<String>,
}

pub struct AssembleOutput {
    pub segments: Vec<Segment>,
    pub symbols: SymbolTable,
    pub errors: Vec<AsmError>,
    pub metadata: Metadata,
    pub entry_point: u16,
}

/// two-pass assembler entry point (§4.B). always returns a
/// `(segments, symbols, errors)`-shaped result; a non-empty error list
/// means the loader must refuse this bot.
pub fn assemble(source: &str) -> AssembleOutput {
    let lines: Vec<LexedLine> = source
        .lines()
        .enumerate()
        .map(|(i, raw)| lex_line(strip_comment(raw), i + 1))
        .collect();

    let org_base = find_org_base(&lines);

    let mut symbols = SymbolTable::new();
    pass1(&lines, &mut symbols, org_base);

    let mut errors = Vec::new();
    let mut metadata = Metadata::default();
    let code = pass2(&lines, &symbols, &mut errors, &mut metadata);

    let entry_point = symbols
        .iter()
        .find(|(k, _)| k.as_str() == "start")
        .map(|(_, v)| *v as u16)
        .unwrap_or(org_base as u16);

    AssembleOutput {
        segments: vec![Segment {
            name: "code".to_string(),
            start: org_base as usize,
            data: code,
        }],
        symbols,
        errors,
        metadata,
        entry_point,
    }
}

/// the code segment's base (§4.B: "placed at base 0 (or `.org` base)").
/// only the first `.org` in the file takes effect; later ones are
/// ignored rather than producing mid-file gaps.
fn find_org_base(lines: &[LexedLine]) -> i32 {
    for line in lines {
        if let Token::Directive { name, payload } = &line.token {
            if name == "org" {
                return parse_number(payload).unwrap_or(0) as i32;
            }
        }
    }
    0
}

/// pass 1 — symbol collection (§4.B). every known instruction advances
/// the address by one logical slot; the actual byte length is decided
/// in pass 2.
fn pass1(lines: &[LexedLine], symbols: &mut SymbolTable, org_base: i32) {
    let mut addr: i32 = org_base;
    let mut start_addr: i32 = org_base;
    let mut pending_code_size: Option<(String, String)> = None;

    for line in lines {
        symbols.define("$", addr);
        match &line.token {
            Token::Label(name) => {
                symbols.define(name, addr);
                if name == "start" {
                    start_addr = addr;
                }
            }
            Token::Directive { .. } => {}
            Token::DataDefinition { form, values } => {
                let unit = match form.as_str() {
                    "db" => 1,
                    "dw" => 2,
                    "dq" => 8,
                    _ => 1,
                };
                addr += unit * values.len().max(1) as i32;
            }
            Token::EquDefinition { name, expr } => {
                if expr.trim() == "$ - start" || expr.trim() == "$-start" {
                    // special-cased per DESIGN.md: resolved at pass-1
                    // end, once "start"'s address and the final address
                    // are both known.
                    pending_code_size = Some((name.clone(), expr.clone()));
                } else if let Some(n) = parse_number(expr) {
                    symbols.define(name, n as i32);
                } else {
                    symbols.define(name, symbols.resolve(expr));
                }
            }
            Token::Instruction { .. } => {
                addr += 1;
            }
            Token::Blank => {}
        }
    }

    if let Some((name, _)) = pending_code_size {
        symbols.define(&name, addr - start_addr);
    }
}

/// pass 2 — emission (§4.B). resolves operands against the pass-1
/// symbol table; unresolved identifiers default to 0.
fn pass2(
    lines: &[LexedLine],
    symbols: &SymbolTable,
    errors: &mut Vec<AsmError>,
    metadata: &mut Metadata,
) -> Vec<u8> {
    let mut out = Vec::new();

    for line in lines {
        match &line.token {
            Token::Label(_) | Token::Blank | Token::EquDefinition { .. } => {}
            Token::Directive { name, payload } => {
                match name.as_str() {
                    "name" => metadata.name = Some(payload.clone()),
                    "author" => metadata.author = Some(payload.clone()),
                    "version" => metadata.version = Some(payload.clone()),
                    "strategy" => metadata.strategy = Some(payload.clone()),
                    "code" | "data" | "const" | "org" | "align" | "space" | "include" => {}
                    _ => errors.push(AsmError {
                        kind: AsmErrorKind::InvalidDirective,
                        line: line.line_no,
                        text: name.clone(),
                    }),
                }
            }
            Token::DataDefinition { form, values } => {
                emit_data(form, values, symbols, &mut out, errors, line.line_no);
            }
            Token::Instruction { mnemonic, operands } => {
                emit_instruction(mnemonic, operands, symbols, &mut out, errors, line.line_no);
            }
        }
    }

    out
}

fn emit_data(
    form: &str,
    values: &[String],
    symbols: &SymbolTable,
    out: &mut Vec<u8>,
    errors: &mut Vec<AsmError>,
    line_no: usize,
) {
    for v in values {
        let n = resolve_value(v, symbols);
        match form {
            "db" => out.push((n & 0xff) as u8),
            "dw" => {
                out.push((n & 0xff) as u8);
                out.push(((n >> 8) & 0xff) as u8);
            }
            "dq" => {
                for shift in (0..64).step_by(8) {
                    out.push(((n >> shift) & 0xff) as u8);
                }
            }
            _ => errors.push(AsmError {
                kind: AsmErrorKind::InvalidDirective,
                line: line_no,
                text: form.to_string(),
            }),
        }
    }
}

fn resolve_value(token: &str, symbols: &SymbolTable) -> i64 {
    resolve_value_checked(token, symbols).unwrap_or(0)
}

/// resolves one "single operand byte" slot (register, or a byte-sized
/// immediate/address per §4.B's "operand values >= 4 denote
/// immediates/addresses").
fn resolve_operand_byte(raw: &str, symbols: &SymbolTable, errors: &mut Vec<AsmError>, line_no: usize) -> u8 {
    let t = raw.trim();
    if is_register_name(t) {
        if let Some(idx) = register_index(t) {
            return idx;
        }
        // sp/pc/flags cannot be encoded in the 2-bit operand scheme.
        errors.push(AsmError {
            kind: AsmErrorKind::InvalidOperand,
            line: line_no,
            text: t.to_string(),
        });
        return 0;
    }
    if let Some(imm) = t.strip_prefix('#') {
        return resolve_value(imm, symbols) as u8;
    }
    if let Some(inner) = t.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if is_register_name(inner) {
            if let Some(idx) = register_index(inner) {
                return idx;
            }
        }
        return resolve_value(inner, symbols) as u8;
    }
    match resolve_value_checked(t, symbols) {
        Some(n) => n as u8,
        None => {
            errors.push(AsmError {
                kind: AsmErrorKind::InvalidImmediate,
                line: line_no,
                text: t.to_string(),
            });
            0
        }
    }
}

/// resolves a bare identifier/number, or a `base+offset`/`base-offset`
/// symbol-arithmetic expression (the `[buffer+2]` style addressing the
/// lexical rules allow inside `[...]`). `base` may be a symbol or a
/// decimal/hex literal; offsets are always decimal or hex literals.
fn resolve_value_checked(token: &str, symbols: &SymbolTable) -> Option<i64> {
    if let Some(n) = parse_number(token) {
        return Some(n);
    }
    if symbols.contains(token) {
        return Some(symbols.resolve(token) as i64);
    }
    if let Some((base, offset)) = split_arithmetic(token) {
        let base_val = parse_number(base).unwrap_or_else(|| symbols.resolve(base) as i64);
        return Some(base_val + offset);
    }
    // unresolved identifiers default to 0, not an error (§4.B).
    Some(0)
}

fn split_arithmetic(token: &str) -> Option<(&str, i64)> {
    if let Some(idx) = token.rfind('+') {
        if idx > 0 {
            let (base, off) = token.split_at(idx);
            let off = parse_number(off[1..].trim())?;
            return Some((base.trim(), off));
        }
    }
    if let Some(idx) = token.rfind('-') {
        if idx > 0 {
            let (base, off) = token.split_at(idx);
            let off = parse_number(off[1..].trim())?;
            return Some((base.trim(), -off));
        }
    }
    None
}

/// resolves a branch/CALL/SPL operand to a full 16-bit address, pulling
/// the inner expression out of `[...]` memory-access syntax if present.
fn resolve_target_operand(raw: &str, symbols: &SymbolTable) -> u16 {
    let t = raw.trim();
    let inner = t
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(t);
    let inner = inner.trim_start_matches('#');
    resolve_value_checked(inner, symbols).unwrap_or(0) as u16
}

fn emit_instruction(
    mnemonic: &str,
    operands: &[String],
    symbols: &SymbolTable,
    out: &mut Vec<u8>,
    errors: &mut Vec<AsmError>,
    line_no: usize,
) {
    let opcode = match mnemonic_to_opcode(mnemonic) {
        Some(op) => op,
        None => {
            errors.push(AsmError {
                kind: AsmErrorKind::InvalidInstruction,
                line: line_no,
                text: mnemonic.to_string(),
            });
            return;
        }
    };

    out.push(opcode);
    // these all carry a bare little-endian 16-bit address/target in
    // their two operand bytes, with no byte to spare for a register
    // select (LEA/LOAD/STORE implicitly target r0, see DESIGN.md).
    let branch_family = matches!(
        opcode,
        opcodes::JMP
            | opcodes::JZ
            | opcodes::JNZ
            | opcodes::JE
            | opcodes::JNE
            | opcodes::JL
            | opcodes::JG
            | opcodes::JGE
            | opcodes::JLE
            | opcodes::CALL
            | opcodes::SPL
            | opcodes::LEA
            | opcodes::LOAD
            | opcodes::STORE
    );

    match opcode {
        opcodes::NOP | opcodes::RET | opcodes::HALT => {}
        opcodes::DAT => {
            let b = operands
                .get(0)
                .map(|v| resolve_operand_byte(v, symbols, errors, line_no))
                .unwrap_or(0);
            out.push(b);
        }
        _ if branch_family => {
            let target = operands
                .get(0)
                .map(|v| resolve_target_operand(v, symbols))
                .unwrap_or_else(|| {
                    errors.push(AsmError {
                        kind: AsmErrorKind::InvalidOperand,
                        line: line_no,
                        text: mnemonic.to_string(),
                    });
                    0
                });
            out.push((target & 0xff) as u8);
            out.push(((target >> 8) & 0xff) as u8);
        }
        opcodes::PUSH | opcodes::POP | opcodes::INC | opcodes::DEC | opcodes::NOT => {
            let a = operands
                .get(0)
                .map(|v| resolve_operand_byte(v, symbols, errors, line_no))
                .unwrap_or(0);
            out.push(a);
            out.push(0);
        }
        _ => {
            // two-operand src/dest instructions: MOV, XCHG, ADD, SUB,
            // MUL, DIV, AND, OR, XOR, CMP, TEST.
            if operands.len() < 2 {
                errors.push(AsmError {
                    kind: AsmErrorKind::InvalidOperand,
                    line: line_no,
                    text: mnemonic.to_string(),
                });
                out.push(0);
                out.push(0);
                return;
            }
            let src = resolve_operand_byte(&operands[0], symbols, errors, line_no);
            let dest = resolve_operand_byte(&operands[1], symbols, errors, line_no);
            out.push(src);
            out.push(dest);
        }
    }
}

fn mnemonic_to_opcode(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic.to_ascii_lowercase().as_str() {
        "nop" => opcodes::NOP,
        "mov" => opcodes::MOV,
        "xchg" => opcodes::XCHG,
        "add" => opcodes::ADD,
        "sub" => opcodes::SUB,
        "mul" => opcodes::MUL,
        "div" => opcodes::DIV,
        "jmp" => opcodes::JMP,
        "jz" => opcodes::JZ,
        "jnz" => opcodes::JNZ,
        "je" => opcodes::JE,
        "jne" => opcodes::JNE,
        "jl" => opcodes::JL,
        "jg" => opcodes::JG,
        "jge" => opcodes::JGE,
        "jle" => opcodes::JLE,
        "push" => opcodes::PUSH,
        "pop" => opcodes::POP,
        "call" => opcodes::CALL,
        "ret" => opcodes::RET,
        "and" => opcodes::AND,
        "or" => opcodes::OR,
        "xor" => opcodes::XOR,
        "not" => opcodes::NOT,
        "inc" => opcodes::INC,
        "dec" => opcodes::DEC,
        "cmp" => opcodes::CMP,
        "test" => opcodes::TEST,
        "lea" => opcodes::LEA,
        "load" => opcodes::LOAD,
        "store" => opcodes::STORE,
        "spl" => opcodes::SPL,
        "dat" => opcodes::DAT,
        "halt" => opcodes::HALT,
        _ => return None,
    })
}

/// disassembles one instruction at `pc`, mirroring the opcode table
/// (§4.B) in reverse; used for L2 and for the CLI's verbose mode.
pub fn disassemble_one(bytes: &[u8]) -> (String, usize) {
    if bytes.is_empty() {
        return ("".to_string(), 0);
    }
    let opcode = bytes[0];
    let size = opcodes::instruction_size(opcode) as usize;
    let name = opcodes::find_handler(opcode).map(|(_, n)| n).unwrap_or("db");
    let text = match size {
        1 => name.to_string(),
        2 => format!("{} {:#04x}", name, bytes.get(1).copied().unwrap_or(0)),
        _ => {
            let b1 = bytes.get(1).copied().unwrap_or(0);
            let b2 = bytes.get(2).copied().unwrap_or(0);
            format!("{} {:#04x}, {:#04x}", name, b1, b2)
        }
    };
    (text, size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_nop_trail() {
        let src = "start:\nnop\nnop\nhalt\n";
        let out = assemble(src);
        assert!(out.errors.is_empty());
        assert_eq!(out.segments[0].data, vec![opcodes::NOP, opcodes::NOP, opcodes::HALT]);
        assert_eq!(out.entry_point, 0);
    }

    #[test]
    fn empty_source_has_no_instructions_no_errors() {
        let out = assemble("");
        assert!(out.errors.is_empty());
        assert!(out.segments[0].data.is_empty());
    }

    #[test]
    fn unresolved_symbol_defaults_to_zero_not_an_error() {
        let out = assemble("jmp nowhere\n");
        assert!(out.errors.is_empty());
        assert_eq!(out.segments[0].data[1], 0);
        assert_eq!(out.segments[0].data[2], 0);
    }

    #[test]
    fn code_size_equ_resolves_post_emission_size() {
        let src = "start:\nnop\nnop\ncode_size equ $ - start\n";
        let out = assemble(src);
        assert_eq!(out.symbols.resolve("code_size"), 2);
    }

    #[test]
    fn unknown_mnemonic_is_an_invalid_instruction_error() {
        let out = assemble("frobnicate r0\n");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].kind, AsmErrorKind::InvalidInstruction);
    }

    #[test]
    fn org_directive_shifts_segment_start_and_symbols() {
        let out = assemble(".org 0x200\nstart:\nnop\nnop\nhalt\n");
        assert!(out.errors.is_empty());
        assert_eq!(out.segments[0].start, 0x200);
        assert_eq!(out.entry_point, 0x200);
        assert_eq!(out.symbols.resolve("start"), 0x200);
    }
}

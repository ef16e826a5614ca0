//! Binary module emission (§4.6, C7).
//!
//! No crate in this workspace's reference stack already encodes the Wasm
//! binary format, so this is hand-rolled against the format itself rather
//! than adapted from an existing encoder: a flat byte sink plus one
//! function per section, written in encounter order
//! (Type/Function/Table/Memory/Global/Export/Code), each prefixed with its
//! LEB128-encoded byte length the way every Wasm section is.
//!
//! The emitted module always has exactly one memory (min = max =
//! `Config::memory_pages`) and one `funcref` table (size
//! `Config::table_size`), and exports `main`, `mem`, `table`, and each
//! global as `global{N}`. No import or data section is ever emitted: every
//! value the generator needs is manufactured in-module by `ModuleContext`.

use alloc::vec::Vec;

use rulegen_core::{BlockType, Immediate, Instruction, ValueType};

use crate::module::{Function, Module};

const WASM_MAGIC: [u8; 4] = *b"\0asm";
const WASM_VERSION: [u8; 4] = [1, 0, 0, 0];

const SECTION_TYPE: u8 = 1;
const SECTION_FUNCTION: u8 = 3;
const SECTION_TABLE: u8 = 4;
const SECTION_MEMORY: u8 = 5;
const SECTION_GLOBAL: u8 = 6;
const SECTION_EXPORT: u8 = 7;
const SECTION_CODE: u8 = 10;

/// Encodes `module` as a complete `.wasm` binary.
pub fn emit_module(module: &Module) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&WASM_MAGIC);
    out.extend_from_slice(&WASM_VERSION);

    write_section(&mut out, SECTION_TYPE, &emit_type_section(module));
    write_section(&mut out, SECTION_FUNCTION, &emit_function_section(module));
    write_section(&mut out, SECTION_TABLE, &emit_table_section(module));
    write_section(&mut out, SECTION_MEMORY, &emit_memory_section(module));
    write_section(&mut out, SECTION_GLOBAL, &emit_global_section(module));
    write_section(&mut out, SECTION_EXPORT, &emit_export_section(module));
    write_section(&mut out, SECTION_CODE, &emit_code_section(module));
    out
}

fn write_section(out: &mut Vec<u8>, id: u8, body: &[u8]) {
    out.push(id);
    write_leb_u32(out, body.len() as u32);
    out.extend_from_slice(body);
}

fn emit_type_section(module: &Module) -> Vec<u8> {
    let mut body = Vec::new();
    write_leb_u32(&mut body, module.types.len() as u32);
    for ty in &module.types {
        body.push(0x60);
        write_leb_u32(&mut body, ty.params.len() as u32);
        for p in &ty.params {
            body.push(p.to_wasm_byte());
        }
        write_leb_u32(&mut body, ty.rets.len() as u32);
        for r in &ty.rets {
            body.push(r.to_wasm_byte());
        }
    }
    body
}

fn emit_function_section(module: &Module) -> Vec<u8> {
    let mut body = Vec::new();
    write_leb_u32(&mut body, module.funcs.len() as u32);
    for func in &module.funcs {
        let type_idx = module
            .types
            .iter()
            .position(|t| t.params == func.args && t.rets == func.body.rets)
            .unwrap_or(0);
        write_leb_u32(&mut body, type_idx as u32);
    }
    body
}

fn emit_table_section(module: &Module) -> Vec<u8> {
    let mut body = Vec::new();
    write_leb_u32(&mut body, 1);
    body.push(ValueType::FuncRef.to_wasm_byte());
    body.push(0x01);
    write_leb_u32(&mut body, module.table_size);
    write_leb_u32(&mut body, module.table_size);
    body
}

fn emit_memory_section(module: &Module) -> Vec<u8> {
    let mut body = Vec::new();
    write_leb_u32(&mut body, 1);
    body.push(0x01);
    write_leb_u32(&mut body, module.memory_pages);
    write_leb_u32(&mut body, module.memory_pages);
    body
}

fn emit_global_section(module: &Module) -> Vec<u8> {
    let mut body = Vec::new();
    write_leb_u32(&mut body, module.globals.len() as u32);
    for global in &module.globals {
        body.push(global.ty.to_wasm_byte());
        body.push(0x01);
        for instr in &global.init {
            emit_instruction(&mut body, instr);
        }
        body.push(0x0b);
    }
    body
}

fn emit_export_section(module: &Module) -> Vec<u8> {
    let mut body = Vec::new();
    let main_idx = module.funcs.iter().position(|f| f.is_main).unwrap_or(0);
    let mut count = 3u32 + module.globals.len() as u32;
    if module.funcs.is_empty() {
        count -= 1;
    }
    write_leb_u32(&mut body, count);
    if !module.funcs.is_empty() {
        write_export(&mut body, "main", 0x00, main_idx as u32);
    }
    write_export(&mut body, "mem", 0x02, 0);
    write_export(&mut body, "table", 0x01, 0);
    for (idx, _global) in module.globals.iter().enumerate() {
        let name = alloc::format!("global{idx}");
        write_export(&mut body, &name, 0x03, idx as u32);
    }
    body
}

fn write_export(body: &mut Vec<u8>, name: &str, kind: u8, idx: u32) {
    write_name(body, name);
    body.push(kind);
    write_leb_u32(body, idx);
}

fn write_name(body: &mut Vec<u8>, name: &str) {
    write_leb_u32(body, name.len() as u32);
    body.extend_from_slice(name.as_bytes());
}

fn emit_code_section(module: &Module) -> Vec<u8> {
    let mut body = Vec::new();
    write_leb_u32(&mut body, module.funcs.len() as u32);
    for func in &module.funcs {
        let func_body = emit_function_body(func);
        write_leb_u32(&mut body, func_body.len() as u32);
        body.extend_from_slice(&func_body);
    }
    body
}

fn emit_function_body(func: &Function) -> Vec<u8> {
    let mut body = Vec::new();
    let locals = run_length_encode_locals(&func.locals);
    write_leb_u32(&mut body, locals.len() as u32);
    for (count, ty) in locals {
        write_leb_u32(&mut body, count);
        body.push(ty.to_wasm_byte());
    }
    for record in &func.body.records {
        for instr in &record.instrs {
            emit_instruction(&mut body, instr);
        }
    }
    body.push(0x0b);
    body
}

fn run_length_encode_locals(locals: &[ValueType]) -> Vec<(u32, ValueType)> {
    let mut runs: Vec<(u32, ValueType)> = Vec::new();
    for ty in locals {
        match runs.last_mut() {
            Some((count, last_ty)) if last_ty == ty => *count += 1,
            _ => runs.push((1, *ty)),
        }
    }
    runs
}

fn opcode_byte(name: &str) -> Option<&'static [u8]> {
    OPCODE_TABLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, bytes)| *bytes)
}

fn emit_instruction(body: &mut Vec<u8>, instr: &Instruction) {
    if let Some(bytes) = opcode_byte(&instr.opcode) {
        body.extend_from_slice(bytes);
    } else {
        log::debug!("opcode `{}` has no binary encoding, skipping", instr.opcode);
        return;
    }
    for imm in &instr.immediates {
        emit_immediate(body, imm);
    }
}

fn emit_immediate(body: &mut Vec<u8>, imm: &Immediate) {
    match imm {
        Immediate::Index(i) => write_leb_u32(body, *i),
        Immediate::LaneIdx(i) => body.push(*i),
        Immediate::MemArg(m) => {
            write_leb_u32(body, m.align);
            write_leb_u32(body, m.offset);
        }
        Immediate::I32(v) => write_leb_i32(body, *v),
        Immediate::I64(v) => write_leb_i64(body, *v),
        Immediate::F32Bits(bits) => body.extend_from_slice(&bits.to_le_bytes()),
        Immediate::F64Bits(bits) => body.extend_from_slice(&bits.to_le_bytes()),
        Immediate::V128Bits(bits) => body.extend_from_slice(&bits.to_le_bytes()),
        Immediate::LaneIdx16(lanes) => body.extend_from_slice(lanes),
        Immediate::BlockType(bt) => emit_blocktype(body, bt),
        Immediate::RefType(ty) => body.push(ty.to_wasm_byte()),
        Immediate::Indices(indices) => {
            write_leb_u32(body, indices.len() as u32);
            for i in indices {
                write_leb_u32(body, *i);
            }
        }
    }
}

fn emit_blocktype(body: &mut Vec<u8>, bt: &BlockType) {
    match bt {
        BlockType::Empty => body.push(0x40),
        BlockType::Value(ty) => body.push(ty.to_wasm_byte()),
        BlockType::FuncType(idx) => write_leb_i64(body, *idx as i64),
    }
}

/// Mnemonic → opcode-byte-sequence table (§4.1): every opcode
/// [`rulegen_core::InstructionTable`] can catalogue has an entry here,
/// plus the structural/variable-access opcodes the frame generator emits
/// directly. Multi-byte SIMD opcodes carry the `0xfd` prefix plus their
/// LEB128 sub-opcode; bulk-memory/table opcodes carry `0xfc`; both encode
/// sub-opcodes above `0x7f` as two LEB128 bytes (`[n & 0x7f | 0x80, 0x01]`).
///
/// `drop.{ty}`/`select.{ty}` (the typed rule-system variants, see
/// `rulegen_core::table`) lower to the single untyped `drop`/`select`
/// opcode for numtypes, and to the explicit-type `select` form (`0x1c`
/// plus a one-element type vector) for `v128`/`funcref`/`externref`,
/// which `select`'s untyped encoding cannot represent.
const OPCODE_TABLE: &[(&str, &[u8])] = &[
    ("unreachable", &[0x00]),
    ("nop", &[0x01]),
    ("block", &[0x02]),
    ("loop", &[0x03]),
    ("if", &[0x04]),
    ("else", &[0x05]),
    ("end", &[0x0b]),
    ("br", &[0x0c]),
    ("br_if", &[0x0d]),
    ("br_table", &[0x0e]),
    ("return", &[0x0f]),
    ("call", &[0x10]),
    ("call_indirect", &[0x11]),
    ("drop", &[0x1a]),
    ("select", &[0x1b]),
    ("drop.i32", &[0x1a]),
    ("drop.i64", &[0x1a]),
    ("drop.f32", &[0x1a]),
    ("drop.f64", &[0x1a]),
    ("drop.v128", &[0x1a]),
    ("drop.funcref", &[0x1a]),
    ("drop.externref", &[0x1a]),
    ("select.i32", &[0x1b]),
    ("select.i64", &[0x1b]),
    ("select.f32", &[0x1b]),
    ("select.f64", &[0x1b]),
    ("select.v128", &[0x1c, 0x01, 0x7b]),
    ("select.funcref", &[0x1c, 0x01, 0x70]),
    ("select.externref", &[0x1c, 0x01, 0x6f]),
    ("local.get", &[0x20]),
    ("local.set", &[0x21]),
    ("local.tee", &[0x22]),
    ("global.get", &[0x23]),
    ("global.set", &[0x24]),
    ("table.get", &[0x25]),
    ("table.set", &[0x26]),
    // Memory access (§4.1): loads/stores plus `memory.size`/`memory.fill`/
    // `memory.copy`, whose reserved trailing memory-index byte(s) are baked
    // into the table since their signatures carry no immediates.
    ("i32.load", &[0x28]),
    ("i64.load", &[0x29]),
    ("f32.load", &[0x2a]),
    ("f64.load", &[0x2b]),
    ("i32.load8_s", &[0x2c]),
    ("i32.load8_u", &[0x2d]),
    ("i32.load16_s", &[0x2e]),
    ("i32.load16_u", &[0x2f]),
    ("i64.load8_s", &[0x30]),
    ("i64.load8_u", &[0x31]),
    ("i64.load16_s", &[0x32]),
    ("i64.load16_u", &[0x33]),
    ("i64.load32_s", &[0x34]),
    ("i64.load32_u", &[0x35]),
    ("i32.store", &[0x36]),
    ("i64.store", &[0x37]),
    ("f32.store", &[0x38]),
    ("f64.store", &[0x39]),
    ("i32.store8", &[0x3a]),
    ("i32.store16", &[0x3b]),
    ("i64.store8", &[0x3c]),
    ("i64.store16", &[0x3d]),
    ("i64.store32", &[0x3e]),
    ("memory.size", &[0x3f, 0x00]),
    ("memory.fill", &[0xfc, 0x0b, 0x00]),
    ("memory.copy", &[0xfc, 0x0a, 0x00, 0x00]),
    ("i32.const", &[0x41]),
    ("i64.const", &[0x42]),
    ("f32.const", &[0x43]),
    ("f64.const", &[0x44]),
    // i32 comparisons/arithmetic.
    ("i32.eqz", &[0x45]),
    ("i32.eq", &[0x46]),
    ("i32.ne", &[0x47]),
    ("i32.lt_s", &[0x48]),
    ("i32.lt_u", &[0x49]),
    ("i32.gt_s", &[0x4a]),
    ("i32.gt_u", &[0x4b]),
    ("i32.le_s", &[0x4c]),
    ("i32.le_u", &[0x4d]),
    ("i32.ge_s", &[0x4e]),
    ("i32.ge_u", &[0x4f]),
    // i64 comparisons.
    ("i64.eqz", &[0x50]),
    ("i64.eq", &[0x51]),
    ("i64.ne", &[0x52]),
    ("i64.lt_s", &[0x53]),
    ("i64.lt_u", &[0x54]),
    ("i64.gt_s", &[0x55]),
    ("i64.gt_u", &[0x56]),
    ("i64.le_s", &[0x57]),
    ("i64.le_u", &[0x58]),
    ("i64.ge_s", &[0x59]),
    ("i64.ge_u", &[0x5a]),
    // f32/f64 comparisons.
    ("f32.eq", &[0x5b]),
    ("f32.ne", &[0x5c]),
    ("f32.lt", &[0x5d]),
    ("f32.gt", &[0x5e]),
    ("f32.le", &[0x5f]),
    ("f32.ge", &[0x60]),
    ("f64.eq", &[0x61]),
    ("f64.ne", &[0x62]),
    ("f64.lt", &[0x63]),
    ("f64.gt", &[0x64]),
    ("f64.le", &[0x65]),
    ("f64.ge", &[0x66]),
    // i32 arithmetic.
    ("i32.clz", &[0x67]),
    ("i32.ctz", &[0x68]),
    ("i32.popcnt", &[0x69]),
    ("i32.add", &[0x6a]),
    ("i32.sub", &[0x6b]),
    ("i32.mul", &[0x6c]),
    ("i32.div_s", &[0x6d]),
    ("i32.div_u", &[0x6e]),
    ("i32.rem_s", &[0x6f]),
    ("i32.rem_u", &[0x70]),
    ("i32.and", &[0x71]),
    ("i32.or", &[0x72]),
    ("i32.xor", &[0x73]),
    ("i32.shl", &[0x74]),
    ("i32.shr_s", &[0x75]),
    ("i32.shr_u", &[0x76]),
    ("i32.rotl", &[0x77]),
    ("i32.rotr", &[0x78]),
    // i64 arithmetic.
    ("i64.clz", &[0x79]),
    ("i64.ctz", &[0x7a]),
    ("i64.popcnt", &[0x7b]),
    ("i64.add", &[0x7c]),
    ("i64.sub", &[0x7d]),
    ("i64.mul", &[0x7e]),
    ("i64.div_s", &[0x7f]),
    ("i64.div_u", &[0x80]),
    ("i64.rem_s", &[0x81]),
    ("i64.rem_u", &[0x82]),
    ("i64.and", &[0x83]),
    ("i64.or", &[0x84]),
    ("i64.xor", &[0x85]),
    ("i64.shl", &[0x86]),
    ("i64.shr_s", &[0x87]),
    ("i64.shr_u", &[0x88]),
    ("i64.rotl", &[0x89]),
    ("i64.rotr", &[0x8a]),
    // f32 arithmetic.
    ("f32.abs", &[0x8b]),
    ("f32.neg", &[0x8c]),
    ("f32.ceil", &[0x8d]),
    ("f32.floor", &[0x8e]),
    ("f32.trunc", &[0x8f]),
    ("f32.nearest", &[0x90]),
    ("f32.sqrt", &[0x91]),
    ("f32.add", &[0x92]),
    ("f32.sub", &[0x93]),
    ("f32.mul", &[0x94]),
    ("f32.div", &[0x95]),
    ("f32.min", &[0x96]),
    ("f32.max", &[0x97]),
    ("f32.copysign", &[0x98]),
    // f64 arithmetic.
    ("f64.abs", &[0x99]),
    ("f64.neg", &[0x9a]),
    ("f64.ceil", &[0x9b]),
    ("f64.floor", &[0x9c]),
    ("f64.trunc", &[0x9d]),
    ("f64.nearest", &[0x9e]),
    ("f64.sqrt", &[0x9f]),
    ("f64.add", &[0xa0]),
    ("f64.sub", &[0xa1]),
    ("f64.mul", &[0xa2]),
    ("f64.div", &[0xa3]),
    ("f64.min", &[0xa4]),
    ("f64.max", &[0xa5]),
    ("f64.copysign", &[0xa6]),
    // Conversions.
    ("i32.wrap_i64", &[0xa7]),
    ("i32.trunc_f32_s", &[0xa8]),
    ("i32.trunc_f32_u", &[0xa9]),
    ("i32.trunc_f64_s", &[0xaa]),
    ("i32.trunc_f64_u", &[0xab]),
    ("i64.extend_i32_s", &[0xac]),
    ("i64.extend_i32_u", &[0xad]),
    ("i64.trunc_f32_s", &[0xae]),
    ("i64.trunc_f32_u", &[0xaf]),
    ("i64.trunc_f64_s", &[0xb0]),
    ("i64.trunc_f64_u", &[0xb1]),
    ("f32.convert_i32_s", &[0xb2]),
    ("f32.convert_i32_u", &[0xb3]),
    ("f32.convert_i64_s", &[0xb4]),
    ("f32.convert_i64_u", &[0xb5]),
    ("f32.demote_f64", &[0xb6]),
    ("f64.convert_i32_s", &[0xb7]),
    ("f64.convert_i32_u", &[0xb8]),
    ("f64.convert_i64_s", &[0xb9]),
    ("f64.convert_i64_u", &[0xba]),
    ("f64.promote_f32", &[0xbb]),
    ("i32.reinterpret_f32", &[0xbc]),
    ("i64.reinterpret_f64", &[0xbd]),
    ("f32.reinterpret_i32", &[0xbe]),
    ("f64.reinterpret_i64", &[0xbf]),
    ("i32.extend8_s", &[0xc0]),
    ("i32.extend16_s", &[0xc1]),
    ("i64.extend8_s", &[0xc2]),
    ("i64.extend16_s", &[0xc3]),
    ("i64.extend32_s", &[0xc4]),
    // Reference types.
    ("ref.null", &[0xd0]),
    ("ref.null.func", &[0xd0, 0x70]),
    ("ref.null.extern", &[0xd0, 0x6f]),
    ("ref.is_null", &[0xd1]),
    ("ref.is_null.func", &[0xd1]),
    ("ref.is_null.extern", &[0xd1]),
    ("ref.func", &[0xd2]),
    // Saturating truncation.
    ("i32.trunc_sat_f32_s", &[0xfc, 0x00]),
    ("i32.trunc_sat_f32_u", &[0xfc, 0x01]),
    ("i32.trunc_sat_f64_s", &[0xfc, 0x02]),
    ("i32.trunc_sat_f64_u", &[0xfc, 0x03]),
    ("i64.trunc_sat_f32_s", &[0xfc, 0x04]),
    ("i64.trunc_sat_f32_u", &[0xfc, 0x05]),
    ("i64.trunc_sat_f64_s", &[0xfc, 0x06]),
    ("i64.trunc_sat_f64_u", &[0xfc, 0x07]),
    // Bulk memory / table ops.
    ("memory.init", &[0xfc, 0x08]),
    ("data.drop", &[0xfc, 0x09]),
    ("table.init", &[0xfc, 0x0c]),
    ("elem.drop", &[0xfc, 0x0d]),
    ("table.copy", &[0xfc, 0x0e]),
    ("table.grow", &[0xfc, 0x0f]),
    ("table.size", &[0xfc, 0x10]),
    ("table.fill", &[0xfc, 0x11]),
    // SIMD: loads, const, bitwise, shuffle/swizzle.
    ("v128.load", &[0xfd, 0x00]),
    ("i8x16.load8x8_s", &[0xfd, 0x01]),
    ("i8x16.load8x8_u", &[0xfd, 0x02]),
    ("i16x8.load16x4_s", &[0xfd, 0x03]),
    ("i16x8.load16x4_u", &[0xfd, 0x04]),
    ("i32x4.load32x2_s", &[0xfd, 0x05]),
    ("i32x4.load32x2_u", &[0xfd, 0x06]),
    ("v128.load8_splat", &[0xfd, 0x07]),
    ("v128.load16_splat", &[0xfd, 0x08]),
    ("v128.load32_splat", &[0xfd, 0x09]),
    ("v128.load64_splat", &[0xfd, 0x0a]),
    ("v128.store", &[0xfd, 0x0b]),
    ("v128.const", &[0xfd, 0x0c]),
    ("i8x16.shuffle", &[0xfd, 0x0d]),
    ("i8x16.swizzle", &[0xfd, 0x0e]),
    ("i8x16.splat", &[0xfd, 0x0f]),
    ("i16x8.splat", &[0xfd, 0x10]),
    ("i32x4.splat", &[0xfd, 0x11]),
    ("i64x2.splat", &[0xfd, 0x12]),
    ("f32x4.splat", &[0xfd, 0x13]),
    ("f64x2.splat", &[0xfd, 0x14]),
    // `extract_lane` on the 8/16-bit shapes picks the unsigned form (the
    // rule-system signature carries no signedness; `_u` round-trips every
    // value the `_s` form would, just zero- rather than sign-extended).
    ("i8x16.extract_lane", &[0xfd, 0x16]),
    ("i8x16.replace_lane", &[0xfd, 0x17]),
    ("i16x8.extract_lane", &[0xfd, 0x19]),
    ("i16x8.replace_lane", &[0xfd, 0x1a]),
    ("i32x4.extract_lane", &[0xfd, 0x1b]),
    ("i32x4.replace_lane", &[0xfd, 0x1c]),
    ("i64x2.extract_lane", &[0xfd, 0x1d]),
    ("i64x2.replace_lane", &[0xfd, 0x1e]),
    ("f32x4.extract_lane", &[0xfd, 0x1f]),
    ("f32x4.replace_lane", &[0xfd, 0x20]),
    ("f64x2.extract_lane", &[0xfd, 0x21]),
    ("f64x2.replace_lane", &[0xfd, 0x22]),
    ("i8x16.eq", &[0xfd, 0x23]),
    ("i8x16.ne", &[0xfd, 0x24]),
    ("i16x8.eq", &[0xfd, 0x2d]),
    ("i16x8.ne", &[0xfd, 0x2e]),
    ("i32x4.eq", &[0xfd, 0x37]),
    ("i32x4.ne", &[0xfd, 0x38]),
    ("f32x4.eq", &[0xfd, 0x41]),
    ("f32x4.ne", &[0xfd, 0x42]),
    ("f64x2.eq", &[0xfd, 0x47]),
    ("f64x2.ne", &[0xfd, 0x48]),
    ("v128.not", &[0xfd, 0x4d]),
    ("v128.and", &[0xfd, 0x4e]),
    ("v128.andnot", &[0xfd, 0x4f]),
    ("v128.or", &[0xfd, 0x50]),
    ("v128.xor", &[0xfd, 0x51]),
    ("v128.bitselect", &[0xfd, 0x52]),
    ("v128.any_true", &[0xfd, 0x53]),
    ("v128.load8_lane", &[0xfd, 0x54]),
    ("v128.load16_lane", &[0xfd, 0x55]),
    ("v128.load32_lane", &[0xfd, 0x56]),
    ("v128.load64_lane", &[0xfd, 0x57]),
    ("v128.store8_lane", &[0xfd, 0x58]),
    ("v128.store16_lane", &[0xfd, 0x59]),
    ("v128.store32_lane", &[0xfd, 0x5a]),
    ("v128.store64_lane", &[0xfd, 0x5b]),
    ("v128.load32_zero", &[0xfd, 0x5c]),
    ("v128.load64_zero", &[0xfd, 0x5d]),
    ("f32x4.demote_f64x2_zero", &[0xfd, 0x5e]),
    ("f64x2.promote_low_f32x4", &[0xfd, 0x5f]),
    ("i8x16.all_true", &[0xfd, 0x63]),
    ("i8x16.bitmask", &[0xfd, 0x64]),
    ("f32x4.ceil", &[0xfd, 0x67]),
    ("f32x4.floor", &[0xfd, 0x68]),
    ("f32x4.trunc", &[0xfd, 0x69]),
    ("f32x4.nearest", &[0xfd, 0x6a]),
    ("i8x16.shl", &[0xfd, 0x6b]),
    ("i8x16.shr_s", &[0xfd, 0x6c]),
    ("i8x16.shr_u", &[0xfd, 0x6d]),
    ("i8x16.add", &[0xfd, 0x6e]),
    ("i8x16.sub", &[0xfd, 0x71]),
    ("f64x2.ceil", &[0xfd, 0x74]),
    ("f64x2.floor", &[0xfd, 0x75]),
    ("i8x16.min_s", &[0xfd, 0x76]),
    ("i8x16.min_u", &[0xfd, 0x77]),
    ("i8x16.max_s", &[0xfd, 0x78]),
    ("i8x16.max_u", &[0xfd, 0x79]),
    ("f64x2.trunc", &[0xfd, 0x7a]),
    ("i16x8.all_true", &[0xfd, 0x83, 0x01]),
    ("i16x8.bitmask", &[0xfd, 0x84, 0x01]),
    ("i16x8.shl", &[0xfd, 0x8b, 0x01]),
    ("i16x8.shr_s", &[0xfd, 0x8c, 0x01]),
    ("i16x8.shr_u", &[0xfd, 0x8d, 0x01]),
    ("i16x8.add", &[0xfd, 0x8e, 0x01]),
    ("i16x8.sub", &[0xfd, 0x91, 0x01]),
    ("f64x2.nearest", &[0xfd, 0x94, 0x01]),
    ("i16x8.min_s", &[0xfd, 0x96, 0x01]),
    ("i16x8.min_u", &[0xfd, 0x97, 0x01]),
    ("i16x8.max_s", &[0xfd, 0x98, 0x01]),
    ("i16x8.max_u", &[0xfd, 0x99, 0x01]),
    ("i32x4.all_true", &[0xfd, 0xa3, 0x01]),
    ("i32x4.bitmask", &[0xfd, 0xa4, 0x01]),
    ("i32x4.shl", &[0xfd, 0xab, 0x01]),
    ("i32x4.shr_s", &[0xfd, 0xac, 0x01]),
    ("i32x4.shr_u", &[0xfd, 0xad, 0x01]),
    ("i32x4.add", &[0xfd, 0xae, 0x01]),
    ("i32x4.sub", &[0xfd, 0xb1, 0x01]),
    ("i32x4.min_s", &[0xfd, 0xb6, 0x01]),
    ("i32x4.min_u", &[0xfd, 0xb7, 0x01]),
    ("i32x4.max_s", &[0xfd, 0xb8, 0x01]),
    ("i32x4.max_u", &[0xfd, 0xb9, 0x01]),
    ("i32x4.dot_i16x8_s", &[0xfd, 0xba, 0x01]),
    ("i64x2.eq", &[0xfd, 0xd6, 0x01]),
    ("i64x2.ne", &[0xfd, 0xd7, 0x01]),
    ("i64x2.all_true", &[0xfd, 0xc3, 0x01]),
    ("i64x2.bitmask", &[0xfd, 0xc4, 0x01]),
    ("i64x2.add", &[0xfd, 0xce, 0x01]),
    ("i64x2.sub", &[0xfd, 0xd1, 0x01]),
    ("f32x4.abs", &[0xfd, 0xe0, 0x01]),
    ("f32x4.neg", &[0xfd, 0xe1, 0x01]),
    ("f32x4.sqrt", &[0xfd, 0xe3, 0x01]),
    ("f32x4.add", &[0xfd, 0xe4, 0x01]),
    ("f32x4.sub", &[0xfd, 0xe5, 0x01]),
    ("f32x4.mul", &[0xfd, 0xe6, 0x01]),
    ("f32x4.div", &[0xfd, 0xe7, 0x01]),
    ("f32x4.min", &[0xfd, 0xe8, 0x01]),
    ("f32x4.max", &[0xfd, 0xe9, 0x01]),
    ("f32x4.pmin", &[0xfd, 0xea, 0x01]),
    ("f32x4.pmax", &[0xfd, 0xeb, 0x01]),
    ("f64x2.abs", &[0xfd, 0xec, 0x01]),
    ("f64x2.neg", &[0xfd, 0xed, 0x01]),
    ("f64x2.sqrt", &[0xfd, 0xef, 0x01]),
    ("f64x2.add", &[0xfd, 0xf0, 0x01]),
    ("f64x2.sub", &[0xfd, 0xf1, 0x01]),
    ("f64x2.mul", &[0xfd, 0xf2, 0x01]),
    ("f64x2.div", &[0xfd, 0xf3, 0x01]),
    ("f64x2.min", &[0xfd, 0xf4, 0x01]),
    ("f64x2.max", &[0xfd, 0xf5, 0x01]),
    ("f64x2.pmin", &[0xfd, 0xf6, 0x01]),
    ("f64x2.pmax", &[0xfd, 0xf7, 0x01]),
];

fn write_leb_u32(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn write_leb_i32(out: &mut Vec<u8>, value: i32) {
    write_leb_i64(out, value as i64);
}

fn write_leb_i64(out: &mut Vec<u8>, value: i64) {
    let mut value = value;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_magic_then_version() {
        let module = crate::module::Module {
            types: Vec::new(),
            funcs: Vec::new(),
            globals: Vec::new(),
            memory_pages: 1,
            table_size: 1,
            mem_params: Vec::new(),
            table_params: Vec::new(),
        };
        let bytes = emit_module(&module);
        assert_eq!(&bytes[0..4], b"\0asm");
        assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
    }

    #[test]
    fn leb_u32_roundtrips_small_values() {
        let mut buf = Vec::new();
        write_leb_u32(&mut buf, 300);
        assert_eq!(buf, alloc::vec![0xac, 0x02]);
    }

    #[test]
    fn leb_i64_encodes_negative_one_in_one_byte() {
        let mut buf = Vec::new();
        write_leb_i64(&mut buf, -1);
        assert_eq!(buf, alloc::vec![0x7f]);
    }

    #[test]
    fn every_catalogued_opcode_has_a_binary_encoding() {
        let table = rulegen_core::InstructionTable::new();
        let missing: Vec<&str> = table.opcodes().filter(|op| opcode_byte(op).is_none()).collect();
        assert!(missing.is_empty(), "opcodes with no encoding: {missing:?}");
    }

    #[test]
    fn typed_drop_and_select_lower_to_their_untyped_opcode() {
        assert_eq!(opcode_byte("drop.i64"), opcode_byte("drop"));
        assert_eq!(opcode_byte("select.f32"), opcode_byte("select"));
        assert_eq!(opcode_byte("select.v128"), Some(&[0x1c, 0x01, 0x7b][..]));
        assert_eq!(opcode_byte("select.funcref"), Some(&[0x1c, 0x01, 0x70][..]));
    }

    #[test]
    fn memory_section_has_min_equal_max() {
        let module = crate::module::Module {
            types: Vec::new(),
            funcs: Vec::new(),
            globals: Vec::new(),
            memory_pages: 4,
            table_size: 1,
            mem_params: Vec::new(),
            table_params: Vec::new(),
        };
        let body = emit_memory_section(&module);
        assert_eq!(body[1], 0x01);
        assert_eq!(body[2], 4);
        assert_eq!(body[3], 4);
    }
}

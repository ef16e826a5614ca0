//! The static instruction catalog (§4.1).
//!
//! `InstructionTable` is the read-only dictionary every other component
//! consults to learn an opcode's stack effect and immediate-operand
//! schema. It never changes after construction, so `RuleStore` and the
//! frame generator can both hold a shared reference to one instance for
//! the lifetime of a generation run.

use crate::instr::OperandKind;
use crate::value::ValueType;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use ValueType::{ExternRef, FuncRef, F32, F64, I32, I64, V128};

/// The input types, output type (if any), and immediate-operand schema of
/// one opcode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionSignature {
    pub inputs: Vec<ValueType>,
    pub output: Option<ValueType>,
    pub immediates: Vec<OperandKind>,
}

impl InstructionSignature {
    fn new(inputs: Vec<ValueType>, output: Option<ValueType>, immediates: Vec<OperandKind>) -> Self {
        Self {
            inputs,
            output,
            immediates,
        }
    }
}

/// Opcodes excluded from synthesis: non-deterministic or no observable
/// value (§4.1).
pub const BLOCKED_OPCODES: &[&str] = &[
    "memory.grow",
    "memory.init",
    "data.drop",
    "elem.drop",
    "table.init",
    "table.grow",
];

/// Terminal opcodes whose result may carry a non-canonical NaN payload and
/// therefore require the canonicalization gadget (§4.5 step 6, §3
/// "Canonicalization").
pub const NAN_PRODUCING_OPCODES: &[&str] = &[
    "f32.add",
    "f32.sub",
    "f32.mul",
    "f32.div",
    "f32.sqrt",
    "f32.min",
    "f32.max",
    "f64.add",
    "f64.sub",
    "f64.mul",
    "f64.div",
    "f64.sqrt",
    "f64.min",
    "f64.max",
    "f32x4.add",
    "f32x4.sub",
    "f32x4.mul",
    "f32x4.div",
    "f32x4.sqrt",
    "f32x4.min",
    "f32x4.max",
    "f64x2.add",
    "f64x2.sub",
    "f64x2.mul",
    "f64x2.div",
    "f64x2.sqrt",
    "f64x2.min",
    "f64x2.max",
    "f64x2.promote_low_f32x4",
    "f32x4.demote_f64x2_zero",
];

/// A read-only catalog of opcode signatures.
#[derive(Debug)]
pub struct InstructionTable {
    signatures: BTreeMap<String, InstructionSignature>,
    align_candidates: BTreeMap<String, Vec<u32>>,
}

macro_rules! ins {
    ($table:ident, $name:expr, [$($in:expr),*], $out:expr, [$($imm:expr),*]) => {
        $table.insert(
            alloc::string::ToString::to_string($name),
            InstructionSignature::new(vec![$($in),*], $out, vec![$($imm),*]),
        );
    };
}

impl InstructionTable {
    /// Builds the full catalog used by default generation runs: numeric,
    /// parametric, variable-access, memory, table, reference, and SIMD
    /// opcodes. Structured control-flow opcodes (`block`, `loop`, `if`,
    /// `else`, `end`, `br*`, `call*`) are *not* catalogued here: the
    /// frame generator (§4.5) emits them directly because their stack
    /// effect depends on the frame they open or close, not a fixed
    /// signature.
    pub fn new() -> Self {
        let mut signatures = BTreeMap::new();
        Self::insert_numeric(&mut signatures);
        Self::insert_parametric_and_variable(&mut signatures);
        Self::insert_memory(&mut signatures);
        Self::insert_table_and_reference(&mut signatures);
        Self::insert_simd(&mut signatures);
        for blocked in BLOCKED_OPCODES {
            signatures.remove(*blocked);
        }
        let align_candidates = Self::build_align_candidates();
        Self {
            signatures,
            align_candidates,
        }
    }

    pub fn get(&self, opcode: &str) -> Option<&InstructionSignature> {
        self.signatures.get(opcode)
    }

    pub fn contains(&self, opcode: &str) -> bool {
        self.signatures.contains_key(opcode)
    }

    pub fn opcodes(&self) -> impl Iterator<Item = &str> {
        self.signatures.keys().map(String::as_str)
    }

    /// All opcodes whose output type matches `ty` (`None` selects
    /// `noout` opcodes: stores and other stack-effect-only instructions).
    pub fn opcodes_with_output(&self, ty: Option<ValueType>) -> Vec<&str> {
        self.signatures
            .iter()
            .filter(|(_, sig)| sig.output == ty)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn align_candidates(&self, opcode: &str) -> Option<&[u32]> {
        self.align_candidates.get(opcode).map(Vec::as_slice)
    }

    pub fn immediates(&self, opcode: &str) -> Option<&[OperandKind]> {
        self.signatures.get(opcode).map(|sig| sig.immediates.as_slice())
    }

    fn insert_numeric(t: &mut BTreeMap<String, InstructionSignature>) {
        ins!(t, "i32.const", [], Some(I32), [OperandKind::I32]);
        ins!(t, "i64.const", [], Some(I64), [OperandKind::I64]);
        ins!(t, "f32.const", [], Some(F32), [OperandKind::F32]);
        ins!(t, "f64.const", [], Some(F64), [OperandKind::F64]);

        for (ty, ops) in [
            (I32, &["clz", "ctz", "popcnt", "eqz"][..]),
            (I64, &["clz", "ctz", "popcnt", "eqz"][..]),
        ] {
            for op in ops {
                let out = if *op == "eqz" { I32 } else { ty };
                ins!(t, &alloc::format!("{ty}.{op}"), [ty], Some(out), []);
            }
        }
        for ty in [I32, I64] {
            for op in [
                "add", "sub", "mul", "div_s", "div_u", "rem_s", "rem_u", "and", "or", "xor",
                "shl", "shr_s", "shr_u", "rotl", "rotr",
            ] {
                ins!(t, &alloc::format!("{ty}.{op}"), [ty, ty], Some(ty), []);
            }
            for op in ["eq", "ne", "lt_s", "lt_u", "gt_s", "gt_u", "le_s", "le_u", "ge_s", "ge_u"] {
                ins!(t, &alloc::format!("{ty}.{op}"), [ty, ty], Some(I32), []);
            }
        }
        for ty in [F32, F64] {
            for op in ["abs", "neg", "ceil", "floor", "trunc", "nearest", "sqrt"] {
                ins!(t, &alloc::format!("{ty}.{op}"), [ty], Some(ty), []);
            }
            for op in ["add", "sub", "mul", "div", "min", "max", "copysign"] {
                ins!(t, &alloc::format!("{ty}.{op}"), [ty, ty], Some(ty), []);
            }
            for op in ["eq", "ne", "lt", "gt", "le", "ge"] {
                ins!(t, &alloc::format!("{ty}.{op}"), [ty, ty], Some(I32), []);
            }
        }

        // Conversions.
        ins!(t, "i32.wrap_i64", [I64], Some(I32), []);
        for op in ["trunc_f32_s", "trunc_f32_u"] {
            ins!(t, &alloc::format!("i32.{op}"), [F32], Some(I32), []);
        }
        for op in ["trunc_f64_s", "trunc_f64_u"] {
            ins!(t, &alloc::format!("i32.{op}"), [F64], Some(I32), []);
        }
        for op in ["extend_i32_s", "extend_i32_u"] {
            ins!(t, &alloc::format!("i64.{op}"), [I32], Some(I64), []);
        }
        for op in ["trunc_f32_s", "trunc_f32_u"] {
            ins!(t, &alloc::format!("i64.{op}"), [F32], Some(I64), []);
        }
        for op in ["trunc_f64_s", "trunc_f64_u"] {
            ins!(t, &alloc::format!("i64.{op}"), [F64], Some(I64), []);
        }
        for op in ["convert_i32_s", "convert_i32_u"] {
            ins!(t, &alloc::format!("f32.{op}"), [I32], Some(F32), []);
        }
        for op in ["convert_i64_s", "convert_i64_u"] {
            ins!(t, &alloc::format!("f32.{op}"), [I64], Some(F32), []);
        }
        ins!(t, "f32.demote_f64", [F64], Some(F32), []);
        for op in ["convert_i32_s", "convert_i32_u"] {
            ins!(t, &alloc::format!("f64.{op}"), [I32], Some(F64), []);
        }
        for op in ["convert_i64_s", "convert_i64_u"] {
            ins!(t, &alloc::format!("f64.{op}"), [I64], Some(F64), []);
        }
        ins!(t, "f64.promote_f32", [F32], Some(F64), []);
        ins!(t, "i32.reinterpret_f32", [F32], Some(I32), []);
        ins!(t, "i64.reinterpret_f64", [F64], Some(I64), []);
        ins!(t, "f32.reinterpret_i32", [I32], Some(F32), []);
        ins!(t, "f64.reinterpret_i64", [I64], Some(F64), []);
        ins!(t, "i32.extend8_s", [I32], Some(I32), []);
        ins!(t, "i32.extend16_s", [I32], Some(I32), []);
        ins!(t, "i64.extend8_s", [I64], Some(I64), []);
        ins!(t, "i64.extend16_s", [I64], Some(I64), []);
        ins!(t, "i64.extend32_s", [I64], Some(I64), []);
        for op in ["trunc_sat_f32_s", "trunc_sat_f32_u"] {
            ins!(t, &alloc::format!("i32.{op}"), [F32], Some(I32), []);
        }
        for op in ["trunc_sat_f64_s", "trunc_sat_f64_u"] {
            ins!(t, &alloc::format!("i32.{op}"), [F64], Some(I32), []);
        }
        for op in ["trunc_sat_f32_s", "trunc_sat_f32_u"] {
            ins!(t, &alloc::format!("i64.{op}"), [F32], Some(I64), []);
        }
        for op in ["trunc_sat_f64_s", "trunc_sat_f64_u"] {
            ins!(t, &alloc::format!("i64.{op}"), [F64], Some(I64), []);
        }
    }

    /// `drop`/`select` are catalogued here because they are ordinary
    /// value-producing/consuming opcodes the rule-based path can target.
    /// `local.*`/`global.*` access is deliberately *not* catalogued: the
    /// frame generator's `gen_var` path (§4.5 step 3) allocates and
    /// accesses locals/globals directly against `ModuleContext`, since
    /// which local or global is read depends on generation-time state a
    /// static table cannot express. The `.{ty}` suffix on `drop`/`select`
    /// disambiguates our internal per-type rule variants; the emitter's
    /// opcode table carries a direct encoding for every suffixed name:
    /// every `drop.*` encodes to the single untyped `drop` opcode, and
    /// `select.*` encodes to the plain untyped `select` for numtypes or
    /// the explicit-type `select` form for `v128`/`funcref`/`externref`,
    /// which the untyped opcode cannot represent.
    fn insert_parametric_and_variable(t: &mut BTreeMap<String, InstructionSignature>) {
        ins!(t, "nop", [], None, []);
        for ty in ValueType::ALL {
            ins!(t, &alloc::format!("drop.{ty}"), [ty], None, []);
            ins!(t, &alloc::format!("select.{ty}"), [ty, ty, I32], Some(ty), []);
        }
    }

    fn insert_memory(t: &mut BTreeMap<String, InstructionSignature>) {
        for (op, ty) in [
            ("i32.load", I32),
            ("i32.load8_s", I32),
            ("i32.load8_u", I32),
            ("i32.load16_s", I32),
            ("i32.load16_u", I32),
            ("i64.load", I64),
            ("i64.load8_s", I64),
            ("i64.load8_u", I64),
            ("i64.load16_s", I64),
            ("i64.load16_u", I64),
            ("i64.load32_s", I64),
            ("i64.load32_u", I64),
            ("f32.load", F32),
            ("f64.load", F64),
        ] {
            ins!(t, op, [I32], Some(ty), [OperandKind::MemArg]);
        }
        for (op, ty) in [
            ("i32.store", I32),
            ("i32.store8", I32),
            ("i32.store16", I32),
            ("i64.store", I64),
            ("i64.store8", I64),
            ("i64.store16", I64),
            ("i64.store32", I64),
            ("f32.store", F32),
            ("f64.store", F64),
        ] {
            ins!(t, op, [I32, ty], None, [OperandKind::MemArg]);
        }
        ins!(t, "memory.size", [], Some(I32), []);
        ins!(t, "memory.grow", [I32], Some(I32), []);
        ins!(t, "memory.fill", [I32, I32, I32], None, []);
        ins!(t, "memory.copy", [I32, I32, I32], None, []);
    }

    fn insert_table_and_reference(t: &mut BTreeMap<String, InstructionSignature>) {
        ins!(t, "table.get", [I32], Some(FuncRef), [OperandKind::TableIdx]);
        ins!(t, "table.set", [I32, FuncRef], None, [OperandKind::TableIdx]);
        ins!(t, "table.size", [], Some(I32), [OperandKind::TableIdx]);
        ins!(t, "table.grow", [FuncRef, I32], Some(I32), [OperandKind::TableIdx]);
        ins!(t, "table.fill", [I32, FuncRef, I32], None, [OperandKind::TableIdx]);
        ins!(t, "table.copy", [I32, I32, I32], None, [OperandKind::TableIdx, OperandKind::TableIdx]);
        ins!(t, "ref.null.func", [], Some(FuncRef), []);
        ins!(t, "ref.null.extern", [], Some(ExternRef), []);
        ins!(t, "ref.is_null.func", [FuncRef], Some(I32), []);
        ins!(t, "ref.is_null.extern", [ExternRef], Some(I32), []);
        ins!(t, "ref.func", [], Some(FuncRef), [OperandKind::FuncIdx]);
    }

    fn insert_simd(t: &mut BTreeMap<String, InstructionSignature>) {
        ins!(t, "v128.const", [], Some(V128), [OperandKind::Byte16]);
        ins!(t, "v128.load", [I32], Some(V128), [OperandKind::MemArg]);
        ins!(t, "v128.store", [I32, V128], None, [OperandKind::MemArg]);
        for op in ["v128.not"] {
            ins!(t, op, [V128], Some(V128), []);
        }
        for op in ["v128.and", "v128.andnot", "v128.or", "v128.xor"] {
            ins!(t, op, [V128, V128], Some(V128), []);
        }
        ins!(t, "v128.bitselect", [V128, V128, V128], Some(V128), []);
        ins!(t, "v128.any_true", [V128], Some(I32), []);
        ins!(t, "i8x16.shuffle", [V128, V128], Some(V128), [OperandKind::LaneIdx16]);
        ins!(t, "i8x16.swizzle", [V128, V128], Some(V128), []);

        for shape in ["i8x16", "i16x8", "i32x4", "i64x2", "f32x4", "f64x2"] {
            ins!(t, &alloc::format!("{shape}.splat"), [Self::lane_scalar_ty(shape)], Some(V128), []);
            ins!(
                t,
                &alloc::format!("{shape}.extract_lane"),
                [V128],
                Some(Self::lane_scalar_ty(shape)),
                [OperandKind::LaneIdx]
            );
            ins!(
                t,
                &alloc::format!("{shape}.replace_lane"),
                [V128, Self::lane_scalar_ty(shape)],
                Some(V128),
                [OperandKind::LaneIdx]
            );
            ins!(t, &alloc::format!("{shape}.eq"), [V128, V128], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.ne"), [V128, V128], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.add"), [V128, V128], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.sub"), [V128, V128], Some(V128), []);
            // `all_true`/`bitmask` exist for every integer shape (including
            // `i64x2`) but not for `f32x4`/`f64x2`: floats have no boolean
            // lane interpretation in the SIMD proposal.
            if shape != "f32x4" && shape != "f64x2" {
                ins!(t, &alloc::format!("{shape}.all_true"), [V128], Some(I32), []);
                ins!(t, &alloc::format!("{shape}.bitmask"), [V128], Some(I32), []);
            }
        }
        for shape in ["i8x16", "i16x8", "i32x4"] {
            ins!(t, &alloc::format!("{shape}.shl"), [V128, I32], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.shr_s"), [V128, I32], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.shr_u"), [V128, I32], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.min_s"), [V128, V128], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.min_u"), [V128, V128], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.max_s"), [V128, V128], Some(V128), []);
            ins!(t, &alloc::format!("{shape}.max_u"), [V128, V128], Some(V128), []);
        }
        for shape in ["f32x4", "f64x2"] {
            for op in ["abs", "neg", "sqrt", "ceil", "floor", "trunc", "nearest"] {
                ins!(t, &alloc::format!("{shape}.{op}"), [V128], Some(V128), []);
            }
            for op in ["mul", "div", "min", "max", "pmin", "pmax"] {
                ins!(t, &alloc::format!("{shape}.{op}"), [V128, V128], Some(V128), []);
            }
        }
        ins!(t, "f64x2.promote_low_f32x4", [V128], Some(V128), []);
        ins!(t, "f32x4.demote_f64x2_zero", [V128], Some(V128), []);
        ins!(t, "i32x4.dot_i16x8_s", [V128, V128], Some(V128), []);
        for op in [
            "i8x16.load8x8_s",
            "i8x16.load8x8_u",
            "i16x8.load16x4_s",
            "i16x8.load16x4_u",
            "i32x4.load32x2_s",
            "i32x4.load32x2_u",
        ] {
            ins!(t, op, [I32], Some(V128), [OperandKind::MemArg]);
        }
        for n in [8, 16, 32, 64] {
            ins!(
                t,
                &alloc::format!("v128.load{n}_splat"),
                [I32],
                Some(V128),
                [OperandKind::MemArg]
            );
            ins!(
                t,
                &alloc::format!("v128.load{n}_lane"),
                [I32, V128],
                Some(V128),
                [OperandKind::MemArg, OperandKind::LaneIdx]
            );
            ins!(
                t,
                &alloc::format!("v128.store{n}_lane"),
                [I32, V128],
                None,
                [OperandKind::MemArg, OperandKind::LaneIdx]
            );
        }
        ins!(t, "v128.load32_zero", [I32], Some(V128), [OperandKind::MemArg]);
        ins!(t, "v128.load64_zero", [I32], Some(V128), [OperandKind::MemArg]);
    }

    fn lane_scalar_ty(shape: &str) -> ValueType {
        match shape {
            "i8x16" | "i16x8" | "i32x4" => I32,
            "i64x2" => I64,
            "f32x4" => F32,
            "f64x2" => F64,
            _ => unreachable!("unknown SIMD shape {shape}"),
        }
    }

    fn build_align_candidates() -> BTreeMap<String, Vec<u32>> {
        let mut m = BTreeMap::new();
        let one_byte = vec![0];
        let two_byte = vec![0, 1];
        let four_byte = vec![0, 1, 2];
        let eight_byte = vec![0, 1, 2, 3];
        let sixteen_byte = vec![0, 1, 2, 3, 4];
        for op in ["i32.load8_s", "i32.load8_u", "i64.load8_s", "i64.load8_u", "i32.store8", "i64.store8"] {
            m.insert(String::from(op), one_byte.clone());
        }
        for op in [
            "i32.load16_s",
            "i32.load16_u",
            "i64.load16_s",
            "i64.load16_u",
            "i32.store16",
            "i64.store16",
        ] {
            m.insert(String::from(op), two_byte.clone());
        }
        for op in ["i32.load", "i32.store", "f32.load", "f32.store", "i64.load32_s", "i64.load32_u", "i64.store32"] {
            m.insert(String::from(op), four_byte.clone());
        }
        for op in ["i64.load", "i64.store", "f64.load", "f64.store"] {
            m.insert(String::from(op), eight_byte.clone());
        }
        m.insert(String::from("v128.load"), sixteen_byte.clone());
        m.insert(String::from("v128.store"), sixteen_byte);
        for op in [
            "i8x16.load8x8_s",
            "i8x16.load8x8_u",
            "i16x8.load16x4_s",
            "i16x8.load16x4_u",
            "i32x4.load32x2_s",
            "i32x4.load32x2_u",
        ] {
            m.insert(String::from(op), eight_byte.clone());
        }
        m.insert(String::from("v128.load8_splat"), one_byte.clone());
        m.insert(String::from("v128.load16_splat"), two_byte.clone());
        m.insert(String::from("v128.load32_splat"), four_byte.clone());
        m.insert(String::from("v128.load64_splat"), eight_byte.clone());
        m.insert(String::from("v128.load8_lane"), one_byte.clone());
        m.insert(String::from("v128.store8_lane"), one_byte);
        m.insert(String::from("v128.load16_lane"), two_byte.clone());
        m.insert(String::from("v128.store16_lane"), two_byte);
        m.insert(String::from("v128.load32_lane"), four_byte.clone());
        m.insert(String::from("v128.store32_lane"), four_byte.clone());
        m.insert(String::from("v128.load64_lane"), eight_byte.clone());
        m.insert(String::from("v128.store64_lane"), eight_byte.clone());
        m.insert(String::from("v128.load32_zero"), four_byte);
        m.insert(String::from("v128.load64_zero"), eight_byte.clone());
        m
    }
}

impl Default for InstructionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_opcodes_are_absent() {
        let table = InstructionTable::new();
        for op in BLOCKED_OPCODES {
            assert!(!table.contains(op), "{op} should be excluded from synthesis");
        }
    }

    #[test]
    fn i32_add_has_expected_signature() {
        let table = InstructionTable::new();
        let sig = table.get("i32.add").expect("i32.add should be catalogued");
        assert_eq!(sig.inputs, vec![I32, I32]);
        assert_eq!(sig.output, Some(I32));
    }

    #[test]
    fn memarg_alignment_is_capped_by_access_width() {
        let table = InstructionTable::new();
        assert_eq!(table.align_candidates("i32.load8_u"), Some(&[0][..]));
        assert_eq!(table.align_candidates("i64.load"), Some(&[0, 1, 2, 3][..]));
    }

    #[test]
    fn nan_producing_opcodes_exist_in_the_table() {
        let table = InstructionTable::new();
        for op in NAN_PRODUCING_OPCODES {
            assert!(table.contains(op), "{op} from NAN_PRODUCING_OPCODES missing from table");
        }
    }
}

use core::fmt;
use core::fmt::Display;

/// Concrete Wasm value types that can appear on the operand stack.
///
/// See the design note on [`TargetType`] for the two pseudo-types
/// (`noout`, `anystack`) that only ever appear while normalizing rule
/// patterns and never on an actual value stack.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

impl ValueType {
    /// All concrete value types, in a stable order used wherever the
    /// generator needs to draw a type uniformly (e.g. fabricating a
    /// random function return signature).
    pub const ALL: [ValueType; 7] = [
        ValueType::I32,
        ValueType::I64,
        ValueType::F32,
        ValueType::F64,
        ValueType::V128,
        ValueType::FuncRef,
        ValueType::ExternRef,
    ];

    /// Value types that can legally sit at the root of a function
    /// signature when the function is the module's exported entry point.
    /// `funcref`/`externref` are excluded there (§4.5 `init`).
    pub const ALL_NON_REF: [ValueType; 4] =
        [ValueType::I32, ValueType::I64, ValueType::F32, ValueType::F64];

    pub fn is_reference(self) -> bool {
        matches!(self, ValueType::FuncRef | ValueType::ExternRef)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }

    /// Bit width used for lane arithmetic, LEB-free constant sampling, and
    /// the conditional sampler's `[lo, hi]` domain width.
    pub fn bit_width(self) -> u32 {
        match self {
            ValueType::I32 | ValueType::F32 => 32,
            ValueType::I64 | ValueType::F64 => 64,
            ValueType::V128 => 128,
            ValueType::FuncRef | ValueType::ExternRef => 0,
        }
    }

    /// The single-byte Wasm binary encoding of this value type.
    pub fn to_wasm_byte(self) -> u8 {
        match self {
            ValueType::I32 => 0x7f,
            ValueType::I64 => 0x7e,
            ValueType::F32 => 0x7d,
            ValueType::F64 => 0x7c,
            ValueType::V128 => 0x7b,
            ValueType::FuncRef => 0x70,
            ValueType::ExternRef => 0x6f,
        }
    }

    pub fn from_name(name: &str) -> Option<ValueType> {
        Some(match name {
            "i32" => ValueType::I32,
            "i64" => ValueType::I64,
            "f32" => ValueType::F32,
            "f64" => ValueType::F64,
            "v128" => ValueType::V128,
            "funcref" => ValueType::FuncRef,
            "externref" => ValueType::ExternRef,
            _ => return None,
        })
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
            ValueType::V128 => write!(f, "v128"),
            ValueType::FuncRef => write!(f, "funcref"),
            ValueType::ExternRef => write!(f, "externref"),
        }
    }
}

/// The output "type" a rule is indexed by, which extends [`ValueType`] with
/// the pseudo-type `noout` for rules that only have a stack *effect*
/// (stores, `nop`, `drop`, ...).
///
/// `anystack`, the other pseudo-type from §3, only appears transiently
/// while ingesting raw extractor records: a rule mentioning it is outside
/// [`ValueType`]'s concrete domain and is dropped during normalization
/// (see `rules::store::RuleStore::ingest`), so it never needs a runtime
/// representation here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetType {
    Value(ValueType),
    NoOut,
}

impl Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TargetType::Value(ty) => Display::fmt(ty, f),
            TargetType::NoOut => write!(f, "noout"),
        }
    }
}

impl From<ValueType> for TargetType {
    fn from(ty: ValueType) -> Self {
        TargetType::Value(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasm_byte_round_trips_through_name() {
        for ty in ValueType::ALL {
            assert_eq!(ValueType::from_name(&ty.to_string()), Some(ty));
        }
    }

    #[test]
    fn noout_is_not_a_value_type() {
        assert_eq!(ValueType::from_name("noout"), None);
    }
}

//! Operand conditions (§3, §4.3, §11).
//!
//! A [`Condition`] is one constraint an extracted rewrite rule places on an
//! operand immediate. The sampler (`crate::sampler`) folds a list of these
//! into a concrete value; this module only owns the vocabulary and the
//! parsing of the rule-extractor's s-expression-ish tuple syntax, the same
//! split the teacher keeps between its `Signature` parsing and its
//! interpreter's actual instruction dispatch.
//!
//! Condition names prefixed with an underscore came from the Cranelift
//! rewrite-rule corpus unmodified; names without it (`lt`, `le`, `nonzero`,
//! ...) are synthesized internally while propagating ranges across `_pow2`
//! and `_shuffle_dupN_from_imm`. §11 lists condition names that appear in
//! the extracted corpus but that the reference generator never implements a
//! byte-construction rule for; [`Condition::Unsupported`] preserves the name
//! for logging while degrading to uniform sampling.

use alloc::string::String;
use alloc::vec::Vec;

/// One constraint on an operand immediate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Operand must equal this exact value.
    Eq(i128),
    Lt(i64),
    Le(i64),
    Gt(i64),
    Ge(i64),
    Nonzero,
    NonMinusOne,
    MinusOne,
    /// Operand is `2^other`, where `other` is the operand at this index,
    /// itself constrained to fit the immediate's bit width.
    Pow2 { var: u32 },
    /// Operand is a `0x0101...` (etc.) byte-replication of `var`, which is
    /// itself constrained to the named lane width.
    ShuffleDup8 { var: u32 },
    ShuffleDup16 { var: u32 },
    ShuffleDup32 { var: u32 },
    ShuffleDup64 { var: u32 },
    /// Operand is a single 5-bit lane index, width implied by the name.
    Lane8,
    Lane16,
    Lane32,
    Lane64,
    /// Cranelift SSE shuffle-immediate byte-construction predicates (§11),
    /// grounded in the reference generator's `gen_operand_with_conds`.
    PshufdLhsImm,
    PshufdRhsImm,
    ShufpsImm,
    ShufpsRevImm,
    PshuflwLhsImm,
    PshuflwRhsImm,
    PshufhwLhsImm,
    PshufhwRhsImm,
    PalignrImmFromImmediate,
    PblendwImm,
    /// A condition name seen in the corpus with no byte-construction rule
    /// (§11's unused-but-accepted list). Carries the original name purely
    /// for `log::debug!` diagnostics; sampling falls back to uniform.
    Unsupported(String),
}

impl Condition {
    /// Parses one condition tuple. `name` is the head symbol (`"_pow2"`,
    /// `"lt"`, ...); `args` are the remaining tokens, already split on
    /// whitespace. `var(n)` arguments are parsed into their index `n`.
    ///
    /// Returns `None` for a malformed tuple (e.g. a `_pow2` missing its
    /// `var` argument); the caller treats that the same as `RuleLoadError`
    /// and drops the record (§7).
    pub fn parse(name: &str, args: &[&str]) -> Option<Condition> {
        fn var_index(token: &str) -> Option<u32> {
            token.strip_prefix("var")?.parse().ok()
        }

        match name {
            "le" => args.first()?.parse().ok().map(Condition::Le),
            "lt" => args.first()?.parse().ok().map(Condition::Lt),
            "ge" => args.first()?.parse().ok().map(Condition::Ge),
            "gt" => args.first()?.parse().ok().map(Condition::Gt),
            "nonzero" | "_nonzero" => Some(Condition::Nonzero),
            "_nonminusone" => Some(Condition::NonMinusOne),
            "_minusone" => Some(Condition::MinusOne),
            "_pow2" => var_index(args.first()?).map(|var| Condition::Pow2 { var }),
            "_shuffle_dup8_from_imm" => {
                var_index(args.first()?).map(|var| Condition::ShuffleDup8 { var })
            }
            "_shuffle_dup16_from_imm" => {
                var_index(args.first()?).map(|var| Condition::ShuffleDup16 { var })
            }
            "_shuffle_dup32_from_imm" => {
                var_index(args.first()?).map(|var| Condition::ShuffleDup32 { var })
            }
            "_shuffle_dup64_from_imm" => {
                var_index(args.first()?).map(|var| Condition::ShuffleDup64 { var })
            }
            "lane8" => Some(Condition::Lane8),
            "lane16" => Some(Condition::Lane16),
            "lane32" => Some(Condition::Lane32),
            "lane64" => Some(Condition::Lane64),
            "_pshufd_lhs_imm" => Some(Condition::PshufdLhsImm),
            "_pshufd_rhs_imm" => Some(Condition::PshufdRhsImm),
            "_shufps_imm" => Some(Condition::ShufpsImm),
            "_shufps_rev_imm" => Some(Condition::ShufpsRevImm),
            "_pshuflw_lhs_imm" => Some(Condition::PshuflwLhsImm),
            "_pshuflw_rhs_imm" => Some(Condition::PshuflwRhsImm),
            "_pshufhw_lhs_imm" => Some(Condition::PshufhwLhsImm),
            "_pshufhw_rhs_imm" => Some(Condition::PshufhwRhsImm),
            "_palignr_imm_from_immediate" => Some(Condition::PalignrImmFromImmediate),
            "_pblendw_imm" => Some(Condition::PblendwImm),
            other => Some(Condition::Unsupported(String::from(other))),
        }
    }

    /// Whether this condition references another operand by index (`_pow2`
    /// and the `_shuffle_dupN_from_imm` family), and if so, which one.
    pub fn var_ref(&self) -> Option<u32> {
        match *self {
            Condition::Pow2 { var }
            | Condition::ShuffleDup8 { var }
            | Condition::ShuffleDup16 { var }
            | Condition::ShuffleDup32 { var }
            | Condition::ShuffleDup64 { var } => Some(var),
            _ => None,
        }
    }
}

/// The full set of conditions attached to one operand, indexed by operand
/// position within the rule's argument list (§3's "oparg conditions").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionExpr {
    pub conditions: Vec<Condition>,
}

impl ConditionExpr {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `Some(value)` if any condition pins this operand to one exact value
    /// (`Eq`/`MinusOne`/a literal from the rule text), used by the sampler
    /// to short-circuit range propagation.
    pub fn exact_value(&self, bitwidth: u32) -> Option<i128> {
        for cond in &self.conditions {
            match cond {
                Condition::Eq(value) => return Some(*value),
                Condition::MinusOne => return Some((1i128 << bitwidth) - 1),
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comparison_conditions() {
        assert_eq!(Condition::parse("lt", &["8"]), Some(Condition::Lt(8)));
        assert_eq!(Condition::parse("ge", &["1"]), Some(Condition::Ge(1)));
    }

    #[test]
    fn parses_pow2_with_var_reference() {
        let cond = Condition::parse("_pow2", &["var3"]).unwrap();
        assert_eq!(cond.var_ref(), Some(3));
    }

    #[test]
    fn unknown_condition_degrades_to_unsupported() {
        let cond = Condition::parse("_splat64", &[]).unwrap();
        assert!(matches!(cond, Condition::Unsupported(name) if name == "_splat64"));
    }

    #[test]
    fn minusone_condition_pins_exact_value() {
        let expr = ConditionExpr::new(alloc::vec![Condition::MinusOne]);
        assert_eq!(expr.exact_value(32), Some(0xFFFF_FFFF));
    }
}

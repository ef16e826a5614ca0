//! Constrained operand sampling (§4.3, §11).
//!
//! Each oparg slot of a rule instantiation is resolved independently but
//! may reference another slot (`_pow2`, `_shuffle_dupN_from_imm`); a fresh
//! [`OperandResolver`] is built per rule instantiation so that resolving
//! slot 2 can recurse into slot 0 and cache the result for reuse if slot 0
//! is asked for again directly.
//!
//! The SIMD shuffle-immediate constructors below produce the exact
//! Cranelift SSE lowering byte layouts (`pshufd`, `shufps`, `pshuflw`,
//! `pshufhw`, `palignr`, `pblendw`); §11 has the bit-level description this
//! was transcribed from.

pub mod interesting;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use rulegen_core::RandomnessSource;

use crate::condition::{Condition, ConditionExpr};
use crate::config::Config;

/// Resolves the oparg slots of one rule instantiation, honoring
/// cross-slot `_pow2`/`_shuffle_dupN_from_imm` references and caching each
/// slot's resolved value so later direct references reuse it.
pub struct OperandResolver<'a> {
    conds: &'a BTreeMap<u32, ConditionExpr>,
    resolved: BTreeMap<u32, i128>,
}

impl<'a> OperandResolver<'a> {
    pub fn new(conds: &'a BTreeMap<u32, ConditionExpr>) -> Self {
        Self {
            conds,
            resolved: BTreeMap::new(),
        }
    }

    fn conds_for(&self, slot: u32) -> &[Condition] {
        self.conds
            .get(&slot)
            .map(|expr| expr.conditions.as_slice())
            .unwrap_or(&[])
    }

    /// The conditional integer sampler (§4.3 table, ported from the
    /// reference generator's `gen_operand_with_conds`): propagates a
    /// `[range_min, range_max]` bound across simple comparisons, resolves
    /// exact-value conditions immediately, and recurses one level for
    /// `_pow2`/`_shuffle_dupN_from_imm`. Falls back to a uniform draw over
    /// the narrowed range, or the full bit width if the range collapsed.
    pub fn sample_bounded<R: RandomnessSource>(
        &mut self,
        rng: &mut R,
        bitwidth: u32,
        slot: u32,
    ) -> i128 {
        self.sample_bounded_with(rng, bitwidth, slot, None)
    }

    fn sample_bounded_with<R: RandomnessSource>(
        &mut self,
        rng: &mut R,
        bitwidth: u32,
        slot: u32,
        extra: Option<Condition>,
    ) -> i128 {
        if extra.is_none() {
            if let Some(value) = self.resolved.get(&slot) {
                return *value;
            }
        }

        let full_max: i128 = if bitwidth >= 127 {
            i128::MAX
        } else {
            (1i128 << bitwidth) - 1
        };
        let mut range_min: i128 = 0;
        let mut range_max: i128 = full_max;

        let conds: Vec<Condition> = self
            .conds_for(slot)
            .iter()
            .cloned()
            .chain(extra.clone())
            .collect();

        for cond in &conds {
            match cond {
                Condition::Eq(value) => return self.cache(slot, extra.is_none(), *value),
                Condition::Le(v) => range_max = range_max.min(*v as i128),
                Condition::Lt(v) => range_max = range_max.min(*v as i128 - 1),
                Condition::Ge(v) => range_min = range_min.max(*v as i128),
                Condition::Gt(v) => range_min = range_min.max(*v as i128 + 1),
                Condition::Nonzero => {
                    if range_min == 0 {
                        range_min = 1;
                    }
                }
                Condition::NonMinusOne => {
                    if range_max == full_max {
                        range_max = full_max - 1;
                    }
                }
                Condition::MinusOne => return self.cache(slot, extra.is_none(), full_max),
                Condition::Pow2 { var } => {
                    let exponent =
                        self.sample_bounded_with(rng, bitwidth, *var, Some(Condition::Lt(bitwidth as i64)));
                    let value = 1i128 << exponent.clamp(0, bitwidth as i128 - 1);
                    return self.cache(slot, extra.is_none(), value);
                }
                Condition::ShuffleDup8 { var } => {
                    let lane = self.sample_bounded_with(rng, bitwidth, *var, Some(Condition::Lt(0x100)));
                    let value = replicate(lane as u128, 1);
                    return self.cache(slot, extra.is_none(), value);
                }
                Condition::ShuffleDup16 { var } => {
                    let lane = self.sample_bounded_with(rng, bitwidth, *var, Some(Condition::Lt(0x1_0000)));
                    let value = replicate(lane as u128, 2);
                    return self.cache(slot, extra.is_none(), value);
                }
                Condition::ShuffleDup32 { var } => {
                    let lane = self.sample_bounded_with(rng, bitwidth, *var, Some(Condition::Lt(0x1_0000_0000)));
                    let value = replicate(lane as u128, 4);
                    return self.cache(slot, extra.is_none(), value);
                }
                Condition::ShuffleDup64 { var } => {
                    let lane = self.sample_bounded_with(rng, bitwidth, *var, Some(Condition::Lt(i64::MAX)));
                    let value = replicate(lane as u128, 8);
                    return self.cache(slot, extra.is_none(), value);
                }
                Condition::Lane8 => return self.cache(slot, extra.is_none(), rng.int(5) as i128),
                Condition::Lane16 => return self.cache(slot, extra.is_none(), sample_lane_mask(rng, 2) as i128),
                Condition::Lane32 => return self.cache(slot, extra.is_none(), sample_lane_mask(rng, 4) as i128),
                Condition::Lane64 => return self.cache(slot, extra.is_none(), sample_lane_mask(rng, 8) as i128),
                Condition::PshufdLhsImm => return self.cache(slot, extra.is_none(), pshufd_imm(rng, 0) as i128),
                Condition::PshufdRhsImm => return self.cache(slot, extra.is_none(), pshufd_imm(rng, 4) as i128),
                Condition::ShufpsImm => return self.cache(slot, extra.is_none(), shufps_imm(rng, false) as i128),
                Condition::ShufpsRevImm => return self.cache(slot, extra.is_none(), shufps_imm(rng, true) as i128),
                Condition::PshuflwLhsImm => return self.cache(slot, extra.is_none(), pshuflw_imm(rng, 0) as i128),
                Condition::PshuflwRhsImm => return self.cache(slot, extra.is_none(), pshuflw_imm(rng, 8) as i128),
                Condition::PshufhwLhsImm => return self.cache(slot, extra.is_none(), pshufhw_imm(rng, 0) as i128),
                Condition::PshufhwRhsImm => return self.cache(slot, extra.is_none(), pshufhw_imm(rng, 8) as i128),
                Condition::PalignrImmFromImmediate => {
                    return self.cache(slot, extra.is_none(), palignr_imm(rng) as i128)
                }
                Condition::PblendwImm => return self.cache(slot, extra.is_none(), pblendw_imm(rng) as i128),
                Condition::Unsupported(name) => {
                    log::debug!("condition `{name}` has no byte-construction rule, ignoring");
                }
            }
        }

        let value = if range_max <= range_min {
            rng.int(bitwidth.clamp(1, 64)) as i128
        } else {
            let span = (range_max - range_min) as u64;
            range_min + rng.choice(span as usize + 1) as i128
        };
        self.cache(slot, extra.is_none(), value)
    }

    fn cache(&mut self, slot: u32, persist: bool, value: i128) -> i128 {
        if persist {
            self.resolved.insert(slot, value);
        }
        value
    }
}

/// Byte-replicates `unit` (`width` low bytes of it) across all 16 bytes,
/// little-endian, matching `0x0101...`/`0x0001_0001...`-style masks.
fn replicate(unit: u128, width: u32) -> i128 {
    let mask = if width >= 16 { u128::MAX } else { (1u128 << (width * 8)) - 1 };
    let unit = unit & mask;
    let mut acc: u128 = 0;
    let mut shift = 0u32;
    while shift < 128 {
        acc |= unit << shift;
        shift += width * 8;
    }
    acc as i128
}

fn sample_lane_mask<R: RandomnessSource>(rng: &mut R, lanes: u32) -> u32 {
    let nbits = 5 * lanes;
    let raw = rng.int(nbits);
    let mut value = 0u32;
    for i in 0..lanes {
        value |= ((raw >> (5 * i)) & 0b11111) as u32;
    }
    value
}

fn from_bytes_le(bytes: [u8; 16]) -> u128 {
    u128::from_le_bytes(bytes)
}

fn pshufd_imm<R: RandomnessSource>(rng: &mut R, base: u8) -> u128 {
    let mut bytes = [0u8, 1, 2, 3].repeat(4);
    for i in 0..4 {
        let imm = base + rng.int(2) as u8;
        for idx in 4 * i..4 * i + 4 {
            bytes[idx] += imm * 4;
        }
    }
    from_bytes_le(bytes.try_into().unwrap())
}

fn shufps_imm<R: RandomnessSource>(rng: &mut R, reverse: bool) -> u128 {
    let mut bytes = [0u8, 1, 2, 3].repeat(4);
    for i in 0..4 {
        let mut imm = rng.int(2) as u8;
        let upper_half = i == 2 || i == 3;
        if upper_half != reverse {
            imm += 4;
        }
        for idx in 4 * i..4 * i + 4 {
            bytes[idx] += imm * 4;
        }
    }
    from_bytes_le(bytes.try_into().unwrap())
}

fn pshuflw_imm<R: RandomnessSource>(rng: &mut R, base: u8) -> u128 {
    let mut bytes = [0u8, 1].repeat(8);
    for i in 0..8usize {
        let imm = if i >= 4 {
            i as u8
        } else {
            base + rng.int(2) as u8
        };
        for idx in 2 * i..2 * i + 2 {
            bytes[idx] += imm * 2;
        }
    }
    from_bytes_le(bytes.try_into().unwrap())
}

fn pshufhw_imm<R: RandomnessSource>(rng: &mut R, base: u8) -> u128 {
    let mut bytes = [0u8, 1].repeat(8);
    for i in 0..8usize {
        let imm = if i < 4 {
            i as u8 + base
        } else {
            base + 4 + rng.int(2) as u8
        };
        for idx in 2 * i..2 * i + 2 {
            bytes[idx] += imm * 2;
        }
    }
    from_bytes_le(bytes.try_into().unwrap())
}

fn palignr_imm<R: RandomnessSource>(rng: &mut R) -> u128 {
    let imm = rng.choice(17) as u8;
    let mut bytes = [0u8; 16];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = i as u8 + imm;
    }
    from_bytes_le(bytes)
}

fn pblendw_imm<R: RandomnessSource>(rng: &mut R) -> u128 {
    let mut bytes = [0u8, 1].repeat(8);
    for i in 0..8usize {
        let imm = rng.int(1) as u8 * 8 + i as u8;
        for idx in 2 * i..2 * i + 2 {
            bytes[idx] += imm * 2;
        }
    }
    from_bytes_le(bytes.try_into().unwrap())
}

/// A const-like operand, one of `i32`/`i64`/`f32`/`f64`, drawn with
/// probability `p_interesting` from the matching table, otherwise sampled
/// uniformly across the full bit width (§4.3).
pub fn sample_const_int<R: RandomnessSource>(rng: &mut R, config: &Config, bitwidth: u32) -> i128 {
    if config.p_interesting > 0.0 && rng.choice_prob(config.p_interesting) {
        if bitwidth <= 32 {
            return *rng.choice_arr(interesting::INTERESTING_I32) as i128;
        }
        return *rng.choice_arr(interesting::INTERESTING_I64) as i128;
    }
    rng.int(bitwidth.clamp(1, 64)) as i128
}

pub fn sample_const_float<R: RandomnessSource>(rng: &mut R, config: &Config, is_f64: bool) -> f64 {
    if rng.choice_prob(config.p_interesting) {
        if is_f64 {
            let table = interesting::interesting_f64();
            return *rng.choice_arr(&table);
        }
        return *rng.choice_arr(&interesting::interesting_f32()) as f64;
    }
    rng.float() as f64
}

/// Perturbs an already-sampled bounded integer within `[min, max)` (§4.3):
/// usually left unchanged, otherwise nudged to a boundary, resampled from
/// the interesting table restricted to range, or redrawn uniformly.
pub fn perturb_int<R: RandomnessSource>(rng: &mut R, config: &Config, value: i64, min: i64, max: i64) -> i64 {
    if max <= min || rng.choice_prob(1.0 - config.p_perturb) {
        return value;
    }
    if rng.choice_prob(1.0 / 3.0) {
        if rng.choice_prob(1.0 / 3.0) {
            (value + 1).min(max - 1)
        } else if rng.choice_prob(0.5) {
            (value - 1).max(min)
        } else {
            (-value).clamp(min, max - 1)
        }
    } else if rng.choice_prob(0.5) {
        let candidates: Vec<i64> = interesting::INTERESTING_I64
            .iter()
            .copied()
            .filter(|v| *v >= min && *v < max)
            .collect();
        if candidates.is_empty() {
            value
        } else {
            *rng.choice_arr(&candidates)
        }
    } else {
        min + rng.choice((max - min) as usize) as i64
    }
}

pub fn perturb_float<R: RandomnessSource>(rng: &mut R, config: &Config, value: f64) -> f64 {
    if rng.choice_prob(1.0 - config.p_perturb) {
        return value;
    }
    if rng.choice_prob(1.0 / 3.0) {
        if rng.choice_prob(1.0 / 3.0) {
            value + 1.0
        } else if rng.choice_prob(0.5) {
            value - 1.0
        } else {
            -value
        }
    } else if rng.choice_prob(0.5) {
        let table = interesting::interesting_f64();
        *rng.choice_arr(&table)
    } else {
        rng.float() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rulegen_core::PrngSource;

    #[test]
    fn le_condition_narrows_the_range() {
        let mut conds = BTreeMap::new();
        conds.insert(0u32, ConditionExpr::new(alloc::vec![Condition::Le(5)]));
        let mut rng = PrngSource::new(StdRng::seed_from_u64(7));
        for _ in 0..50 {
            let mut resolver = OperandResolver::new(&conds);
            let value = resolver.sample_bounded(&mut rng, 32, 0);
            assert!(value <= 5);
        }
    }

    #[test]
    fn nonzero_condition_never_samples_zero() {
        let mut conds = BTreeMap::new();
        conds.insert(0u32, ConditionExpr::new(alloc::vec![Condition::Nonzero, Condition::Le(3)]));
        let mut rng = PrngSource::new(StdRng::seed_from_u64(11));
        for _ in 0..50 {
            let mut resolver = OperandResolver::new(&conds);
            let value = resolver.sample_bounded(&mut rng, 32, 0);
            assert!(value >= 1 && value <= 3);
        }
    }

    #[test]
    fn pow2_condition_produces_a_power_of_two() {
        let mut conds = BTreeMap::new();
        conds.insert(0u32, ConditionExpr::new(alloc::vec![Condition::Pow2 { var: 1 }]));
        let mut rng = PrngSource::new(StdRng::seed_from_u64(3));
        for _ in 0..50 {
            let mut resolver = OperandResolver::new(&conds);
            let value = resolver.sample_bounded(&mut rng, 32, 0);
            assert_eq!(value & (value - 1), 0);
            assert!(value >= 1);
        }
    }

    #[test]
    fn shuffle_dup8_replicates_a_single_byte() {
        let mut conds = BTreeMap::new();
        conds.insert(0u32, ConditionExpr::new(alloc::vec![Condition::ShuffleDup8 { var: 1 }]));
        let mut rng = PrngSource::new(StdRng::seed_from_u64(5));
        let mut resolver = OperandResolver::new(&conds);
        let value = resolver.sample_bounded(&mut rng, 128, 0) as u128;
        let byte = (value & 0xff) as u8;
        let expected = u128::from_le_bytes([byte; 16]);
        assert_eq!(value, expected);
    }

    #[test]
    fn minusone_condition_is_exact() {
        let mut conds = BTreeMap::new();
        conds.insert(0u32, ConditionExpr::new(alloc::vec![Condition::MinusOne]));
        let mut rng = PrngSource::new(StdRng::seed_from_u64(2));
        let mut resolver = OperandResolver::new(&conds);
        assert_eq!(resolver.sample_bounded(&mut rng, 32, 0), 0xFFFF_FFFF);
    }
}

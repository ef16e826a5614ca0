//! The rule index (§C3, §4.2).
//!
//! Two maps, `typing` and `extracted`, both keyed `TargetType ->
//! terminal_opcode -> Vec<InstrNode>`. `typing` is built once from
//! [`InstructionTable`] (one rule per catalogued opcode: consume its
//! declared input types, produce its declared outputs) so every reachable
//! type always has *something* to instantiate; `extracted` is built from
//! parsed corpus text and may be empty or partial.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use rulegen_core::{InstructionTable, OperandKind, RandomnessSource, TargetType, ValueType};

use super::extract::{BodyNode, InstrNode};
use crate::error::RuleLoadError;

type OpcodeRules = BTreeMap<String, Vec<InstrNode>>;

/// Indexes typing rules and extracted rules by output type and terminal
/// opcode, and answers `get_rule` (§4.2).
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    typing: BTreeMap<TargetType, OpcodeRules>,
    extracted: BTreeMap<TargetType, OpcodeRules>,
    /// Per-opcode immediate-operand schema, copied from the
    /// `InstructionTable` this store was built from (§4.3): lets rule
    /// instantiation materialize each oparg as the `OperandKind` the
    /// opcode actually declares rather than guessing from its name.
    immediate_kinds: BTreeMap<String, Vec<OperandKind>>,
    /// Per-opcode `memarg.align` candidates, copied from the same table
    /// (§4.1's alignment-exponent cap).
    align_candidates: BTreeMap<String, Vec<u32>>,
    /// Count of corpus lines dropped during the last `ingest_extracted`
    /// call, logged once at the end of loading (§10.2).
    pub dropped_on_load: usize,
}

impl RuleStore {
    /// Builds the typing-rule half of the store directly from the static
    /// instruction table: one rule per catalogued opcode whose inputs are
    /// its declared operand types and whose single output (if any) is its
    /// declared output type.
    pub fn from_instruction_table(table: &InstructionTable) -> Self {
        let mut typing: BTreeMap<TargetType, OpcodeRules> = BTreeMap::new();
        let mut immediate_kinds: BTreeMap<String, Vec<OperandKind>> = BTreeMap::new();
        let mut align_candidates: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for opcode in table.opcodes() {
            let sig = table.get(opcode).expect("opcode came from opcodes()");
            let param_types = sig.inputs.clone();
            let ret_types: Vec<ValueType> = sig.output.into_iter().collect();
            let target = sig
                .output
                .map(TargetType::Value)
                .unwrap_or(TargetType::NoOut);

            let mut body: Vec<BodyNode> = (0..param_types.len())
                .map(|idx| BodyNode::Arg(idx as u32))
                .collect();
            body.push(BodyNode::Op {
                opcode: alloc::string::ToString::to_string(opcode),
                opargs: (0..sig.immediates.len() as u32).collect(),
            });

            let node = InstrNode {
                param_types,
                ret_types,
                body,
                conds: BTreeMap::new(),
            };
            immediate_kinds.insert(alloc::string::ToString::to_string(opcode), sig.immediates.clone());
            if let Some(candidates) = table.align_candidates(opcode) {
                align_candidates.insert(alloc::string::ToString::to_string(opcode), candidates.to_vec());
            }
            typing
                .entry(target)
                .or_default()
                .entry(alloc::string::ToString::to_string(opcode))
                .or_default()
                .push(node);
        }
        Self {
            typing,
            extracted: BTreeMap::new(),
            immediate_kinds,
            align_candidates,
            dropped_on_load: 0,
        }
    }

    /// The immediate-operand schema for `opcode`, if it was catalogued by
    /// the `InstructionTable` this store was built from (§4.3).
    pub fn immediate_kinds(&self, opcode: &str) -> Option<&[OperandKind]> {
        self.immediate_kinds.get(opcode).map(Vec::as_slice)
    }

    /// The `memarg.align` candidates for `opcode`, if any were recorded
    /// for it (§4.1).
    pub fn align_candidates(&self, opcode: &str) -> Option<&[u32]> {
        self.align_candidates.get(opcode).map(Vec::as_slice)
    }

    /// Merges parsed corpus rules into the extracted-rule half of the
    /// store. Rules whose params/rets reference a blacklisted type, or
    /// whose body is empty, are dropped with a `RuleLoadError` appended to
    /// `errors` (the caller logs these via `log::warn!`, §10.2).
    pub fn ingest_extracted(
        &mut self,
        rules: Vec<InstrNode>,
        blacklist: &[ValueType],
        errors: &mut Vec<RuleLoadError>,
    ) {
        for (idx, node) in rules.into_iter().enumerate() {
            let touches_blacklisted = node
                .param_types
                .iter()
                .chain(node.ret_types.iter())
                .any(|ty| blacklist.contains(ty));
            if touches_blacklisted {
                errors.push(RuleLoadError {
                    line: idx,
                    reason: alloc::string::String::from("rule touches a blacklisted type"),
                });
                self.dropped_on_load += 1;
                continue;
            }
            let Some(opcode) = node.terminal_opcode().map(alloc::string::ToString::to_string)
            else {
                self.dropped_on_load += 1;
                continue;
            };
            // A rule whose final body node is itself `arg` has no observable
            // effect and is not worth instantiating (mirrors the reference
            // generator silently skipping `last_opcode == 'arg'`).
            if matches!(node.body.last(), Some(BodyNode::Arg(_))) {
                continue;
            }
            let target = node
                .ret_types
                .first()
                .copied()
                .map(TargetType::Value)
                .unwrap_or(TargetType::NoOut);
            self.extracted
                .entry(target)
                .or_default()
                .entry(opcode)
                .or_default()
                .push(node);
        }
    }

    /// §4.2's `get_rule`: with probability `p_use_typing`, draw from the
    /// typing rules for `target`; otherwise prefer the extracted rules,
    /// falling back to typing rules if none were extracted for `target`.
    pub fn get_rule<'a, R: RandomnessSource>(
        &'a self,
        target: TargetType,
        p_use_typing: f64,
        rng: &mut R,
    ) -> Option<&'a InstrNode> {
        let use_typing = rng.choice_prob(p_use_typing) || !self.extracted.contains_key(&target);
        let table = if use_typing { &self.typing } else { &self.extracted };
        let opcodes = table.get(&target)?;
        let keys: Vec<&String> = opcodes.keys().collect();
        let opcode = rng.choice_arr(&keys);
        let candidates = &opcodes[opcode.as_str()];
        Some(rng.choice_arr(candidates))
    }

    pub fn typing_rule_count(&self) -> usize {
        self.typing.values().map(|m| m.values().map(Vec::len).sum::<usize>()).sum()
    }

    pub fn extracted_rule_count(&self) -> usize {
        self.extracted.values().map(|m| m.values().map(Vec::len).sum::<usize>()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rulegen_core::PrngSource;

    #[test]
    fn typing_rules_cover_every_catalogued_opcode_output() {
        let table = InstructionTable::new();
        let store = RuleStore::from_instruction_table(&table);
        assert!(store.typing_rule_count() >= table.opcodes().count());
    }

    #[test]
    fn get_rule_prefers_typing_when_forced() {
        let table = InstructionTable::new();
        let store = RuleStore::from_instruction_table(&table);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(1));
        let rule = store
            .get_rule(TargetType::Value(ValueType::I32), 1.0, &mut rng)
            .expect("i32 typing rules exist");
        assert_eq!(rule.ret_types, alloc::vec![ValueType::I32]);
    }

    #[test]
    fn immediate_kinds_mirrors_the_source_table() {
        let table = InstructionTable::new();
        let store = RuleStore::from_instruction_table(&table);
        assert_eq!(
            store.immediate_kinds("i32.load"),
            Some(&[rulegen_core::OperandKind::MemArg][..])
        );
        assert_eq!(store.align_candidates("i64.load"), Some(&[0, 1, 2, 3][..]));
    }
}

//! Black-box property tests for §8's generation invariants, run across
//! many seeds the way the teacher's `tests/spec` suite sweeps the full
//! WebAssembly spec testsuite rather than a handful of hand-picked cases.

use rand::{rngs::StdRng, SeedableRng};
use rulegen::condition::{Condition, ConditionExpr};
use rulegen::sampler::OperandResolver;
use rulegen::{Config, InstructionTable, ModuleContext, PrngSource, RuleStore, NAN_PRODUCING_OPCODES};

fn default_rules() -> RuleStore {
    let table = InstructionTable::new();
    RuleStore::from_instruction_table(&table)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn determinism_same_seed_same_bytes() {
    let config = Config::default();
    let rules = default_rules();
    let emit_for_seed = |seed: u64| {
        let mut ctx = ModuleContext::new(&config, &rules);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(seed));
        ctx.generate(&mut rng);
        rulegen::emit::emit_module(&ctx.module)
    };
    for seed in 0..20 {
        assert_eq!(emit_for_seed(seed), emit_for_seed(seed), "seed {seed} was not deterministic");
    }
}

#[test]
fn every_function_body_closes_onto_its_declared_return_signature() {
    let config = Config::default();
    let rules = default_rules();
    for seed in 0..200 {
        let mut ctx = ModuleContext::new(&config, &rules);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(seed));
        ctx.generate(&mut rng);
        for func in &ctx.module.funcs {
            assert_eq!(
                func.body.stack, func.body.rets,
                "seed {seed}: function body stack didn't close onto its return signature"
            );
            assert_eq!(
                func.body.params, func.args,
                "seed {seed}: function body params diverged from its declared args"
            );
        }
    }
}

#[test]
fn exported_module_always_has_main_mem_and_table() {
    let config = Config::default();
    let rules = default_rules();
    let mut ctx = ModuleContext::new(&config, &rules);
    let mut rng = PrngSource::new(StdRng::seed_from_u64(3));
    ctx.generate(&mut rng);
    let bytes = rulegen::emit::emit_module(&ctx.module);

    // Export names are length-prefixed ASCII inside the export section;
    // a direct substring search is enough to confirm each one was written,
    // without re-implementing a full section parser here.
    assert!(contains(&bytes, b"main"));
    assert!(contains(&bytes, b"mem"));
    assert!(contains(&bytes, b"table"));
    assert!(ctx.module.funcs.iter().any(|f| f.is_main));
}

#[test]
fn zero_max_depth_emits_no_structured_control_instructions() {
    let config = Config::builder().max_depth(0).build().expect("valid config");
    let rules = default_rules();
    for seed in 0..50 {
        let mut ctx = ModuleContext::new(&config, &rules);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(seed));
        ctx.generate(&mut rng);
        for func in &ctx.module.funcs {
            for record in &func.body.records {
                for instr in &record.instrs {
                    assert!(
                        !matches!(instr.opcode.as_str(), "block" | "loop" | "if"),
                        "seed {seed}: found `{}` with max_depth=0",
                        instr.opcode
                    );
                }
            }
        }
    }
}

#[test]
fn canonicalization_gadget_follows_every_nan_producing_opcode() {
    let config = Config::default();
    assert!(config.canonicalize_nans);
    let rules = default_rules();
    let mut saw_one = false;
    for seed in 0..300 {
        let mut ctx = ModuleContext::new(&config, &rules);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(seed));
        ctx.generate(&mut rng);
        for func in &ctx.module.funcs {
            for record in &func.body.records {
                // The gadget, when appended, lives in the same record right
                // after the NaN-producing opcode that triggered it (§4.5's
                // `instantiate_rule`), not in a separate record.
                for window in record.instrs.windows(2) {
                    let [producer, next] = window else { continue };
                    if !NAN_PRODUCING_OPCODES.contains(&producer.opcode.as_str()) {
                        continue;
                    }
                    saw_one = true;
                    assert_eq!(
                        next.opcode, "local.tee",
                        "seed {seed}: `{}` wasn't followed by the canonicalization gadget",
                        producer.opcode
                    );
                }
            }
        }
    }
    assert!(saw_one, "no NaN-producing opcode was sampled across 300 seeds; widen the sweep");
}

#[test]
fn operand_conditions_are_respected_across_many_draws() {
    let mut conds = std::collections::BTreeMap::new();
    conds.insert(0, ConditionExpr::new(vec![Condition::Nonzero, Condition::Lt(32)]));
    let mut rng = PrngSource::new(StdRng::seed_from_u64(11));
    for _ in 0..10_000 {
        let mut resolver = OperandResolver::new(&conds);
        let value = resolver.sample_bounded(&mut rng, 32, 0);
        assert!(
            (1i128..32i128).contains(&value),
            "sampled {value} violates `nonzero` and `lt 32`"
        );
    }
}

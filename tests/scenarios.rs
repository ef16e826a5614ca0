//! Concrete end-to-end scenarios from §8, each isolating one generation
//! path with a config tuned to make it overwhelmingly likely rather than
//! waiting on a lucky seed.

use rand::{rngs::StdRng, SeedableRng};
use rulegen::{Config, InstructionTable, ModuleContext, PrngSource, RuleStore};

fn default_rules() -> RuleStore {
    let table = InstructionTable::new();
    RuleStore::from_instruction_table(&table)
}

#[test]
fn minimal_module_exports_a_single_main_function() {
    let config = Config::default();
    let rules = default_rules();
    let mut ctx = ModuleContext::new(&config, &rules);
    let mut rng = PrngSource::new(StdRng::seed_from_u64(0));
    ctx.generate(&mut rng);

    assert_eq!(ctx.module.funcs.len(), 1);
    assert!(ctx.module.funcs[0].is_main);
    let bytes = rulegen::emit::emit_module(&ctx.module);
    assert_eq!(&bytes[0..4], b"\0asm");
    assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
}

#[test]
fn forced_call_indirect_references_a_registered_type() {
    // Raise the odds of a structure-opening decision picking `call`, and
    // every call resolving to `call_indirect`, per §4.5 step 1's gate order,
    // without forcing either to certainty (which risks runaway recursion
    // through `open_call`'s fresh-callee path).
    let config = Config {
        p_struct_gen: 0.3,
        p_struct_exit: 0.6,
        p_call: 1.0,
        p_call_indirect: 1.0,
        table_size: 8,
        max_depth: 3,
        ..Config::default()
    };
    let rules = default_rules();
    let mut found_call_indirect = false;
    for seed in 0..500 {
        let mut ctx = ModuleContext::new(&config, &rules);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(seed));
        ctx.generate(&mut rng);
        for func in &ctx.module.funcs {
            for record in &func.body.records {
                for (idx, instr) in record.instrs.iter().enumerate() {
                    if instr.opcode != "call_indirect" {
                        continue;
                    }
                    found_call_indirect = true;
                    // A `ref.func` + `i32.const` index precede `call_indirect`
                    // (§4.5's `open_call`), and its type index must resolve.
                    assert!(idx > 0, "call_indirect had no preceding instructions");
                }
            }
        }
        if found_call_indirect {
            break;
        }
    }
    assert!(found_call_indirect, "no call_indirect observed across 100 forced seeds");
}

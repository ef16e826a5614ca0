//! Flags shared by every subcommand that runs the generator (§6, §10.3).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rulegen::{Config, ModuleContext, RandomnessSource, RuleStore, ValueType};
use rulegen::wrapper::{WrapperOutput, WrapperShim};

use crate::rng::Rng;

#[derive(Parser)]
pub struct GenerationArgs {
    /// Seeds the deterministic PRNG backing generation.
    #[clap(long, default_value_t = 0)]
    pub seed: u64,

    /// Reads randomness from this byte file instead of a seeded PRNG, the
    /// way a coverage-guided front-end would feed back a mutated input.
    #[clap(long, value_name = "FILE")]
    pub stream: Option<PathBuf>,

    /// A line-oriented extracted-rule corpus to merge on top of the built-in
    /// typing rules (§C3). Without this flag only typing rules are used.
    #[clap(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Number of 64KiB linear memory pages.
    #[clap(long, default_value_t = 1)]
    pub memory_pages: u32,

    /// Number of funcref table slots.
    #[clap(long, default_value_t = 65536)]
    pub table_size: u32,

    /// Maximum nesting depth for block/loop/if structures.
    #[clap(long, default_value_t = 5)]
    pub max_depth: u32,

    /// Disables the NaN-canonicalization gadget inserted after
    /// NaN-producing opcodes.
    #[clap(long)]
    pub no_canonicalize_nans: bool,

    /// Value types to exclude from generation entirely, comma-separated
    /// (e.g. `v128,funcref`).
    #[clap(long, value_delimiter = ',')]
    pub blacklist: Vec<String>,

    /// Wrap the module in a JavaScript driver harness instead of emitting
    /// the raw `.wasm` binary (`WrapperShim::JsHarness`).
    #[clap(long)]
    pub js_harness: bool,
}

impl GenerationArgs {
    pub fn build_config(&self) -> Result<Config> {
        let mut builder = Config::builder()
            .memory_pages(self.memory_pages)
            .table_size(self.table_size)
            .max_depth(self.max_depth)
            .canonicalize_nans(!self.no_canonicalize_nans);
        for name in &self.blacklist {
            let ty = ValueType::from_name(name.trim())
                .with_context(|| format!("unknown value type `{name}` in --blacklist"))?;
            builder = builder.blacklist_type(ty);
        }
        builder.build().context("invalid generation config")
    }

    pub fn build_rng(&self) -> Result<Rng> {
        match &self.stream {
            Some(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("failed to read stream file `{}`", path.display()))?;
                Ok(Rng::stream(bytes))
            }
            None => Ok(Rng::seeded(self.seed)),
        }
    }

    /// Builds the rule store: typing rules from the static instruction
    /// table, plus any extracted rules from `--rules`, merged per §4.2.
    /// Dropped corpus lines are logged at `warn`, matching §10.2.
    pub fn build_rules(&self, config: &Config) -> Result<RuleStore> {
        let table = rulegen::InstructionTable::new();
        let mut store = RuleStore::from_instruction_table(&table);
        if let Some(path) = &self.rules {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read corpus `{}`", path.display()))?;
            let (rules, parse_errors) = rulegen::rules::parse_corpus(&text);
            for error in &parse_errors {
                log::warn!("{error}");
            }
            let mut load_errors = Vec::new();
            store.ingest_extracted(rules, &config.blacklist_types, &mut load_errors);
            for error in &load_errors {
                log::warn!("{error}");
            }
            if store.dropped_on_load > 0 {
                log::warn!("dropped {} corpus rule(s) while loading", store.dropped_on_load);
            }
        }
        Ok(store)
    }
}

/// Generates one module end to end and applies the wrapper shim (§4.7):
/// `ModuleContext::generate` builds it, `emit::emit_module` encodes it to
/// Wasm binary, and the shim either returns those bytes verbatim or wraps
/// them in a JS driver harness.
pub fn generate_one(
    config: &Config,
    rules: &RuleStore,
    js_harness: bool,
    rng: &mut impl RandomnessSource,
) -> WrapperOutput {
    let mut ctx = ModuleContext::new(config, rules);
    ctx.generate(rng);
    let main_params = ctx
        .module
        .funcs
        .iter()
        .find(|f| f.is_main)
        .map(|f| f.args.clone())
        .unwrap_or_default();
    let wasm_bytes = rulegen::emit::emit_module(&ctx.module);
    let shim = if js_harness {
        WrapperShim::JsHarness
    } else {
        WrapperShim::Raw
    };
    shim.render(&wasm_bytes, config, &main_params, rng)
}

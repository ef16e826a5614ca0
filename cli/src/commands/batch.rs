use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::args::{generate_one, GenerationArgs};
use crate::commands::generate::write_output;
use crate::commands::Command;
use crate::rng::Rng;

/// Generates a batch of independent Wasm modules, one seed per module.
///
/// Each module gets its own `Rng::seeded(seed_start + index)`; `--stream`
/// is rejected here since a single byte stream cannot be split across an
/// unknown number of independent runs.
#[derive(Parser)]
pub struct BatchCommand {
    #[command(flatten)]
    args: GenerationArgs,

    /// Number of modules to generate.
    #[clap(long, default_value_t = 10)]
    count: usize,

    /// Seed of the first module; module `i` uses `seed_start + i`.
    #[clap(long, default_value_t = 0)]
    seed_start: u64,

    /// Directory to write the generated modules into; created if missing.
    #[clap(long, short = 'o')]
    out_dir: PathBuf,
}

impl Command for BatchCommand {
    fn execute(self) -> Result<()> {
        if self.args.stream.is_some() {
            anyhow::bail!("`batch` generates from `--seed-start`, not `--stream`");
        }
        let config = self.args.build_config()?;
        let rules = self.args.build_rules(&config)?;
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create `{}`", self.out_dir.display()))?;

        let extension = if self.args.js_harness { "js" } else { "wasm" };
        for index in 0..self.count {
            let mut rng = Rng::seeded(self.seed_start + index as u64);
            let output = generate_one(&config, &rules, self.args.js_harness, &mut rng);
            let path = self.out_dir.join(format!("module_{index:04}.{extension}"));
            write_output(output, Some(&path))?;
        }
        log::info!("wrote {} module(s) to {}", self.count, self.out_dir.display());
        Ok(())
    }
}

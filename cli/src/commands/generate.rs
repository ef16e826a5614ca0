use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rulegen::wrapper::WrapperOutput;

use crate::args::{generate_one, GenerationArgs};
use crate::commands::Command;

/// Generates a single Wasm module.
#[derive(Parser)]
pub struct GenerateCommand {
    #[command(flatten)]
    args: GenerationArgs,

    /// Where to write the generated module. Defaults to stdout.
    #[clap(long = "out", short = 'o', value_name = "FILE")]
    out: Option<PathBuf>,
}

impl Command for GenerateCommand {
    fn execute(self) -> Result<()> {
        let config = self.args.build_config()?;
        let rules = self.args.build_rules(&config)?;
        let mut rng = self.args.build_rng()?;
        let output = generate_one(&config, &rules, self.args.js_harness, &mut rng);
        write_output(output, self.out.as_deref())
    }
}

pub fn write_output(output: WrapperOutput, path: Option<&std::path::Path>) -> Result<()> {
    match (output, path) {
        (WrapperOutput::Bytes(bytes), Some(path)) => fs::write(path, bytes)
            .with_context(|| format!("failed to write `{}`", path.display())),
        (WrapperOutput::Bytes(bytes), None) => io::stdout()
            .write_all(&bytes)
            .context("failed to write module to stdout"),
        (WrapperOutput::Text(text), Some(path)) => fs::write(path, text)
            .with_context(|| format!("failed to write `{}`", path.display())),
        (WrapperOutput::Text(text), None) => {
            println!("{text}");
            Ok(())
        }
    }
}

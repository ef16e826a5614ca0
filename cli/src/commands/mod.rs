mod batch;
mod generate;

use anyhow::Result;
use clap::Parser;

pub use self::batch::BatchCommand;
pub use self::generate::GenerateCommand;

#[derive(Parser)]
#[command(name = "rulegen", version, about)]
pub struct WasmRulegenApp {
    #[command(subcommand)]
    subcommand: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Generates a single Wasm module.
    Generate(GenerateCommand),
    /// Generates a batch of independent Wasm modules into a directory.
    Batch(BatchCommand),
}

/// Implemented by sub-commands in order to execute them.
pub trait Command {
    fn execute(self) -> Result<()>;
}

impl Command for WasmRulegenApp {
    fn execute(self) -> Result<()> {
        match self.subcommand {
            SubCommand::Generate(cmd) => cmd.execute(),
            SubCommand::Batch(cmd) => cmd.execute(),
        }
    }
}

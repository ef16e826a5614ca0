use crate::commands::{Command, WasmRulegenApp};
use anyhow::Result;
use clap::Parser;

mod args;
mod commands;
mod rng;

fn main() -> Result<()> {
    env_logger::init();
    WasmRulegenApp::parse().execute()
}

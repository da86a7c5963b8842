//! `tdbridge` entry point.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tdbridge::Cli;
use tdbridge_engine::TdJson;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tdbridge::app::run(cli, Arc::new(TdJson::new())).await
}

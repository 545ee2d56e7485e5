mod config;
mod langs;
mod run;

use anyhow::Result;
use clap::Parser;

/// Compile and run single-file programs inside a sandbox
#[derive(Debug, Parser)]
#[command(name = "coderun")]
enum Cli {
    /// run one source file and print the result as JSON
    Run(run::Run),
    /// list languages and whether their toolchain is installed
    Langs(langs::Langs),
    /// print the effective configuration as TOML
    Config(config::Config),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli {
        Cli::Run(v) => run::run(v).await?,
        Cli::Langs(v) => langs::langs(v).await?,
        Cli::Config(v) => config::config(v).await?,
    };

    Ok(())
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Debug, Parser)]
pub struct Langs {
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,
}

pub async fn langs(v: Langs) -> Result<()> {
    let runner = runner::init::new(&v.config).await?;
    println!("{}", serde_json::to_string_pretty(&runner.registry().list())?);
    Ok(())
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use runner::{init::config::load, LangSpec, LimitOverrides, Limits};

#[derive(Debug, Parser)]
pub struct Config {
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,
}

fn filled(limits: Limits) -> LimitOverrides {
    LimitOverrides {
        timeout_millis: Some(limits.timeout_millis),
        memory_bytes: Some(limits.memory_bytes),
        cpu_millis: Some(limits.cpu_millis),
        max_output_bytes: Some(limits.max_output_bytes),
    }
}

/// print the loaded config with every default spelled out
pub async fn config(v: Config) -> Result<()> {
    let mut config = load(&v.config).await?;

    config.limits = filled(config.limits());
    config.ceiling = filled(config.ceiling());
    config.language = runner::language::merge(LangSpec::builtin()?, config.language);

    print!("{}", toml::to_string(&config)?);
    Ok(())
}

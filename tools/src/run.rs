use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use runner::{CancellationToken, LimitOverrides, Submission};
use tokio::fs;

#[derive(Debug, Parser)]
pub struct Run {
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,
    /// language name or alias
    #[arg(long)]
    lang: String,
    /// source file
    file: PathBuf,
    /// file fed to the program's stdin
    #[arg(long)]
    stdin: Option<PathBuf>,

    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    memory_bytes: Option<u64>,
    #[arg(long)]
    cpu_ms: Option<u64>,
    #[arg(long)]
    max_output: Option<u64>,
}

pub async fn run(v: Run) -> Result<()> {
    let runner = runner::init::new(&v.config).await?;

    let source = fs::read_to_string(&v.file)
        .await
        .with_context(|| format!("cannot read {}", v.file.display()))?;
    let stdin = match &v.stdin {
        Some(path) => Some(
            fs::read_to_string(path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?,
        ),
        None => None,
    };

    let mut submission = Submission::new(source, v.lang).limits(LimitOverrides {
        timeout_millis: v.timeout_ms,
        memory_bytes: v.memory_bytes,
        cpu_millis: v.cpu_ms,
        max_output_bytes: v.max_output,
    });
    submission.stdin = stdin;

    // ctrl-c kills the stage in flight and still cleans up
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupted, cancelling");
            trigger.cancel();
        }
    });

    let result = runner.run_with_cancel(&submission, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

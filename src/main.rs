use anyhow::Context;
use vaultcore::config::Config;
use vaultcore::scenario::{self, Scenario};

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: vaultcore <scenario.json>");
        std::process::exit(2);
    };

    if let Err(e) = replay(&path, &config) {
        eprintln!("Scenario error: {:#}", e);
        std::process::exit(1);
    }
}

fn replay(path: &str, config: &Config) -> anyhow::Result<()> {
    let scenario =
        Scenario::load(path).with_context(|| format!("loading scenario from {}", path))?;
    let report = scenario::run(&scenario, config).context("replaying scenario")?;

    let failed = report.failures().count();
    tracing::info!(steps = report.outcomes.len(), failed, "replay finished");

    let output = serde_json::to_string_pretty(&report).context("serializing report")?;
    println!("{}", output);
    Ok(())
}

use std::io;
use std::sync::Arc;

use anyhow::{Context, bail};

use readiness_catalog::InMemoryCatalog;
use readiness_infra::ReadinessConfig;
use readiness_worker::Replayer;

const USAGE: &str = "usage: readiness-worker --catalog <snapshot.json> < changes.jsonl";

fn catalog_path() -> anyhow::Result<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--catalog" => return args.next().context(USAGE),
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unexpected argument `{other}`\n{USAGE}"),
        }
    }
    std::env::var("READINESS_CATALOG").context(USAGE)
}

fn main() -> anyhow::Result<()> {
    let config = ReadinessConfig::from_env()?;
    readiness_observability::init_with(&config.log_level, config.log_format);

    let path = catalog_path()?;
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("reading catalog snapshot {path}"))?;
    let catalog = InMemoryCatalog::from_json(&json)
        .with_context(|| format!("loading catalog snapshot {path}"))?;

    tracing::info!(mode = %config.execution_mode, catalog = %path, "replaying catalog changes");

    let existing = catalog.products().context("listing snapshot products")?;
    let mut replayer = Replayer::new(&config, Arc::new(catalog));
    replayer.bootstrap(existing)?;
    replayer.replay(io::stdin().lock())?;
    replayer.write_summaries(io::stdout().lock())?;

    let report = replayer.finish()?;
    if report.dead_letters > 0 {
        tracing::warn!(dead_letters = report.dead_letters, "some inspection jobs were dead-lettered");
    }
    Ok(())
}

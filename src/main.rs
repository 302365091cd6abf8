use anyhow::{Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use volgen::run::VertexRun;
use volgen::settings;

fn main() -> Result<()> {
    let config_file = settings::config_file()?;
    let settings = settings::load_config(&config_file)?;

    let level = if settings.verbosity {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting the default tracing subscriber")?;
    info!("Using configuration: {:?}", config_file);

    let mut run = VertexRun::new(settings)?;
    run.solve()?;
    run.writeup()
}

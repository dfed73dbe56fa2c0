use anyhow::Result;
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use multilayer::settings::{self, CliArgs};
use multilayer::sweep;

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let settings = settings::load_config_with(&args)?;
    let mut stack = settings.build_stack()?;

    let mut output = sweep::run(&settings, &mut stack, !args.quiet)?;
    output
        .header
        .push(format!("generated {}", Local::now().format("%Y-%m-%d %H:%M:%S")));
    output.writeup(settings.output.as_deref(), settings.format)?;

    if let Some(path) = &settings.output {
        tracing::info!("results written to {:?}", path);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    // RUST_LOG wins over the verbosity flag
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "multilayer=debug" } else { "multilayer=info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

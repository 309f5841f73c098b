use clap::Parser;
use docsift::{
    BaseDir,
    IndexRegistry,
    Lifecycle,
    TantivyEngine,
    cli::{Cli, Command},
    error,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSIFT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::Completions(args)) => {
            args.generate();
            Ok(())
        }
        Some(Command::Serve) | None => {
            init_tracing(cli.verbose, cli.quiet);
            serve(&cli)
        }
    }
}

fn serve(cli: &Cli) -> error::Result<()> {
    let base_dir = BaseDir::resolve(&cli.base_dir)?;
    info!(base_dir = %base_dir.root().display(), "using index directory");

    let registry = IndexRegistry::new(TantivyEngine, base_dir);
    let lifecycle = Lifecycle::new(registry, cli.server_config());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    let summary = runtime.block_on(lifecycle.run())?;
    if summary.failed > 0 {
        warn!(failed = summary.failed, "some indices failed to close");
    }
    Ok(())
}

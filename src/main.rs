use anyhow::Result;
use clap::Parser;
use humtrace::{
    app,
    cli::{handle_fit_command, Cli, CliCommand},
    config::Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Some(CliCommand::Version) = cli.command {
        println!("humtrace {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(CliCommand::Fit(args)) => handle_fit_command(&config, args),
        Some(CliCommand::Simulate(args)) => {
            app::run_simulation(config, args.sessions, args.snapshot).await
        }
        Some(CliCommand::Listen(args)) => app::run_listen(config, args.snapshot).await,
        Some(CliCommand::Version) => Ok(()),
        None => app::run_listen(config, None).await,
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use booking_outbox::cli::args::{Cli, Commands};
use booking_outbox::cli::commands::{self, LocalOnly};
use booking_outbox::config::Config;
use booking_outbox::engine::Outbox;
use booking_outbox::logging;
use booking_outbox::remote::{ConnectivityProbe, HttpRemote};
use booking_outbox::storage::Database;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    config.general.color.apply();
    let format = cli.output.unwrap_or(config.general.default_output);

    let db = Arc::new(Database::open().context("opening outbox database")?);
    let remote = Arc::new(HttpRemote::new(&config.remote)?);

    let probe: &dyn ConnectivityProbe = if commands::needs_network(&cli.command) {
        remote.as_ref()
    } else {
        &LocalOnly
    };
    let outbox = Outbox::init(config, db, remote.clone(), probe).await?;

    let result = match cli.command {
        Commands::Enqueue(args) => commands::enqueue(&outbox, args, format),
        Commands::Submit(args) => commands::submit(&outbox, args, format).await,
        Commands::List { status, limit } => commands::list(&outbox, status, limit, format),
        Commands::Show { id } => commands::show(&outbox, &id, format),
        Commands::Status => commands::status(&outbox, format),
        Commands::Sync => commands::sync(&outbox, format).await,
        Commands::Retry { id, all } => commands::retry(&outbox, id, all, format),
        Commands::Discard { id } => commands::discard(&outbox, &id, format),
        Commands::Prune { id, older_than } => commands::prune(&outbox, id, older_than, format),
        Commands::Draft(args) => commands::draft(&outbox, args.command, format),
    };

    outbox.shutdown().await?;
    let output = result?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

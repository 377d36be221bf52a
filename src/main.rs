#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

mod bot;
mod cli;
mod config;
mod db;
mod error;
mod parsers;
mod slack;
mod supervisor;
mod themes;
mod utils;

use bot::{BotContext, PropsBot};
use cli::{Cli, Command};
use config::Config;
use db::{DatabaseManager, format_report};
use slack::SlackRtmClient;
use supervisor::{ShutdownReport, Supervisor};
use themes::ThemeCatalog;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Command::Server { token: Some(token) } = &cli.command {
        config.slack.token = token.clone();
    }
    match cli.command {
        Command::Server { .. } => config.validate()?,
        _ => config.validate_offline()?,
    }

    utils::logging::init_tracing(&config.logging);

    let db_manager = DatabaseManager::new(&config.database)
        .await
        .context("failed to open database")?;
    db_manager.migrate().await.context("migration failed")?;

    match cli.command {
        Command::Migrate => {
            info!(backend = ?db_manager.db_type(), "database schema is up to date");
            Ok(())
        }
        Command::Leaderboard { limit } => {
            let limit = limit.unwrap_or(config.bot.leaderboard_size).max(1);
            let leaderboard = db_manager.leaderboard();
            let givers = leaderboard.top_givers(limit).await?;
            let receivers = leaderboard.top_receivers(limit).await?;
            print!("{}", format_report(&givers, &receivers));
            Ok(())
        }
        Command::Server { .. } => run_server(config, db_manager).await,
    }
}

async fn run_server(config: Config, db_manager: DatabaseManager) -> Result<()> {
    let catalog = ThemeCatalog::builtin().context("invalid theme catalog")?;
    let connection_key = Uuid::new_v4().to_string();
    info!(%connection_key, "teamprops starting up");

    let (stop_tx, stop_rx) = watch::channel(false);
    let token = SecretString::from(config.slack.token.clone());
    let (transport, events, slack_task) =
        SlackRtmClient::start(&config.slack, token, stop_rx.clone())?;

    let context = BotContext {
        transport: Arc::new(transport),
        props_store: db_manager.props_store(),
        reaction_store: db_manager.reaction_store(),
        catalog: Arc::new(catalog),
        connection_key,
        leaderboard_size: config.bot.leaderboard_size,
    };
    let bot = PropsBot::new(context, events, StdRng::from_entropy());

    let signal_stop = stop_tx.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination signal received");
        signal_stop.send_replace(true);
    });

    let supervisor = Supervisor::new(Duration::from_secs(config.bot.shutdown_timeout_secs));
    let outcome = supervisor.run(bot, stop_rx).await;

    stop_tx.send_replace(true);
    signal_task.abort();
    if let Err(e) = slack_task.await {
        warn!(error = %e, "slack connection task ended abnormally");
    }

    match outcome {
        Ok(ShutdownReport::TimedOut) => {
            warn!("event loop exceeded the shutdown budget");
            Ok(())
        }
        Ok(report) => {
            info!(?report, "teamprops shut down");
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            error!(error = %e, "slack rejected the bot, exiting");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "could not install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

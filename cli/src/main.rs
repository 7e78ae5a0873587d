mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use platform_api::ApiError;
use platform_obs::{ObsConfig, init_tracing};
use rust_decimal::Decimal;
use tracing::error;

use crate::{
    commands::{Mutation, Workspace, render},
    config::AppConfig,
};

#[derive(Parser, Debug)]
#[command(name = "pipeline", version, about = "Real-estate transaction pipeline")]
struct Cli {
    /// JSON array of transaction records.
    #[arg(long, short, value_name = "FILE", global = true, default_value = "transactions.json")]
    file: PathBuf,
    /// Reference date for overdue and due-soon checks (YYYY-MM-DD).
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print pipeline-wide rollups.
    Report,
    /// Show milestone progress and status for one transaction.
    Milestones {
        #[arg(long)]
        id: String,
    },
    /// Move a transaction to any stage (validated).
    Transition {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        stage: String,
    },
    /// Move a transaction one step along the forward path.
    Advance {
        #[command(flatten)]
        target: Target,
    },
    /// Mark a milestone complete.
    Complete {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        milestone: String,
    },
    /// Undo a milestone completion.
    Reopen {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        milestone: String,
    },
    /// Change deal amount and/or commission rate.
    Commission {
        #[command(flatten)]
        target: Target,
        #[arg(long, allow_negative_numbers = true)]
        amount_cents: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        rate: Option<Decimal>,
    },
}

#[derive(Args, Debug)]
struct Target {
    #[arg(long)]
    id: String,
    /// Rewrite FILE with the result instead of only printing it.
    #[arg(long)]
    write: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    init_tracing(
        ObsConfig::new(config.service_name.clone())
            .with_filter(config.log_filter.clone())
            .with_otlp_endpoint(config.otlp_endpoint.clone()),
    )?;

    let today = cli
        .today
        .or(config.today)
        .unwrap_or_else(|| Local::now().date_naive());
    let pretty = cli.pretty || config.pretty;
    let workspace = Workspace::open(&cli.file)?;

    let (target, mutation) = match cli.command {
        Command::Report => {
            println!("{}", render(&workspace.report(today)?, pretty)?);
            return Ok(());
        }
        Command::Milestones { id } => {
            println!("{}", render(&workspace.milestones(&id, today)?, pretty)?);
            return Ok(());
        }
        Command::Transition { target, stage } => (target, Mutation::Transition(stage)),
        Command::Advance { target } => (target, Mutation::Advance),
        Command::Complete { target, milestone } => (target, Mutation::Complete(milestone)),
        Command::Reopen { target, milestone } => (target, Mutation::Reopen(milestone)),
        Command::Commission {
            target,
            amount_cents,
            rate,
        } => (target, Mutation::Commission { amount_cents, rate }),
    };

    let updated = workspace.mutate(&target.id, &mutation, Utc::now())?;
    if target.write {
        workspace.save()?;
    }
    println!("{}", render(&updated.to_record(), pretty)?);
    Ok(())
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<ApiError>() {
        Some(api) => {
            error!(code = api.code(), "command failed");
            let body = serde_json::to_string(&api.body())
                .unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", api.code()));
            eprintln!("{body}");
        }
        None => eprintln!("error: {err:#}"),
    }
}

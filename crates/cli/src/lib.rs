pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use staffdesk_core::config::{AppConfig, LoadOptions, LogFormat};
use staffdesk_core::domain::leave::DecisionAction;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "staffdesk",
    about = "Staffdesk leave approval operator CLI",
    long_about = "Inspect who approves leave requests, check approval rights, and commit decisions against the Staffdesk organization database.",
    after_help = "Examples:\n  staffdesk migrate\n  staffdesk seed\n  staffdesk resolve u-rita\n  staffdesk can-approve u-hana u-rita\n  staffdesk decide lr-demo-001 --approver u-hana --action approve"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo organization and verify it")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, schema, and superadmin presence")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show the primary, coverage, and candidate approvers for a requester")]
    Resolve {
        #[arg(help = "User id of the leave requester")]
        requester: String,
    },
    #[command(about = "Check whether an approver may decide a requester's leave requests")]
    CanApprove {
        #[arg(help = "User id of the approver")]
        approver: String,
        #[arg(help = "User id of the leave requester")]
        requester: String,
    },
    #[command(about = "Approve or reject a pending leave request after an authorization check")]
    Decide {
        #[arg(help = "Leave request id")]
        request: String,
        #[arg(long, help = "User id of the deciding approver")]
        approver: String,
        #[arg(long, value_enum)]
        action: ActionArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActionArg {
    Approve,
    Reject,
}

impl From<ActionArg> for DecisionAction {
    fn from(value: ActionArg) -> Self {
        match value {
            ActionArg::Approve => DecisionAction::Approve,
            ActionArg::Reject => DecisionAction::Reject,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Resolve { requester } => commands::resolve::run(&requester),
        Command::CanApprove { approver, requester } => {
            commands::can_approve::run(&approver, &requester)
        }
        Command::Decide { request, approver, action } => {
            commands::decide::run(&request, &approver, action.into())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr; stdout carries the command payload.
fn init_logging() {
    use tracing::Level;

    let (level, format) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            (config.logging.level.parse::<Level>().unwrap_or(Level::INFO), config.logging.format)
        }
        Err(_) => (Level::WARN, LogFormat::Compact),
    };

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);
    let initialized = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = initialized {
        eprintln!("{}", logging_disabled_message(&error));
    }
}

fn logging_disabled_message(error: &dyn std::fmt::Display) -> String {
    format!("staffdesk: logging disabled: {error}")
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::util::SubscriberInitExt;

    use super::logging_disabled_message;

    #[test]
    fn second_logging_init_reports_instead_of_panicking() {
        let _ = tracing_subscriber::fmt().with_writer(std::io::sink).try_init();
        let error = tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .finish()
            .try_init()
            .expect_err("global subscriber is already set");

        let message = logging_disabled_message(&error);
        assert!(message.starts_with("staffdesk: logging disabled: "), "message: {message}");
    }
}

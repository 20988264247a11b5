use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::features::sync::{OperationStatus, OperationType};

#[derive(Parser)]
#[command(name = "booking-outbox")]
#[command(about = "Offline write queue and sync engine for the booking service")]
#[command(long_about = "booking-outbox - offline writes for the booking service

Records bookings and customer changes while the booking service is
unreachable and replays them in order, exactly once, when it comes back.

QUICK START:
  booking-outbox submit create-booking -p '{\"customer_id\": \"C-1\"}'
  booking-outbox list                 Show queued operations
  booking-outbox sync                 Replay pending operations now
  booking-outbox retry <ID>           Re-queue a failed operation

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

Data lives in ~/.booking-outbox (override with BOOKING_OUTBOX_HOME).")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Defaults to the `general.default_output` config setting.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a write without trying the service first
    ///
    /// The operation is stored durably and replayed by `sync`. Prints the
    /// operation id and its provisional PENDING- reference.
    ///
    /// # Examples
    ///
    ///   booking-outbox enqueue create-booking -p '{"customer_id": "C-1"}'
    ///   booking-outbox enqueue cancel-booking -p '{"booking_id": "BK-9"}' -d "Cancel BK-9"
    Enqueue(WriteArgs),

    /// Send a write now, queueing it if the service is unreachable
    ///
    /// Rejections by the service (validation or business rules) are
    /// reported and not queued.
    ///
    /// # Examples
    ///
    ///   booking-outbox submit create-booking -p @booking.json --form booking
    Submit(SubmitArgs),

    /// List queued operations
    #[command(alias = "ls")]
    List {
        /// Only show operations with this status
        #[arg(long, short = 's')]
        status: Option<OperationStatus>,

        /// Maximum operations to show
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Show one operation in detail
    Show {
        /// Operation id
        id: String,
    },

    /// Show queue counts and connectivity
    Status,

    /// Probe the service and replay pending operations
    Sync,

    /// Re-queue terminally failed operations
    Retry {
        /// Operation id
        id: Option<String>,

        /// Retry every failed operation
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Remove an operation that is not in flight
    Discard {
        /// Operation id
        id: String,
    },

    /// Remove completed or failed operations
    Prune {
        /// Operation id
        id: Option<String>,

        /// Remove completed operations older than this many hours
        #[arg(long, conflicts_with = "id", value_parser = clap::value_parser!(u32).range(1..))]
        older_than: Option<u32>,
    },

    /// Manage saved form drafts
    Draft(DraftArgs),
}

/// A write to send or queue.
#[derive(Args)]
pub struct WriteArgs {
    /// Operation type (create-booking, update-booking, cancel-booking, create-customer)
    pub operation: OperationType,

    /// Payload as JSON, or @path to read it from a file
    #[arg(long, short = 'p')]
    pub payload: String,

    /// Provisional result to show until confirmed (JSON, or @path)
    #[arg(long)]
    pub optimistic: Option<String>,

    /// Short human label
    #[arg(long, short = 'd')]
    pub description: Option<String>,
}

#[derive(Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub write: WriteArgs,

    /// Clear this form's draft once the write is sent or queued
    #[arg(long)]
    pub form: Option<String>,
}

#[derive(Args)]
pub struct DraftArgs {
    #[command(subcommand)]
    pub command: DraftCommands,
}

/// Draft subcommands.
#[derive(Subcommand)]
pub enum DraftCommands {
    /// Save form state (ignored if it has no content)
    Save {
        /// Form name
        form: String,

        /// Form state as JSON, or @path
        data: String,
    },

    /// Show a draft if it can still be resumed
    Show {
        /// Form name
        form: String,
    },

    /// Delete a draft
    Clear {
        /// Form name
        form: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enqueue() {
        let cli = Cli::try_parse_from([
            "booking-outbox",
            "enqueue",
            "create-booking",
            "-p",
            "{}",
            "-o",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.output, Some(OutputFormat::Json));
        match cli.command {
            Commands::Enqueue(args) => {
                assert_eq!(args.operation, OperationType::CreateBooking);
                assert_eq!(args.payload, "{}");
            },
            _ => panic!("expected enqueue"),
        }
    }

    #[test]
    fn test_parse_list_status() {
        let cli = Cli::try_parse_from(["booking-outbox", "list", "-s", "failed"]).unwrap();
        match cli.command {
            Commands::List { status, .. } => assert_eq!(status, Some(OperationStatus::Failed)),
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_unknown_operation_rejected() {
        assert!(Cli::try_parse_from(["booking-outbox", "enqueue", "ship-it", "-p", "{}"]).is_err());
    }

    #[test]
    fn test_prune_retention_must_be_positive() {
        let cli = Cli::try_parse_from(["booking-outbox", "prune", "--older-than", "48"]).unwrap();
        match cli.command {
            Commands::Prune { older_than, .. } => assert_eq!(older_than, Some(48)),
            _ => panic!("expected prune"),
        }

        for bad in ["0", "-5", "99999999999"] {
            assert!(
                Cli::try_parse_from(["booking-outbox", "prune", "--older-than", bad]).is_err(),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn test_verbose_counts() {
        let cli = Cli::try_parse_from(["booking-outbox", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}

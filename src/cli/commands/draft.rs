//! Draft command implementation.

use serde_json::json;

use super::read_json_arg;
use crate::cli::args::{DraftCommands, OutputFormat};
use crate::engine::Outbox;
use crate::error::OutboxError;
use crate::output::{format_draft, to_json};

/// Execute draft subcommands.
///
/// # Errors
///
/// Returns an error if the draft cannot be read, written or parsed.
pub fn draft(outbox: &Outbox, cmd: DraftCommands, format: OutputFormat) -> Result<String, OutboxError> {
    match cmd {
        DraftCommands::Save { form, data } => {
            let data = read_json_arg(&data)?;
            let saved = outbox.drafts(&form).save_draft(&data)?;

            match format {
                OutputFormat::Json => to_json(&json!({"form": form, "saved": saved})),
                OutputFormat::Pretty if saved => Ok(format!("Saved draft for '{form}'")),
                OutputFormat::Pretty => Ok(format!("Nothing to save for '{form}'")),
            }
        },
        DraftCommands::Show { form } => {
            let load = outbox.drafts(&form).load()?;
            format_draft(&form, &load, format)
        },
        DraftCommands::Clear { form } => {
            let cleared = outbox.drafts(&form).clear_draft()?;

            match format {
                OutputFormat::Json => to_json(&json!({"form": form, "cleared": cleared})),
                OutputFormat::Pretty if cleared => Ok(format!("Cleared draft for '{form}'")),
                OutputFormat::Pretty => Ok(format!("No draft saved for '{form}'")),
            }
        },
    }
}

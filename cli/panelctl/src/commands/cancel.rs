//! `panelctl cancel` - tombstone a booking and free its capacity.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use panelist_id::InterviewerId;
use panelist_scheduler::{AppendOutcome, LedgerError};

use crate::error::CliError;
use crate::output::{local_time, print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct CancelCommand {
    /// Interviewer holding the booking.
    #[arg(long)]
    interviewer: String,

    /// Start of the booked interview (RFC 3339).
    #[arg(long)]
    at: DateTime<Utc>,

    /// Recorded with the tombstone.
    #[arg(long, default_value = "cancelled")]
    reason: String,
}

impl CancelCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let interviewer_id = InterviewerId::parse(&self.interviewer)
            .map_err(|e| CliError::InvalidArgument(format!("interviewer id: {e}")))?;
        let pipeline = ctx.pipeline()?;

        let outcome = match pipeline
            .cancel_booking(&interviewer_id, self.at, &self.reason)
            .await
        {
            Ok(outcome) => outcome,
            Err(LedgerError::BookingNotFound(key)) => {
                return Err(CliError::NotFound(format!("no live booking {key}")).into())
            }
            Err(e) => return Err(e.into()),
        };

        if ctx.format == OutputFormat::Json {
            print_single(&serde_json::json!({
                "interviewer_id": interviewer_id,
                "scheduled_at": self.at,
                "cancelled": outcome == AppendOutcome::Appended,
            }));
            return Ok(());
        }

        let tz = pipeline
            .registry()
            .get(&interviewer_id)
            .map(|i| i.timezone)
            .unwrap_or(ctx.config.reference_tz);
        match outcome {
            AppendOutcome::Appended => print_success(&format!(
                "Cancelled {} on {}",
                interviewer_id,
                local_time(self.at, tz)
            )),
            _ => print_info("Booking was already cancelled"),
        }
        Ok(())
    }
}

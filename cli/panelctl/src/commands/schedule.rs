//! `panelctl schedule` - book the best slot and send the invite.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use panelist_scheduler::{RunOutcome, Stage};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{
    local_time, print_info, print_output, print_single, print_success, print_warning,
    OutputFormat,
};

use super::preview::no_availability;
use super::request::RequestArgs;
use super::{cancel_on_ctrl_c, CommandContext};

#[derive(Debug, Args)]
pub struct ScheduleCommand {
    #[command(flatten)]
    request: RequestArgs,

    /// Print the decision trace.
    #[arg(long)]
    explain: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct TraceRow {
    #[tabled(rename = "Stage")]
    stage: Stage,

    #[tabled(rename = "At")]
    at: DateTime<Utc>,

    #[tabled(rename = "Event")]
    message: String,
}

impl ScheduleCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let pipeline = ctx.pipeline()?;
        let request = self.request.into_request(Utc::now())?;

        match pipeline.schedule(request, cancel_on_ctrl_c()).await {
            RunOutcome::Committed(assignment) => {
                if ctx.format == OutputFormat::Json {
                    print_single(&assignment);
                    return Ok(());
                }

                print_success(&format!(
                    "Booked {} with {} ({}) on {}",
                    assignment.request.candidate_name,
                    assignment.interviewer.name,
                    assignment.interviewer.id,
                    local_time(assignment.slot.start, assignment.interviewer.timezone),
                ));
                print_info(&format!(
                    "Candidate time: {}",
                    local_time(assignment.slot.start, assignment.request.candidate_timezone)
                ));
                print_info(&assignment.reasoning);
                print_info(&format!("Assignment ID: {}", assignment.id));

                if let Some(error) = &assignment.invite_error {
                    print_warning(&format!("Invite not delivered ({error}); the booking stands"));
                }

                if self.explain {
                    let rows: Vec<TraceRow> = assignment
                        .trace
                        .entries()
                        .iter()
                        .map(|e| TraceRow {
                            stage: e.stage,
                            at: e.at,
                            message: e.message.clone(),
                        })
                        .collect();
                    print_output(&rows, ctx.format);
                }
                Ok(())
            }
            RunOutcome::NoAvailability { report, .. } => {
                Err(no_availability(&report, ctx.format).into())
            }
            RunOutcome::Aborted { reason, trace, .. } => {
                if self.explain && ctx.format == OutputFormat::Table {
                    for entry in trace.entries() {
                        print_info(&format!("[{}] {}", entry.stage, entry.message));
                    }
                }
                Err(CliError::Aborted(reason.to_string()).into())
            }
        }
    }
}

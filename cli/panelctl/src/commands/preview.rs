//! `panelctl preview` - rank candidate slots without booking.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use panelist_scheduler::{DecisionPipeline, NoAvailabilityReport, PreviewOutcome, RankedCandidate};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{
    local_time, print_info, print_output, print_single, print_warning, OutputFormat,
};

use super::request::RequestArgs;
use super::{cancel_on_ctrl_c, CommandContext};

#[derive(Debug, Args)]
pub struct PreviewCommand {
    #[command(flatten)]
    request: RequestArgs,
}

#[derive(Debug, Serialize, Tabled)]
struct CandidateRow {
    #[tabled(rename = "#")]
    rank: usize,

    #[tabled(rename = "Interviewer")]
    interviewer: String,

    #[tabled(rename = "Interviewer time")]
    interviewer_time: String,

    #[tabled(rename = "Candidate time")]
    candidate_time: String,

    #[tabled(rename = "Score")]
    score: String,

    #[tabled(rename = "Deviation")]
    deviation: String,

    #[tabled(rename = "This week")]
    week_count: u32,

    #[tabled(rename = "Specialty")]
    specialty: String,
}

impl PreviewCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let pipeline = ctx.pipeline()?;
        let request = self.request.into_request(Utc::now())?;
        let candidate_tz = request.candidate_timezone;

        match pipeline.preview(request, cancel_on_ctrl_c()).await {
            PreviewOutcome::Ready(preview) => {
                if ctx.format == OutputFormat::Json {
                    print_single(&preview);
                    return Ok(());
                }

                let rows: Vec<CandidateRow> = preview
                    .candidates
                    .iter()
                    .enumerate()
                    .map(|(i, c)| candidate_row(&pipeline, i + 1, c, candidate_tz))
                    .collect();
                print_output(&rows, ctx.format);

                print_info(&format!(
                    "{} of {} candidates; fair share {:.1} interviews per interviewer",
                    rows.len(),
                    preview.total_candidates,
                    preview.fairness.fair_share
                ));
                if preview.assist_applied {
                    print_info("Order adjusted by the ranking assist");
                }
                for exclusion in &preview.excluded {
                    print_warning(&format!(
                        "{} excluded: {}",
                        exclusion.interviewer_id, exclusion.reason
                    ));
                }
                for full in &preview.capacity_dropped {
                    print_warning(&format!(
                        "{} at weekly capacity ({}/{})",
                        full.interviewer_id, full.current_week, full.max_per_week
                    ));
                }
                Ok(())
            }
            PreviewOutcome::NoAvailability { report, .. } => {
                Err(no_availability(&report, ctx.format).into())
            }
            PreviewOutcome::Aborted { reason, .. } => {
                Err(CliError::Aborted(reason.to_string()).into())
            }
        }
    }
}

fn candidate_row(
    pipeline: &DecisionPipeline,
    rank: usize,
    candidate: &RankedCandidate,
    candidate_tz: chrono_tz::Tz,
) -> CandidateRow {
    let interviewer_tz = pipeline
        .registry()
        .get(candidate.interviewer_id())
        .map(|i| i.timezone)
        .unwrap_or(candidate_tz);

    CandidateRow {
        rank,
        interviewer: format!("{} ({})", candidate.interviewer_name, candidate.interviewer_id()),
        interviewer_time: local_time(candidate.slot.start, interviewer_tz),
        candidate_time: local_time(candidate.slot.start, candidate_tz),
        score: format!("{:.2}", candidate.score),
        deviation: format!("{:+.1}", candidate.deviation),
        week_count: candidate.week_count,
        specialty: if candidate.specialty_match { "yes" } else { "-" }.to_string(),
    }
}

/// Reports why nothing was bookable and returns the error to exit with.
pub fn no_availability(report: &NoAvailabilityReport, format: OutputFormat) -> CliError {
    if format == OutputFormat::Json {
        print_single(report);
    } else {
        for exclusion in &report.excluded {
            print_warning(&format!(
                "{} excluded: {}",
                exclusion.interviewer_id, exclusion.reason
            ));
        }
        for full in &report.capacity_dropped {
            print_warning(&format!(
                "{} at weekly capacity ({}/{})",
                full.interviewer_id, full.current_week, full.max_per_week
            ));
        }
    }

    CliError::NoAvailability(format!(
        "nothing left after {} ({} interviewers queried)",
        report.stage, report.queried
    ))
}

//! `panelctl upcoming` - booked interviews from now on.

use anyhow::Result;
use chrono_tz::Tz;
use panelist_events::{HistoryRecord, RecordKind};
use panelist_scheduler::InterviewerRegistry;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{local_time, print_info, print_output, print_single, OutputFormat};

use super::CommandContext;

#[derive(Debug, Serialize, Tabled)]
struct UpcomingRow {
    #[tabled(rename = "When")]
    when: String,

    #[tabled(rename = "Interviewer")]
    interviewer: String,

    #[tabled(rename = "Specialty")]
    specialty: String,

    #[tabled(rename = "Minutes")]
    duration: String,

    #[tabled(rename = "Assignment")]
    assignment_id: String,
}

fn upcoming_row(
    record: &HistoryRecord,
    registry: &InterviewerRegistry,
    fallback: Tz,
) -> UpcomingRow {
    let interviewer = registry.get(&record.interviewer_id);
    let tz = interviewer.map(|i| i.timezone).unwrap_or(fallback);

    let (duration, assignment_id) = match &record.kind {
        RecordKind::Booked {
            assignment_id,
            duration_minutes,
        } => (duration_minutes.to_string(), assignment_id.to_string()),
        RecordKind::Cancelled { .. } => ("-".to_string(), "-".to_string()),
    };

    UpcomingRow {
        when: local_time(record.scheduled_at, tz),
        interviewer: match interviewer {
            Some(i) => format!("{} ({})", i.name, i.id),
            None => record.interviewer_id.to_string(),
        },
        specialty: record.specialty.clone().unwrap_or_else(|| "-".to_string()),
        duration,
        assignment_id,
    }
}

pub async fn run(ctx: CommandContext) -> Result<()> {
    let pipeline = ctx.pipeline()?;
    let records = pipeline.upcoming().await?;

    if ctx.format == OutputFormat::Json {
        print_single(&records);
        return Ok(());
    }

    if records.is_empty() {
        print_info("No upcoming interviews");
        return Ok(());
    }

    let rows: Vec<UpcomingRow> = records
        .iter()
        .map(|r| upcoming_row(r, pipeline.registry(), ctx.config.reference_tz))
        .collect();
    print_output(&rows, ctx.format);
    Ok(())
}

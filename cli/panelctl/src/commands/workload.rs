//! `panelctl workload` - per-interviewer load.

use anyhow::Result;
use panelist_scheduler::WorkloadStats;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_single, OutputFormat};

use super::CommandContext;

#[derive(Debug, Serialize, Tabled)]
struct WorkloadRow {
    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Specialties")]
    specialties: String,

    #[tabled(rename = "Rolling")]
    rolling: u32,

    #[tabled(rename = "This week")]
    week: String,

    #[tabled(rename = "Deviation")]
    deviation: String,

    #[tabled(rename = "Capacity")]
    capacity: String,
}

impl From<&WorkloadStats> for WorkloadRow {
    fn from(stats: &WorkloadStats) -> Self {
        let specialties = if stats.specialties.is_empty() {
            "-".to_string()
        } else {
            stats
                .specialties
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        Self {
            id: stats.interviewer_id.to_string(),
            name: stats.name.clone(),
            specialties,
            rolling: stats.rolling_count,
            week: format!("{}/{}", stats.week_count, stats.max_per_week),
            deviation: format!("{:+.1}", stats.deviation),
            capacity: if stats.at_capacity {
                "FULL".to_string()
            } else {
                format!("{:.0}%", stats.capacity_used_pct)
            },
        }
    }
}

pub async fn run(ctx: CommandContext) -> Result<()> {
    let pipeline = ctx.pipeline()?;
    let report = pipeline.workload().await?;

    match ctx.format {
        OutputFormat::Json => print_single(&report),
        OutputFormat::Table => {
            let rows: Vec<WorkloadRow> = report.iter().map(WorkloadRow::from).collect();
            print_output(&rows, ctx.format);
        }
    }
    Ok(())
}

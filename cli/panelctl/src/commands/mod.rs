//! CLI commands.

mod cancel;
mod preview;
mod request;
mod schedule;
mod upcoming;
mod workload;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use panelist_scheduler::{
    CancelSignal, Collaborators, DecisionPipeline, FileLedger, HttpRankingAssist,
    InterviewerRegistry, LoggingInviteSender, RankingAssist, SchedulerConfig, StaticCalendar,
    SystemClock,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::output::OutputFormat;

/// panelctl - Fair interview scheduling from the command line.
#[derive(Debug, Parser)]
#[command(name = "panelctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Interviewer registry file.
    #[arg(long, global = true, env = "PANELIST_REGISTRY", default_value = "interviewers.json")]
    registry: PathBuf,

    /// Busy-calendar file; without one every interviewer is free.
    #[arg(long, global = true, env = "PANELIST_CALENDAR")]
    calendar: Option<PathBuf>,

    /// Interview ledger file, created on first booking.
    #[arg(long, global = true, env = "PANELIST_LEDGER", default_value = "ledger.json")]
    ledger: PathBuf,

    /// Ranking assist endpoint.
    #[arg(long, global = true, env = "PANELIST_ASSIST_URL")]
    assist_url: Option<String>,

    /// Bearer token for the ranking assist.
    #[arg(long, global = true, env = "PANELIST_ASSIST_TOKEN", hide_env_values = true)]
    assist_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rank candidate slots without booking.
    Preview(preview::PreviewCommand),

    /// Book the best slot and send the invite.
    Schedule(schedule::ScheduleCommand),

    /// Show per-interviewer workload.
    Workload,

    /// List booked interviews from now on.
    Upcoming,

    /// Cancel a booked interview.
    Cancel(cancel::CancelCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = OutputFormat::parse(&self.format);
        let config = SchedulerConfig::from_env()?;
        init_tracing(&config.log_level, format);

        let ctx = CommandContext {
            config,
            format,
            registry: self.registry,
            calendar: self.calendar,
            ledger: self.ledger,
            assist_url: self.assist_url,
            assist_token: self.assist_token,
        };

        match self.command {
            Commands::Preview(cmd) => cmd.run(ctx).await,
            Commands::Schedule(cmd) => cmd.run(ctx).await,
            Commands::Workload => workload::run(ctx).await,
            Commands::Upcoming => upcoming::run(ctx).await,
            Commands::Cancel(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("panelctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Logs go to stderr so stdout stays parseable.
fn init_tracing(level: &str, format: OutputFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        OutputFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        OutputFormat::Table => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: SchedulerConfig,
    pub format: OutputFormat,
    pub registry: PathBuf,
    pub calendar: Option<PathBuf>,
    pub ledger: PathBuf,
    pub assist_url: Option<String>,
    pub assist_token: Option<String>,
}

impl CommandContext {
    /// Wire a pipeline from the configured files.
    pub fn pipeline(&self) -> Result<DecisionPipeline> {
        let registry = InterviewerRegistry::load(&self.registry)?;

        let calendar = match &self.calendar {
            Some(path) => StaticCalendar::load(path)?,
            None => {
                warn!("No calendar file given; treating every interviewer as free");
                StaticCalendar::new()
            }
        };

        let ledger = FileLedger::open(&self.ledger, self.config.reference_tz).with_context(|| {
            format!("Failed to open ledger: {}", self.ledger.display())
        })?;

        let assist: Option<Arc<dyn RankingAssist>> = match &self.assist_url {
            Some(url) => {
                info!(endpoint = %url, "Using ranking assist");
                Some(Arc::new(HttpRankingAssist::new(
                    url.clone(),
                    self.assist_token.as_deref(),
                    self.config.assist_timeout,
                )?))
            }
            None => None,
        };

        let pipeline = DecisionPipeline::new(
            &self.config,
            Arc::new(registry),
            Arc::new(ledger),
            Collaborators {
                calendar: Arc::new(calendar),
                invites: Arc::new(LoggingInviteSender),
                clock: Arc::new(SystemClock),
                assist,
            },
        )?;
        Ok(pipeline)
    }
}

/// A cancellation signal that fires on Ctrl+C.
pub fn cancel_on_ctrl_c() -> CancelSignal {
    let (handle, signal) = CancelSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling run");
            handle.cancel();
        }
    });
    signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "panelctl",
            "workload",
            "--registry",
            "team.json",
            "--ledger",
            "/tmp/ledger.json",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.registry, PathBuf::from("team.json"));
        assert_eq!(cli.ledger, PathBuf::from("/tmp/ledger.json"));
        assert_eq!(cli.format, "json");
        assert!(matches!(cli.command, Commands::Workload));
    }

    fn context(dir: &std::path::Path) -> CommandContext {
        let registry = dir.join("interviewers.json");
        std::fs::write(
            &registry,
            r#"{"solution_architects": [
                {"name": "Alex", "email": "alex@example.com", "specialty": "Platform",
                 "timezone": "America/New_York", "max_interviews_per_week": 4},
                {"name": "Sam", "email": "sam@example.com", "timezone": "Europe/London"}
            ]}"#,
        )
        .unwrap();

        CommandContext {
            config: SchedulerConfig::default(),
            format: OutputFormat::Json,
            registry,
            calendar: None,
            ledger: dir.join("ledger.json"),
            assist_url: None,
            assist_token: None,
        }
    }

    #[tokio::test]
    async fn test_pipeline_wires_registry_and_fresh_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = context(dir.path()).pipeline().unwrap();

        let workload = pipeline.workload().await.unwrap();
        assert_eq!(workload.len(), 2);
        assert_eq!(workload[0].interviewer_id.as_ref(), "sa1");
        assert_eq!(workload[0].max_per_week, 4);
        assert!(pipeline.upcoming().await.unwrap().is_empty());
    }

    #[test]
    fn test_pipeline_reports_missing_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.registry = dir.path().join("missing.json");

        assert!(ctx.pipeline().is_err());
    }

    #[test]
    fn test_schedule_requires_candidate_email() {
        let result = Cli::try_parse_from([
            "panelctl",
            "schedule",
            "--name",
            "Jordan",
            "--timezone",
            "America/New_York",
        ]);
        assert!(result.is_err());
    }
}

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use chrono_tz::Tz;

use crate::error::{SchedulerError, SchedulerResult};
use crate::hours::WorkingHours;
use crate::ranking::{FairnessWindow, RankingWeights};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Local working window applied to both interviewer and candidate.
    pub working_hours: WorkingHours,

    /// Slot start grid in minutes, aligned to the UTC epoch.
    pub slot_step_minutes: u32,

    /// Upper bound on slots produced per interviewer.
    pub max_slots_per_interviewer: usize,

    /// Window the fairness ranker counts bookings over.
    pub fairness_window: FairnessWindow,

    pub weights: RankingWeights,

    /// How many of the top candidates the ranking assist may reorder.
    pub assist_top_k: usize,
    pub assist_timeout: Duration,

    /// Commit attempts before a run aborts with capacity-race-exhausted.
    pub commit_retry_bound: usize,

    pub calendar_query_timeout: Duration,
    pub max_concurrent_queries: usize,

    /// Candidates returned by preview runs.
    pub preview_top_k: usize,

    pub invite_timeout: Duration,

    /// Organization timezone used for week buckets.
    pub reference_tz: Tz,

    pub log_level: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            working_hours: WorkingHours::default(),
            slot_step_minutes: 30,
            max_slots_per_interviewer: 40,
            fairness_window: FairnessWindow::default(),
            weights: RankingWeights::default(),
            assist_top_k: 5,
            assist_timeout: Duration::from_secs(5),
            commit_retry_bound: 3,
            calendar_query_timeout: Duration::from_secs(10),
            max_concurrent_queries: 8,
            preview_top_k: 5,
            invite_timeout: Duration::from_secs(10),
            reference_tz: chrono_tz::America::Los_Angeles,
            log_level: "info".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Loads configuration from `PANELIST_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let start_hour: u32 = env_or("PANELIST_WORK_START_HOUR", 8)?;
        let end_hour: u32 = env_or("PANELIST_WORK_END_HOUR", 18)?;
        let skip_weekends = std::env::var("PANELIST_SKIP_WEEKENDS")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);
        let working_hours = WorkingHours::from_hours(start_hour, end_hour)
            .with_context(|| {
                format!("invalid working hours {start_hour:02}:00-{end_hour:02}:00")
            })?
            .skipping_weekends(skip_weekends);

        let fairness_window = FairnessWindow {
            lookback: TimeDelta::days(env_or("PANELIST_ROLLING_WINDOW_DAYS", 21)?),
            lookahead: TimeDelta::days(env_or("PANELIST_FAIRNESS_LOOKAHEAD_DAYS", 28)?),
        };

        let weights = RankingWeights {
            specialty_bonus: env_or("PANELIST_SPECIALTY_BONUS", defaults.weights.specialty_bonus)?,
            timezone_bonus: env_or("PANELIST_TIMEZONE_BONUS", defaults.weights.timezone_bonus)?,
        };

        let reference_tz: Tz = std::env::var("PANELIST_REFERENCE_TZ")
            .unwrap_or_else(|_| "America/Los_Angeles".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid PANELIST_REFERENCE_TZ: {e}"))?;

        let config = Self {
            working_hours,
            slot_step_minutes: env_or("PANELIST_SLOT_STEP_MINUTES", defaults.slot_step_minutes)?,
            max_slots_per_interviewer: env_or(
                "PANELIST_MAX_SLOTS_PER_INTERVIEWER",
                defaults.max_slots_per_interviewer,
            )?,
            fairness_window,
            weights,
            assist_top_k: env_or("PANELIST_ASSIST_TOP_K", defaults.assist_top_k)?,
            assist_timeout: Duration::from_millis(env_or("PANELIST_ASSIST_TIMEOUT_MS", 5_000)?),
            commit_retry_bound: env_or("PANELIST_COMMIT_RETRY_BOUND", defaults.commit_retry_bound)?,
            calendar_query_timeout: Duration::from_millis(env_or(
                "PANELIST_CALENDAR_TIMEOUT_MS",
                10_000,
            )?),
            max_concurrent_queries: env_or(
                "PANELIST_MAX_CONCURRENT_QUERIES",
                defaults.max_concurrent_queries,
            )?,
            preview_top_k: env_or("PANELIST_PREVIEW_TOP_K", defaults.preview_top_k)?,
            invite_timeout: Duration::from_millis(env_or("PANELIST_INVITE_TIMEOUT_MS", 10_000)?),
            reference_tz,
            log_level: std::env::var("PANELIST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values no run could work with.
    pub fn validate(&self) -> SchedulerResult<()> {
        let invalid = |msg: &str| Err(SchedulerError::Configuration(msg.to_string()));

        if self.working_hours.day_length() <= TimeDelta::zero() {
            return invalid("working hours must end after they start");
        }
        if self.slot_step_minutes == 0 {
            return invalid("slot step must be positive");
        }
        if self.max_slots_per_interviewer == 0 {
            return invalid("max slots per interviewer must be positive");
        }
        if self.fairness_window.lookback < TimeDelta::zero()
            || self.fairness_window.lookahead < TimeDelta::zero()
        {
            return invalid("fairness window bounds must not be negative");
        }
        if !self.weights.specialty_bonus.is_finite() || !self.weights.timezone_bonus.is_finite() {
            return invalid("ranking weights must be finite");
        }
        if self.commit_retry_bound == 0 {
            return invalid("commit retry bound must be at least 1");
        }
        if self.max_concurrent_queries == 0 {
            return invalid("max concurrent queries must be at least 1");
        }
        Ok(())
    }

    pub fn slot_step(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.slot_step_minutes))
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.slot_step(), TimeDelta::minutes(30));
        assert_eq!(config.weights.specialty_bonus, 1.5);
        assert_eq!(config.fairness_window.lookback, TimeDelta::days(21));
        assert!(config.working_hours.skip_weekends);
    }

    #[test]
    fn test_validate_rejects_zero_retry_bound() {
        let config = SchedulerConfig {
            commit_retry_bound: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_finite_weights() {
        let config = SchedulerConfig {
            weights: RankingWeights {
                specialty_bonus: f64::NAN,
                timezone_bonus: 1.0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

//! Interview request flags shared by `preview` and `schedule`.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use clap::Args;
use panelist_scheduler::hours::local_to_utc;
use panelist_scheduler::{InterviewRequest, SpecialtyMap, SpecialtyTag};

use crate::error::CliError;

/// Default search window when `--to` is omitted.
const DEFAULT_RANGE_DAYS: u64 = 7;

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Candidate name.
    #[arg(long)]
    name: String,

    /// Candidate email.
    #[arg(long)]
    email: String,

    /// Candidate IANA timezone, e.g. America/New_York.
    #[arg(long)]
    timezone: String,

    /// Interview type; selects the preferred specialties.
    #[arg(long = "type", default_value = "tech_screen")]
    interview_type: String,

    /// Interview length in minutes.
    #[arg(long, default_value = "60")]
    duration: u32,

    /// First day to search (YYYY-MM-DD, candidate's timezone). Defaults to today.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Day the search stops before (YYYY-MM-DD). Defaults to a week after --from.
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Preferred specialty; repeatable. Overrides the interview type's defaults.
    #[arg(long = "specialty")]
    specialties: Vec<String>,
}

impl RequestArgs {
    /// Builds the request, resolving dates in the candidate's timezone.
    pub fn into_request(self, now: DateTime<Utc>) -> Result<InterviewRequest, CliError> {
        let tz: Tz = self.timezone.parse().map_err(|_| {
            CliError::InvalidArgument(format!("unknown timezone '{}'", self.timezone))
        })?;

        let from = self
            .from
            .unwrap_or_else(|| now.with_timezone(&tz).date_naive());
        let to = match self.to {
            Some(to) => to,
            None => from
                .checked_add_days(Days::new(DEFAULT_RANGE_DAYS))
                .ok_or_else(|| CliError::InvalidArgument(format!("date out of range: {from}")))?,
        };
        if to <= from {
            return Err(CliError::InvalidArgument(format!(
                "--to ({to}) must be after --from ({from})"
            )));
        }

        let midnight = |date: NaiveDate| {
            local_to_utc(tz, date, NaiveTime::MIN)
                .ok_or_else(|| CliError::InvalidArgument(format!("no midnight on {date} in {tz}")))
        };

        let mut request = InterviewRequest::new(
            self.name,
            self.email,
            tz,
            self.interview_type,
            self.duration,
            midnight(from)?,
            midnight(to)?,
        );
        for specialty in &self.specialties {
            request = request.with_required_specialty(SpecialtyTag::new(specialty));
        }
        request = request.with_specialties_from(&SpecialtyMap::default());

        request
            .validate()
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        Ok(request)
    }
}

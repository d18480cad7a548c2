//! Availability resolution.
//!
//! Calendars are queried concurrently, one task per active interviewer, with
//! a semaphore bounding in-flight queries and a timeout on each query. A
//! failed or slow calendar excludes its interviewer and never fails the
//! resolution.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use panelist_id::InterviewerId;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{BusyInterval, Calendar, CalendarError};
use crate::config::SchedulerConfig;
use crate::hours::{intersect_all, subtract, Interval, WorkingHours};
use crate::registry::Interviewer;
use crate::request::InterviewRequest;

/// Identifies one (interviewer, slot) candidate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateKey {
    pub interviewer_id: InterviewerId,
    pub slot_start: DateTime<Utc>,
}

/// A bookable slot for one interviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilitySlot {
    pub interviewer_id: InterviewerId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AvailabilitySlot {
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            interviewer_id: self.interviewer_id.clone(),
            slot_start: self.start,
        }
    }

    /// Slot start on a party's wall clock.
    pub fn local_start(&self, tz: Tz) -> DateTime<Tz> {
        self.start.with_timezone(&tz)
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

/// An interviewer left out of a resolution, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub interviewer_id: InterviewerId,
    pub reason: String,
}

/// Result of one resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Slots sorted by `(interviewer_id, start)`.
    pub slots: Vec<AvailabilitySlot>,

    /// Interviewers whose calendar could not be read, sorted by id.
    pub excluded: Vec<Exclusion>,

    /// Interviewers whose calendar was queried.
    pub queried: usize,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Slot tiling and query limits.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub working_hours: WorkingHours,
    pub slot_step: TimeDelta,
    pub max_slots_per_interviewer: usize,
    pub query_timeout: Duration,
    pub max_concurrent_queries: usize,
}

impl From<&SchedulerConfig> for ResolverSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            working_hours: config.working_hours,
            slot_step: config.slot_step(),
            max_slots_per_interviewer: config.max_slots_per_interviewer,
            query_timeout: config.calendar_query_timeout,
            max_concurrent_queries: config.max_concurrent_queries,
        }
    }
}

/// Turns a request into candidate slots across the interviewer pool.
pub struct AvailabilityResolver {
    calendar: Arc<dyn Calendar>,
    settings: ResolverSettings,
}

impl AvailabilityResolver {
    pub fn new(calendar: Arc<dyn Calendar>, settings: ResolverSettings) -> Self {
        Self { calendar, settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Queries every active interviewer's calendar and tiles free slots
    /// starting no earlier than `now`.
    ///
    /// Dropping the returned future aborts outstanding queries.
    #[instrument(skip_all, fields(candidate = %request.candidate_email))]
    pub async fn resolve(
        &self,
        request: &InterviewRequest,
        interviewers: &[&Interviewer],
        now: DateTime<Utc>,
    ) -> Resolution {
        let active: Vec<&Interviewer> = interviewers.iter().copied().filter(|i| i.active).collect();
        let range = bookable_range(request, now);

        let limit = self
            .settings
            .max_concurrent_queries
            .min(active.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let timeout = self.settings.query_timeout;

        let mut tasks = JoinSet::new();
        for interviewer in &active {
            let calendar = Arc::clone(&self.calendar);
            let semaphore = Arc::clone(&semaphore);
            let id = interviewer.id.clone();
            let calendar_ref = interviewer.calendar_ref.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let query = calendar.busy_intervals(&calendar_ref, range.start, range.end);
                let result = match tokio::time::timeout(timeout, query).await {
                    Ok(result) => result,
                    Err(_) => Err(CalendarError::Timeout(timeout)),
                };
                (id, result)
            });
        }

        let mut busy_by_id: BTreeMap<InterviewerId, Vec<BusyInterval>> = BTreeMap::new();
        let mut excluded: BTreeMap<InterviewerId, String> = BTreeMap::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(busy))) => {
                    debug!(interviewer_id = %id, busy = busy.len(), "Calendar query succeeded");
                    busy_by_id.insert(id, busy);
                }
                Ok((id, Err(e))) => {
                    warn!(interviewer_id = %id, error = %e, "Calendar query failed, excluding interviewer");
                    excluded.insert(id, e.to_string());
                }
                Err(e) => {
                    warn!(error = %e, "Calendar query task failed");
                }
            }
        }

        // A task that panicked reported neither outcome.
        for interviewer in &active {
            if !busy_by_id.contains_key(&interviewer.id) && !excluded.contains_key(&interviewer.id) {
                excluded.insert(
                    interviewer.id.clone(),
                    "calendar query task failed".to_string(),
                );
            }
        }

        let mut slots: Vec<AvailabilitySlot> = active
            .iter()
            .filter_map(|interviewer| {
                let busy = busy_by_id.get(&interviewer.id)?;
                Some(free_slots(request, interviewer, busy, &self.settings, now))
            })
            .flatten()
            .collect();
        slots.sort_by(|a, b| {
            a.interviewer_id
                .cmp(&b.interviewer_id)
                .then(a.start.cmp(&b.start))
        });

        info!(
            queried = active.len(),
            excluded = excluded.len(),
            slots = slots.len(),
            "Availability resolved"
        );

        Resolution {
            slots,
            excluded: excluded
                .into_iter()
                .map(|(interviewer_id, reason)| Exclusion {
                    interviewer_id,
                    reason,
                })
                .collect(),
            queried: active.len(),
        }
    }
}

/// The part of the request range that has not started yet.
fn bookable_range(request: &InterviewRequest, now: DateTime<Utc>) -> Interval {
    let range = request.date_range();
    Interval::new(range.start.max(now), range.end)
}

/// Slots for one interviewer given their busy intervals, earliest first.
///
/// A slot lies inside the request range and after `now`, outside every busy
/// interval, and inside both the interviewer's and the candidate's working
/// hours. Starts sit on the `slot_step` grid.
pub fn free_slots(
    request: &InterviewRequest,
    interviewer: &Interviewer,
    busy: &[BusyInterval],
    settings: &ResolverSettings,
    now: DateTime<Utc>,
) -> Vec<AvailabilitySlot> {
    let range = bookable_range(request, now);
    if range.is_empty() {
        return Vec::new();
    }
    let hours = &settings.working_hours;

    let shared = intersect_all(
        &hours.windows(interviewer.timezone, range),
        &hours.windows(request.candidate_timezone, range),
    );
    let free = subtract(&shared, busy);

    let duration = request.duration();
    let step = settings.slot_step.max(TimeDelta::minutes(1));
    let mut slots = Vec::new();
    for window in free {
        let mut start = align_up(window.start, step);
        while start + duration <= window.end {
            if slots.len() >= settings.max_slots_per_interviewer {
                return slots;
            }
            slots.push(AvailabilitySlot {
                interviewer_id: interviewer.id.clone(),
                start,
                end: start + duration,
            });
            start += step;
        }
    }
    slots
}

/// Rounds `instant` up to the next multiple of `step` since the epoch.
fn align_up(instant: DateTime<Utc>, step: TimeDelta) -> DateTime<Utc> {
    let step_secs = step.num_seconds().max(1);
    let secs = instant.timestamp();
    let rem = secs.rem_euclid(step_secs);
    if rem == 0 && instant.timestamp_subsec_nanos() == 0 {
        return instant;
    }
    DateTime::from_timestamp(secs - rem + step_secs, 0).unwrap_or(instant)
}

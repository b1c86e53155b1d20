//! Time-triggered jobs.
//!
//! Two jobs share one fire time: the daily accumulation run on weekdays and
//! the rebalance on a fixed day of the month. Dates and times are read on
//! the exchange clock (`schedule.timezone`), not the host's.

use crate::config::ScheduleConfig;
use crate::state::AppState;
use anyhow::Result;
use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use log::{error, info, warn};
use std::fmt;
use trading::EngineError;

/// Far enough ahead to always reach a configured rebalance day.
const SEARCH_DAYS: i64 = 62;
const HEARTBEAT: std::time::Duration = std::time::Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Daily,
    Rebalance,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Job::Daily => "daily run",
            Job::Rebalance => "rebalance",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    zone: Tz,
    time: NaiveTime,
    rebalance_day: u32,
    daily_enabled: bool,
    rebalance_enabled: bool,
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            zone: config.zone()?,
            time: config.fire_time()?,
            rebalance_day: config.rebalance_day,
            daily_enabled: config.daily_enabled,
            rebalance_enabled: config.rebalance_enabled,
        })
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone)
    }

    /// A wall-clock time skipped by a DST jump resolves one hour later.
    fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Tz>> {
        self.zone.from_local_datetime(&local).earliest().or_else(|| {
            self.zone
                .from_local_datetime(&(local + Duration::hours(1)))
                .earliest()
        })
    }

    fn jobs_on(&self, date: NaiveDate) -> Vec<Job> {
        let mut jobs = Vec::new();
        let weekday = !matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        if self.daily_enabled && weekday {
            jobs.push(Job::Daily);
        }
        if self.rebalance_enabled && date.day() == self.rebalance_day {
            jobs.push(Job::Rebalance);
        }
        jobs
    }

    /// First fire time strictly after `now` and the jobs due then.
    pub fn next_fire(&self, now: DateTime<Tz>) -> Option<(DateTime<Tz>, Vec<Job>)> {
        let today = now.with_timezone(&self.zone).date_naive();
        (0..SEARCH_DAYS).find_map(|offset| {
            let date = today + Duration::days(offset);
            let at = self.resolve(date.and_time(self.time))?;
            if at <= now {
                return None;
            }
            let jobs = self.jobs_on(date);
            (!jobs.is_empty()).then_some((at, jobs))
        })
    }
}

/// Engine clock on exchange time, so trade dates match the schedule's days.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeClock(Tz);

impl ExchangeClock {
    pub fn new(zone: Tz) -> Self {
        Self(zone)
    }
}

impl execution_engine::Clock for ExchangeClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.0).naive_local()
    }
}

async fn run_job(state: &AppState, job: Job) {
    info!("Starting scheduled {}", job);
    match job {
        Job::Daily => match state.accumulation(|engine| engine.run_daily()).await {
            Ok(report) => info!(
                "Daily run for {} finished ({} symbols)",
                report.date,
                report.symbols.len()
            ),
            Err(crate::state::TaskError::Engine(EngineError::ConfigurationMissing(reason))) => {
                info!("Daily run skipped: {}", reason)
            }
            Err(e) => error!("Daily run failed: {}", e),
        },
        Job::Rebalance => match state.rebalance(|engine| engine.rebalance(false)).await {
            Ok(report) => info!(
                "Rebalance finished: {} placed, {} failed",
                report.placed, report.failed
            ),
            Err(e) => error!("Rebalance failed: {}", e),
        },
    }
}

/// Fires jobs until the process exits.
pub async fn run(state: AppState, schedule: Schedule) {
    loop {
        let now = schedule.now();
        let Some((at, jobs)) = schedule.next_fire(now) else {
            warn!("Scheduler: no job enabled, stopping");
            return;
        };
        info!(
            "Scheduler: next fire at {} ({:?})",
            at.format("%Y-%m-%d %H:%M %Z"),
            jobs
        );
        let wait = (at - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        for job in jobs {
            run_job(&state, job).await;
        }
    }
}

/// Logs the next fire time every 30 minutes.
pub async fn heartbeat(schedule: Schedule) {
    let mut ticker = tokio::time::interval(HEARTBEAT);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let now = schedule.now();
        match schedule.next_fire(now) {
            Some((at, jobs)) => info!(
                "Heartbeat: now {} | next {:?} at {} (in {} min)",
                now.format("%H:%M:%S %Z"),
                jobs,
                at.format("%Y-%m-%d %H:%M %Z"),
                (at - now).num_minutes()
            ),
            None => info!("Heartbeat: no job scheduled"),
        }
    }
}

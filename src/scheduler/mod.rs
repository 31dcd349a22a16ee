//! Calendar trigger for collection runs.
//!
//! Fires on a cron schedule evaluated in UTC. Each fire runs the callback to
//! completion before the next fire is computed, so runs never overlap and a
//! fire missed while a run (or the host) was busy is reported as past due and
//! run once rather than replayed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why the callback is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fire {
    /// Scheduled instant, `None` for the startup run
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Fired later than the grace period allows
    pub past_due: bool,
}

pub struct Scheduler {
    schedule: Schedule,
    run_on_startup: bool,
    past_due_grace: Duration,
}

impl Scheduler {
    pub fn new(cron_expr: &str, run_on_startup: bool, past_due_grace: Duration) -> Result<Self> {
        let schedule = Schedule::from_str(cron_expr)
            .with_context(|| format!("invalid cron expression '{}'", cron_expr))?;
        Ok(Self {
            schedule,
            run_on_startup,
            past_due_grace,
        })
    }

    /// First fire strictly after `after`.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Whether a fire scheduled for `scheduled_for` that starts at `now` is late.
    pub fn is_past_due(&self, scheduled_for: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - scheduled_for)
            .to_std()
            .map(|late| late > self.past_due_grace)
            .unwrap_or(false)
    }

    /// Invoke `on_fire` on every fire, forever.
    ///
    /// Returns only if the schedule has no upcoming fire.
    pub async fn run<F, Fut>(&self, mut on_fire: F)
    where
        F: FnMut(Fire) -> Fut,
        Fut: Future<Output = ()>,
    {
        if self.run_on_startup {
            info!("Running on startup");
            on_fire(Fire {
                scheduled_for: None,
                past_due: false,
            })
            .await;
        }

        loop {
            let Some(next) = self.next_fire_after(Utc::now()) else {
                warn!("Schedule has no upcoming fire, stopping");
                return;
            };
            info!(next = %next, "Next collection run scheduled");

            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let now = Utc::now();
            let past_due = self.is_past_due(next, now);
            if past_due {
                warn!(scheduled_for = %next, started = %now, "The timer is past due");
            }
            debug!(scheduled_for = %next, "Timer fired");

            on_fire(Fire {
                scheduled_for: Some(next),
                past_due,
            })
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn daily_noon() -> Scheduler {
        Scheduler::new("0 0 12 * * *", true, Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_next_fire_daily() {
        let scheduler = daily_noon();
        let morning = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        assert_eq!(
            scheduler.next_fire_after(morning),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );

        let evening = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        assert_eq!(
            scheduler.next_fire_after(evening),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_exact_fire_time_moves_to_next_day() {
        let scheduler = daily_noon();
        let noon = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            scheduler.next_fire_after(noon),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_past_due() {
        let scheduler = daily_noon();
        let noon = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(!scheduler.is_past_due(noon, noon + chrono::Duration::seconds(5)));
        assert!(scheduler.is_past_due(noon, noon + chrono::Duration::minutes(10)));
        // early wake-ups are never late
        assert!(!scheduler.is_past_due(noon, noon - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_invalid_expression() {
        assert!(Scheduler::new("noon", true, Duration::from_secs(60)).is_err());
    }

    #[tokio::test]
    async fn test_startup_run() {
        // yearly schedule: the loop parks after the startup run
        let scheduler = Scheduler::new("0 0 0 1 1 *", true, Duration::from_secs(60)).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            scheduler
                .run(|fire| {
                    let tx = tx.clone();
                    async move {
                        tx.send(fire).ok();
                    }
                })
                .await;
        });

        let fire = rx.recv().await.unwrap();
        assert_eq!(fire.scheduled_for, None);
        assert!(!fire.past_due);
        handle.abort();
    }
}

use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use cron::Schedule as CronSchedule;

use crate::config::ScheduleConfig;

/// Cron schedule evaluated in a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct NightlyScheduler {
    schedule: CronSchedule,
    expr: String,
    offset: FixedOffset,
}

impl NightlyScheduler {
    pub fn new(cron_expr: &str, offset: FixedOffset) -> Result<Self> {
        let schedule = CronSchedule::from_str(cron_expr)
            .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", cron_expr, e))?;
        Ok(Self {
            schedule,
            expr: cron_expr.to_string(),
            offset,
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::new(&config.cron, config.offset()?)
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        self.schedule.after(&now.with_timezone(&self.offset)).next()
    }

    /// Fire times within the next `hours`, in the schedule's offset.
    pub fn next_runs(&self, hours: u64) -> Vec<DateTime<FixedOffset>> {
        self.next_runs_from(Utc::now(), hours)
    }

    pub fn next_runs_from(&self, now: DateTime<Utc>, hours: u64) -> Vec<DateTime<FixedOffset>> {
        let end = (now + Duration::hours(hours as i64)).with_timezone(&self.offset);
        self.schedule
            .after(&now.with_timezone(&self.offset))
            .take_while(|t| *t <= end)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(19_800).unwrap()
    }

    #[test]
    fn test_rejects_bad_expression() {
        assert!(NightlyScheduler::new("not a cron", ist()).is_err());
    }

    #[test]
    fn test_fires_at_two_local() {
        let s = NightlyScheduler::from_config(&ScheduleConfig::default()).unwrap();
        // 2025-03-14 01:00 IST
        let now = Utc.with_ymd_and_hms(2025, 3, 13, 19, 30, 0).unwrap();
        let next = s.next_after(now).unwrap();
        assert_eq!(next.hour(), 2);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.offset().local_minus_utc(), 19_800);
        assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2025, 3, 13, 20, 30, 0).unwrap());
    }

    #[test]
    fn test_preview_window() {
        let s = NightlyScheduler::new("0 0 2 * * *", ist()).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 13, 19, 30, 0).unwrap();
        assert_eq!(s.next_runs_from(now, 0).len(), 0);
        assert_eq!(s.next_runs_from(now, 1).len(), 1);
        assert_eq!(s.next_runs_from(now, 72).len(), 3);
    }
}

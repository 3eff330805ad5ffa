/// Next-fire bookkeeping for cron records.
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use lisa_plugins::CronRecord;
use tracing::{info, warn};

struct Entry {
    record: CronRecord,
    schedule: Schedule,
    next: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct CronTable {
    entries: HashMap<String, Entry>,
    /// (name, expression) pairs already reported as invalid.
    rejected: HashSet<(String, String)>,
}

impl CronTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Align the table with the current records. Disabled and removed
    /// records are dropped; new or rescheduled ones get a fresh next time.
    pub fn sync(&mut self, records: Vec<CronRecord>, now: DateTime<Utc>) {
        let active: HashMap<String, CronRecord> = records
            .into_iter()
            .filter(|r| r.enabled)
            .map(|r| (r.name.clone(), r))
            .collect();
        self.entries.retain(|name, _| active.contains_key(name));

        for (name, record) in active {
            if let Some(entry) = self.entries.get_mut(&name) {
                if entry.record.schedule == record.schedule {
                    entry.record = record;
                    continue;
                }
            }
            match Schedule::from_str(&record.schedule) {
                Ok(schedule) => {
                    let next = schedule.after(&now).next();
                    info!(cron = %name, handler = %record.handler, next = ?next, "Registered cron trigger");
                    self.entries.insert(name, Entry { record, schedule, next });
                }
                Err(e) => {
                    self.entries.remove(&name);
                    if self.rejected.insert((name.clone(), record.schedule.clone())) {
                        warn!(cron = %name, schedule = %record.schedule, error = %e, "Invalid cron expression, skipping");
                    }
                }
            }
        }
    }

    /// Records due at `now`, each rescheduled to its next occurrence.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<CronRecord> {
        let mut fired = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.next.is_some_and(|next| next <= now) {
                fired.push(entry.record.clone());
                entry.next = entry.schedule.after(&now).next();
            }
        }
        fired.sort_by(|a, b| a.name.cmp(&b.name));
        fired
    }

    pub fn next_fire(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.get(name).and_then(|e| e.next)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str, schedule: &str) -> CronRecord {
        CronRecord {
            name: name.into(),
            handler: "Clock".into(),
            entry_point: "tick".into(),
            schedule: schedule.into(),
            enabled: true,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_due_and_reschedule() {
        let mut table = CronTable::new();
        table.sync(vec![record("morning", "0 0 7 * * *")], at(6, 0, 0));
        assert_eq!(table.next_fire("morning"), Some(at(7, 0, 0)));

        assert!(table.due(at(6, 59, 59)).is_empty());
        let fired = table.due(at(7, 0, 0));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].name, "morning");
        assert!(table.due(at(7, 0, 1)).is_empty());
        assert_eq!(
            table.next_fire("morning"),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 7, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_and_disabled_are_skipped() {
        let mut table = CronTable::new();
        let mut disabled = record("off", "*/5 * * * * *");
        disabled.enabled = false;
        table.sync(vec![record("bad", "every day"), disabled], at(6, 0, 0));
        assert!(table.is_empty());
    }

    #[test]
    fn test_sync_drops_removed_and_reschedules_changed() {
        let mut table = CronTable::new();
        table.sync(vec![record("a", "0 0 7 * * *"), record("b", "0 0 8 * * *")], at(6, 0, 0));
        assert_eq!(table.len(), 2);

        table.sync(vec![record("a", "0 30 6 * * *")], at(6, 0, 0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.next_fire("a"), Some(at(6, 30, 0)));
    }
}

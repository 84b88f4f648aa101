//! Read-side statistics over the lifespan history. Pure functions, no I/O.

use crate::lifecycle::LifespanRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityStats {
    pub count: u64,
    pub total_duration_seconds: f64,
    pub first_start: DateTime<Utc>,
    pub last_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub record_count: u64,
    pub distinct_identity_count: u64,
    pub total_duration_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub totals: Totals,
    pub per_identity: BTreeMap<String, IdentityStats>,
}

impl Statistics {
    pub fn from_records(records: &[LifespanRecord]) -> Self {
        let mut s = Statistics::default();

        for r in records {
            s.totals.record_count += 1;
            s.totals.total_duration_seconds += r.duration_seconds;

            let entry = s
                .per_identity
                .entry(r.name.clone())
                .or_insert_with(|| IdentityStats {
                    count: 0,
                    total_duration_seconds: 0.0,
                    first_start: r.start_time,
                    last_end: r.end_time,
                });
            entry.count += 1;
            entry.total_duration_seconds += r.duration_seconds;
            entry.first_start = entry.first_start.min(r.start_time);
            entry.last_end = entry.last_end.max(r.end_time);
        }

        s.totals.distinct_identity_count = s.per_identity.len() as u64;
        s
    }

    /// Top `n` identities by total duration (descending), ties by name (ascending).
    pub fn top(&self, n: usize) -> Vec<(&str, &IdentityStats)> {
        let mut ranked: Vec<(&str, &IdentityStats)> =
            self.per_identity.iter().map(|(k, v)| (k.as_str(), v)).collect();
        ranked.sort_by(|a, b| {
            b.1.total_duration_seconds
                .total_cmp(&a.1.total_duration_seconds)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.truncate(n);
        ranked
    }
}

pub fn aggregate(records: &[LifespanRecord]) -> Statistics {
    Statistics::from_records(records)
}

/// `HH:MM:SS`, hours unbounded. Fractions are dropped.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_pads_and_truncates() {
        assert_eq!(format_duration(0.0), "00:00:00");
        assert_eq!(format_duration(59.9), "00:00:59");
        assert_eq!(format_duration(3661.0), "01:01:01");
        assert_eq!(format_duration(360_000.0), "100:00:00");
        assert_eq!(format_duration(-5.0), "00:00:00");
        assert_eq!(format_duration(f64::NAN), "00:00:00");
    }
}

//! Response counters.
//!
//! A [`Metrics`] value is shared by every [`ResponseWriter`](crate::ResponseWriter)
//! of a server. It counts responses by status code, error responses
//! (status >= 400) separately, and request durations in 100 ms buckets.
//!
//! Statuses are counted as sent: a writer given a status that cannot go on
//! the wire records `500`.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

const BUCKET_MS: u128 = 100;

#[derive(Debug, Default)]
pub struct Metrics {
    responses: Mutex<BTreeMap<String, u64>>,
    errors: Mutex<BTreeMap<String, u64>>,
    duration: Mutex<BTreeMap<String, u64>>,
}

/// Point-in-time copy of the counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Keyed by status code, plus `"total"`.
    pub responses: BTreeMap<String, u64>,
    /// Keyed by status code (>= 400 only), plus `"total"`.
    pub errors: BTreeMap<String, u64>,
    /// Keyed by bucket lower bound in milliseconds.
    pub duration: BTreeMap<String, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one response with `status`.
    pub fn record_status(&self, status: u16) {
        let key = status.to_string();
        {
            let mut responses = self.responses.lock();
            bump(&mut responses, &key);
            bump(&mut responses, "total");
        }
        if status >= 400 {
            let mut errors = self.errors.lock();
            bump(&mut errors, &key);
            bump(&mut errors, "total");
        }
    }

    /// Counts one finished request in its duration bucket.
    pub fn record_duration(&self, elapsed: Duration) {
        let bucket = elapsed.as_millis() / BUCKET_MS * BUCKET_MS;
        bump(&mut self.duration.lock(), &bucket.to_string());
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            responses: self.responses.lock().clone(),
            errors: self.errors.lock().clone(),
            duration: self.duration.lock().clone(),
        }
    }
}

fn bump(map: &mut BTreeMap<String, u64>, key: &str) {
    *map.entry(key.to_owned()).or_default() += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_statuses_and_errors() {
        let metrics = Metrics::new();
        metrics.record_status(200);
        metrics.record_status(200);
        metrics.record_status(404);

        let snap = metrics.snapshot();
        assert_eq!(snap.responses["200"], 2);
        assert_eq!(snap.responses["404"], 1);
        assert_eq!(snap.responses["total"], 3);
        assert_eq!(snap.errors.get("200"), None);
        assert_eq!(snap.errors["404"], 1);
        assert_eq!(snap.errors["total"], 1);
    }

    #[test]
    fn durations_round_down_to_bucket() {
        let metrics = Metrics::new();
        metrics.record_duration(Duration::from_millis(42));
        metrics.record_duration(Duration::from_millis(99));
        metrics.record_duration(Duration::from_millis(250));

        let snap = metrics.snapshot();
        assert_eq!(snap.duration["0"], 2);
        assert_eq!(snap.duration["200"], 1);
    }
}

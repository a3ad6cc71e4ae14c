use super::transaction::Checkpoint;
use serde::{Deserialize, Serialize};

/// Running totals of a benchmark run: relaxation time and the normal/anomalous partition of
/// reaction keys. Serialized as the anomaly-detection document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    /// Total slab and adsorbate-slab relaxation time over all recorded reactions, in seconds.
    pub time: f64,
    pub normal: Vec<String>,
    pub anomaly: Vec<String>,
}

impl Accumulator {
    /// Adds one successfully evaluated reaction.
    pub fn record(&mut self, key: &str, elapsed: f64, anomalous: bool) {
        self.time += elapsed;
        if anomalous {
            self.anomaly.push(key.to_string());
        } else {
            self.normal.push(key.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.normal.len() + self.anomaly.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_anomalous(&self, key: &str) -> bool {
        self.anomaly.iter().any(|k| k == key)
    }
}

/// Partition lengths and the running time before a reaction was recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulatorMark {
    time: f64,
    normal: usize,
    anomaly: usize,
}

impl Checkpoint for Accumulator {
    type Mark = AccumulatorMark;

    fn mark(&self) -> AccumulatorMark {
        AccumulatorMark {
            time: self.time,
            normal: self.normal.len(),
            anomaly: self.anomaly.len(),
        }
    }

    fn restore(&mut self, mark: AccumulatorMark) {
        self.time = mark.time;
        self.normal.truncate(mark.normal);
        self.anomaly.truncate(mark.anomaly);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_partitions_keys_and_sums_time() {
        let mut accumulator = Accumulator::default();
        accumulator.record("a", 1.5, false);
        accumulator.record("b", 2.0, true);
        accumulator.record("c", 0.5, false);
        assert_eq!(accumulator.normal, vec!["a", "c"]);
        assert_eq!(accumulator.anomaly, vec!["b"]);
        assert_eq!(accumulator.time, 4.0);
        assert_eq!(accumulator.len(), 3);
        assert!(accumulator.is_anomalous("b"));
        assert!(!accumulator.is_anomalous("a"));
    }

    #[test]
    fn restore_undoes_records_after_mark() {
        let mut accumulator = Accumulator::default();
        accumulator.record("a", 1.5, false);
        let mark = accumulator.mark();
        accumulator.record("b", 2.0, true);
        accumulator.record("c", 0.7, false);
        accumulator.restore(mark);
        assert_eq!(accumulator.time, 1.5);
        assert!(accumulator.anomaly.is_empty());
        assert_eq!(accumulator.normal, vec!["a"]);
    }

    #[test]
    fn serializes_as_anomaly_detection_document() {
        let mut accumulator = Accumulator::default();
        accumulator.record("a", 1.0, true);
        let json = serde_json::to_string(&accumulator).unwrap();
        assert_eq!(json, r#"{"time":1.0,"normal":[],"anomaly":["a"]}"#);
    }
}

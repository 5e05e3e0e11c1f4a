/// A forward jump in playback position larger than the tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekAnomaly {
    pub from: f64,
    pub to: f64,
}

impl SeekAnomaly {
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.to - self.from
    }
}

/// Delta-based forward-skip heuristic over sampled media positions.
///
/// Feed one position per poll. The tolerance has to exceed the poll interval
/// plus buffering slack, otherwise regular playback is flagged.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekAnomalyDetector {
    tolerance: f64,
    last_known: Option<f64>,
}

impl SeekAnomalyDetector {
    #[must_use]
    pub fn new(tolerance_secs: f64) -> Self {
        Self {
            tolerance: tolerance_secs,
            last_known: None,
        }
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[must_use]
    pub fn last_known(&self) -> Option<f64> {
        self.last_known
    }

    /// Record a sampled position.
    ///
    /// The first sample only sets the baseline. Non-finite samples are
    /// dropped without touching the baseline.
    pub fn observe(&mut self, position: f64) -> Option<SeekAnomaly> {
        if !position.is_finite() {
            return None;
        }
        let previous = self.last_known.replace(position)?;
        (position - previous > self.tolerance).then_some(SeekAnomaly {
            from: previous,
            to: position,
        })
    }

    pub fn reset(&mut self) {
        self.last_known = None;
    }
}

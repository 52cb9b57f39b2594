use serde::{Deserialize, Serialize};

/// When a slide came up, measured in recording seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideTimestamp {
    pub slide_number: u32,
    #[serde(rename = "timestamp")]
    pub elapsed_seconds: u64,
}

/// Correlates slide transitions with elapsed recording time so the backend can
/// cut the final recording per slide.
#[derive(Debug, Default, Clone)]
pub struct TimestampCorrelator {
    entries: Vec<SlideTimestamp>,
}

impl TimestampCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh sequence at slide 1, second 0.
    pub fn seed(&mut self) {
        self.entries.clear();
        self.entries.push(SlideTimestamp {
            slide_number: 1,
            elapsed_seconds: 0,
        });
    }

    pub fn record(&mut self, slide_number: u32, elapsed_seconds: u64) {
        // keep the sequence non-decreasing even if a caller passes a stale value
        let floor = self.entries.last().map_or(0, |e| e.elapsed_seconds);
        self.entries.push(SlideTimestamp {
            slide_number,
            elapsed_seconds: elapsed_seconds.max(floor),
        });
    }

    pub fn entries(&self) -> &[SlideTimestamp] {
        &self.entries
    }

    /// Hands the sequence to the caller and clears it.
    pub fn take(&mut self) -> Vec<SlideTimestamp> {
        std::mem::take(&mut self.entries)
    }
}

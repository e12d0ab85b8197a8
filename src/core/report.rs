use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::error::{DatasetError, Result};

/// How policy-governed metadata problems are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPolicy {
    /// Fail the split
    #[default]
    Strict,
    /// Skip the offending item and count it in the `SkipLog`
    Lenient,
}

impl MetadataPolicy {
    /// Return the error under `Strict`; record and swallow it under `Lenient`.
    ///
    /// Only `DanglingReference` and `MissingMetadata` are policy-governed, every other
    /// error is returned unchanged.
    pub fn handle(self, err: DatasetError, skips: &SkipLog) -> Result<()> {
        let kind = match &err {
            DatasetError::DanglingReference { .. } => SkipKind::DanglingReference,
            DatasetError::MissingMetadata { .. } => SkipKind::MissingMetadata,
            _ => return Err(err),
        };
        match self {
            MetadataPolicy::Strict => Err(err),
            MetadataPolicy::Lenient => {
                skips.record(kind, &err);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipKind {
    DanglingReference,
    MissingMetadata,
}

/// Summary of skipped items, surfaced to the caller after generation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SkipSummary {
    pub dangling_references: usize,
    pub missing_metadata: usize,
    /// The first few skip messages, for display
    pub samples: Vec<String>,
}

impl SkipSummary {
    pub fn total(&self) -> usize {
        self.dangling_references + self.missing_metadata
    }
}

#[derive(Debug, Default)]
struct SkipCounters {
    dangling: AtomicUsize,
    missing: AtomicUsize,
    samples: Mutex<Vec<String>>,
}

/// Shared counters of items skipped under `MetadataPolicy::Lenient`.
///
/// Cloning shares the same counters, so a caller can keep one handle and read it
/// while (or after) a stream that holds another handle runs.
#[derive(Debug, Clone, Default)]
pub struct SkipLog {
    inner: Arc<SkipCounters>,
}

impl SkipLog {
    const MAX_SAMPLES: usize = 10;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: SkipKind, reason: impl std::fmt::Display) {
        let message = reason.to_string();
        warn!("Skipping item: {}", message);
        match kind {
            SkipKind::DanglingReference => self.inner.dangling.fetch_add(1, Ordering::Relaxed),
            SkipKind::MissingMetadata => self.inner.missing.fetch_add(1, Ordering::Relaxed),
        };
        if let Ok(mut samples) = self.inner.samples.lock() {
            if samples.len() < Self::MAX_SAMPLES {
                samples.push(message);
            }
        }
    }

    pub fn count(&self, kind: SkipKind) -> usize {
        match kind {
            SkipKind::DanglingReference => self.inner.dangling.load(Ordering::Relaxed),
            SkipKind::MissingMetadata => self.inner.missing.load(Ordering::Relaxed),
        }
    }

    pub fn summary(&self) -> SkipSummary {
        SkipSummary {
            dangling_references: self.count(SkipKind::DanglingReference),
            missing_metadata: self.count(SkipKind::MissingMetadata),
            samples: self
                .inner
                .samples
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default(),
        }
    }
}

use std::iter::FusedIterator;
use tracing::{debug, error, info};

use super::builder::{DatasetBuilder, RecordStream};
use super::features::Features;
use super::record::Record;
use super::report::SkipLog;
use super::split::{Split, SplitGenerator};
use crate::error::{DatasetError, Result};

/// Lifecycle of one split's generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitState {
    /// Before `plan_splits` has bound the split's resources. A `SplitStream` is only
    /// built from a planned generator, so it never reports this state.
    #[default]
    Unresolved,
    /// Planned, no record pulled yet
    ResourcesLocated,
    Streaming,
    Exhausted,
}

/// Records of one split, checked against the declared features as they are pulled.
///
/// The first schema mismatch or generator error is yielded once and ends the stream;
/// after that, and after normal exhaustion, `next` always returns `None`.
pub struct SplitStream<'a> {
    split: Split,
    features: &'a Features,
    inner: RecordStream<'a>,
    state: SplitState,
    yielded: usize,
}

impl<'a> SplitStream<'a> {
    pub fn new(split: Split, features: &'a Features, inner: RecordStream<'a>) -> Self {
        Self {
            split,
            features,
            inner,
            state: SplitState::ResourcesLocated,
            yielded: 0,
        }
    }

    /// Call the builder's generator for one planned split
    pub fn open<B: DatasetBuilder>(
        builder: &'a B,
        features: &'a Features,
        generator: &'a SplitGenerator<B::Args>,
        skips: &SkipLog,
    ) -> Result<Self> {
        let inner = builder.generate(&generator.args, skips)?;
        Ok(Self::new(generator.split.clone(), features, inner))
    }

    pub fn split(&self) -> &Split {
        &self.split
    }

    pub fn state(&self) -> SplitState {
        self.state
    }

    /// Records yielded so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    fn finish(&mut self) {
        self.state = SplitState::Exhausted;
    }
}

impl Iterator for SplitStream<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            SplitState::Exhausted => return None,
            SplitState::Unresolved | SplitState::ResourcesLocated => {
                debug!("Streaming split '{}'", self.split);
                self.state = SplitState::Streaming;
            }
            SplitState::Streaming => {}
        }

        match self.inner.next() {
            None => {
                self.finish();
                info!(
                    "Split '{}' exhausted after {} records",
                    self.split, self.yielded
                );
                None
            }
            Some(Err(e)) => {
                self.finish();
                error!("Split '{}' aborted: {}", self.split, e);
                Some(Err(e))
            }
            Some(Ok(record)) => match self.features.check(&record) {
                Ok(()) => {
                    self.yielded += 1;
                    Some(Ok(record))
                }
                Err(reason) => {
                    self.finish();
                    let err = DatasetError::SchemaMismatch {
                        split: self.split.to_string(),
                        key: record.key,
                        reason,
                    };
                    error!("Split '{}' aborted: {}", self.split, err);
                    Some(Err(err))
                }
            },
        }
    }
}

impl FusedIterator for SplitStream<'_> {}

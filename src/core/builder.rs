use super::info::DatasetInfo;
use super::record::Record;
use super::report::SkipLog;
use super::split::SplitPlan;
use crate::error::Result;
use crate::fetch::ResourceFetcher;

/// Lazy sequence of records for one split
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record>> + 'a>;

/// A dataset definition: metadata, a split plan, and a record generator.
///
/// An execution engine (see [`load_dataset`](super::materialize::load_dataset)) calls
/// the three operations in order. Implementations hold only immutable state, so the
/// same builder can plan and generate any number of times.
pub trait DatasetBuilder {
    /// Arguments bound to each split by `plan_splits` and handed back to `generate`
    type Args;

    /// Dataset name, used for logging and as the key in saved infos
    fn name(&self) -> &str;

    /// Name of the selected configuration
    fn config_name(&self) -> &str {
        "default"
    }

    /// Dataset metadata and feature schema. Pure: performs no I/O.
    fn describe(&self) -> Result<DatasetInfo>;

    /// Locate (download, extract) resources and bind per-split arguments.
    /// Must not read record contents.
    fn plan_splits(&self, fetcher: &mut dyn ResourceFetcher) -> Result<SplitPlan<Self::Args>>;

    /// Stream the records of one split. Each call starts over from the resources
    /// bound in `args`; items skipped under a lenient policy are counted in `skips`.
    fn generate<'a>(&'a self, args: &'a Self::Args, skips: &SkipLog) -> Result<RecordStream<'a>>;
}

pub mod builder;
pub mod dataset;
pub mod features;
pub mod info;
pub mod materialize;
pub mod record;
pub mod registry;
pub mod report;
pub mod split;
pub mod stream;
pub mod value;

pub use builder::{DatasetBuilder, RecordStream};
pub use features::{Dtype, FeatureType, Features};
pub use info::{ConfigInfos, DatasetInfo, DatasetInfos, SplitInfo, SupervisedKeys};
pub use materialize::{load_dataset, DatasetDict};
pub use record::Record;
pub use registry::{BuilderConfig, ConfigRegistry};
pub use report::{MetadataPolicy, SkipKind, SkipLog, SkipSummary};
pub use split::{Split, SplitGenerator, SplitPlan};
pub use stream::{SplitState, SplitStream};
pub use value::{FeatureValue, ImageData};

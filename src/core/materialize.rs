use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::info;

use super::builder::DatasetBuilder;
use super::info::{ConfigInfos, DatasetInfo, DatasetInfos, SplitInfo};
use super::record::Record;
use super::report::SkipLog;
use super::split::Split;
use super::stream::SplitStream;
use crate::error::{DatasetError, Result};
use crate::fetch::ResourceFetcher;

/// A fully generated dataset: its info and every split's records
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDict {
    pub name: String,
    pub config_name: String,
    pub info: DatasetInfo,
    splits: BTreeMap<Split, Vec<Record>>,
}

/// Run describe → plan_splits → generate for every split and keep all records
pub fn load_dataset<B: DatasetBuilder>(
    builder: &B,
    fetcher: &mut dyn ResourceFetcher,
    skips: &SkipLog,
) -> Result<DatasetDict> {
    let info = builder.describe()?;
    info.validate()?;

    let plan = builder.plan_splits(fetcher)?;
    info!(
        "Loading {} ({}) with {} splits",
        builder.name(),
        builder.config_name(),
        plan.len()
    );

    let mut splits = BTreeMap::new();
    for generator in &plan {
        let stream = SplitStream::open(builder, &info.features, generator, skips)?;
        let records = stream.collect::<Result<Vec<_>>>()?;
        info!("Generated {} records for split '{}'", records.len(), generator.split);
        splits.insert(generator.split.clone(), records);
    }

    Ok(DatasetDict {
        name: builder.name().to_string(),
        config_name: builder.config_name().to_string(),
        info,
        splits,
    })
}

impl DatasetDict {
    pub fn new(
        name: impl Into<String>,
        config_name: impl Into<String>,
        info: DatasetInfo,
        splits: BTreeMap<Split, Vec<Record>>,
    ) -> Self {
        Self {
            name: name.into(),
            config_name: config_name.into(),
            info,
            splits,
        }
    }

    pub fn split(&self, split: &Split) -> Option<&[Record]> {
        self.splits.get(split).map(Vec::as_slice)
    }

    pub fn splits(&self) -> impl Iterator<Item = (&Split, &[Record])> {
        self.splits.iter().map(|(s, r)| (s, r.as_slice()))
    }

    pub fn split_names(&self) -> impl Iterator<Item = &Split> {
        self.splits.keys()
    }

    pub fn num_rows(&self, split: &Split) -> usize {
        self.splits.get(split).map_or(0, Vec::len)
    }

    pub fn split_infos(&self) -> Vec<SplitInfo> {
        self.splits
            .iter()
            .map(|(split, records)| SplitInfo {
                name: split.to_string(),
                num_examples: records.len(),
            })
            .collect()
    }

    /// Infos for `dataset_infos.json`, keyed by configuration name
    pub fn infos(&self) -> DatasetInfos {
        let mut infos = DatasetInfos::default();
        infos.configs.insert(
            self.config_name.clone(),
            ConfigInfos {
                info: self.info.clone(),
                splits: self.split_infos(),
            },
        );
        infos
    }

    /// Shuffle `source` with a seeded RNG and cut it into `train` and `test`.
    /// Other splits are dropped from the result.
    pub fn train_test_split(&self, source: &Split, test_fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..=1.0).contains(&test_fraction) {
            return Err(DatasetError::InvalidSchema(format!(
                "test fraction {} is outside [0, 1]",
                test_fraction
            )));
        }
        let records = self.splits.get(source).ok_or_else(|| {
            DatasetError::InvalidSchema(format!("split '{}' does not exist", source))
        })?;

        let mut shuffled = records.clone();
        let mut rng = StdRng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);

        let test_len = (shuffled.len() as f64 * test_fraction).round() as usize;
        let train = shuffled.split_off(test_len);
        let test = shuffled;

        let mut splits = BTreeMap::new();
        splits.insert(Split::Train, train);
        splits.insert(Split::Test, test);
        Ok(Self {
            name: self.name.clone(),
            config_name: self.config_name.clone(),
            info: self.info.clone(),
            splits,
        })
    }
}

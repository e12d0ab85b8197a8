use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::folder::{IMAGE_FEATURE, LABEL_FEATURE};
use crate::core::builder::{DatasetBuilder, RecordStream};
use crate::core::features::{FeatureType, Features};
use crate::core::info::{DatasetInfo, SupervisedKeys};
use crate::core::record::Record;
use crate::core::registry::{BuilderConfig, ConfigRegistry};
use crate::core::report::{MetadataPolicy, SkipLog};
use crate::core::split::{Split, SplitGenerator, SplitPlan};
use crate::core::value::{FeatureValue, ImageData};
use crate::error::{DatasetError, Result};
use crate::fetch::{ArchiveEntries, ArchiveEntry, ArchiveHandle, ResourceFetcher};

/// `data_urls` role of the image archive; every other role names a split
pub const IMAGES_ROLE: &str = "images";

/// How an archive entry is turned into the identifier looked up in a membership list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// `images/pizza/0001.jpg` → `0001`
    #[default]
    FileStem,
    /// `images/pizza/0001.jpg` with image dir `images` → `pizza/0001`
    RelativeStem,
}

impl KeyMode {
    /// Identifier for a path relative to the image directory
    pub fn key(self, relative: &str) -> String {
        let path = Path::new(relative);
        match self {
            KeyMode::FileStem => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            KeyMode::RelativeStem => path.with_extension("").to_string_lossy().replace('\\', "/"),
        }
    }
}

/// A dataset packed as one image archive plus a membership list per split.
///
/// ```json
/// {
///   "name": "food",
///   "class_names": ["pizza", "sushi"],
///   "image_dir": "images",
///   "label_position": 1,
///   "configs": [{"name": "default", "data_urls": {"images": "food.zip", "train": "train.txt"}}]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub citation: String,
    #[serde(default)]
    pub homepage: String,
    pub class_names: Vec<String>,
    /// Entries outside this directory are ignored
    pub image_dir: String,
    /// Index of the `/`-separated entry path segment naming the class
    pub label_position: usize,
    #[serde(default)]
    pub key_mode: KeyMode,
    pub configs: ConfigRegistry,
}

impl ArchiveDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| DatasetError::unavailable(path.display().to_string(), e))?;
        let descriptor: Self = serde_json::from_str(&contents)?;
        debug!("Loaded archive descriptor '{}' from {:?}", descriptor.name, path);
        Ok(descriptor)
    }

    fn image_prefix(&self) -> String {
        let dir = self.image_dir.trim_matches('/');
        if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        }
    }
}

/// Generation arguments of one archive-backed split
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveSplitArgs {
    pub split: Split,
    pub archive: ArchiveHandle,
    pub membership: PathBuf,
}

/// Builder for an [`ArchiveDescriptor`] with one configuration selected
#[derive(Debug, Clone)]
pub struct ArchiveImageDataset {
    descriptor: ArchiveDescriptor,
    config: BuilderConfig,
    policy: MetadataPolicy,
}

impl ArchiveImageDataset {
    /// Select a configuration by name, or the first one
    pub fn new(descriptor: ArchiveDescriptor, config_name: Option<&str>) -> Result<Self> {
        let config = descriptor.configs.select(config_name)?.clone();
        if config.url(IMAGES_ROLE).is_none() {
            return Err(DatasetError::InvalidSchema(format!(
                "configuration '{}' has no '{}' resource",
                config.name, IMAGES_ROLE
            )));
        }
        Ok(Self {
            descriptor,
            config,
            policy: MetadataPolicy::Strict,
        })
    }

    /// How membership identifiers with no archive entry are handled
    pub fn with_policy(mut self, policy: MetadataPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn descriptor(&self) -> &ArchiveDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// The record for a kept entry, with the membership identifier it matched
    fn entry_record(
        &self,
        split: &Split,
        prefix: &str,
        members: &HashSet<String>,
        entry: ArchiveEntry,
    ) -> Result<Option<(String, Record)>> {
        let Some(relative) = entry.path.strip_prefix(prefix) else {
            return Ok(None);
        };
        if ImageFormat::from_path(relative).is_err() {
            return Ok(None);
        }
        let id = self.descriptor.key_mode.key(relative);
        if !members.contains(&id) {
            return Ok(None);
        }

        let class = entry.path.split('/').nth(self.descriptor.label_position);
        let index = class
            .and_then(|c| self.descriptor.class_names.iter().position(|n| n == c))
            .ok_or_else(|| DatasetError::SchemaMismatch {
                split: split.to_string(),
                key: entry.path.clone(),
                reason: format!(
                    "path segment {} ({:?}) is not a known class",
                    self.descriptor.label_position, class
                ),
            })?;

        let record = Record::new(entry.path.clone())
            .with_field(
                IMAGE_FEATURE,
                FeatureValue::Image(ImageData::from_bytes(entry.path, entry.bytes)),
            )
            .with_field(LABEL_FEATURE, FeatureValue::ClassLabel(index as i64));
        Ok(Some((id, record)))
    }
}

impl DatasetBuilder for ArchiveImageDataset {
    type Args = ArchiveSplitArgs;

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn config_name(&self) -> &str {
        &self.config.name
    }

    fn describe(&self) -> Result<DatasetInfo> {
        let features = Features::new()
            .with(IMAGE_FEATURE, FeatureType::Image)
            .with(
                LABEL_FEATURE,
                FeatureType::ClassLabel {
                    names: self.descriptor.class_names.clone(),
                },
            );
        let description = if self.config.description.is_empty() {
            self.descriptor.description.clone()
        } else {
            format!("{}\n\n{}", self.descriptor.description, self.config.description)
        };
        let mut info = DatasetInfo::new(description, features)
            .with_supervised_keys(SupervisedKeys::new(IMAGE_FEATURE, LABEL_FEATURE));
        info.license = self.descriptor.license.clone();
        info.citation = self.descriptor.citation.clone();
        info.homepage = self.descriptor.homepage.clone();
        info.version = Some(self.config.version.clone());
        Ok(info)
    }

    fn plan_splits(&self, fetcher: &mut dyn ResourceFetcher) -> Result<SplitPlan<ArchiveSplitArgs>> {
        let images = self.config.url(IMAGES_ROLE).ok_or_else(|| {
            DatasetError::InvalidSchema(format!("no '{}' resource", IMAGES_ROLE))
        })?;
        let archive_path = fetcher.download(images)?;
        let archive = fetcher.iter_archive(&archive_path)?;

        let mut generators = Vec::new();
        for (role, locator) in &self.config.data_urls {
            if role == IMAGES_ROLE {
                continue;
            }
            let membership = fetcher.download(locator)?;
            let split = Split::parse(role);
            debug!("Split '{}' uses membership list {:?}", split, membership);
            generators.push(SplitGenerator::new(
                split.clone(),
                ArchiveSplitArgs {
                    split,
                    archive: archive.clone(),
                    membership,
                },
            ));
        }
        generators.sort_by(|a, b| a.split.cmp(&b.split));
        SplitPlan::new(generators)
    }

    fn generate<'a>(&'a self, args: &'a ArchiveSplitArgs, skips: &SkipLog) -> Result<RecordStream<'a>> {
        // The archive can only be read forward, so the whole list is loaded first
        let members = read_membership(&args.membership)?;
        info!(
            "Split '{}': {} members, streaming {:?}",
            args.split,
            members.len(),
            args.archive.path()
        );
        let entries = args.archive.entries()?;

        Ok(Box::new(MembershipStream {
            dataset: self,
            args,
            prefix: self.descriptor.image_prefix(),
            members,
            matched: HashSet::new(),
            entries,
            skips: skips.clone(),
            done: false,
        }))
    }
}

/// Archive entries kept by a membership list. Identifiers that matched no entry are
/// reported once the archive is exhausted.
struct MembershipStream<'a> {
    dataset: &'a ArchiveImageDataset,
    args: &'a ArchiveSplitArgs,
    prefix: String,
    members: HashSet<String>,
    matched: HashSet<String>,
    entries: ArchiveEntries,
    skips: SkipLog,
    done: bool,
}

impl MembershipStream<'_> {
    fn report_unmatched(&self) -> Result<()> {
        let mut unmatched: Vec<&String> = self.members.difference(&self.matched).collect();
        unmatched.sort();
        for id in unmatched {
            self.dataset.policy.handle(
                DatasetError::DanglingReference {
                    metadata: self.args.membership.clone(),
                    file_name: id.clone(),
                },
                &self.skips,
            )?;
        }
        Ok(())
    }
}

impl Iterator for MembershipStream<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let entry = match self.entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return self.report_unmatched().err().map(Err);
                }
            };
            match self
                .dataset
                .entry_record(&self.args.split, &self.prefix, &self.members, entry)
            {
                Ok(Some((id, record))) => {
                    self.matched.insert(id);
                    return Some(Ok(record));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// One identifier per line; surrounding whitespace and blank lines are ignored
pub fn read_membership(path: &Path) -> Result<HashSet<String>> {
    let file =
        File::open(path).map_err(|e| DatasetError::unavailable(path.display().to_string(), e))?;
    let mut members = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let id = line.trim();
        if !id.is_empty() {
            members.insert(id.to_string());
        }
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::materialize::load_dataset;
    use crate::fetch::test_utils::write_zip;
    use crate::fetch::DownloadManager;
    use tempfile::{tempdir, TempDir};

    fn food_descriptor(configs: Vec<BuilderConfig>) -> ArchiveDescriptor {
        ArchiveDescriptor {
            name: "food".to_string(),
            description: "Pictures of food".to_string(),
            license: String::new(),
            citation: String::new(),
            homepage: String::new(),
            class_names: vec!["pizza".to_string(), "sushi".to_string()],
            image_dir: "images/".to_string(),
            label_position: 1,
            key_mode: KeyMode::FileStem,
            configs: ConfigRegistry::new(configs).unwrap(),
        }
    }

    fn write_fixture(dir: &TempDir) {
        write_zip(
            &dir.path().join("food.zip"),
            &[
                ("README.txt", &b"about"[..]),
                ("images/pizza/0001.jpg", &b"one"[..]),
                ("images/sushi/0002.jpg", &b"two"[..]),
                ("images/pizza/0003.jpg", &b"three"[..]),
                ("thumbs/pizza/0001.jpg", &b"small"[..]),
            ],
        );
        fs::write(dir.path().join("train.txt"), "0001\n0002\n\n").unwrap();
        fs::write(dir.path().join("test.txt"), "0003\n").unwrap();
    }

    fn default_config() -> BuilderConfig {
        BuilderConfig::new("default")
            .with_url(IMAGES_ROLE, "food.zip")
            .with_url("train", "train.txt")
            .with_url("test", "test.txt")
    }

    fn fetcher(dir: &TempDir) -> DownloadManager {
        DownloadManager::new(dir.path(), dir.path().join(".cache"))
    }

    #[test]
    fn test_membership_filters_archive_entries() -> Result<()> {
        let dir = tempdir()?;
        write_fixture(&dir);
        let builder = ArchiveImageDataset::new(food_descriptor(vec![default_config()]), None)?;

        let plan = builder.plan_splits(&mut fetcher(&dir))?;
        let train = plan.get(&Split::Train).unwrap();
        let records: Vec<Record> = builder.generate(&train.args, &SkipLog::new())?.collect::<Result<_>>()?;

        let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["images/pizza/0001.jpg", "images/sushi/0002.jpg"]);
        assert_eq!(records[0].get(LABEL_FEATURE), Some(&FeatureValue::ClassLabel(0)));
        assert_eq!(records[1].get(LABEL_FEATURE), Some(&FeatureValue::ClassLabel(1)));
        let image = records[1].get(IMAGE_FEATURE).and_then(FeatureValue::as_image).unwrap();
        assert_eq!(image.bytes.as_deref(), Some(&b"two"[..]));
        Ok(())
    }

    #[test]
    fn test_load_all_splits_and_regenerate() -> Result<()> {
        let dir = tempdir()?;
        write_fixture(&dir);
        let builder = ArchiveImageDataset::new(food_descriptor(vec![default_config()]), None)?;

        let first = load_dataset(&builder, &mut fetcher(&dir), &SkipLog::new())?;
        let second = load_dataset(&builder, &mut fetcher(&dir), &SkipLog::new())?;
        assert_eq!(first, second);
        assert_eq!(first.num_rows(&Split::Train), 2);
        assert_eq!(first.num_rows(&Split::Test), 1);
        assert_eq!(first.info.version.as_deref(), Some("1.0.0"));
        Ok(())
    }

    #[test]
    fn test_relative_stem_keys() -> Result<()> {
        let dir = tempdir()?;
        write_fixture(&dir);
        fs::write(dir.path().join("train.txt"), "pizza/0001\nsushi/0002\n")?;
        let mut descriptor = food_descriptor(vec![default_config()]);
        descriptor.key_mode = KeyMode::RelativeStem;
        let builder = ArchiveImageDataset::new(descriptor, None)?;

        let plan = builder.plan_splits(&mut fetcher(&dir))?;
        let records: Vec<Record> = builder
            .generate(&plan.get(&Split::Train).unwrap().args, &SkipLog::new())?
            .collect::<Result<_>>()?;
        let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["images/pizza/0001.jpg", "images/sushi/0002.jpg"]);
        Ok(())
    }

    #[test]
    fn test_unmatched_members_are_dangling() -> Result<()> {
        let dir = tempdir()?;
        write_fixture(&dir);
        // identifiers written with their extension never match a file stem
        fs::write(dir.path().join("train.txt"), "0001.jpg\n0002\n")?;

        let strict = ArchiveImageDataset::new(food_descriptor(vec![default_config()]), None)?;
        let plan = strict.plan_splits(&mut fetcher(&dir))?;
        let result: Result<Vec<Record>> = strict
            .generate(&plan.get(&Split::Train).unwrap().args, &SkipLog::new())?
            .collect();
        match result {
            Err(DatasetError::DanglingReference { file_name, .. }) => assert_eq!(file_name, "0001.jpg"),
            other => panic!("expected dangling reference, got {:?}", other),
        }

        let lenient = ArchiveImageDataset::new(food_descriptor(vec![default_config()]), None)?
            .with_policy(MetadataPolicy::Lenient);
        let plan = lenient.plan_splits(&mut fetcher(&dir))?;
        let skips = SkipLog::new();
        let records: Vec<Record> = lenient
            .generate(&plan.get(&Split::Train).unwrap().args, &skips)?
            .collect::<Result<_>>()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "images/sushi/0002.jpg");
        assert_eq!(skips.summary().dangling_references, 1);
        Ok(())
    }

    #[test]
    fn test_unknown_class_is_schema_mismatch() -> Result<()> {
        let dir = tempdir()?;
        write_fixture(&dir);
        let mut descriptor = food_descriptor(vec![default_config()]);
        descriptor.class_names = vec!["pizza".to_string()];
        let builder = ArchiveImageDataset::new(descriptor, None)?;

        let plan = builder.plan_splits(&mut fetcher(&dir))?;
        let result: Result<Vec<Record>> = builder
            .generate(&plan.get(&Split::Train).unwrap().args, &SkipLog::new())?
            .collect();
        match result {
            Err(DatasetError::SchemaMismatch { key, .. }) => assert_eq!(key, "images/sushi/0002.jpg"),
            other => panic!("expected schema mismatch, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_missing_resource_is_unavailable() -> Result<()> {
        let dir = tempdir()?;
        write_fixture(&dir);
        let config = default_config().with_url("validation", "missing.txt");
        let builder = ArchiveImageDataset::new(food_descriptor(vec![config]), None)?;

        match builder.plan_splits(&mut fetcher(&dir)) {
            Err(DatasetError::ResourceUnavailable { locator, .. }) => assert_eq!(locator, "missing.txt"),
            other => panic!("expected unavailable resource, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_config_selects_resources() -> Result<()> {
        let dir = tempdir()?;
        write_fixture(&dir);
        let small = BuilderConfig::new("small")
            .with_description("Train split only")
            .with_url(IMAGES_ROLE, "food.zip")
            .with_url("train", "test.txt");
        let descriptor = food_descriptor(vec![default_config(), small]);

        let builder = ArchiveImageDataset::new(descriptor.clone(), Some("small"))?;
        assert_eq!(builder.config_name(), "small");
        let dataset = load_dataset(&builder, &mut fetcher(&dir), &SkipLog::new())?;
        assert_eq!(dataset.split_names().count(), 1);
        assert_eq!(dataset.num_rows(&Split::Train), 1);

        assert!(matches!(
            ArchiveImageDataset::new(descriptor, Some("large")),
            Err(DatasetError::UnknownConfig { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_descriptor_json() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("food.json");
        fs::write(
            &path,
            r#"{
                "name": "food",
                "class_names": ["pizza"],
                "image_dir": "images",
                "label_position": 1,
                "key_mode": "relative_stem",
                "configs": [{"name": "default", "data_urls": {"images": "food.zip", "train": "train.txt"}}]
            }"#,
        )?;
        let descriptor = ArchiveDescriptor::load(&path)?;
        assert_eq!(descriptor.key_mode, KeyMode::RelativeStem);
        assert_eq!(descriptor.image_prefix(), "images/");
        assert_eq!(descriptor.configs.len(), 1);
        Ok(())
    }

    #[test]
    fn test_key_modes() {
        assert_eq!(KeyMode::FileStem.key("pizza/0001.jpg"), "0001");
        assert_eq!(KeyMode::RelativeStem.key("pizza/0001.jpg"), "pizza/0001");
        assert_eq!(KeyMode::RelativeStem.key("0001.tar.jpg"), "0001.tar");
    }
}

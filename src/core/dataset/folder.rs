//! Datasets defined by a directory layout instead of code.
//!
//! ```text
//! root/train/cat/0001.jpg          labels come from the class directory
//! root/train/metadata.jsonl        or from per-image metadata rows
//! root/train/images + labels/      or from YOLO label files
//! ```

use image::ImageFormat;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::metadata::{infer_columns, normalize, read_rows, MetadataRow, METADATA_FILE_NAME};
use super::yolo::{is_yolo_split, label_path_for_image, parse_label_file, LabelInfo, IMAGES_DIR, LABELS_DIR};
use crate::config::LoaderConfig;
use crate::core::builder::{DatasetBuilder, RecordStream};
use crate::core::features::{FeatureType, Features};
use crate::core::info::{DatasetInfo, SupervisedKeys};
use crate::core::record::Record;
use crate::core::report::{MetadataPolicy, SkipLog};
use crate::core::split::{Split, SplitGenerator, SplitPlan};
use crate::core::value::{FeatureValue, ImageData};
use crate::error::{DatasetError, Result};
use crate::fetch::ResourceFetcher;

pub const IMAGE_FEATURE: &str = "image";
pub const LABEL_FEATURE: &str = "label";
pub const OBJECTS_FEATURE: &str = "objects";

/// How an image folder is read
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFolderOptions {
    pub data_dir: PathBuf,
    pub name: Option<String>,
    pub description: Option<String>,
    /// `None`: drop directory labels only when metadata files are present
    pub drop_labels: Option<bool>,
    pub drop_metadata: bool,
    pub metadata_policy: MetadataPolicy,
}

impl ImageFolderOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            name: None,
            description: None,
            drop_labels: None,
            drop_metadata: false,
            metadata_policy: MetadataPolicy::Strict,
        }
    }

    pub fn from_config(data_dir: impl Into<PathBuf>, config: &LoaderConfig) -> Self {
        Self {
            drop_labels: config.drop_labels,
            drop_metadata: config.drop_metadata,
            metadata_policy: config.metadata_policy,
            ..Self::new(data_dir)
        }
    }

    pub fn with_drop_labels(mut self, drop: bool) -> Self {
        self.drop_labels = Some(drop);
        self
    }

    pub fn with_drop_metadata(mut self, drop: bool) -> Self {
        self.drop_metadata = drop;
        self
    }

    pub fn with_policy(mut self, policy: MetadataPolicy) -> Self {
        self.metadata_policy = policy;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Files found in one split directory; also the generation arguments of that split
#[derive(Debug, Clone, PartialEq)]
pub struct FolderSplit {
    pub split: Split,
    pub root: PathBuf,
    pub images: Vec<PathBuf>,
    pub metadata_files: Vec<PathBuf>,
    pub label_files: Vec<PathBuf>,
    pub yolo: bool,
}

/// Dataset builder for the folder convention.
///
/// The tree is scanned once by [`ImageFolder::open`]; `describe` then works from the
/// cached layout without touching the disk.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    options: ImageFolderOptions,
    name: String,
    splits: Vec<FolderSplit>,
    class_names: Option<Vec<String>>,
    metadata_columns: Vec<(String, FeatureType)>,
    use_metadata: bool,
    yolo: bool,
}

impl ImageFolder {
    pub fn open(options: ImageFolderOptions) -> Result<Self> {
        let data_dir = normalize(&options.data_dir);
        if !data_dir.is_dir() {
            return Err(DatasetError::unavailable(
                data_dir.display().to_string(),
                "data directory does not exist",
            ));
        }
        info!("Scanning image folder: {:?}", data_dir);

        let splits = discover_splits(&data_dir)?
            .into_iter()
            .map(|(split, root)| scan_split(split, root))
            .collect::<Result<Vec<_>>>()?;

        let yolo = splits.iter().any(|s| s.yolo);
        if yolo && !splits.iter().all(|s| s.yolo) {
            return Err(DatasetError::InvalidSchema(
                "either every split or none must use the images/ + labels/ layout".to_string(),
            ));
        }

        let has_metadata = splits.iter().any(|s| !s.metadata_files.is_empty());
        let use_metadata = has_metadata && !options.drop_metadata;
        let drop_labels = options.drop_labels.unwrap_or(use_metadata);
        if use_metadata && options.drop_labels.is_none() {
            debug!("Metadata files present, directory labels are not inferred");
        }

        let class_names = if drop_labels || yolo {
            None
        } else {
            infer_class_names(&splits)
        };

        let metadata_columns = if use_metadata {
            let mut files = Vec::new();
            for split in &splits {
                for path in &split.metadata_files {
                    files.push((path.clone(), read_rows(path)?));
                }
            }
            infer_columns(&files)?
        } else {
            Vec::new()
        };

        for (column, _) in &metadata_columns {
            let taken = column == IMAGE_FEATURE
                || (column == LABEL_FEATURE && class_names.is_some())
                || (column == OBJECTS_FEATURE && yolo);
            if taken {
                return Err(DatasetError::InvalidSchema(format!(
                    "metadata column '{}' collides with an inferred feature",
                    column
                )));
            }
        }

        let total: usize = splits.iter().map(|s| s.images.len()).sum();
        if total == 0 {
            warn!("No images found under {:?}", data_dir);
        }
        for split in &splits {
            info!(
                "Found {} images in split '{}' ({:?})",
                split.images.len(),
                split.split,
                split.root
            );
        }

        let name = options.name.clone().unwrap_or_else(|| {
            data_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("imagefolder")
                .to_string()
        });

        Ok(Self {
            options: ImageFolderOptions {
                data_dir,
                ..options
            },
            name,
            splits,
            class_names,
            metadata_columns,
            use_metadata,
            yolo,
        })
    }

    /// Resolve `data_dir` through a fetcher first, so it may be a URL or a zip archive
    pub fn open_with(mut options: ImageFolderOptions, fetcher: &mut dyn ResourceFetcher) -> Result<Self> {
        let locator = options.data_dir.to_string_lossy().into_owned();
        let resolved = fetcher.download_and_extract(&locator)?;
        options.data_dir = single_subdir(&resolved).unwrap_or(resolved);
        Self::open(options)
    }

    pub fn data_dir(&self) -> &Path {
        &self.options.data_dir
    }

    pub fn class_names(&self) -> Option<&[String]> {
        self.class_names.as_deref()
    }

    pub fn layout(&self) -> &[FolderSplit] {
        &self.splits
    }

    /// Pair every image with its metadata row. All rows are read before the first
    /// record is produced.
    fn pair_metadata(
        &self,
        args: &FolderSplit,
        skips: &SkipLog,
    ) -> Result<Vec<(PathBuf, Option<BTreeMap<String, FeatureValue>>)>> {
        if !self.use_metadata {
            return Ok(args.images.iter().map(|p| (p.clone(), None)).collect());
        }
        let policy = self.options.metadata_policy;
        let known: HashSet<&PathBuf> = args.images.iter().collect();
        let mut rows_by_image: HashMap<PathBuf, BTreeMap<String, FeatureValue>> = HashMap::new();

        for metadata_path in &args.metadata_files {
            for row in read_rows(metadata_path)? {
                let target = row.resolve(metadata_path);
                if !known.contains(&target) {
                    policy.handle(
                        DatasetError::DanglingReference {
                            metadata: metadata_path.clone(),
                            file_name: row.file_name.clone(),
                        },
                        skips,
                    )?;
                    continue;
                }
                let fields = self.check_row(metadata_path, &row)?;
                if rows_by_image.insert(target, fields).is_some() {
                    return Err(DatasetError::invalid_metadata(
                        metadata_path,
                        format!("more than one row for '{}'", row.file_name),
                    ));
                }
            }
        }

        let mut items = Vec::with_capacity(args.images.len());
        for image in &args.images {
            match rows_by_image.remove(image) {
                Some(fields) => items.push((image.clone(), Some(fields))),
                None => policy.handle(DatasetError::MissingMetadata { path: image.clone() }, skips)?,
            }
        }
        Ok(items)
    }

    fn check_row(&self, metadata_path: &Path, row: &MetadataRow) -> Result<BTreeMap<String, FeatureValue>> {
        let fields = row.to_fields();
        for (name, ty) in &self.metadata_columns {
            let value = fields.get(name).ok_or_else(|| {
                DatasetError::invalid_metadata(
                    metadata_path,
                    format!("line {} has no '{}' column", row.line, name),
                )
            })?;
            ty.check(value).map_err(|reason| {
                DatasetError::invalid_metadata(
                    metadata_path,
                    format!("line {} column '{}': {}", row.line, name, reason),
                )
            })?;
        }
        if let Some(extra) = fields
            .keys()
            .find(|k| !self.metadata_columns.iter().any(|(n, _)| n == *k))
        {
            return Err(DatasetError::invalid_metadata(
                metadata_path,
                format!("line {} has unexpected column '{}'", row.line, extra),
            ));
        }
        Ok(fields)
    }

    /// Label files with no image next to them
    fn check_label_files(&self, args: &FolderSplit, skips: &SkipLog) -> Result<()> {
        let expected: HashSet<PathBuf> = args
            .images
            .iter()
            .filter_map(|image| label_path_for_image(&args.root, image))
            .collect();
        for label in &args.label_files {
            if !expected.contains(label) {
                let file_name = label
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                self.options.metadata_policy.handle(
                    DatasetError::DanglingReference {
                        metadata: label.clone(),
                        file_name,
                    },
                    skips,
                )?;
            }
        }
        Ok(())
    }

    fn make_record(
        &self,
        args: &FolderSplit,
        path: PathBuf,
        fields: Option<BTreeMap<String, FeatureValue>>,
    ) -> Result<Record> {
        let key = path
            .strip_prefix(&self.options.data_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let bytes = fs::read(&path)?;
        let mut record = Record::new(key.clone()).with_field(
            IMAGE_FEATURE,
            FeatureValue::Image(ImageData::from_bytes(path.to_string_lossy(), bytes)),
        );

        if let Some(names) = &self.class_names {
            let class = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let index = names.iter().position(|n| n == class).ok_or_else(|| {
                DatasetError::SchemaMismatch {
                    split: args.split.to_string(),
                    key: key.clone(),
                    reason: format!("unknown class directory '{}'", class),
                }
            })?;
            record = record.with_field(LABEL_FEATURE, FeatureValue::ClassLabel(index as i64));
        }

        if args.yolo {
            let label = match label_path_for_image(&args.root, &path) {
                Some(label_path) if label_path.is_file() => parse_label_file(&label_path)?,
                _ => LabelInfo::default(),
            };
            record = record.with_field(OBJECTS_FEATURE, label.to_objects());
        }

        if let Some(fields) = fields {
            record.fields.extend(fields);
        }
        Ok(record)
    }
}

impl DatasetBuilder for ImageFolder {
    type Args = FolderSplit;

    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Result<DatasetInfo> {
        let mut features = Features::new().with(IMAGE_FEATURE, FeatureType::Image);
        if let Some(names) = &self.class_names {
            features.insert(
                LABEL_FEATURE,
                FeatureType::ClassLabel {
                    names: names.clone(),
                },
            );
        }
        if self.yolo {
            features.insert(OBJECTS_FEATURE, FeatureType::detection_objects());
        }
        for (name, ty) in &self.metadata_columns {
            features.insert(name.clone(), ty.clone());
        }

        let description = self
            .options
            .description
            .clone()
            .unwrap_or_else(|| format!("Image folder dataset loaded from {}", self.options.data_dir.display()));
        let mut info = DatasetInfo::new(description, features);
        if self.class_names.is_some() {
            info = info.with_supervised_keys(SupervisedKeys::new(IMAGE_FEATURE, LABEL_FEATURE));
        }
        Ok(info)
    }

    fn plan_splits(&self, _fetcher: &mut dyn ResourceFetcher) -> Result<SplitPlan<FolderSplit>> {
        let mut generators = Vec::with_capacity(self.splits.len());
        for split in &self.splits {
            if !split.root.is_dir() {
                return Err(DatasetError::unavailable(
                    split.root.display().to_string(),
                    "split directory disappeared",
                ));
            }
            generators.push(SplitGenerator::new(split.split.clone(), split.clone()));
        }
        SplitPlan::new(generators)
    }

    fn generate<'a>(&'a self, args: &'a FolderSplit, skips: &SkipLog) -> Result<RecordStream<'a>> {
        let items = self.pair_metadata(args, skips)?;
        if args.yolo {
            self.check_label_files(args, skips)?;
        }
        debug!("Split '{}': {} images to stream", args.split, items.len());
        Ok(Box::new(
            items
                .into_iter()
                .map(move |(path, fields)| self.make_record(args, path, fields)),
        ))
    }
}

/// Top-level split directories, or the whole tree as `train` when there are none
fn discover_splits(data_dir: &Path) -> Result<Vec<(Split, PathBuf)>> {
    let mut found: Vec<(Split, PathBuf)> = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(data_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();

    for dir in entries {
        let Some(split) = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(Split::from_dir_name)
        else {
            continue;
        };
        if found.iter().any(|(s, _)| *s == split) {
            return Err(DatasetError::DuplicateSplit(split.to_string()));
        }
        found.push((split, dir));
    }

    if found.is_empty() {
        debug!("No split directories in {:?}, using it as '{}'", data_dir, Split::Train);
        found.push((Split::Train, data_dir.to_path_buf()));
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

fn scan_split(split: Split, root: PathBuf) -> Result<FolderSplit> {
    let yolo = is_yolo_split(&root);
    let image_root = if yolo { root.join(IMAGES_DIR) } else { root.clone() };
    let label_root = root.join(LABELS_DIR);

    let mut layout = FolderSplit {
        split,
        root: root.clone(),
        images: Vec::new(),
        metadata_files: Vec::new(),
        label_files: Vec::new(),
        yolo,
    };

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = normalize(entry.path());
        let is_metadata = path.file_name().and_then(|n| n.to_str()) == Some(METADATA_FILE_NAME);

        if is_metadata {
            layout.metadata_files.push(path);
        } else if path.starts_with(&image_root) && is_image_file(&path) {
            layout.images.push(path);
        } else if yolo
            && path.starts_with(&label_root)
            && path.extension().and_then(|e| e.to_str()) == Some("txt")
        {
            layout.label_files.push(path);
        }
    }
    Ok(layout)
}

fn is_image_file(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

/// Class names from the parent directories of all images, or `None` when some image
/// sits directly in its split directory
fn infer_class_names(splits: &[FolderSplit]) -> Option<Vec<String>> {
    let mut names = BTreeSet::new();
    for split in splits {
        for image in &split.images {
            let parent = image.parent()?;
            if parent == split.root {
                return None;
            }
            names.insert(parent.file_name()?.to_str()?.to_string());
        }
    }
    if names.is_empty() {
        None
    } else {
        Some(names.into_iter().collect())
    }
}

/// The only entry of `dir`, if it is a directory (archives often wrap their content)
fn single_subdir(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).ok()?.filter_map(|e| e.ok());
    let first = entries.next()?;
    if entries.next().is_some() || !first.path().is_dir() {
        return None;
    }
    let path = first.path();
    let name = path.file_name()?.to_str()?;
    if Split::from_dir_name(name).is_some() {
        return None;
    }
    // A lone class directory must stay a class directory
    let has_subdirs = fs::read_dir(&path).ok()?.filter_map(|e| e.ok()).any(|e| e.path().is_dir());
    has_subdirs.then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::materialize::load_dataset;
    use crate::core::report::SkipKind;
    use crate::fetch::DownloadManager;
    use std::fs::File;
    use tempfile::{tempdir, TempDir};

    mod test_utils {
        use super::*;

        pub fn touch(path: &Path) {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            File::create(path).unwrap();
        }

        pub fn write(path: &Path, contents: &str) {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        pub fn fetcher(dir: &TempDir) -> DownloadManager {
            DownloadManager::new(dir.path(), dir.path().join(".cache"))
        }

        pub fn collect(folder: &ImageFolder, split: &Split, skips: &SkipLog) -> Result<Vec<Record>> {
            let mut dm = DownloadManager::new(".", std::env::temp_dir());
            let plan = folder.plan_splits(&mut dm)?;
            let generator = plan.get(split).unwrap();
            let records = folder.generate(&generator.args, skips)?.collect();
            records
        }
    }
    use test_utils::*;

    #[test]
    fn test_class_directories_become_labels() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("beans");
        touch(&root.join("train/healthy/a.jpg"));
        touch(&root.join("train/rust/b.jpg"));
        touch(&root.join("test/healthy/c.png"));
        touch(&root.join("test/notes.txt"));

        let folder = ImageFolder::open(ImageFolderOptions::new(&root))?;
        let info = folder.describe()?;
        assert_eq!(
            info.features.get(LABEL_FEATURE),
            Some(&FeatureType::ClassLabel {
                names: vec!["healthy".into(), "rust".into()]
            })
        );
        assert_eq!(
            info.supervised_keys,
            Some(SupervisedKeys::new(IMAGE_FEATURE, LABEL_FEATURE))
        );

        let dataset = load_dataset(&folder, &mut fetcher(&dir), &SkipLog::new())?;
        let train = dataset.split(&Split::Train).unwrap();
        assert_eq!(train.len(), 2);
        assert_eq!(train[0].key, "train/healthy/a.jpg");
        assert_eq!(train[1].get(LABEL_FEATURE), Some(&FeatureValue::ClassLabel(1)));
        assert_eq!(dataset.num_rows(&Split::Test), 1);
        Ok(())
    }

    #[test]
    fn test_without_split_dirs_everything_is_train() -> Result<()> {
        let dir = tempdir()?;
        touch(&dir.path().join("data/cat/a.jpg"));
        touch(&dir.path().join("data/dog/b.jpg"));

        let folder = ImageFolder::open(ImageFolderOptions::new(dir.path().join("data")))?;
        assert_eq!(folder.layout().len(), 1);
        assert_eq!(folder.layout()[0].split, Split::Train);
        assert_eq!(folder.class_names(), Some(&["cat".to_string(), "dog".to_string()][..]));
        Ok(())
    }

    #[test]
    fn test_captions_from_metadata_suppress_labels() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("pokemon");
        for name in ["0001.png", "0002.png", "0003.png"] {
            touch(&root.join("train").join(name));
        }
        write(
            &root.join("train/metadata.jsonl"),
            concat!(
                r#"{"file_name": "0001.png", "text": "a drawing of a green pokemon with red eyes"}"#, "\n",
                r#"{"file_name": "0002.png", "text": "a green and yellow toy with a red nose"}"#, "\n",
                r#"{"file_name": "0003.png", "text": "a red and white ball with an angry look on its face"}"#, "\n",
            ),
        );

        let folder = ImageFolder::open(ImageFolderOptions::new(&root))?;
        let info = folder.describe()?;
        assert!(!info.features.contains(LABEL_FEATURE));
        assert_eq!(info.features.get("text"), Some(&FeatureType::Text));

        let records = collect(&folder, &Split::Train, &SkipLog::new())?;
        assert_eq!(records.len(), 3);
        for record in &records {
            assert!(record.get(IMAGE_FEATURE).and_then(FeatureValue::as_image).is_some());
            assert!(record.get("text").and_then(FeatureValue::as_str).is_some());
            assert!(record.get(LABEL_FEATURE).is_none());
            assert!(info.features.check(record).is_ok());
        }
        assert_eq!(
            records[2].get("text").and_then(FeatureValue::as_str),
            Some("a red and white ball with an angry look on its face")
        );
        Ok(())
    }

    #[test]
    fn test_labels_kept_with_metadata_when_asked() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("ds");
        touch(&root.join("train/cat/a.png"));
        write(
            &root.join("train/metadata.jsonl"),
            "{\"file_name\": \"cat/a.png\", \"text\": \"a cat\"}\n",
        );

        let folder = ImageFolder::open(ImageFolderOptions::new(&root).with_drop_labels(false))?;
        let info = folder.describe()?;
        assert!(info.features.contains(LABEL_FEATURE));
        assert!(info.features.contains("text"));

        let records = collect(&folder, &Split::Train, &SkipLog::new())?;
        assert_eq!(records[0].get(LABEL_FEATURE), Some(&FeatureValue::ClassLabel(0)));
        Ok(())
    }

    #[test]
    fn test_object_detection_metadata_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("cppe");
        touch(&root.join("train/0001.png"));
        let row = serde_json::json!({
            "file_name": "0001.png",
            "objects": {
                "bbox": [[302.0, 109.0, 73.0, 52.0], [810.0, 100.0, 57.0, 28.0]],
                "categories": [4, 1]
            }
        });
        write(&root.join("train/metadata.jsonl"), &format!("{}\n", row));

        let folder = ImageFolder::open(ImageFolderOptions::new(&root))?;
        assert_eq!(
            folder.describe()?.features.get(OBJECTS_FEATURE),
            Some(&FeatureType::detection_objects())
        );

        let records = collect(&folder, &Split::Train, &SkipLog::new())?;
        assert_eq!(records[0].get(OBJECTS_FEATURE).unwrap().to_json(), row["objects"]);
        Ok(())
    }

    #[test]
    fn test_dangling_reference_strict_and_lenient() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("ds");
        touch(&root.join("train/a.png"));
        write(
            &root.join("train/metadata.jsonl"),
            concat!(
                r#"{"file_name": "a.png", "text": "here"}"#, "\n",
                r#"{"file_name": "gone.png", "text": "not here"}"#, "\n",
            ),
        );

        let strict = ImageFolder::open(ImageFolderOptions::new(&root))?;
        match collect(&strict, &Split::Train, &SkipLog::new()) {
            Err(DatasetError::DanglingReference { file_name, .. }) => assert_eq!(file_name, "gone.png"),
            other => panic!("expected dangling reference, got {:?}", other),
        }

        let lenient = ImageFolder::open(ImageFolderOptions::new(&root).with_policy(MetadataPolicy::Lenient))?;
        let skips = SkipLog::new();
        let records = collect(&lenient, &Split::Train, &skips)?;
        assert_eq!(records.len(), 1);
        assert_eq!(skips.count(SkipKind::DanglingReference), 1);
        Ok(())
    }

    #[test]
    fn test_missing_metadata_strict_and_lenient() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("ds");
        touch(&root.join("train/a.png"));
        touch(&root.join("train/b.png"));
        write(&root.join("train/metadata.jsonl"), "{\"file_name\": \"a.png\", \"text\": \"a\"}\n");

        let strict = ImageFolder::open(ImageFolderOptions::new(&root))?;
        assert!(matches!(
            collect(&strict, &Split::Train, &SkipLog::new()),
            Err(DatasetError::MissingMetadata { .. })
        ));

        let lenient = ImageFolder::open(ImageFolderOptions::new(&root).with_policy(MetadataPolicy::Lenient))?;
        let skips = SkipLog::new();
        assert_eq!(collect(&lenient, &Split::Train, &skips)?.len(), 1);
        assert_eq!(skips.summary().missing_metadata, 1);
        Ok(())
    }

    #[test]
    fn test_duplicate_rows_are_invalid() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("ds");
        touch(&root.join("train/a.png"));
        write(
            &root.join("train/metadata.jsonl"),
            "{\"file_name\": \"a.png\", \"text\": \"a\"}\n{\"file_name\": \"./a.png\", \"text\": \"b\"}\n",
        );
        let folder = ImageFolder::open(ImageFolderOptions::new(&root))?;
        assert!(matches!(
            collect(&folder, &Split::Train, &SkipLog::new()),
            Err(DatasetError::InvalidMetadata { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_drop_metadata_restores_labels() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("ds");
        touch(&root.join("train/cat/a.png"));
        write(&root.join("train/metadata.jsonl"), "{\"file_name\": \"cat/a.png\", \"text\": \"a\"}\n");

        let folder = ImageFolder::open(ImageFolderOptions::new(&root).with_drop_metadata(true))?;
        let info = folder.describe()?;
        assert!(info.features.contains(LABEL_FEATURE));
        assert!(!info.features.contains("text"));
        Ok(())
    }

    #[test]
    fn test_yolo_layout_yields_objects() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("cs2");
        touch(&root.join("train/images/frame_1.png"));
        touch(&root.join("train/images/frame_2.png"));
        write(&root.join("train/labels/frame_1.txt"), "# Map: de_dust2\n0 0.5 0.5 0.1 0.2\n1 0.2 0.2 0.1 0.1\n");
        write(&root.join("train/labels/orphan.txt"), "0 0.5 0.5 0.1 0.1\n");

        let strict = ImageFolder::open(ImageFolderOptions::new(&root))?;
        assert!(matches!(
            collect(&strict, &Split::Train, &SkipLog::new()),
            Err(DatasetError::DanglingReference { .. })
        ));

        let folder = ImageFolder::open(ImageFolderOptions::new(&root).with_policy(MetadataPolicy::Lenient))?;
        let info = folder.describe()?;
        assert!(!info.features.contains(LABEL_FEATURE));
        let skips = SkipLog::new();
        let records = collect(&folder, &Split::Train, &skips)?;
        assert_eq!(records.len(), 2);
        assert_eq!(skips.count(SkipKind::DanglingReference), 1);

        let categories = records[0].get(OBJECTS_FEATURE).unwrap().as_struct().unwrap()["categories"].clone();
        assert_eq!(categories, FeatureValue::List(vec![FeatureValue::Int(0), FeatureValue::Int(1)]));
        let background = records[1].get(OBJECTS_FEATURE).unwrap().as_struct().unwrap()["bbox"].clone();
        assert_eq!(background, FeatureValue::List(vec![]));
        for record in &records {
            assert!(info.features.check(record).is_ok());
        }
        Ok(())
    }

    #[test]
    fn test_generate_twice_is_identical() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("ds");
        touch(&root.join("train/cat/a.png"));
        touch(&root.join("train/dog/b.png"));
        let folder = ImageFolder::open(ImageFolderOptions::new(&root))?;

        let first = collect(&folder, &Split::Train, &SkipLog::new())?;
        let second = collect(&folder, &Split::Train, &SkipLog::new())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_missing_data_dir_is_unavailable() {
        let err = ImageFolder::open(ImageFolderOptions::new("/no/such/folder")).unwrap_err();
        assert!(matches!(err, DatasetError::ResourceUnavailable { .. }));
    }

    #[test]
    fn test_open_with_extracts_archives() -> Result<()> {
        let dir = tempdir()?;
        crate::fetch::test_utils::write_zip(
            &dir.path().join("beans.zip"),
            &[("beans/train/healthy/a.png", &b""[..]), ("beans/train/rust/b.png", &b""[..])],
        );
        let mut dm = fetcher(&dir);
        let folder = ImageFolder::open_with(ImageFolderOptions::new("beans.zip"), &mut dm)?;
        assert_eq!(folder.layout()[0].images.len(), 2);
        assert_eq!(folder.class_names().map(|n| n.len()), Some(2));
        Ok(())
    }
}

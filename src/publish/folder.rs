use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use super::{parse_destination, PublishReceipt, Publisher};
use crate::core::dataset::{FILE_NAME_KEY, LABEL_FEATURE, METADATA_FILE_NAME};
use crate::core::{DatasetDict, DatasetInfos, FeatureType, FeatureValue, Record};
use crate::error::{DatasetError, Result};

/// Publishes into `<root>/<namespace>/<name>` using the folder convention, so the
/// result can be loaded back with `ImageFolder`.
///
/// Records with a `label` class go to `<split>/<class name>/`. When a split also has
/// metadata columns, reload with `drop_labels` set to `false` to keep the labels.
#[derive(Debug, Clone)]
pub struct FolderPublisher {
    root: PathBuf,
    overwrite: bool,
}

impl FolderPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn write_split(
        &self,
        dataset: &DatasetDict,
        image_feature: &str,
        dir: &Path,
        records: &[Record],
    ) -> Result<usize> {
        fs::create_dir_all(dir)?;
        let class_names = dataset.info.features.get(LABEL_FEATURE).and_then(|ty| match ty {
            FeatureType::ClassLabel { names } => Some(names.as_slice()),
            _ => None,
        });
        let columns = dataset.info.features.len() - 1 - usize::from(class_names.is_some());
        let mut metadata = if columns > 0 {
            Some(BufWriter::new(File::create(dir.join(METADATA_FILE_NAME))?))
        } else {
            None
        };

        let mut used = HashSet::new();
        for (index, record) in records.iter().enumerate() {
            let image = record
                .get(image_feature)
                .and_then(FeatureValue::as_image)
                .ok_or_else(|| {
                    DatasetError::Publish(format!("record '{}' has no image", record.key))
                })?;
            let class = match class_names {
                Some(names) => Some(class_dir(names, record)?),
                None => None,
            };
            let file_name = unused_file_name(&used, class, image.file_name().unwrap_or("image"), index);
            let target = dir.join(&file_name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, image.load_bytes()?)?;

            if let Some(out) = metadata.as_mut() {
                let row = metadata_row(dataset, image_feature, &file_name, record)?;
                serde_json::to_writer(&mut *out, &row)?;
                out.write_all(b"\n")?;
            }
            used.insert(file_name);
        }

        let mut files = records.len();
        if let Some(out) = metadata {
            out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            files += 1;
        }
        Ok(files)
    }
}

/// Directory of a record's class, named after the label
fn class_dir<'a>(names: &'a [String], record: &Record) -> Result<&'a str> {
    let index = record
        .get(LABEL_FEATURE)
        .and_then(FeatureValue::as_i64)
        .ok_or_else(|| DatasetError::Publish(format!("record '{}' has no class label", record.key)))?;
    let name = usize::try_from(index)
        .ok()
        .and_then(|i| names.get(i))
        .ok_or_else(|| {
            DatasetError::Publish(format!(
                "record '{}' has class label {} but only {} classes are defined",
                record.key,
                index,
                names.len()
            ))
        })?;
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(DatasetError::Publish(format!(
            "class name '{}' cannot be used as a directory name",
            name
        ))),
    }
}

/// `base` under `class_dir`, prefixed with the record index (and then counters)
/// until it no longer clashes with a file already written
fn unused_file_name(used: &HashSet<String>, class_dir: Option<&str>, base: &str, index: usize) -> String {
    let join = |name: &str| match class_dir {
        Some(dir) => format!("{}/{}", dir, name),
        None => name.to_string(),
    };
    let mut candidate = join(base);
    let mut prefix = index;
    while used.contains(&candidate) {
        candidate = join(&format!("{:06}_{}", prefix, base));
        prefix += 1;
    }
    candidate
}

/// Every field except the image and the class label; other class labels are written as
/// their names
fn metadata_row(
    dataset: &DatasetDict,
    image_feature: &str,
    file_name: &str,
    record: &Record,
) -> Result<Value> {
    let mut row = Map::new();
    row.insert(FILE_NAME_KEY.to_string(), Value::String(file_name.to_string()));
    for (name, ty) in dataset.info.features.iter() {
        if name == image_feature {
            continue;
        }
        let value = match (ty, record.get(name)) {
            (FeatureType::ClassLabel { .. }, _) if name == LABEL_FEATURE => continue,
            (FeatureType::ClassLabel { names }, Some(FeatureValue::ClassLabel(i))) => usize::try_from(*i)
                .ok()
                .and_then(|i| names.get(i))
                .map(|n| Value::String(n.clone()))
                .ok_or_else(|| {
                    DatasetError::Publish(format!(
                        "record '{}' has {} = {} but only {} classes are defined",
                        record.key,
                        name,
                        i,
                        names.len()
                    ))
                })?,
            (_, Some(value)) => value.to_json(),
            (_, None) => Value::Null,
        };
        row.insert(name.to_string(), value);
    }
    Ok(Value::Object(row))
}

impl Publisher for FolderPublisher {
    fn publish(&self, dataset: &DatasetDict, destination: &str) -> Result<PublishReceipt> {
        let (namespace, name) = parse_destination(destination)?;
        let mut image_features = dataset
            .info
            .features
            .iter()
            .filter(|(_, ty)| matches!(ty, FeatureType::Image));
        let image_feature = match (image_features.next(), image_features.next()) {
            (Some((name, _)), None) => name,
            _ => {
                return Err(DatasetError::Publish(
                    "folder export needs exactly one image feature".to_string(),
                ))
            }
        };

        let target = self.root.join(namespace).join(name);
        if target.exists() {
            if !self.overwrite {
                return Err(DatasetError::Publish(format!(
                    "{} already exists",
                    target.display()
                )));
            }
            debug!("Replacing existing export at {:?}", target);
            fs::remove_dir_all(&target)?;
        }
        fs::create_dir_all(&target)?;

        let mut files_written = 0;
        for (split, records) in dataset.splits() {
            let dir = target.join(split.as_str());
            files_written += self.write_split(dataset, image_feature, &dir, records)?;
            info!("Wrote {} records of split '{}' to {:?}", records.len(), split, dir);
        }

        dataset.infos().save(&target.join(DatasetInfos::FILE_NAME))?;
        files_written += 1;

        Ok(PublishReceipt {
            destination: destination.to_string(),
            location: target.display().to_string(),
            files_written,
            splits: dataset.split_infos(),
        })
    }
}

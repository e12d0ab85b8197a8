use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};

use crate::core::features::{Dtype, FeatureType};
use crate::core::value::FeatureValue;
use crate::error::{DatasetError, Result};

/// File name recognized as a metadata side channel
pub const METADATA_FILE_NAME: &str = "metadata.jsonl";

/// Key every metadata row must carry
pub const FILE_NAME_KEY: &str = "file_name";

/// One parsed `metadata.jsonl` line
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    /// 1-based line number, for error messages
    pub line: usize,
    pub file_name: String,
    /// Every key except `file_name`
    pub columns: Map<String, Value>,
}

impl MetadataRow {
    /// Path of the referenced image, relative to the metadata file's directory
    pub fn resolve(&self, metadata_path: &Path) -> PathBuf {
        let dir = metadata_path.parent().unwrap_or_else(|| Path::new(""));
        normalize(&dir.join(&self.file_name))
    }

    pub fn to_fields(&self) -> BTreeMap<String, FeatureValue> {
        self.columns
            .iter()
            .map(|(k, v)| (k.clone(), FeatureValue::from_json(v)))
            .collect()
    }
}

/// Read every row of a metadata file. Blank lines are skipped; a line that is not a
/// JSON object, or has no string `file_name`, fails with its line number.
pub fn read_rows(path: &Path) -> Result<Vec<MetadataRow>> {
    let file = File::open(path)
        .map_err(|e| DatasetError::unavailable(path.display().to_string(), e))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_num = idx + 1;
        let value: Value = serde_json::from_str(&line).map_err(|e| {
            DatasetError::invalid_metadata(path, format!("invalid JSON at line {}: {}", line_num, e))
        })?;
        let Value::Object(mut columns) = value else {
            return Err(DatasetError::invalid_metadata(
                path,
                format!("line {} is not a JSON object", line_num),
            ));
        };
        let file_name = match columns.remove(FILE_NAME_KEY) {
            Some(Value::String(name)) => name,
            Some(_) => {
                return Err(DatasetError::invalid_metadata(
                    path,
                    format!("'{}' at line {} is not a string", FILE_NAME_KEY, line_num),
                ))
            }
            None => {
                return Err(DatasetError::invalid_metadata(
                    path,
                    format!("line {} has no '{}' key", line_num, FILE_NAME_KEY),
                ))
            }
        };
        rows.push(MetadataRow {
            line: line_num,
            file_name,
            columns,
        });
    }
    Ok(rows)
}

/// Infer column types across metadata files.
///
/// All rows must carry the same set of columns. A column's type comes from the first
/// row whose value is informative; columns that are null everywhere become strings.
pub fn infer_columns(files: &[(PathBuf, Vec<MetadataRow>)]) -> Result<Vec<(String, FeatureType)>> {
    let Some(first) = files.iter().flat_map(|(_, rows)| rows.iter()).next() else {
        return Ok(Vec::new());
    };
    let names: Vec<String> = first.columns.keys().cloned().collect();

    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        let mut inferred = None;
        for (path, rows) in files {
            for row in rows {
                check_same_columns(path, row, &names)?;
                if inferred.is_none() {
                    inferred = row.columns.get(name).and_then(|v| FeatureType::infer(name, v));
                }
            }
        }
        columns.push((
            name.clone(),
            inferred.unwrap_or(FeatureType::value(Dtype::String)),
        ));
    }
    Ok(columns)
}

fn check_same_columns(path: &Path, row: &MetadataRow, names: &[String]) -> Result<()> {
    let same = row.columns.len() == names.len() && names.iter().all(|n| row.columns.contains_key(n));
    if same {
        Ok(())
    } else {
        let found: Vec<&String> = row.columns.keys().collect();
        Err(DatasetError::invalid_metadata(
            path,
            format!(
                "line {} has columns {:?}, expected {:?}",
                row.line, found, names
            ),
        ))
    }
}

/// Drop `.` components so `./a.png` and `a.png` compare equal
pub fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_rows_skip_blank_lines() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"{{"file_name": "0001.png", "text": "a drawing of a green pokemon"}}"#)?;
        writeln!(file)?;
        writeln!(file, r#"{{"file_name": "./0002.png", "text": "a blue dragon"}}"#)?;

        let rows = read_rows(file.path())?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[0].columns["text"], "a drawing of a green pokemon");

        let dir = Path::new("data/train/metadata.jsonl");
        assert_eq!(rows[1].resolve(dir), PathBuf::from("data/train/0002.png"));
        Ok(())
    }

    #[test]
    fn test_missing_file_name_is_invalid() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"{{"text": "no file"}}"#)?;
        match read_rows(file.path()) {
            Err(DatasetError::InvalidMetadata { reason, .. }) => {
                assert!(reason.contains("line 1"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_inconsistent_columns_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"{{"file_name": "a.png", "text": "x"}}"#)?;
        writeln!(file, r#"{{"file_name": "b.png", "caption": "y"}}"#)?;
        let rows = read_rows(file.path())?;
        let files = vec![(file.path().to_path_buf(), rows)];
        assert!(infer_columns(&files).is_err());
        Ok(())
    }

    #[test]
    fn test_infer_uses_first_informative_row() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"{{"file_name": "a.png", "score": null, "tags": []}}"#)?;
        writeln!(file, r#"{{"file_name": "b.png", "score": 0.5, "tags": ["x"]}}"#)?;
        let rows = read_rows(file.path())?;
        let columns = infer_columns(&[(file.path().to_path_buf(), rows)])?;
        assert_eq!(
            columns,
            vec![
                ("score".to_string(), FeatureType::value(Dtype::Float64)),
                ("tags".to_string(), FeatureType::sequence(FeatureType::Text)),
            ]
        );
        Ok(())
    }
}

//! YOLO label files: `labels/<stem>.txt` next to `images/<stem>.<ext>`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::value::FeatureValue;
use crate::error::Result;

pub const IMAGES_DIR: &str = "images";
pub const LABELS_DIR: &str = "labels";

#[derive(Debug, Clone, PartialEq)]
pub struct YoloDetection {
    pub class_id: u32,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelInfo {
    pub detections: Vec<YoloDetection>,
    /// `Key: value` pairs from `#` comment lines
    pub attributes: BTreeMap<String, String>,
}

impl LabelInfo {
    /// Parse label text. Detection lines that do not have exactly five valid numbers
    /// are ignored.
    ///
    /// Comment lines look like `# Resolution: 2560x1440, Map: de_dust2`.
    pub fn parse(content: &str) -> Self {
        let mut label = LabelInfo::default();

        for line in content.lines() {
            let line = line.trim();

            if let Some(comment) = line.strip_prefix('#') {
                for part in comment.split(',') {
                    if let Some((key, value)) = part.split_once(':') {
                        label
                            .attributes
                            .insert(key.trim().to_string(), value.trim().to_string());
                    }
                }
            } else if !line.is_empty() {
                // class_id x_center y_center width height
                let values: Vec<&str> = line.split_whitespace().collect();
                if values.len() == 5 {
                    if let (Ok(class_id), Ok(x), Ok(y), Ok(w), Ok(h)) = (
                        values[0].parse::<u32>(),
                        values[1].parse::<f32>(),
                        values[2].parse::<f32>(),
                        values[3].parse::<f32>(),
                        values[4].parse::<f32>(),
                    ) {
                        label.detections.push(YoloDetection {
                            class_id,
                            x_center: x,
                            y_center: y,
                            width: w,
                            height: h,
                        });
                    }
                }
            }
        }

        label
    }

    /// The `objects` value: `{bbox: [[x_center, y_center, width, height], ...], categories: [...]}`
    pub fn to_objects(&self) -> FeatureValue {
        let bbox = self
            .detections
            .iter()
            .map(|d| {
                FeatureValue::List(
                    [d.x_center, d.y_center, d.width, d.height]
                        .iter()
                        .map(|v| FeatureValue::Float(f64::from(*v)))
                        .collect(),
                )
            })
            .collect();
        let categories = self
            .detections
            .iter()
            .map(|d| FeatureValue::Int(i64::from(d.class_id)))
            .collect();

        let mut fields = BTreeMap::new();
        fields.insert("bbox".to_string(), FeatureValue::List(bbox));
        fields.insert("categories".to_string(), FeatureValue::List(categories));
        FeatureValue::Struct(fields)
    }
}

/// Read and parse a label file
pub fn parse_label_file(label_path: &Path) -> Result<LabelInfo> {
    let content = fs::read_to_string(label_path)?;
    Ok(LabelInfo::parse(&content))
}

/// `<split>/images/a/b.jpg` → `<split>/labels/a/b.txt`
pub fn label_path_for_image(split_root: &Path, image_path: &Path) -> Option<PathBuf> {
    let relative = image_path.strip_prefix(split_root.join(IMAGES_DIR)).ok()?;
    Some(split_root.join(LABELS_DIR).join(relative).with_extension("txt"))
}

/// True when a split directory follows the `images/` + `labels/` layout
pub fn is_yolo_split(split_root: &Path) -> bool {
    split_root.join(IMAGES_DIR).is_dir() && split_root.join(LABELS_DIR).is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detections_and_attributes() {
        let label = LabelInfo::parse(
            "# Resolution: 2560x1440, Map: de_dust2, Time: 1764637338\n\
             0 0.5 0.5 0.1 0.2\n\
             1 0.25 0.75 0.05 0.1\n",
        );
        assert_eq!(label.detections.len(), 2);
        assert_eq!(label.detections[1].class_id, 1);
        assert_eq!(label.attributes["Map"], "de_dust2");
        assert_eq!(label.attributes["Resolution"], "2560x1440");
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let label = LabelInfo::parse("0 0.5 0.5 0.1\nx 0.5 0.5 0.1 0.1\n2 0.1 0.1 0.1 0.1\n");
        assert_eq!(label.detections.len(), 1);
        assert_eq!(label.detections[0].class_id, 2);
    }

    #[test]
    fn test_objects_shape() {
        let label = LabelInfo::parse("3 0.5 0.25 0.5 0.125\n");
        let objects = label.to_objects();
        let fields = objects.as_struct().unwrap();
        assert_eq!(
            fields["bbox"],
            FeatureValue::List(vec![FeatureValue::List(vec![
                FeatureValue::Float(0.5),
                FeatureValue::Float(0.25),
                FeatureValue::Float(0.5),
                FeatureValue::Float(0.125),
            ])])
        );
        assert_eq!(fields["categories"], FeatureValue::List(vec![FeatureValue::Int(3)]));
    }

    #[test]
    fn test_label_path_for_image() {
        let root = Path::new("data/train");
        let image = root.join("images/sub/frame_01.png");
        assert_eq!(
            label_path_for_image(root, &image),
            Some(PathBuf::from("data/train/labels/sub/frame_01.txt"))
        );
        assert_eq!(label_path_for_image(root, Path::new("other/x.png")), None);
    }
}

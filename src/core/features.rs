//! Feature schema: the declared shape every record of a dataset must have.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::Record;
use super::value::FeatureValue;

/// Scalar types for `FeatureType::Value`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Bool,
    Int64,
    Float64,
    String,
}

/// Semantic type of a single feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureType {
    /// Encoded image, as a path and/or bytes
    Image,
    /// Integer index into a fixed list of class names
    ClassLabel { names: Vec<String> },
    Value { dtype: Dtype },
    /// Free text, e.g. a caption
    Text,
    /// Sequence of boxes, each exactly four numbers
    BoundingBoxes,
    Sequence { feature: Box<FeatureType> },
    Struct { fields: Vec<(String, FeatureType)> },
}

impl FeatureType {
    pub fn value(dtype: Dtype) -> Self {
        FeatureType::Value { dtype }
    }

    pub fn sequence(inner: FeatureType) -> Self {
        FeatureType::Sequence {
            feature: Box::new(inner),
        }
    }

    /// The `objects` layout used for object detection: `{bbox, categories}`
    pub fn detection_objects() -> Self {
        FeatureType::Struct {
            fields: vec![
                ("bbox".to_string(), FeatureType::BoundingBoxes),
                (
                    "categories".to_string(),
                    FeatureType::sequence(FeatureType::value(Dtype::Int64)),
                ),
            ],
        }
    }

    /// Infer a type from a JSON sample. Returns `None` when the sample carries no
    /// type information (null, or an empty array).
    pub fn infer(name: &str, sample: &Value) -> Option<FeatureType> {
        match sample {
            Value::Null => None,
            Value::Bool(_) => Some(FeatureType::value(Dtype::Bool)),
            // Integers beyond i64 are read as floats
            Value::Number(n) if n.is_i64() => Some(FeatureType::value(Dtype::Int64)),
            Value::Number(_) => Some(FeatureType::value(Dtype::Float64)),
            Value::String(_) => Some(FeatureType::Text),
            Value::Array(items) => {
                if is_box_name(name) && items.iter().all(is_box) {
                    return Some(FeatureType::BoundingBoxes);
                }
                let inner = items.iter().find_map(|item| Self::infer(name, item))?;
                Some(FeatureType::sequence(inner))
            }
            Value::Object(map) => {
                let mut fields = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let ty = Self::infer(key, value).or_else(|| {
                        if key == "categories" {
                            Some(FeatureType::sequence(FeatureType::value(Dtype::Int64)))
                        } else if is_box_name(key) && value.is_array() {
                            Some(FeatureType::BoundingBoxes)
                        } else {
                            None
                        }
                    })?;
                    fields.push((key.clone(), ty));
                }
                Some(FeatureType::Struct { fields })
            }
        }
    }

    /// Check a value against this type. The error names the offending path.
    pub fn check(&self, value: &FeatureValue) -> Result<(), String> {
        self.check_at("", value)
    }

    fn check_at(&self, at: &str, value: &FeatureValue) -> Result<(), String> {
        let mismatch = || {
            Err(format!(
                "{}expected {}, found {}",
                location(at),
                self.describe(),
                value.type_name()
            ))
        };
        match (self, value) {
            (FeatureType::Image, FeatureValue::Image(img)) => {
                if img.has_content() {
                    Ok(())
                } else {
                    Err(format!("{}image has neither path nor bytes", location(at)))
                }
            }
            (FeatureType::ClassLabel { names }, FeatureValue::ClassLabel(idx)) => {
                if *idx >= 0 && (*idx as usize) < names.len() {
                    Ok(())
                } else {
                    Err(format!(
                        "{}class index {} out of range for {} names",
                        location(at),
                        idx,
                        names.len()
                    ))
                }
            }
            // Scalars are nullable
            (FeatureType::Value { .. } | FeatureType::Text, FeatureValue::Null) => Ok(()),
            (FeatureType::Value { dtype: Dtype::Bool }, FeatureValue::Bool(_)) => Ok(()),
            (FeatureType::Value { dtype: Dtype::Int64 }, FeatureValue::Int(_)) => Ok(()),
            (
                FeatureType::Value {
                    dtype: Dtype::Float64,
                },
                FeatureValue::Float(_) | FeatureValue::Int(_),
            ) => Ok(()),
            (
                FeatureType::Value {
                    dtype: Dtype::String,
                }
                | FeatureType::Text,
                FeatureValue::Text(_),
            ) => Ok(()),
            (FeatureType::BoundingBoxes, FeatureValue::List(boxes)) => {
                for (i, b) in boxes.iter().enumerate() {
                    let coords = b.as_list().unwrap_or(&[]);
                    if coords.len() != 4 || coords.iter().any(|c| c.as_f64().is_none()) {
                        return Err(format!(
                            "{}box {} must be 4 numbers",
                            location(at),
                            i
                        ));
                    }
                }
                Ok(())
            }
            (FeatureType::Sequence { feature }, FeatureValue::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    feature.check_at(&format!("{}[{}]", at, i), item)?;
                }
                Ok(())
            }
            (FeatureType::Struct { fields }, FeatureValue::Struct(map)) => {
                for (name, ty) in fields {
                    let child = join(at, name);
                    match map.get(name) {
                        Some(v) => ty.check_at(&child, v)?,
                        None => return Err(format!("missing field '{}'", child)),
                    }
                }
                if let Some(extra) = map.keys().find(|k| !fields.iter().any(|(n, _)| n == *k)) {
                    return Err(format!("unexpected field '{}'", join(at, extra)));
                }
                Ok(())
            }
            _ => mismatch(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FeatureType::Image => "image",
            FeatureType::ClassLabel { .. } => "class_label",
            FeatureType::Value { dtype: Dtype::Bool } => "bool",
            FeatureType::Value { dtype: Dtype::Int64 } => "int64",
            FeatureType::Value {
                dtype: Dtype::Float64,
            } => "float64",
            FeatureType::Value {
                dtype: Dtype::String,
            } => "string",
            FeatureType::Text => "text",
            FeatureType::BoundingBoxes => "bounding boxes",
            FeatureType::Sequence { .. } => "sequence",
            FeatureType::Struct { .. } => "struct",
        }
    }
}

fn is_box_name(name: &str) -> bool {
    matches!(name, "bbox" | "bboxes" | "boxes")
}

fn is_box(value: &Value) -> bool {
    value
        .as_array()
        .map(|coords| coords.len() == 4 && coords.iter().all(Value::is_number))
        .unwrap_or(false)
}

fn join(at: &str, name: &str) -> String {
    if at.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", at, name)
    }
}

fn location(at: &str) -> String {
    if at.is_empty() {
        String::new()
    } else {
        format!("'{}': ", at)
    }
}

/// Ordered mapping from feature name to type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features {
    fields: Vec<(String, FeatureType)>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feature, replacing an existing one with the same name in place
    pub fn with(mut self, name: impl Into<String>, ty: FeatureType) -> Self {
        self.insert(name, ty);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: FeatureType) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = ty,
            None => self.fields.push((name, ty)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FeatureType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureType)> {
        self.fields.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that a record has exactly these features, each with a matching value
    pub fn check(&self, record: &Record) -> Result<(), String> {
        for (name, ty) in &self.fields {
            match record.get(name) {
                Some(value) => ty
                    .check(value)
                    .map_err(|e| format!("field '{}': {}", name, e))?,
                None => return Err(format!("missing field '{}'", name)),
            }
        }
        if let Some(extra) = record.field_names().find(|n| !self.contains(n)) {
            return Err(format!("unexpected field '{}'", extra));
        }
        Ok(())
    }
}

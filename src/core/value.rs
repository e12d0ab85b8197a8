use image::{DynamicImage, ImageFormat};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{DatasetError, Result};

/// An image carried by a record, either as a path on disk, raw encoded bytes, or both.
///
/// Archive entries carry the entry path together with the bytes read from the stream,
/// folder images carry the file path together with the bytes read at generation time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageData {
    pub path: Option<String>,
    pub bytes: Option<Vec<u8>>,
}

impl ImageData {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            bytes: None,
        }
    }

    pub fn from_bytes(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: Some(path.into()),
            bytes: Some(bytes),
        }
    }

    /// True when the image can be materialized from either its bytes or its path
    pub fn has_content(&self) -> bool {
        self.bytes.is_some() || self.path.is_some()
    }

    /// Encoded image bytes, reading the file when only a path is known
    pub fn load_bytes(&self) -> Result<Cow<'_, [u8]>> {
        if let Some(bytes) = &self.bytes {
            return Ok(Cow::Borrowed(bytes));
        }
        match &self.path {
            Some(path) => Ok(Cow::Owned(fs::read(path)?)),
            None => Err(DatasetError::unavailable("<image>", "image has neither bytes nor path")),
        }
    }

    /// Guess the encoding from the bytes, falling back to the path extension
    pub fn format(&self) -> Option<ImageFormat> {
        self.bytes
            .as_deref()
            .and_then(|b| image::guess_format(b).ok())
            .or_else(|| {
                self.path
                    .as_deref()
                    .and_then(|p| ImageFormat::from_path(p).ok())
            })
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        let bytes = self.load_bytes()?;
        Ok(image::load_from_memory(&bytes)?)
    }

    /// Base file name of the image path, if any
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .and_then(|n| n.to_str())
    }
}

/// A single field value inside a record
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Image(ImageData),
    /// Index into the class names of a `ClassLabel` feature
    ClassLabel(i64),
    List(Vec<FeatureValue>),
    Struct(BTreeMap<String, FeatureValue>),
}

impl FeatureValue {
    /// Convert a JSON value from a metadata row. Numbers keep their integer-ness.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FeatureValue::Null,
            Value::Bool(b) => FeatureValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FeatureValue::Int(i),
                None => FeatureValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FeatureValue::Text(s.clone()),
            Value::Array(items) => FeatureValue::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => FeatureValue::Struct(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to JSON. Images become `{"path": ...}`; bytes are not inlined.
    pub fn to_json(&self) -> Value {
        match self {
            FeatureValue::Null => Value::Null,
            FeatureValue::Bool(b) => Value::Bool(*b),
            FeatureValue::Int(i) | FeatureValue::ClassLabel(i) => Value::from(*i),
            FeatureValue::Float(f) => Value::from(*f),
            FeatureValue::Text(s) => Value::String(s.clone()),
            FeatureValue::Image(img) => serde_json::json!({ "path": img.path }),
            FeatureValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            FeatureValue::Struct(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureValue::Null => "null",
            FeatureValue::Bool(_) => "bool",
            FeatureValue::Int(_) => "int",
            FeatureValue::Float(_) => "float",
            FeatureValue::Text(_) => "text",
            FeatureValue::Image(_) => "image",
            FeatureValue::ClassLabel(_) => "class_label",
            FeatureValue::List(_) => "list",
            FeatureValue::Struct(_) => "struct",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FeatureValue::Int(i) | FeatureValue::ClassLabel(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Float(f) => Some(*f),
            FeatureValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            FeatureValue::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FeatureValue]> {
        match self {
            FeatureValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, FeatureValue>> {
        match self {
            FeatureValue::Struct(map) => Some(map),
            _ => None,
        }
    }
}

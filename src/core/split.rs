use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::error::{DatasetError, Result};

/// A named partition of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Split {
    Train,
    Validation,
    Test,
    Named(String),
}

impl Split {
    pub fn as_str(&self) -> &str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
            Split::Named(name) => name,
        }
    }

    /// Map a directory name to a canonical split, accepting the usual aliases.
    /// Returns `None` for names that do not look like a split.
    pub fn from_dir_name(name: &str) -> Option<Split> {
        match name.to_lowercase().as_str() {
            "train" | "training" => Some(Split::Train),
            "validation" | "valid" | "val" | "dev" => Some(Split::Validation),
            "test" | "testing" | "eval" | "evaluation" => Some(Split::Test),
            _ => None,
        }
    }

    /// Canonical split for known names and aliases, `Named` otherwise
    pub fn parse(name: &str) -> Split {
        Self::from_dir_name(name).unwrap_or_else(|| Split::Named(name.to_string()))
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Split::parse(s))
    }
}

impl Serialize for Split {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Split {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Split::parse(&name))
    }
}

/// Recipe for one split: its name and the arguments its generator is called with.
///
/// `A` is the builder's own argument type, so arguments always match the generator.
#[derive(Debug, Clone)]
pub struct SplitGenerator<A> {
    pub split: Split,
    pub args: A,
}

impl<A> SplitGenerator<A> {
    pub fn new(split: Split, args: A) -> Self {
        Self { split, args }
    }
}

/// Ordered split generators with unique split names
#[derive(Debug, Clone)]
pub struct SplitPlan<A> {
    generators: Vec<SplitGenerator<A>>,
}

impl<A> SplitPlan<A> {
    pub fn new(generators: Vec<SplitGenerator<A>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for generator in &generators {
            if !seen.insert(&generator.split) {
                return Err(DatasetError::DuplicateSplit(generator.split.to_string()));
            }
        }
        Ok(Self { generators })
    }

    pub fn get(&self, split: &Split) -> Option<&SplitGenerator<A>> {
        self.generators.iter().find(|g| &g.split == split)
    }

    pub fn splits(&self) -> impl Iterator<Item = &Split> {
        self.generators.iter().map(|g| &g.split)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SplitGenerator<A>> {
        self.generators.iter()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl<'a, A> IntoIterator for &'a SplitPlan<A> {
    type Item = &'a SplitGenerator<A>;
    type IntoIter = std::slice::Iter<'a, SplitGenerator<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_map_to_canonical_splits() {
        assert_eq!(Split::from_dir_name("val"), Some(Split::Validation));
        assert_eq!(Split::from_dir_name("Valid"), Some(Split::Validation));
        assert_eq!(Split::from_dir_name("testing"), Some(Split::Test));
        assert_eq!(Split::from_dir_name("cats"), None);
        assert_eq!(Split::parse("extra"), Split::Named("extra".into()));
    }

    #[test]
    fn test_split_serializes_as_name() {
        let json = serde_json::to_string(&Split::Validation).unwrap();
        assert_eq!(json, "\"validation\"");
        let back: Split = serde_json::from_str("\"dev\"").unwrap();
        assert_eq!(back, Split::Validation);
    }

    #[test]
    fn test_plan_rejects_duplicate_split_names() {
        let plan = SplitPlan::new(vec![
            SplitGenerator::new(Split::Train, 1),
            SplitGenerator::new(Split::parse("training"), 2),
        ]);
        assert!(matches!(plan, Err(DatasetError::DuplicateSplit(name)) if name == "train"));
    }

    #[test]
    fn test_plan_keeps_declared_order() {
        let plan = SplitPlan::new(vec![
            SplitGenerator::new(Split::Test, "t"),
            SplitGenerator::new(Split::Train, "tr"),
        ])
        .unwrap();
        let names: Vec<_> = plan.splits().map(Split::as_str).collect();
        assert_eq!(names, vec!["test", "train"]);
        assert_eq!(plan.get(&Split::Train).unwrap().args, "tr");
    }
}

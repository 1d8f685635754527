//! Ordered channel labels of one sample.

use crate::error::{Result, TransformError};
use rustc_hash::FxHashMap;

/// Substrings marking scatter and time channels, which are never fluorescence.
const NON_FLUORO_MARKERS: [&str; 3] = ["FSC", "SSC", "TIME"];

/// Maps channel labels to column indices of a sample's event matrix and
/// records which columns carry fluorescence.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelMap {
    labels: Vec<String>,
    index: FxHashMap<String, usize>,
    fluoro: Vec<bool>,
}

impl ChannelMap {
    /// Build a map from an ordered label list, guessing fluorescence
    /// channels from their names.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let mut index =
            FxHashMap::with_capacity_and_hasher(labels.len(), Default::default());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(TransformError::DuplicateChannel {
                    channel: label.clone(),
                });
            }
        }
        let fluoro = labels
            .iter()
            .map(|label| {
                let upper = label.to_uppercase();
                !NON_FLUORO_MARKERS.iter().any(|m| upper.contains(m))
            })
            .collect();
        Ok(Self {
            labels,
            index,
            fluoro,
        })
    }

    /// Replace the guessed fluorescence flags with an explicit index list.
    pub fn with_fluoro_indices(mut self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.labels.len()) {
            return Err(TransformError::shape_mismatch(format!(
                "fluorescence index {bad} is out of range for {} channels",
                self.labels.len()
            )));
        }
        self.fluoro = vec![false; self.labels.len()];
        for &i in indices {
            self.fluoro[i] = true;
        }
        Ok(self)
    }

    /// Same as [`with_fluoro_indices`](Self::with_fluoro_indices), by label.
    pub fn with_fluoro_labels<S: AsRef<str>>(self, labels: &[S]) -> Result<Self> {
        let indices = labels
            .iter()
            .map(|l| self.resolve(l.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.with_fluoro_indices(&indices)
    }

    pub fn resolve(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| TransformError::unknown_channel(label))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn is_fluoro(&self, index: usize) -> bool {
        self.fluoro.get(index).copied().unwrap_or(false)
    }

    pub fn fluoro_labels(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .zip(&self.fluoro)
            .filter(|(_, f)| **f)
            .map(|(l, _)| l.as_str())
    }
}

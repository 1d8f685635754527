use crate::dimension::Dimension;
use crate::error::Result;
use ndarray::Array1;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Extracted columns of one sample, keyed by the full dimension
/// (channel, compensation and transform).
///
/// Gates sharing a dimension reuse one compensated, transformed column.
/// A disabled cache extracts on every request.
#[derive(Debug, Default)]
pub struct DimensionCache {
    enabled: bool,
    columns: FxHashMap<Dimension, Arc<Array1<f64>>>,
    hits: usize,
}

impl DimensionCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Cached column for `dimension`, extracting it with `extract` on a miss
    pub fn get_or_extract<F>(&mut self, dimension: &Dimension, extract: F) -> Result<Arc<Array1<f64>>>
    where
        F: FnOnce() -> Result<Array1<f64>>,
    {
        if !self.enabled {
            return extract().map(Arc::new);
        }
        if let Some(column) = self.columns.get(dimension) {
            self.hits += 1;
            return Ok(Arc::clone(column));
        }
        let column = Arc::new(extract()?);
        self.columns.insert(dimension.clone(), Arc::clone(&column));
        Ok(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_reuses_identical_dimension() {
        let mut cache = DimensionCache::new(true);
        let dim = Dimension::new("FL1").with_transform("logicle");
        let mut calls = 0;
        for _ in 0..3 {
            cache
                .get_or_extract(&dim, || {
                    calls += 1;
                    Ok(array![1.0, 2.0])
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.hits(), 2);

        // a different transform is a different column
        cache
            .get_or_extract(&Dimension::new("FL1"), || Ok(array![0.0, 0.0]))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_disabled_cache_always_extracts() {
        let mut cache = DimensionCache::new(false);
        let dim = Dimension::new("FL1");
        let mut calls = 0;
        for _ in 0..2 {
            cache
                .get_or_extract(&dim, || {
                    calls += 1;
                    Ok(array![1.0])
                })
                .unwrap();
        }
        assert_eq!(calls, 2);
        assert!(cache.is_empty());
    }
}

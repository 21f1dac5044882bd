//! Content-addressed memoization of pipeline runs.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::ColumnMapping;
use crate::error::Result;
use crate::model::ClassifiedDataset;
use crate::pipeline::process_source;
use crate::source::SourceFile;

/// SHA-256 over the file contents and the column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn new(contents: &[u8], mapping: &ColumnMapping) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(contents);
        // Length-prefix each field so ("ab","c") and ("a","bc") differ.
        for (source, target) in mapping.iter() {
            for field in [source, target] {
                hasher.update((field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
        }
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Memoizes classified datasets per (file contents, mapping).
///
/// Entries are immutable `Arc`s; failed loads are not cached.
#[derive(Default)]
pub struct DatasetCache {
    entries: RwLock<HashMap<CacheKey, Arc<ClassifiedDataset>>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached dataset for this file and mapping, running the
    /// pipeline on a miss.
    pub fn get_or_load(
        &self,
        path: impl AsRef<Path>,
        mapping: &ColumnMapping,
    ) -> Result<Arc<ClassifiedDataset>> {
        let source = SourceFile::read(path)?;
        self.get_or_process(&source, mapping)
    }

    pub fn get_or_process(
        &self,
        source: &SourceFile,
        mapping: &ColumnMapping,
    ) -> Result<Arc<ClassifiedDataset>> {
        let key = CacheKey::new(source.bytes(), mapping);

        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            debug!(%key, "Dataset cache hit");
            return Ok(Arc::clone(hit));
        }

        debug!(%key, "Dataset cache miss");
        let dataset = Arc::new(process_source(source, mapping)?);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have filled the slot meanwhile; keep the first one.
        let entry = entries.entry(key).or_insert(dataset);
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IgacError;

    const CSV: &str = "FECHA_RADICA_TEXTO;VALOR\n01/02/2023;0\n02/02/2023;10,00\n";

    fn source(text: &str) -> SourceFile {
        SourceFile::from_bytes("mem.csv", text.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn key_depends_on_contents_and_mapping() {
        let mapping = ColumnMapping::default();
        let key = CacheKey::new(CSV.as_bytes(), &mapping);

        assert_eq!(key, CacheKey::new(CSV.as_bytes(), &mapping));
        assert_ne!(key, CacheKey::new(b"other", &mapping));
        assert_ne!(
            key,
            CacheKey::new(CSV.as_bytes(), &ColumnMapping::new([("A", "fecha_transaccion")]))
        );
        assert_eq!(key.to_string().len(), 64);
    }

    #[test]
    fn key_separates_mapping_fields() {
        let a = ColumnMapping::new([("ab", "c")]);
        let b = ColumnMapping::new([("a", "bc")]);
        assert_ne!(CacheKey::new(b"", &a), CacheKey::new(b"", &b));
    }

    #[test]
    fn identical_inputs_share_one_dataset() {
        let cache = DatasetCache::new();
        let mapping = ColumnMapping::default();

        let first = cache.get_or_process(&source(CSV), &mapping).unwrap();
        let second = cache.get_or_process(&source(CSV), &mapping).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn changed_contents_miss_the_cache() {
        let cache = DatasetCache::new();
        let mapping = ColumnMapping::default();

        cache.get_or_process(&source(CSV), &mapping).unwrap();
        let changed = format!("{CSV}03/02/2023;5,00\n");
        let dataset = cache.get_or_process(&source(&changed), &mapping).unwrap();

        assert_eq!(dataset.all().height(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let cache = DatasetCache::new();
        let err = cache
            .get_or_process(&source("MUNICIPIO\nCALI\n"), &ColumnMapping::default())
            .unwrap_err();

        assert!(matches!(err, IgacError::MissingDateColumn(_)));
        assert!(cache.is_empty());
    }
}

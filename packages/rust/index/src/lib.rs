//! Exact nearest-neighbour vector index.
//!
//! [`VectorIndex`] keeps fixed-dimension embeddings in insertion order next to
//! their document text and metadata. Search is a brute-force scan ranked by
//! squared L2 distance (lower = more similar). A record's identity is its
//! insertion position; the index never reorders or deduplicates.
//!
//! See [`persist`] for the on-disk format used by [`VectorIndex::save`] and
//! [`VectorIndex::load`].

pub mod persist;

use serde::Serialize;
use tracing::{debug, info};

use searchlight_shared::{DocumentMetadata, Embedding, Result, SearchlightError};

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Stored document text.
    pub text: String,
    /// Stored document metadata.
    pub metadata: DocumentMetadata,
    /// Squared L2 distance to the query (lower = more similar).
    pub similarity_score: f32,
    /// 1-based rank within this result set.
    pub rank: usize,
    /// Insertion position of the record.
    pub position: usize,
}

/// A stored document without its vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub dimension: usize,
    pub has_data: bool,
}

/// Brute-force exact L2 index over `dimension`-length vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    /// Row-major: record `i` occupies `vectors[i * dimension..(i + 1) * dimension]`.
    vectors: Vec<f32>,
    documents: Vec<String>,
    metadata: Vec<DocumentMetadata>,
}

impl VectorIndex {
    /// Create an empty index accepting vectors of length `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            documents: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Append records in input order.
    ///
    /// All three lists must have equal length and every vector must have the
    /// index dimension. Validation happens before any mutation, so a failed
    /// call leaves the index unchanged.
    pub fn add(
        &mut self,
        texts: &[String],
        vectors: &[Embedding],
        metadata: &[DocumentMetadata],
    ) -> Result<()> {
        if texts.len() != vectors.len() || texts.len() != metadata.len() {
            return Err(SearchlightError::LengthMismatch {
                texts: texts.len(),
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(SearchlightError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        if texts.is_empty() {
            debug!("add called with no records");
            return Ok(());
        }

        self.vectors.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.vectors.extend_from_slice(v);
        }
        self.documents.extend_from_slice(texts);
        self.metadata.extend_from_slice(metadata);

        info!(
            added = texts.len(),
            total = self.documents.len(),
            "added documents to vector index"
        );
        Ok(())
    }

    /// Return up to `min(k, len)` nearest records, closest first.
    ///
    /// Ties keep insertion order. With `threshold > 0`, records farther than
    /// `threshold` are dropped, which may shorten the result.
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Result<Vec<SearchHit>> {
        self.check_dimension(query.len())?;

        let mut ranked = self.ranked(query);
        ranked.truncate(k);

        let hits: Vec<SearchHit> = ranked
            .into_iter()
            .filter(|&(_, distance)| threshold <= 0.0 || distance <= threshold)
            .enumerate()
            .map(|(i, (position, distance))| self.hit(position, distance, i + 1))
            .collect();

        debug!(k, threshold, found = hits.len(), "vector search complete");
        Ok(hits)
    }

    /// Nearest-first search keeping only records whose metadata matches `filter`.
    pub fn search_filtered<F>(&self, query: &[f32], k: usize, filter: F) -> Result<Vec<SearchHit>>
    where
        F: Fn(&DocumentMetadata) -> bool,
    {
        self.check_dimension(query.len())?;

        let hits: Vec<SearchHit> = self
            .ranked(query)
            .into_iter()
            .filter(|&(position, _)| filter(&self.metadata[position]))
            .take(k)
            .enumerate()
            .map(|(i, (position, distance))| self.hit(position, distance, i + 1))
            .collect();

        debug!(k, found = hits.len(), candidates = self.len(), "filtered vector search complete");
        Ok(hits)
    }

    /// All stored documents in insertion order.
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.documents
            .iter()
            .zip(&self.metadata)
            .map(|(text, metadata)| StoredDocument {
                text: text.clone(),
                metadata: metadata.clone(),
            })
            .collect()
    }

    /// Drop every record; the dimension is kept.
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.documents.clear();
        self.metadata.clear();
        debug!(dimension = self.dimension, "cleared vector index");
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            document_count: self.len(),
            dimension: self.dimension,
            has_data: !self.is_empty(),
        }
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(SearchlightError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Every record as `(position, distance)`, ascending by distance.
    fn ranked(&self, query: &[f32]) -> Vec<(usize, f32)> {
        if self.dimension == 0 {
            return (0..self.len()).map(|i| (i, 0.0)).collect();
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|row| squared_l2(row, query))
            .enumerate()
            .collect();

        // Stable sort: equal distances stay in insertion order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored
    }

    fn hit(&self, position: usize, distance: f32, rank: usize) -> SearchHit {
        SearchHit {
            text: self.documents[position].clone(),
            metadata: self.metadata[position].clone(),
            similarity_score: distance,
            rank,
            position,
        }
    }
}

/// Squared Euclidean distance.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

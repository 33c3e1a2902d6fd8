//! Brute-force nearest-neighbor search over fixed-length vectors.
//!
//! The only embedder shipped is [`ByteEmbedder`], a deliberate placeholder
//! with no semantic content: it copies raw byte values into the vector, so
//! only texts sharing a byte prefix land near each other. The [`Embedder`]
//! trait is the substitution point for a real text-embedding model; the
//! index and everything above it are indifferent to the swap.

pub const EMBEDDING_DIM: usize = 384;

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Maps a string to a fixed-length vector by copying its UTF-8 byte values
/// into the leading positions, zero-padding the remainder and truncating
/// any excess.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteEmbedder;

impl Embedder for ByteEmbedder {
    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        for (slot, byte) in vector.iter_mut().zip(text.bytes()) {
            *slot = byte as f32;
        }
        vector
    }
}

/// Euclidean distance. Both vectors must share a length; the index only
/// ever compares vectors it produced itself.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Flat index: one vector per entry, scanned in full on every query.
pub struct VectorIndex {
    embedder: Box<dyn Embedder>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn build(embedder: Box<dyn Embedder>, texts: &[String]) -> Self {
        let vectors = texts.iter().map(|t| embedder.embed(t)).collect();
        Self { embedder, vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The `k` nearest entries as `(entry_index, distance)`, ascending by
    /// distance.
    pub fn query(&self, text: &str, k: usize) -> Vec<(usize, f32)> {
        let needle = self.embedder.embed(text);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, l2_distance(&needle, v)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_embedding_pads_and_truncates() {
        let embedder = ByteEmbedder;
        let short = embedder.embed("ab");
        assert_eq!(short.len(), EMBEDDING_DIM);
        assert_eq!(short[0], b'a' as f32);
        assert_eq!(short[1], b'b' as f32);
        assert_eq!(short[2], 0.0);

        let long = embedder.embed(&"z".repeat(EMBEDDING_DIM * 2));
        assert_eq!(long.len(), EMBEDDING_DIM);
        assert!(long.iter().all(|&v| v == b'z' as f32));
    }

    #[test]
    fn identical_text_is_nearest_at_distance_zero() {
        let texts = vec![
            "alpha section of the document".to_string(),
            "beta section of the document".to_string(),
            "gamma section of the document".to_string(),
        ];
        let index = VectorIndex::build(Box::new(ByteEmbedder), &texts);
        let hits = index.query("beta section of the document", 2);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[0].1, 0.0);
    }

    #[test]
    fn query_orders_by_ascending_distance() {
        let texts = vec!["aaaa".to_string(), "aaab".to_string(), "zzzz".to_string()];
        let index = VectorIndex::build(Box::new(ByteEmbedder), &texts);
        let hits = index.query("aaaa", 3);
        let ids: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
        assert_eq!(ids, [0, 1, 2]);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let texts = vec!["one".to_string(), "two".to_string()];
        let index = VectorIndex::build(Box::new(ByteEmbedder), &texts);
        assert_eq!(index.query("one", 10).len(), 2);
    }
}

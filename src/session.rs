//! Session-scoped upload state.
//!
//! Retrieval context lives only as long as the session: each upload batch
//! replaces the previous one wholesale and nothing here is persisted. All
//! durable state belongs to the [`crate::db::Store`]; this map is the one
//! place ephemeral per-user state is allowed to live.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::extract::{chunk_text, extract_or_placeholder, TextChunk, CHUNK_SIZE};
use crate::index::{ByteEmbedder, VectorIndex};

#[derive(Debug, Clone, Serialize)]
pub struct UploadedDocument {
    pub filename: String,
    pub kind: &'static str,
    pub chars: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub documents: Vec<UploadedDocument>,
    pub chunks: usize,
}

struct DocumentBatch {
    chunks: Vec<TextChunk>,
    index: VectorIndex,
}

/// Per-user document batches keyed by the user label.
#[derive(Default)]
pub struct Sessions {
    batches: Mutex<HashMap<String, DocumentBatch>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts, chunks, and indexes an upload batch, replacing whatever
    /// the user had before. A file that cannot be read contributes its
    /// placeholder text rather than failing the batch.
    pub fn ingest(&self, user: &str, files: &[(String, Vec<u8>)]) -> IngestSummary {
        let mut documents = Vec::with_capacity(files.len());
        let mut chunks: Vec<TextChunk> = Vec::new();

        for (filename, bytes) in files {
            let extracted = extract_or_placeholder(filename, bytes);
            documents.push(UploadedDocument {
                filename: filename.clone(),
                kind: extracted.kind,
                chars: extracted.text.chars().count(),
            });
            for chunk in chunk_text(&extracted.text, CHUNK_SIZE) {
                chunks.push(TextChunk {
                    index: chunks.len(),
                    ..chunk
                });
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let index = VectorIndex::build(Box::new(ByteEmbedder), &texts);
        let summary = IngestSummary {
            documents,
            chunks: chunks.len(),
        };

        tracing::info!(
            user,
            documents = summary.documents.len(),
            chunks = summary.chunks,
            "ingested upload batch"
        );

        self.batches
            .lock()
            .unwrap()
            .insert(user.to_string(), DocumentBatch { chunks, index });
        summary
    }

    /// The `k` nearest chunk texts for the query, nearest first. Empty when
    /// the user has no active batch.
    pub fn retrieve(&self, user: &str, query: &str, k: usize) -> Vec<String> {
        let batches = self.batches.lock().unwrap();
        let Some(batch) = batches.get(user) else {
            return Vec::new();
        };
        batch
            .index
            .query(query, k)
            .into_iter()
            .map(|(i, _)| batch.chunks[i].text.clone())
            .collect()
    }

    pub fn clear(&self, user: &str) {
        self.batches.lock().unwrap().remove(user);
    }
}

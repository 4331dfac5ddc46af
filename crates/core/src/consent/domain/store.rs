use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::record::ConsentRecord;

/// Immutable view of the consent set. The video stage takes one per frame
/// and matches every detected face against it without holding any lock.
pub type ConsentSnapshot = Arc<HashMap<PathBuf, ConsentRecord>>;

/// Copy-on-write store of consent records, keyed by capture file path.
///
/// One record per capture file: a person who consented twice has two
/// records, and deleting one capture file revokes only that record while
/// the other keeps them consented. Writers (the consent watcher and the
/// transcription workers) clone the map, mutate the clone and swap it in;
/// readers only ever clone the Arc. A frame is therefore matched against
/// one coherent consent set even while grants and revocations land
/// mid-stream.
#[derive(Default)]
pub struct ConsentStore {
    current: Mutex<ConsentSnapshot>,
}

impl ConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ConsentSnapshot {
        Arc::clone(&self.current.lock().expect("consent lock poisoned"))
    }

    /// Inserts the record under its capture file path. A second grant for
    /// the same name is a separate record; re-reading the same file
    /// replaces in place.
    pub fn insert(&self, record: ConsentRecord) {
        let mut guard = self.current.lock().expect("consent lock poisoned");
        let mut next: HashMap<PathBuf, ConsentRecord> = (**guard).clone();
        log::info!("Consent granted: {}", record.name);
        next.insert(record.source.clone(), record);
        *guard = Arc::new(next);
    }

    /// Revokes the record whose capture file was deleted. Other records
    /// for the same person are untouched.
    pub fn remove_by_source(&self, source: &Path) -> Option<String> {
        let mut guard = self.current.lock().expect("consent lock poisoned");
        if !guard.contains_key(source) {
            return None;
        }
        let mut next: HashMap<PathBuf, ConsentRecord> = (**guard).clone();
        let removed = next.remove(source)?;
        *guard = Arc::new(next);
        log::info!("Consent revoked: {}", removed.name);
        Some(removed.name)
    }

    pub fn len(&self) -> usize {
        self.current.lock().expect("consent lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine distance between two L2-normalized embeddings. 0 is identical,
/// 2 is opposite.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    1.0 - dot
}

/// Finds the consented identity closest to `embedding`. Only matches at or
/// below `threshold` count; among those the lowest distance wins.
pub fn best_match<'a>(
    snapshot: &'a ConsentSnapshot,
    embedding: &[f32],
    threshold: f32,
) -> Option<(&'a str, f32)> {
    let mut best: Option<(&str, f32)> = None;
    for record in snapshot.values() {
        if record.embedding.len() != embedding.len() {
            continue;
        }
        let distance = cosine_distance(&record.embedding, embedding);
        if distance <= threshold && best.map_or(true, |(_, d)| distance < d) {
            best = Some((record.name.as_str(), distance));
        }
    }
    best
}

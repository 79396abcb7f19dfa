//! In-memory reference vector store.
//!
//! State is copy-on-write: readers clone an `Arc<StoreState>` and never
//! block writers. Writes serialize on an async mutex, stage changes on a
//! private copy and publish it with a single assignment, so a rejected or
//! cancelled batch leaves nothing behind.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use rayon::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, info};
use ulid::Ulid;

use docn_core::{DocnError, IndexKind, Result, ScoredEntry, VectorEntry, VectorStore};

use crate::similarity::cosine_similarity;

/// Below this many entries every index kind is served by an exact scan.
pub const EXACT_SCAN_THRESHOLD: usize = 64;

/// Lloyd iterations when building clusters.
const KMEANS_ITERATIONS: usize = 5;

/// Inverted-file index: entries grouped under their nearest centroid.
#[derive(Debug, Clone)]
struct IvfIndex {
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<Ulid>>,
    assignments: HashMap<Ulid, usize>,
    nprobe: usize,
}

impl IvfIndex {
    fn build(kind: IndexKind, entries: &HashMap<Ulid, Arc<VectorEntry>>) -> Self {
        let mut ids: Vec<&Ulid> = entries.keys().collect();
        ids.sort();

        let nlist = ((ids.len() as f64).sqrt().round() as usize).max(1);
        let nprobe = match kind {
            IndexKind::ClusteredApprox => (nlist / 4).max(1),
            _ => (nlist / 2).max(2),
        }
        .min(nlist);

        // Deterministic seeding: evenly spaced entries in id order.
        let mut centroids: Vec<Vec<f32>> = (0..nlist)
            .map(|j| entries[ids[j * ids.len() / nlist]].embedding.clone())
            .collect();

        let assign_all = |centroids: &[Vec<f32>]| -> Vec<usize> {
            ids.par_iter()
                .map(|id| nearest_centroid(centroids, &entries[*id].embedding))
                .collect()
        };

        for _ in 0..KMEANS_ITERATIONS {
            let assignment = assign_all(&centroids);
            for (j, centroid) in centroids.iter_mut().enumerate() {
                let members: Vec<&[f32]> = ids
                    .iter()
                    .zip(&assignment)
                    .filter(|(_, a)| **a == j)
                    .map(|(id, _)| entries[*id].embedding.as_slice())
                    .collect();
                if let Some(mean) = mean_vector(&members) {
                    *centroid = mean;
                }
            }
        }

        // Final pass so every entry sits under its nearest final centroid.
        let assignment = assign_all(&centroids);
        let mut index = Self {
            centroids,
            lists: vec![Vec::new(); nlist],
            assignments: HashMap::with_capacity(ids.len()),
            nprobe,
        };
        for (id, list) in ids.into_iter().zip(assignment) {
            index.lists[list].push(*id);
            index.assignments.insert(*id, list);
        }
        index
    }

    fn assign(&mut self, id: Ulid, embedding: &[f32]) {
        self.remove(&id);
        let list = nearest_centroid(&self.centroids, embedding);
        self.lists[list].push(id);
        self.assignments.insert(id, list);
    }

    fn remove(&mut self, id: &Ulid) {
        if let Some(list) = self.assignments.remove(id) {
            self.lists[list].retain(|member| member != id);
        }
    }

    /// Ids in the `nprobe` lists whose centroids are closest to `query`.
    fn probe(&self, query: &[f32]) -> Vec<Ulid> {
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(j, c)| (j, cosine_similarity(query, c)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .take(self.nprobe)
            .flat_map(|(j, _)| self.lists[j].iter().copied())
            .collect()
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], embedding: &[f32]) -> usize {
    let mut best = 0;
    let mut best_sim = f32::NEG_INFINITY;
    for (j, centroid) in centroids.iter().enumerate() {
        let sim = cosine_similarity(embedding, centroid);
        if sim > best_sim {
            best = j;
            best_sim = sim;
        }
    }
    best
}

fn mean_vector(members: &[&[f32]]) -> Option<Vec<f32>> {
    let first = members.first()?;
    let mut sum = vec![0.0f32; first.len()];
    for member in members {
        for (s, v) in sum.iter_mut().zip(member.iter()) {
            *s += v;
        }
    }
    let n = members.len() as f32;
    Some(sum.into_iter().map(|s| s / n).collect())
}

#[derive(Debug, Clone)]
enum VectorIndex {
    Flat,
    Ivf(Arc<IvfIndex>),
}

#[derive(Debug, Clone)]
struct NamedIndex {
    kind: IndexKind,
    index: VectorIndex,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    entries: HashMap<Ulid, Arc<VectorEntry>>,
    dimension: Option<usize>,
    indexes: HashMap<String, NamedIndex>,
    /// Index used by `nearest`: the most recently created one.
    active: Option<String>,
}

impl StoreState {
    fn check_entry(&self, entry: &VectorEntry) -> Result<()> {
        if entry.embedding.is_empty() {
            return Err(DocnError::invalid_configuration(format!(
                "vector {} has an empty embedding",
                entry.id
            )));
        }
        if entry.embedding.iter().any(|v| !v.is_finite()) {
            return Err(DocnError::invalid_configuration(format!(
                "vector {} has non-finite components",
                entry.id
            )));
        }
        if let Some(expected) = self.dimension {
            if entry.dimension() != expected {
                return Err(DocnError::DimensionMismatch {
                    expected,
                    actual: entry.dimension(),
                });
            }
        }
        Ok(())
    }

    fn upsert(&mut self, entry: VectorEntry) -> Result<()> {
        self.check_entry(&entry)?;
        self.dimension.get_or_insert(entry.dimension());

        for named in self.indexes.values_mut() {
            if let VectorIndex::Ivf(ivf) = &mut named.index {
                Arc::make_mut(ivf).assign(entry.id, &entry.embedding);
            }
        }
        self.entries.insert(entry.id, Arc::new(entry));
        Ok(())
    }

    fn remove(&mut self, id: &Ulid) -> bool {
        for named in self.indexes.values_mut() {
            if let VectorIndex::Ivf(ivf) = &mut named.index {
                Arc::make_mut(ivf).remove(id);
            }
        }
        self.entries.remove(id).is_some()
    }

    fn nearest(&self, query: &[f32], k: usize) -> Vec<ScoredEntry> {
        let probed = match self.active.as_ref().and_then(|name| self.indexes.get(name)) {
            Some(NamedIndex {
                index: VectorIndex::Ivf(ivf),
                ..
            }) if self.entries.len() >= EXACT_SCAN_THRESHOLD => Some(ivf.probe(query)),
            _ => None,
        };

        let mut scored: Vec<ScoredEntry> = match probed {
            Some(ids) => ids
                .par_iter()
                .filter_map(|id| self.entries.get(id))
                .map(|entry| score(query, entry))
                .collect(),
            None => self
                .entries
                .par_iter()
                .map(|(_, entry)| score(query, entry))
                .collect(),
        };

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        scored.truncate(k);
        scored
    }
}

fn score(query: &[f32], entry: &Arc<VectorEntry>) -> ScoredEntry {
    ScoredEntry {
        similarity: cosine_similarity(query, &entry.embedding),
        entry: VectorEntry::clone(entry),
    }
}

/// Vector store held entirely in memory.
pub struct MemoryVectorStore {
    state: RwLock<Arc<StoreState>>,
    writer: Mutex<()>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(StoreState::default())),
            writer: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Arc<StoreState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn publish(&self, state: StoreState) {
        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(state);
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name and kind of the index currently serving searches.
    pub fn active_index(&self) -> Option<(String, IndexKind)> {
        let state = self.snapshot();
        let name = state.active.clone()?;
        let kind = state.indexes.get(&name)?.kind;
        Some((name, kind))
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn store_vector(&self, entry: VectorEntry) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut staged = StoreState::clone(&self.snapshot());
        staged.upsert(entry)?;
        self.publish(staged);
        Ok(())
    }

    async fn get_vector(&self, id: Ulid) -> Result<Option<VectorEntry>> {
        Ok(self
            .snapshot()
            .entries
            .get(&id)
            .map(|entry| VectorEntry::clone(entry)))
    }

    async fn delete_vector(&self, id: Ulid) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let mut staged = StoreState::clone(&self.snapshot());
        let existed = staged.remove(&id);
        if existed {
            self.publish(staged);
        }
        Ok(existed)
    }

    async fn batch_store_vectors(&self, entries: &[VectorEntry]) -> Result<usize> {
        let _guard = self.writer.lock().await;
        let mut staged = StoreState::clone(&self.snapshot());

        for entry in entries {
            staged
                .upsert(entry.clone())
                .map_err(|e| DocnError::batch_rejected(entries.len(), e.to_string()))?;
        }

        self.publish(staged);
        debug!("Stored batch of {} vectors", entries.len());
        Ok(entries.len())
    }

    async fn create_or_update_index(&self, name: &str, kind: IndexKind) -> Result<()> {
        let start = Instant::now();
        let base = self.snapshot();

        // Build off the lock; searches keep using the current index meanwhile.
        let index = match kind {
            IndexKind::Flat => VectorIndex::Flat,
            IndexKind::Ann | IndexKind::ClusteredApprox if base.entries.is_empty() => {
                VectorIndex::Flat
            }
            IndexKind::Ann | IndexKind::ClusteredApprox => {
                let entries = base.entries.clone();
                let built = tokio::task::spawn_blocking(move || IvfIndex::build(kind, &entries))
                    .await
                    .map_err(|e| DocnError::internal(format!("index build failed: {}", e)))?;
                VectorIndex::Ivf(Arc::new(built))
            }
        };

        let _guard = self.writer.lock().await;
        let mut staged = StoreState::clone(&self.snapshot());

        // Reconcile writes that landed while the index was building.
        let index = match index {
            VectorIndex::Ivf(mut ivf) => {
                let ivf_mut = Arc::make_mut(&mut ivf);
                let stale: Vec<Ulid> = ivf_mut
                    .assignments
                    .keys()
                    .filter(|id| !staged.entries.contains_key(*id))
                    .copied()
                    .collect();
                for id in stale {
                    ivf_mut.remove(&id);
                }
                for (id, entry) in &staged.entries {
                    let unchanged = base
                        .entries
                        .get(id)
                        .is_some_and(|old| Arc::ptr_eq(old, entry));
                    if !unchanged || !ivf_mut.assignments.contains_key(id) {
                        ivf_mut.assign(*id, &entry.embedding);
                    }
                }
                VectorIndex::Ivf(ivf)
            }
            flat => flat,
        };

        staged
            .indexes
            .insert(name.to_string(), NamedIndex { kind, index });
        staged.active = Some(name.to_string());
        let entry_count = staged.entries.len();
        self.publish(staged);

        info!(
            "Index '{}' ({}) ready over {} vectors in {}ms",
            name,
            kind,
            entry_count,
            start.elapsed().as_millis()
        );
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        let state = self.snapshot();
        if let Some(expected) = state.dimension {
            if query.len() != expected {
                return Err(DocnError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        Ok(state.nearest(query, k))
    }

    fn dimension(&self) -> Option<usize> {
        self.snapshot().dimension
    }
}

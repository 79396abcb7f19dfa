//! Vector retriever: filtering, thresholding and MMR over a `VectorStore`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use ulid::Ulid;

use docn_core::{
    CancellationToken, DocnError, IndexKind, MetadataFilter, Result, RetrievalConfig,
    RuntimeSettings, ScoredEntry, SearchOutcome, VectorEntry, VectorSearchResult, VectorStore,
    DEFAULT_MMR_LAMBDA,
};

use crate::mmr::{mmr_select, resolve_lambda};
use crate::similarity::cosine_similarity;

/// Race a store call against cancellation.
async fn guarded<T, F>(cancel: &CancellationToken, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    cancel.check()?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DocnError::Cancelled),
        result = op => result,
    }
}

/// Wraps a vector store with the retrieval contract.
///
/// Configuration errors and cancellation surface as `Err`. Any other
/// store failure during a search becomes `SearchOutcome::StoreUnavailable`
/// so callers can continue with lexical results.
pub struct VectorRetriever<S: VectorStore + ?Sized> {
    store: Arc<S>,
    settings: Arc<RuntimeSettings>,
    config: RetrievalConfig,
}

impl<S: VectorStore + ?Sized> VectorRetriever<S> {
    /// Create a new retriever.
    pub fn new(store: Arc<S>, settings: Arc<RuntimeSettings>, config: RetrievalConfig) -> Self {
        Self {
            store,
            settings,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runtime settings shared with whoever tunes lambda.
    pub fn settings(&self) -> &Arc<RuntimeSettings> {
        &self.settings
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Lambda for a call: explicit, then runtime settings, then 0.5.
    pub fn effective_lambda(&self, explicit: Option<f32>) -> Result<f32> {
        resolve_lambda(explicit, self.settings.mmr_lambda(), DEFAULT_MMR_LAMBDA)
    }

    fn check_dimension(&self, query: &[f32]) -> Result<()> {
        if query.is_empty() {
            return Err(DocnError::invalid_configuration("query vector is empty"));
        }
        match self.store.dimension() {
            Some(expected) if expected != query.len() => Err(DocnError::DimensionMismatch {
                expected,
                actual: query.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Fetch `k` raw neighbours; a store failure becomes `Ok(Err(reason))`.
    async fn fetch(
        &self,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<Vec<ScoredEntry>, String>> {
        match guarded(cancel, self.store.nearest(query, k)).await {
            Ok(hits) => Ok(Ok(hits)),
            Err(e) if e.is_configuration_error() || matches!(e, DocnError::Cancelled) => Err(e),
            Err(e) => {
                warn!("Vector store unavailable, continuing without vectors: {}", e);
                Ok(Err(e.to_string()))
            }
        }
    }

    /// Nearest vectors with similarity at least `min_similarity`.
    ///
    /// Over-fetches before applying `filter`, then truncates to `top_k`.
    pub async fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        min_similarity: f32,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome<VectorSearchResult>> {
        let start = Instant::now();
        self.check_dimension(query)?;
        if top_k == 0 {
            return Ok(SearchOutcome::NoMatches);
        }

        let fetch_k = top_k * self.config.over_fetch_factor.max(1);
        let raw = match self.fetch(query, fetch_k, cancel).await? {
            Ok(raw) => raw,
            Err(reason) => return Ok(SearchOutcome::StoreUnavailable { reason }),
        };
        let fetched = raw.len();

        let mut results: Vec<VectorSearchResult> = raw
            .into_iter()
            .filter(|hit| hit.similarity >= min_similarity)
            .filter(|hit| filter.map_or(true, |f| f.matches(&hit.entry.metadata)))
            .map(VectorSearchResult::from)
            .collect();
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        debug!(
            "Vector search fetched {}, kept {} (min similarity {})",
            fetched,
            results.len(),
            min_similarity
        );
        info!(
            "Vector search completed in {}ms, returned {} results",
            start.elapsed().as_millis(),
            results.len()
        );

        Ok(SearchOutcome::from_hits(results))
    }

    /// [`search_similar`](Self::search_similar) at the configured `min_similarity`.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome<VectorSearchResult>> {
        self.search_similar(query, top_k, filter, self.config.min_similarity, cancel)
            .await
    }

    /// Relevance-and-novelty ranking by Maximal Marginal Relevance.
    ///
    /// Draws a pool of `mmr_pool_factor × top_k` candidates above the
    /// relaxed pool threshold, then selects `top_k` of them.
    pub async fn search_with_mmr(
        &self,
        query: &[f32],
        top_k: usize,
        lambda: Option<f32>,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome<VectorSearchResult>> {
        let start = Instant::now();
        let lambda = self.effective_lambda(lambda)?;
        self.check_dimension(query)?;
        if top_k == 0 {
            return Ok(SearchOutcome::NoMatches);
        }

        let pool_k = top_k * self.config.mmr_pool_factor.max(1);
        let raw = match self.fetch(query, pool_k, cancel).await? {
            Ok(raw) => raw,
            Err(reason) => return Ok(SearchOutcome::StoreUnavailable { reason }),
        };

        let pool: Vec<VectorSearchResult> = raw
            .into_iter()
            .filter(|hit| hit.similarity >= self.config.mmr_pool_min_similarity)
            .filter(|hit| filter.map_or(true, |f| f.matches(&hit.entry.metadata)))
            .map(VectorSearchResult::from)
            .collect();

        let results = rerank(pool, top_k, lambda);

        info!(
            "MMR search (lambda {}) completed in {}ms, returned {} results",
            lambda,
            start.elapsed().as_millis(),
            results.len()
        );

        Ok(SearchOutcome::from_hits(results))
    }

    /// Store a single vector.
    pub async fn store_vector(&self, entry: VectorEntry, cancel: &CancellationToken) -> Result<()> {
        guarded(cancel, self.store.store_vector(entry)).await
    }

    pub async fn get_vector(&self, id: Ulid, cancel: &CancellationToken) -> Result<Option<VectorEntry>> {
        guarded(cancel, self.store.get_vector(id)).await
    }

    pub async fn delete_vector(&self, id: Ulid, cancel: &CancellationToken) -> Result<bool> {
        guarded(cancel, self.store.delete_vector(id)).await
    }

    /// Store a batch; all-or-nothing.
    pub async fn batch_store(&self, entries: &[VectorEntry], cancel: &CancellationToken) -> Result<usize> {
        let stored = guarded(cancel, self.store.batch_store_vectors(entries)).await?;
        if stored != entries.len() {
            return Err(DocnError::batch_rejected(
                entries.len(),
                format!("store reported {} of {} entries", stored, entries.len()),
            ));
        }
        Ok(stored)
    }

    /// Create or replace a named index.
    pub async fn create_or_update_index(
        &self,
        name: &str,
        kind: IndexKind,
        cancel: &CancellationToken,
    ) -> Result<()> {
        guarded(cancel, self.store.create_or_update_index(name, kind)).await
    }
}

/// MMR-select `top_k` of `pool`, using the pool's own query similarities as relevance.
pub fn rerank(pool: Vec<VectorSearchResult>, top_k: usize, lambda: f32) -> Vec<VectorSearchResult> {
    let relevance: Vec<f32> = pool.iter().map(|r| r.similarity).collect();
    let picks = mmr_select(&relevance, top_k, lambda, |i, j| {
        cosine_similarity(&pool[i].embedding, &pool[j].embedding)
    });

    let mut slots: Vec<Option<VectorSearchResult>> = pool.into_iter().map(Some).collect();
    picks
        .into_iter()
        .filter_map(|pick| {
            slots[pick.index].take().map(|mut result| {
                result.mmr_score = Some(pick.score);
                result
            })
        })
        .collect()
}

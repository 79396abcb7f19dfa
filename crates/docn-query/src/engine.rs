//! Query engine for hybrid search.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ulid::Ulid;

use docn_core::{
    CancellationToken, CandidateResult, DocnError, Metadata, MetadataFilter, Result,
    SearchOutcome, VectorSearchResult, VectorStore,
};
use docn_lexical::Bm25Index;
use docn_vector::{cosine_similarity, mmr_select, VectorRetriever};

use crate::fusion::{max_normalize, reciprocal_rank_fusion, weighted_fusion, FusionWeights};
use crate::intent::{classify, Intent};

/// How lexical and vector candidates are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Intent-weighted sum of normalized scores.
    #[default]
    Weighted,
    /// Reciprocal Rank Fusion of the two rankings.
    Rrf,
}

/// A single query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query text, used for intent and lexical scoring.
    pub text: String,

    /// Precomputed query embedding; without one only lexical search runs.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    /// Number of results; falls back to the retrieval config.
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Explicit MMR lambda.
    #[serde(default)]
    pub lambda: Option<f32>,

    /// Exact-match metadata filter.
    #[serde(default)]
    pub filter: Option<MetadataFilter>,

    /// Vector similarity floor; falls back to `mmr_pool_min_similarity`.
    #[serde(default)]
    pub min_similarity: Option<f32>,

    #[serde(default)]
    pub fusion: FusionMode,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_lambda(mut self, lambda: f32) -> Self {
        self.lambda = Some(lambda);
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    pub fn with_fusion(mut self, fusion: FusionMode) -> Self {
        self.fusion = fusion;
        self
    }
}

/// Ranked candidates for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub intent: Intent,
    pub candidates: Vec<CandidateResult>,

    /// True when the vector store was unavailable and results are lexical only.
    pub degraded: bool,

    pub latency_ms: u64,
}

/// Merge state for one candidate.
#[derive(Debug, Default)]
struct Merged {
    lexical: Option<f32>,
    similarity: Option<f32>,
    metadata: Metadata,
    embedding: Option<Vec<f32>>,
}

/// Hybrid search query engine.
///
/// Runs BM25 and vector search independently, merges the candidates,
/// then reranks them with MMR over the fused scores.
pub struct QueryEngine<S: VectorStore + ?Sized> {
    /// Lexical index over chunk text.
    lexical: Arc<Bm25Index>,

    /// Vector retriever over the chunk embeddings.
    retriever: Arc<VectorRetriever<S>>,
}

impl<S: VectorStore + ?Sized> QueryEngine<S> {
    /// Create a new query engine.
    pub fn new(lexical: Arc<Bm25Index>, retriever: Arc<VectorRetriever<S>>) -> Self {
        Self { lexical, retriever }
    }

    pub fn lexical(&self) -> &Arc<Bm25Index> {
        &self.lexical
    }

    pub fn retriever(&self) -> &Arc<VectorRetriever<S>> {
        &self.retriever
    }

    /// Run the full query path.
    pub async fn search(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse> {
        let start = Instant::now();
        cancel.check()?;

        let intent = classify(&request.text);
        let config = self.retriever.config();
        let top_k = request.top_k.unwrap_or(config.top_k);
        let lambda = self.retriever.effective_lambda(request.lambda)?;

        info!("Searching for {:?} (intent {})", request.text, intent);

        if top_k == 0 {
            return Ok(QueryResponse {
                query: request.text.clone(),
                intent,
                candidates: Vec::new(),
                degraded: false,
                latency_ms: start.elapsed().as_millis() as u64,
            });
        }

        let pool_k = top_k * config.mmr_pool_factor.max(1);
        let filter = request.filter.as_ref();

        let (lexical_hits, vector_outcome) = tokio::join!(
            self.lexical_search(&request.text, pool_k),
            self.vector_search(
                request.embedding.as_deref(),
                pool_k,
                filter,
                request.min_similarity,
                cancel
            )
        );
        let lexical_hits = lexical_hits?;
        let vector_outcome = vector_outcome?;
        cancel.check()?;

        let degraded = vector_outcome.is_unavailable();
        let vector_hits = vector_outcome.into_hits();

        debug!(
            "Lexical search returned {} results, vector search returned {} results",
            lexical_hits.len(),
            vector_hits.len()
        );

        let mut merged: HashMap<Ulid, Merged> = HashMap::new();
        let lexical_ranked = max_normalize(&lexical_hits);
        for (id, score) in &lexical_ranked {
            merged.entry(*id).or_default().lexical = Some(*score);
        }
        let mut vector_ranked = Vec::with_capacity(vector_hits.len());
        for hit in vector_hits {
            vector_ranked.push((hit.id, hit.similarity));
            let slot = merged.entry(hit.id).or_default();
            slot.similarity = Some(hit.similarity);
            slot.metadata = hit.metadata;
            slot.embedding = Some(hit.embedding);
        }

        if !degraded {
            self.resolve_lexical_only(&mut merged, request.embedding.as_deref(), filter, cancel)
                .await?;
        } else if filter.is_some() {
            // Without the store no lexical candidate's metadata can be checked.
            merged.clear();
        }

        let fused = match request.fusion {
            FusionMode::Weighted => {
                let weights = FusionWeights::for_intent(intent);
                let lexical: Vec<(Ulid, f32)> = lexical_ranked
                    .into_iter()
                    .filter(|(id, _)| merged.contains_key(id))
                    .collect();
                let semantic: Vec<(Ulid, f32)> = merged
                    .iter()
                    .filter_map(|(id, m)| m.similarity.map(|s| (*id, s)))
                    .collect();
                weighted_fusion(
                    vec![(lexical, weights.lexical), (semantic, weights.semantic)],
                    pool_k,
                )
            }
            FusionMode::Rrf => {
                let lexical: Vec<(Ulid, f32)> = lexical_ranked
                    .into_iter()
                    .filter(|(id, _)| merged.contains_key(id))
                    .collect();
                reciprocal_rank_fusion(vec![lexical, vector_ranked], config.rrf_k, pool_k)
            }
        };

        let candidates = self.diversify(fused, merged, top_k, lambda);
        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} results{}",
            latency_ms,
            candidates.len(),
            if degraded { " (lexical only)" } else { "" }
        );

        Ok(QueryResponse {
            query: request.text.clone(),
            intent,
            candidates,
            degraded,
            latency_ms,
        })
    }

    /// BM25 search on a blocking worker.
    async fn lexical_search(&self, query: &str, k: usize) -> Result<Vec<(Ulid, f32)>> {
        let index = Arc::clone(&self.lexical);
        let query = query.to_string();

        let hits = tokio::task::spawn_blocking(move || index.search(&query, k))
            .await
            .map_err(|e| DocnError::internal(format!("Lexical search task failed: {}", e)))?;

        Ok(hits
            .into_iter()
            .map(|hit| (hit.id, hit.score as f32))
            .collect())
    }

    async fn vector_search(
        &self,
        embedding: Option<&[f32]>,
        k: usize,
        filter: Option<&MetadataFilter>,
        min_similarity: Option<f32>,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome<VectorSearchResult>> {
        match embedding {
            Some(query) => {
                let min_similarity =
                    min_similarity.unwrap_or(self.retriever.config().mmr_pool_min_similarity);
                self.retriever
                    .search_similar(query, k, filter, min_similarity, cancel)
                    .await
            }
            None => Ok(SearchOutcome::NoMatches),
        }
    }

    /// Look up stored vectors for candidates found only lexically.
    ///
    /// Fills in similarity, metadata and embedding; with a filter, drops
    /// candidates whose metadata fails it or that have no stored vector.
    async fn resolve_lexical_only(
        &self,
        merged: &mut HashMap<Ulid, Merged>,
        query: Option<&[f32]>,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut pending: Vec<Ulid> = merged
            .iter()
            .filter(|(_, m)| m.embedding.is_none())
            .map(|(id, _)| *id)
            .collect();
        pending.sort();

        for id in pending {
            let entry = match self.retriever.get_vector(id, cancel).await {
                Ok(entry) => entry,
                Err(DocnError::Cancelled) => return Err(DocnError::Cancelled),
                Err(e) => {
                    warn!("Vector lookup for {} failed: {}", id, e);
                    None
                }
            };

            match entry {
                Some(entry) => {
                    if filter.map_or(false, |f| !f.matches(&entry.metadata)) {
                        merged.remove(&id);
                        continue;
                    }
                    if let Some(slot) = merged.get_mut(&id) {
                        if let Some(query) = query {
                            if query.len() == entry.embedding.len() {
                                slot.similarity = Some(cosine_similarity(query, &entry.embedding));
                            }
                        }
                        slot.metadata = entry.metadata;
                        slot.embedding = Some(entry.embedding);
                    }
                }
                None if filter.is_some() => {
                    merged.remove(&id);
                }
                None => {}
            }
        }

        Ok(())
    }

    /// MMR over the fused ranking; candidates without an embedding are
    /// treated as dissimilar to everything.
    fn diversify(
        &self,
        fused: Vec<(Ulid, f32)>,
        mut merged: HashMap<Ulid, Merged>,
        top_k: usize,
        lambda: f32,
    ) -> Vec<CandidateResult> {
        let pool: Vec<(Ulid, f32, Merged)> = fused
            .into_iter()
            .filter_map(|(id, score)| merged.remove(&id).map(|m| (id, score, m)))
            .collect();

        let relevance: Vec<f32> = pool.iter().map(|(_, score, _)| *score).collect();
        let picks = mmr_select(&relevance, top_k, lambda, |i, j| {
            match (&pool[i].2.embedding, &pool[j].2.embedding) {
                (Some(a), Some(b)) => cosine_similarity(a, b),
                _ => 0.0,
            }
        });

        let mut slots: Vec<Option<(Ulid, f32, Merged)>> = pool.into_iter().map(Some).collect();
        picks
            .into_iter()
            .filter_map(|pick| {
                slots[pick.index]
                    .take()
                    .map(|(chunk_id, fused_score, m)| CandidateResult {
                        chunk_id,
                        lexical_score: m.lexical,
                        similarity_score: m.similarity,
                        fused_score,
                        mmr_score: Some(pick.score),
                        metadata: m.metadata,
                    })
            })
            .collect()
    }
}

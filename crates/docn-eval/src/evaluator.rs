//! Offline evaluation and A/B comparison of retrieval configurations.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ulid::Ulid;

use docn_core::{CancellationToken, DocnError, EvaluationConfig, Result, VectorStore};
use docn_query::{QueryEngine, QueryRequest};

use crate::dataset::EvaluationQuery;
use crate::metrics::{AggregateMetrics, QueryMetrics};

/// Relative MRR margin a configuration needs to win a comparison.
///
/// A fixed heuristic, not a significance test.
pub const WIN_MARGIN: f64 = 0.05;

/// Anything that can rank chunk ids for a golden query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &EvaluationQuery,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Ulid>>;
}

#[async_trait]
impl<S: VectorStore + ?Sized> Retriever for QueryEngine<S> {
    async fn retrieve(
        &self,
        query: &EvaluationQuery,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Ulid>> {
        let mut request = QueryRequest::new(query.query_text.clone()).with_top_k(top_k);
        request.embedding = query.query_embedding.clone();

        let response = self.search(&request, cancel).await?;
        Ok(response.candidates.iter().map(|c| c.chunk_id).collect())
    }
}

/// Ranking and metrics for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerQueryResult {
    pub query_id: String,
    pub retrieved: Vec<Ulid>,
    pub metrics: QueryMetrics,
}

/// Result of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub k: usize,
    pub aggregate: AggregateMetrics,
    pub per_query: Vec<PerQueryResult>,

    /// Queries without any relevant chunk.
    pub skipped: Vec<String>,

    pub latency_ms: u64,
}

/// Relative change from A to B, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricImprovement {
    pub mrr: f64,
    pub ndcg: f64,
    pub precision: f64,
    pub recall: f64,
    pub hit_rate: f64,
    pub map: f64,
}

impl MetricImprovement {
    pub fn between(a: &AggregateMetrics, b: &AggregateMetrics) -> Self {
        Self {
            mrr: percent_change(a.mrr, b.mrr),
            ndcg: percent_change(a.ndcg, b.ndcg),
            precision: percent_change(a.precision, b.precision),
            recall: percent_change(a.recall, b.recall),
            hit_rate: percent_change(a.hit_rate, b.hit_rate),
            map: percent_change(a.map, b.map),
        }
    }
}

/// `(b − a) / a × 100`; from a zero baseline, 100 if `b` is positive else 0.
pub fn percent_change(a: f64, b: f64) -> f64 {
    if a > 0.0 {
        (b - a) / a * 100.0
    } else if b > 0.0 {
        100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    A,
    B,
    Tie,
}

impl Winner {
    /// Decide on MRR: the higher side must clear the other by [`WIN_MARGIN`].
    pub fn decide(a: &AggregateMetrics, b: &AggregateMetrics) -> Self {
        if b.mrr > a.mrr * (1.0 + WIN_MARGIN) {
            Self::B
        } else if a.mrr > b.mrr * (1.0 + WIN_MARGIN) {
            Self::A
        } else {
            Self::Tie
        }
    }
}

/// Two configurations evaluated over the same queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationComparison {
    pub a: EvaluationResult,
    pub b: EvaluationResult,
    pub improvement: MetricImprovement,
    pub winner: Winner,
}

/// Runs golden queries through a retriever and scores the rankings.
#[derive(Debug, Clone)]
pub struct RetrievalEvaluator {
    k: usize,
}

impl RetrievalEvaluator {
    /// Evaluator with cutoff `k`; `k` must be positive.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(DocnError::invalid_configuration(
                "evaluation cutoff k must be positive",
            ));
        }
        Ok(Self { k })
    }

    pub fn from_config(config: &EvaluationConfig) -> Result<Self> {
        Self::new(config.k)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Evaluate every query; cancellation is checked before each one.
    pub async fn evaluate<R>(
        &self,
        retriever: &R,
        queries: &[EvaluationQuery],
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult>
    where
        R: Retriever + ?Sized,
    {
        let start = Instant::now();
        let mut per_query = Vec::with_capacity(queries.len());
        let mut skipped = Vec::new();

        for query in queries {
            cancel.check()?;

            if !query.has_relevant() {
                warn!("Skipping query {}: no relevant chunks", query.query_id);
                skipped.push(query.query_id.clone());
                continue;
            }

            let retrieved = retriever.retrieve(query, self.k, cancel).await?;
            let metrics = QueryMetrics::compute(&retrieved, &query.relevance(), self.k);

            debug!(
                "Query {}: RR {:.3}, NDCG@{} {:.3}",
                query.query_id, metrics.reciprocal_rank, self.k, metrics.ndcg
            );

            per_query.push(PerQueryResult {
                query_id: query.query_id.clone(),
                retrieved,
                metrics,
            });
        }

        let aggregate = AggregateMetrics::from_queries(per_query.iter().map(|r| &r.metrics));
        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Evaluated {} queries in {}ms: MRR {:.3}, NDCG@{} {:.3}, MAP {:.3}",
            aggregate.query_count, latency_ms, aggregate.mrr, self.k, aggregate.ndcg, aggregate.map
        );

        Ok(EvaluationResult {
            k: self.k,
            aggregate,
            per_query,
            skipped,
            latency_ms,
        })
    }

    /// Evaluate two retrievers on the same queries and pick a winner.
    pub async fn compare<A, B>(
        &self,
        a: &A,
        b: &B,
        queries: &[EvaluationQuery],
        cancel: &CancellationToken,
    ) -> Result<EvaluationComparison>
    where
        A: Retriever + ?Sized,
        B: Retriever + ?Sized,
    {
        let a = self.evaluate(a, queries, cancel).await?;
        let b = self.evaluate(b, queries, cancel).await?;

        let improvement = MetricImprovement::between(&a.aggregate, &b.aggregate);
        let winner = Winner::decide(&a.aggregate, &b.aggregate);

        info!(
            "Comparison: MRR {:.3} vs {:.3} ({:+.1}%), winner {:?}",
            a.aggregate.mrr, b.aggregate.mrr, improvement.mrr, winner
        );

        Ok(EvaluationComparison {
            a,
            b,
            improvement,
            winner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(mrr: f64) -> AggregateMetrics {
        AggregateMetrics {
            mrr,
            query_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_percent_change() {
        assert!((percent_change(0.5, 0.6) - 20.0).abs() < 1e-9);
        assert!((percent_change(0.5, 0.4) + 20.0).abs() < 1e-9);
        assert_eq!(percent_change(0.0, 0.3), 100.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_winner_needs_margin() {
        assert_eq!(Winner::decide(&agg(0.50), &agg(0.60)), Winner::B);
        assert_eq!(Winner::decide(&agg(0.60), &agg(0.50)), Winner::A);
        assert_eq!(Winner::decide(&agg(0.50), &agg(0.52)), Winner::Tie);
        assert_eq!(Winner::decide(&agg(0.52), &agg(0.50)), Winner::Tie);
        assert_eq!(Winner::decide(&agg(0.0), &agg(0.0)), Winner::Tie);
        assert_eq!(Winner::decide(&agg(0.0), &agg(0.1)), Winner::B);
    }

    #[test]
    fn test_zero_k_rejected() {
        let err = RetrievalEvaluator::new(0).unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(RetrievalEvaluator::from_config(&EvaluationConfig::default()).unwrap().k(), 10);
    }
}

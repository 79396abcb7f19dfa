use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use docn_core::{
    CancellationToken, DocnError, Result, RetrievalConfig, RuntimeSettings, VectorStore,
};
use docn_eval::{EvaluationQuery, RetrievalEvaluator, Retriever, Winner};
use docn_lexical::Bm25Index;
use docn_query::QueryEngine;
use docn_vector::{MemoryVectorStore, VectorRetriever};
use ulid::Ulid;

fn ulid(n: u128) -> Ulid {
    Ulid::from(n)
}

/// Returns the same ranking for every query.
struct FixedRanking(Vec<Ulid>);

#[async_trait]
impl Retriever for FixedRanking {
    async fn retrieve(
        &self,
        _query: &EvaluationQuery,
        top_k: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Ulid>> {
        Ok(self.0.iter().take(top_k).copied().collect())
    }
}

/// Cancels the shared token after its first query.
struct CancelAfterFirst(CancellationToken);

#[async_trait]
impl Retriever for CancelAfterFirst {
    async fn retrieve(
        &self,
        _query: &EvaluationQuery,
        _top_k: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Ulid>> {
        self.0.cancel();
        Ok(vec![ulid(1)])
    }
}

fn golden() -> Vec<EvaluationQuery> {
    vec![
        EvaluationQuery::new("q1", "remote work policy").with_relevant([ulid(1)]),
        EvaluationQuery::new("q2", "password rotation").with_relevant([ulid(2)]),
        EvaluationQuery::new("q3", "unlabeled"),
    ]
}

#[tokio::test]
async fn test_evaluate_fixed_ranking() {
    let evaluator = RetrievalEvaluator::new(3).unwrap();
    let retriever = FixedRanking(vec![ulid(1), ulid(2), ulid(3)]);

    let result = evaluator
        .evaluate(&retriever, &golden(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.skipped, vec!["q3".to_string()]);
    assert_eq!(result.per_query.len(), 2);
    assert_eq!(result.aggregate.query_count, 2);
    // q1 at rank 1, q2 at rank 2.
    assert!((result.aggregate.mrr - 0.75).abs() < 1e-9);
    assert_eq!(result.aggregate.hit_rate, 1.0);
    assert_eq!(result.aggregate.recall, 1.0);
}

#[tokio::test]
async fn test_compare_picks_winner() {
    let evaluator = RetrievalEvaluator::new(3).unwrap();
    let worse = FixedRanking(vec![ulid(3), ulid(1), ulid(2)]);
    let better = FixedRanking(vec![ulid(1), ulid(2), ulid(3)]);

    let comparison = evaluator
        .compare(&worse, &better, &golden(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(comparison.winner, Winner::B);
    assert!(comparison.improvement.mrr > 5.0);

    let tie = evaluator
        .compare(&better, &better, &golden(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(tie.winner, Winner::Tie);
    assert_eq!(tie.improvement.mrr, 0.0);
}

#[tokio::test]
async fn test_cancellation_between_queries() {
    let evaluator = RetrievalEvaluator::new(3).unwrap();
    let cancel = CancellationToken::new();
    let retriever = CancelAfterFirst(cancel.clone());

    let err = evaluator
        .evaluate(&retriever, &golden(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DocnError::Cancelled));
}

#[tokio::test]
async fn test_evaluate_query_engine() {
    let lexical = Arc::new(Bm25Index::new());
    lexical.update_statistics(&HashMap::from([
        (
            ulid(1),
            "Our remote work policy allows employees to work from home".to_string(),
        ),
        (
            ulid(2),
            "The security policy covers password rotation".to_string(),
        ),
        (ulid(3), "Lunch menu for the cafeteria".to_string()),
    ]));

    let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
    let retriever = VectorRetriever::new(
        store,
        Arc::new(RuntimeSettings::default()),
        RetrievalConfig::default(),
    );
    let engine = QueryEngine::new(lexical, Arc::new(retriever));

    let evaluator = RetrievalEvaluator::new(2).unwrap();
    let result = evaluator
        .evaluate(&engine, &golden(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.aggregate.query_count, 2);
    assert_eq!(result.aggregate.mrr, 1.0);
    assert_eq!(result.per_query[0].retrieved[0], ulid(1));
}

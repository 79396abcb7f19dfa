//! docn-eval - Retrieval quality evaluation
//!
//! Scores rankings against a golden dataset with MRR, NDCG@k, MAP,
//! precision@k, recall@k and hit rate, and compares two retrieval
//! configurations over the same queries.

mod dataset;
mod evaluator;
mod metrics;

pub use dataset::{load_corpus, load_golden_dataset, CorpusRecord, EvaluationQuery};
pub use evaluator::{
    percent_change, EvaluationComparison, EvaluationResult, MetricImprovement, PerQueryResult,
    RetrievalEvaluator, Retriever, Winner, WIN_MARGIN,
};
pub use metrics::{
    average_precision, hit_rate_at_k, ndcg_at_k, precision_at_k, recall_at_k, reciprocal_rank,
    AggregateMetrics, QueryMetrics,
};

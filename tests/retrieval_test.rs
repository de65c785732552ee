//! Semantic retrieval over documents indexed through the retriever.

mod support;

use specforge::retrieval::{RetrievalError, RetrievalOptions, RetrieverConfig, SemanticRetriever};
use specforge::vector::{ChunkMetadata, ContentKind, VectorStore};
use std::sync::Arc;
use support::KeywordEmbedder;

async fn seeded() -> SemanticRetriever {
    let embedder = Arc::new(KeywordEmbedder::mvc());
    let store = Arc::new(VectorStore::in_memory(6).unwrap());
    let retriever = SemanticRetriever::new(store, embedder, RetrieverConfig::default());

    let documents = [
        ("user-model", "The user model stores profile fields."),
        ("order-model", "The order model tracks line items and totals."),
        ("cart-model", "A cart model keeps pending purchases."),
        ("audit-model", "The audit model records every change."),
        ("report-view", "The report view renders a model summary."),
        ("jobs", "Background jobs are pushed onto a queue."),
    ];
    for (id, text) in documents {
        retriever
            .index_text(id, text, Some(ContentKind::Documentation), ChunkMetadata::default())
            .await
            .unwrap();
    }
    retriever
}

#[tokio::test]
async fn test_results_capped_and_above_threshold() {
    let retriever = seeded().await;
    let context = retriever
        .retrieve_text("model", 3, &RetrievalOptions::default())
        .await
        .unwrap();

    assert!(!context.chunks.is_empty());
    assert!(context.chunks.len() <= 3);
    for ranked in &context.chunks {
        assert!(ranked.similarity >= 0.5, "{} below threshold", ranked.chunk.id);
    }
    assert!(context.chunks.iter().all(|c| !c.chunk.id.starts_with("jobs")));
    assert!(!context.cache_hit);
}

#[tokio::test]
async fn test_unrelated_query_finds_nothing_relevant() {
    let retriever = seeded().await;
    let context = retriever
        .retrieve_text("queue", 10, &RetrievalOptions::default())
        .await
        .unwrap();

    let ids: Vec<&str> = context.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["jobs-0"]);
}

#[tokio::test]
async fn test_repeat_query_hits_cache_until_reindex() {
    let retriever = seeded().await;
    let options = RetrievalOptions::default();

    let first = retriever.retrieve_text("model", 2, &options).await.unwrap();
    let second = retriever.retrieve_text("model", 2, &options).await.unwrap();
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(retriever.metrics().cache_hits, 1);

    retriever
        .index_text(
            "invoice-model",
            "An invoice model with due dates.",
            None,
            ChunkMetadata::default(),
        )
        .await
        .unwrap();
    let third = retriever.retrieve_text("model", 2, &options).await.unwrap();
    assert!(!third.cache_hit);
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let retriever = seeded().await;
    let err = retriever
        .retrieve_text("   ", 5, &RetrievalOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_zero_chunks_requested() {
    let retriever = seeded().await;
    let context = retriever
        .retrieve_text("model", 0, &RetrievalOptions::default())
        .await
        .unwrap();
    assert!(context.chunks.is_empty());
    assert_eq!(context.aggregate_score, 0.0);
}

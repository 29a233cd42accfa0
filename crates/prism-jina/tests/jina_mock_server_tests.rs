//! Mock server tests for the Jina reranker.
//!
//! These run against a local wiremock server, so they exercise the real
//! request construction, status mapping, and index-based score mapping
//! without touching the network.

#![allow(clippy::unwrap_used)]

use prism::{Error, Reranker};
use prism_jina::JinaRerank;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mock_rerank_response(results: &[(usize, f64)]) -> serde_json::Value {
    let results: Vec<_> = results
        .iter()
        .map(|(index, score)| json!({"index": index, "relevance_score": score}))
        .collect();
    json!({
        "model": "jina-reranker-v1-base-en",
        "results": results,
        "usage": {"total_tokens": 42}
    })
}

fn reranker(mock_server: &MockServer) -> JinaRerank {
    JinaRerank::new()
        .with_api_key("test-key")
        .with_base_url(mock_server.uri())
}

fn pairs(query: &str, passages: &[&str]) -> Vec<(String, String)> {
    passages
        .iter()
        .map(|passage| (query.to_string(), (*passage).to_string()))
        .collect()
}

#[tokio::test]
async fn test_score_maps_results_back_by_index() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(
            json!({"model": "jina-reranker-v1-base-en", "query": "what moved churn?"}),
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(mock_rerank_response(&[(2, 0.9), (0, 0.4), (1, 0.1)])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let scores = reranker(&mock_server)
        .score(pairs("what moved churn?", &["alpha", "beta", "gamma"]))
        .await
        .unwrap();

    assert_eq!(scores.len(), 3);
    assert!((scores[0] - 0.4).abs() < 1e-6);
    assert!((scores[1] - 0.1).abs() < 1e-6);
    assert!((scores[2] - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn test_score_sends_documents_in_pair_order() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(mock_rerank_response(&[(0, 0.5), (1, 0.5)])),
        )
        .mount(&mock_server)
        .await;

    reranker(&mock_server)
        .score(pairs("what moved churn?", &["alpha", "beta"]))
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["query"], "what moved churn?");
    assert_eq!(body["documents"][0], "alpha");
    assert_eq!(body["documents"][1], "beta");
    assert_eq!(body["model"], "jina-reranker-v1-base-en");
}

#[tokio::test]
async fn test_score_rejects_missing_scores() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_rerank_response(&[(0, 0.7)])))
        .mount(&mock_server)
        .await;

    let err = reranker(&mock_server)
        .score(pairs("q", &["alpha", "beta"]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ApiFormat(_)));
    assert!(err.to_string().contains("missing a score"));
}

#[tokio::test]
async fn test_score_rejects_out_of_range_index() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_rerank_response(&[(7, 0.7)])))
        .mount(&mock_server)
        .await;

    let err = reranker(&mock_server)
        .score(pairs("q", &["alpha", "beta"]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ApiFormat(_)));
    assert!(err.to_string().contains("index 7"));
}

#[tokio::test]
async fn test_score_maps_unauthorized_to_authentication_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&mock_server)
        .await;

    let err = reranker(&mock_server)
        .score(pairs("q", &["alpha"]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Authentication(_)));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_score_maps_429_to_rate_limit_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let err = reranker(&mock_server)
        .score(pairs("q", &["alpha"]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RateLimit(_)));
}

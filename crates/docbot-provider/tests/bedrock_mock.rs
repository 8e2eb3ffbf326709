use std::time::Duration;

use docbot_auth::AwsCredentials;
use docbot_provider::{
    BedrockRuntime, EmbeddingProvider, GenerationConfig, TextGenerator, TitanEmbeddingProvider,
    TitanTextGenerator,
};
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn runtime_for(server: &MockServer) -> BedrockRuntime {
    BedrockRuntime::new(
        "us-east-1",
        Some(server.uri()),
        Some(AwsCredentials::new("AKIDEXAMPLE", "secret", None)),
    )
    .with_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn titan_text_sends_generation_config() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/model/amazon.titan-text-express-v1/invoke"))
        .and(header("content-type", "application/json"))
        .and(header_exists("authorization"))
        .and(body_json(serde_json::json!({
            "inputText": "QUESTION: what?",
            "textGenerationConfig": {
                "maxTokenCount": 400,
                "temperature": 0.1,
                "topP": 0.9,
                "stopSequences": []
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inputTextTokenCount": 5,
            "results": [{
                "tokenCount": 3,
                "outputText": "Answer: it is",
                "completionReason": "FINISH"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = TitanTextGenerator::new(runtime_for(&server));
    let text = generator
        .generate("QUESTION: what?", &GenerationConfig::default())
        .await
        .unwrap();
    assert_eq!(text, "Answer: it is");
}

#[tokio::test]
async fn titan_embedding_invokes_once_per_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/model/amazon.titan-embed-text-v2%3A0/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embedding": [0.1, 0.2, 0.3, 0.4],
            "inputTextTokenCount": 2
        })))
        .expect(2)
        .mount(&server)
        .await;

    let provider = TitanEmbeddingProvider::with_model(
        runtime_for(&server),
        "amazon.titan-embed-text-v2:0",
        4,
    );
    let result = provider
        .embed(&["one".to_string(), "two".to_string()])
        .await
        .unwrap();
    assert_eq!(result.embeddings.len(), 2);
    assert_eq!(result.dimensions, 4);
}

#[tokio::test]
async fn titan_embedding_rejects_wrong_dimensions() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"embedding": [0.1]})),
        )
        .mount(&server)
        .await;

    let provider = TitanEmbeddingProvider::with_model(runtime_for(&server), "m", 4);
    let err = provider.embed(&["x".to_string()]).await.unwrap_err();
    assert!(err.to_string().contains("dimensions mismatch"));
}

#[tokio::test]
async fn bedrock_error_body_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "message": "You don't have access to the model"
        })))
        .mount(&server)
        .await;

    let generator = TitanTextGenerator::with_model(runtime_for(&server), "m");
    let err = generator
        .generate("hi", &GenerationConfig::default())
        .await
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("403"));
    assert!(text.contains("access to the model"));
    assert!(!text.contains("[retryable]"));
}

#[tokio::test]
async fn empty_results_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
        .mount(&server)
        .await;

    let generator = TitanTextGenerator::with_model(runtime_for(&server), "m");
    assert!(generator
        .generate("hi", &GenerationConfig::default())
        .await
        .is_err());
}

#[tokio::test]
async fn throttled_invoke_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/model/amazon.titan-text-express-v1/invoke"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(serde_json::json!({"message": "slow down"})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/model/amazon.titan-text-express-v1/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"outputText": "ok"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = TitanTextGenerator::new(runtime_for(&server));
    let text = generator
        .generate("QUESTION: what?", &GenerationConfig::default())
        .await
        .unwrap();
    assert_eq!(text, "ok");
}

#[tokio::test]
async fn persistent_server_error_gives_up_after_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/model/amazon.titan-text-express-v1/invoke"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let generator = TitanTextGenerator::new(runtime_for(&server));
    let err = generator
        .generate("QUESTION: what?", &GenerationConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn validation_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/model/amazon.titan-text-express-v1/invoke"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"message": "Malformed input request"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let generator = TitanTextGenerator::new(runtime_for(&server));
    let err = generator
        .generate("QUESTION: what?", &GenerationConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Malformed input request"));
}

use common::Settings;
use forexscope::error::AnalysisError;
use forexscope::llm::remote::RemoteAnalyzer;
use forexscope::llm::{build_prompt, Analyzer};

fn test_settings() -> Settings {
    Settings {
        api_key: "fake-api-key".to_string(),
        model: "gpt-4o-mini".to_string(),
        prompt: "Analyze this:".to_string(),
        ..Default::default()
    }
}

#[test]
fn prompt_is_template_title_content_blank_line_separated() {
    assert_eq!(
        build_prompt("Analyze this:", "EUR/USD climbs", "Euro gains."),
        "Analyze this:\n\nEUR/USD climbs\n\nEuro gains."
    );
}

#[tokio::test]
async fn analyze_sends_prompt_and_returns_first_choice() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer fake-api-key")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [{
                "role": "user",
                "content": "Analyze this:\n\nEUR/USD climbs\n\nEuro gains."
            }]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "model": "gpt-4o-mini",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "Bullish for the euro."
                    },
                    "finish_reason": "stop"
                }]
            }"#,
        )
        .create_async()
        .await;

    let analyzer = RemoteAnalyzer::new(server.url(), &test_settings());
    let result = analyzer.analyze("EUR/USD climbs", "Euro gains.").await;

    assert_eq!(result.expect("analysis"), "Bullish for the euro.");
    mock.assert_async().await;
}

#[tokio::test]
async fn zero_choices_yields_empty_analysis() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"model": "gpt-4o-mini", "choices": []}"#)
        .create_async()
        .await;

    let analyzer = RemoteAnalyzer::new(server.url(), &test_settings());
    let result = analyzer.analyze("title", "content").await;

    assert_eq!(result.expect("analysis"), "");
}

#[tokio::test]
async fn api_error_is_reported_with_status_and_body() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"message": "Rate limit exceeded"}}"#)
        .create_async()
        .await;

    let analyzer = RemoteAnalyzer::new(server.url(), &test_settings());
    let err = analyzer.analyze("title", "content").await.unwrap_err();

    match err {
        AnalysisError::Api { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert!(body.contains("Rate limit exceeded"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_response_is_an_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("not json")
        .create_async()
        .await;

    let analyzer = RemoteAnalyzer::new(server.url(), &test_settings());
    let err = analyzer.analyze("title", "content").await.unwrap_err();
    assert!(matches!(err, AnalysisError::Decode(_)));
}

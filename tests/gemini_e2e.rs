use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use weather_ask_service::{GeminiClient, ModelClient, ModelError};

const MODEL_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

#[derive(Clone)]
struct MockGemini {
    replies: Arc<Mutex<Vec<(StatusCode, Value)>>>,
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

impl MockGemini {
    fn new(replies: Vec<(StatusCode, Value)>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Vec<(Option<String>, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

async fn mock_generate(
    State(mock): State<MockGemini>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.requests.lock().unwrap().push((key, body));

    let mut replies = mock.replies.lock().unwrap();
    if replies.is_empty() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "no reply queued"})));
    }
    let (status, reply) = replies.remove(0);
    (status, Json(reply))
}

async fn spawn_mock_gemini(mock: MockGemini) -> String {
    let app = Router::new()
        .route(MODEL_PATH, post(mock_generate))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/v1beta", addr)
}

fn text_reply(text: &str) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        }),
    )
}

fn weather_call_reply(location: &str) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{
                    "functionCall": {"name": "get_current_weather", "args": {"location": location}}
                }]},
                "finishReason": "STOP"
            }]
        }),
    )
}

#[tokio::test]
async fn e2e_text_answer_is_returned() {
    let mock = MockGemini::new(vec![text_reply("It's sunny.")]);
    let base_url = spawn_mock_gemini(mock.clone()).await;
    let client = GeminiClient::new("test-key", "gemini-2.0-flash", &base_url);

    let answer = client.generate("What's the weather in Paris?").await.unwrap();

    assert_eq!(answer, "It's sunny.");
    let requests = mock.requests();
    assert_eq!(requests.len(), 1);

    let (key, body) = &requests[0];
    assert_eq!(key.as_deref(), Some("test-key"));
    assert_eq!(body["contents"][0]["parts"][0]["text"], "What's the weather in Paris?");
    assert_eq!(
        body["systemInstruction"]["parts"][0]["text"],
        "You are a helpful assistant"
    );
    assert_eq!(
        body["tools"][0]["functionDeclarations"][0]["name"],
        "get_current_weather"
    );
}

#[tokio::test]
async fn e2e_function_call_round_trip() {
    let mock = MockGemini::new(vec![
        weather_call_reply("Paris"),
        text_reply("It is 23C in Paris."),
    ]);
    let base_url = spawn_mock_gemini(mock.clone()).await;
    let client = GeminiClient::new("test-key", "gemini-2.0-flash", &base_url);

    let answer = client.generate("What's the weather in Paris?").await.unwrap();

    assert_eq!(answer, "It is 23C in Paris.");
    let requests = mock.requests();
    assert_eq!(requests.len(), 2);

    let contents = requests[1].1["contents"].as_array().unwrap().clone();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(
        contents[1]["parts"][0]["functionCall"]["name"],
        "get_current_weather"
    );
    assert_eq!(contents[2]["role"], "user");
    assert_eq!(
        contents[2]["parts"][0]["functionResponse"],
        json!({"name": "get_current_weather", "response": {"result": "23C"}})
    );
}

#[tokio::test]
async fn e2e_declaration_only_mode_skips_tool_execution() {
    let mock = MockGemini::new(vec![weather_call_reply("Paris")]);
    let base_url = spawn_mock_gemini(mock.clone()).await;
    let client = GeminiClient::new("test-key", "gemini-2.0-flash", &base_url)
        .with_auto_function_calling(false);

    let answer = client.generate("What's the weather in Paris?").await.unwrap();

    assert_eq!(answer, "");
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test]
async fn e2e_tool_rounds_are_bounded() {
    let mock = MockGemini::new(vec![
        weather_call_reply("Paris"),
        weather_call_reply("Paris"),
        weather_call_reply("Paris"),
    ]);
    let base_url = spawn_mock_gemini(mock.clone()).await;
    let client = GeminiClient::new("test-key", "gemini-2.0-flash", &base_url)
        .with_max_tool_rounds(2);

    let err = client.generate("loop forever").await.unwrap_err();

    assert!(matches!(err, ModelError::ToolRoundsExceeded(2)));
    assert_eq!(mock.requests().len(), 3);
}

#[tokio::test]
async fn e2e_upstream_error_status_is_surfaced() {
    let mock = MockGemini::new(vec![(
        StatusCode::FORBIDDEN,
        json!({"error": {"code": 403, "message": "API key not valid"}}),
    )]);
    let base_url = spawn_mock_gemini(mock).await;
    let client = GeminiClient::new("bad-key", "gemini-2.0-flash", &base_url);

    match client.generate("hi").await {
        Err(ModelError::Status { status, body }) => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert!(body.contains("API key not valid"));
        }
        other => panic!("expected Status error, got {other:?}"),
    }
}

#[tokio::test]
async fn e2e_empty_candidates_is_an_error() {
    let mock = MockGemini::new(vec![(StatusCode::OK, json!({"candidates": []}))]);
    let base_url = spawn_mock_gemini(mock).await;
    let client = GeminiClient::new("test-key", "gemini-2.0-flash", &base_url);

    let err = client.generate("hi").await.unwrap_err();

    assert!(matches!(err, ModelError::NoCandidates));
}

#[tokio::test]
async fn e2e_unreachable_api_is_http_error() {
    let client = GeminiClient::new("test-key", "gemini-2.0-flash", "http://127.0.0.1:1/v1beta");

    let err = client.generate("hi").await.unwrap_err();

    assert!(matches!(err, ModelError::Http(_)));
}

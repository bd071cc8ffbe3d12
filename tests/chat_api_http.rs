use httpmock::prelude::*;
use qalamx::chat_api::{ChatClient, ChatConfig, Message, ModelType};
use qalamx::turn::{FieldDelta, TurnPhase};
use serde_json::json;

fn user_messages(prompt: &str) -> Vec<Message> {
    vec![
        Message::new("system", "Be brief."),
        Message::new("user", prompt),
    ]
}

fn ndjson(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&json!({ "message": { "content": chunk }, "done": false }).to_string());
        body.push('\n');
    }
    body.push_str("{\"done\":true}\n");
    body
}

#[tokio::test]
async fn oneshot_returns_first_choice_content() {
    let server = MockServer::start();
    let expected = "Hello from the mock";

    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "choices": [
                    { "message": { "content": expected } }
                ]
            }));
    });

    let config = ChatConfig {
        host: server.base_url(),
        ..ChatConfig::default()
    };
    let client = ChatClient::new(config).unwrap();

    let answer = client
        .oneshot_with_messages(user_messages("Hello?"))
        .await
        .unwrap();

    mock.assert();
    assert_eq!(answer, expected);
}

#[tokio::test]
async fn oneshot_sends_images_as_content_parts() {
    let server = MockServer::start();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .body_contains(r#"{"type":"text","text":"Describe it"}"#)
            .body_contains(
                r#"{"type":"image_url","image_url":{"url":"data:image/png;base64,aGk="}}"#,
            );
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "choices": [
                    { "message": { "content": "A picture." } }
                ]
            }));
    });

    let config = ChatConfig {
        host: server.base_url(),
        ..ChatConfig::default()
    };
    let client = ChatClient::new(config).unwrap();

    let mut message = Message::new("user", "Describe it");
    message.images.push("aGk=".to_string());

    let answer = client.oneshot_with_messages(vec![message]).await.unwrap();

    mock.assert();
    assert_eq!(answer, "A picture.");
}

#[tokio::test]
async fn stream_concatenates_ndjson_chunks() {
    let server = MockServer::start();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body(ndjson(&["Bon", "jour"]));
    });

    let config = ChatConfig {
        host: server.base_url(),
        ..ChatConfig::default()
    };
    let client = ChatClient::new(config).unwrap();

    let mut answer = String::new();
    client
        .stream_with_messages(user_messages("Hello"), |chunk| {
            answer.push_str(chunk);
        })
        .await
        .unwrap();

    mock.assert();
    assert_eq!(answer, "Bonjour");
}

#[tokio::test]
async fn stream_turn_splits_trace_across_chunk_boundaries() {
    let server = MockServer::start();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body(ndjson(&[
                "<thin",
                "king>step 1",
                "step 2</thi",
                "nking>The answer",
                " is 42.",
            ]));
    });

    let config = ChatConfig {
        host: server.base_url(),
        ..ChatConfig::for_model(ModelType::Pro)
    };
    let client = ChatClient::new(config).unwrap();

    let mut thinking_flags = Vec::new();
    let mut appended_content = String::new();
    let finished = client
        .stream_turn(user_messages("What is 6 x 7?"), |result, delta| {
            thinking_flags.push(result.is_thinking);
            if let FieldDelta::Append(text) = &delta.content {
                appended_content.push_str(text);
            }
        })
        .await
        .unwrap();

    mock.assert();
    assert_eq!(thinking_flags, vec![false, true, true, false, false]);
    assert!(finished.is_complete());
    assert_eq!(finished.phase(), TurnPhase::Done);
    assert_eq!(finished.result.thinking.as_deref(), Some("step 1step 2"));
    assert_eq!(finished.result.content, "The answer is 42.");
    assert_eq!(appended_content, "The answer is 42.");
}

#[tokio::test]
async fn stream_turn_reports_unclosed_trace() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body(ndjson(&["<thinking>", "still ", "going"]));
    });

    let config = ChatConfig {
        host: server.base_url(),
        ..ChatConfig::default()
    };
    let client = ChatClient::new(config).unwrap();

    let finished = client
        .stream_turn(user_messages("Think forever"), |_result, _delta| {})
        .await
        .unwrap();

    assert!(!finished.is_complete());
    assert!(finished.result.is_thinking);
    assert_eq!(finished.result.thinking.as_deref(), Some("still going"));
    assert_eq!(finished.result.content, "");
}

#[tokio::test]
async fn stream_turn_folds_native_thinking_field() {
    let server = MockServer::start();
    let body = concat!(
        "{\"message\":{\"content\":\"\",\"thinking\":\"weigh \"},\"done\":false}\n",
        "{\"message\":{\"content\":\"\",\"thinking\":\"options\"},\"done\":false}\n",
        "{\"message\":{\"content\":\"Pick B.\"},\"done\":false}\n",
        "{\"done\":true}\n"
    );

    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body(body);
    });

    let config = ChatConfig {
        host: server.base_url(),
        reasoning_effort: Some("low".to_string()),
        ..ChatConfig::default()
    };
    let client = ChatClient::new(config).unwrap();

    let finished = client
        .stream_turn(user_messages("A or B?"), |_result, _delta| {})
        .await
        .unwrap();

    assert!(finished.is_complete());
    assert_eq!(finished.result.thinking.as_deref(), Some("weigh options"));
    assert_eq!(finished.result.content, "Pick B.");
    assert_eq!(finished.raw, "<thinking>weigh options</thinking>Pick B.");
}

#[tokio::test]
async fn stream_turn_closes_native_trace_when_stream_ends() {
    let server = MockServer::start();
    let body = concat!(
        "{\"message\":{\"content\":\"\",\"thinking\":\"only a trace\"},\"done\":false}\n",
        "{\"done\":true}\n"
    );

    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body(body);
    });

    let config = ChatConfig {
        host: server.base_url(),
        ..ChatConfig::default()
    };
    let client = ChatClient::new(config).unwrap();

    let finished = client
        .stream_turn(user_messages("?"), |_result, _delta| {})
        .await
        .unwrap();

    assert!(finished.is_complete());
    assert_eq!(finished.result.thinking.as_deref(), Some("only a trace"));
    assert_eq!(finished.result.content, "");
}

#[tokio::test]
async fn stream_sends_generation_options_from_config() {
    let server = MockServer::start();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .body_contains("\"num_predict\":777")
            .body_contains("\"num_ctx\":16384")
            .body_contains("\"keep_alive\":\"5m\"")
            .body_contains("\"think\":\"high\"")
            .body_contains("\"stop\":[\"<END>\"]");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body("{\"done\":true}\n");
    });

    let config = ChatConfig {
        host: server.base_url(),
        max_tokens: 777,
        num_ctx: Some(16384),
        keep_alive: Some("5m".to_string()),
        reasoning_effort: Some("high".to_string()),
        stop: vec!["<END>".to_string()],
        ..ChatConfig::default()
    };
    let client = ChatClient::new(config).unwrap();

    client
        .stream_with_messages(user_messages("Test"), |_chunk| {})
        .await
        .unwrap();

    mock.assert();
}

#[tokio::test]
async fn stream_surfaces_http_errors() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(404).body("model not found");
    });

    let config = ChatConfig {
        host: server.base_url(),
        ..ChatConfig::default()
    };
    let client = ChatClient::new(config).unwrap();

    let err = client
        .stream_turn(user_messages("Hi"), |_result, _delta| {})
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("404"), "{message}");
    assert!(message.contains("model not found"), "{message}");
}

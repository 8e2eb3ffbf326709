use docbot_channels::{Messenger, TelegramMessenger};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123456:TEST-token";

fn messenger_for(server: &MockServer) -> TelegramMessenger {
    TelegramMessenger::new(TOKEN)
        .with_api_url(&server.uri())
        .unwrap()
}

#[tokio::test]
async fn send_text_posts_send_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"(?i)^/bot123456:TEST-token/sendmessage$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": {
                "message_id": 10,
                "date": 1_700_000_000,
                "chat": {"id": 42, "type": "private", "first_name": "Ana"},
                "text": "hello"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    messenger_for(&server).send_text(42, "hello").await.unwrap();
}

#[tokio::test]
async fn send_text_surfaces_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let err = messenger_for(&server).send_text(42, "hi").await.unwrap_err();
    assert!(err.to_string().contains("chat 42"));
}

#[tokio::test]
async fn probe_reads_get_me() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"(?i)^/bot123456:TEST-token/getme$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": {
                "id": 123456,
                "is_bot": true,
                "first_name": "Docbot",
                "username": "docbot_test_bot",
                "can_join_groups": true,
                "can_read_all_group_messages": false,
                "supports_inline_queries": false,
                "can_connect_to_business": false,
                "has_main_web_app": false
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let identity = messenger_for(&server).probe().await.unwrap();
    assert_eq!(identity.id, 123456);
    assert_eq!(identity.username.as_deref(), Some("docbot_test_bot"));
}

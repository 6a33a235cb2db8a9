//! Telegram notifier against a mock Bot API

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dca_sentinel::config::TelegramConfig;
use dca_sentinel::notify::TelegramNotifier;
use dca_sentinel::{DcaError, Notifier};

fn notifier(server: &MockServer) -> TelegramNotifier {
    let config = TelegramConfig {
        bot_token: "123:abc".into(),
        chat_id: "-1001".into(),
        api_url: server.uri(),
    };
    TelegramNotifier::new(&config, Duration::from_secs(5)).expect("Failed to create notifier")
}

#[tokio::test]
async fn test_send_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": "-1001",
            "text": "*DCA SESSION - HOLD*",
            "parse_mode": "Markdown"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 1}})))
        .expect(1)
        .mount(&server)
        .await;

    tokio_test::assert_ok!(notifier(&server).notify("*DCA SESSION - HOLD*").await);
}

#[tokio::test]
async fn test_api_rejection_is_a_notification_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: can't parse entities"
        })))
        .mount(&server)
        .await;

    let err = notifier(&server).notify("*unbalanced").await.unwrap_err();

    match err {
        DcaError::Notification(message) => assert!(message.contains("can't parse entities"), "{}", message),
        other => panic!("expected notification error, got {:?}", other),
    }
}

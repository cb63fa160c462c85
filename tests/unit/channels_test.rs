//! Unit tests for channel senders: registry wiring, payload formatting and
//! permanent-error validation paths. Network delivery itself is out of
//! scope here; classification of live failures is covered by the senders'
//! own modules.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use alertpipe::channels::{
    ChannelRegistry, ChannelSender, ChatSender, EmailSender, NotificationPayload, SendError,
    WebhookSender,
};
use alertpipe::config::{ChannelConfig, SmtpConfig};
use alertpipe::models::EndpointType;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

fn payload() -> NotificationPayload {
    NotificationPayload {
        notification_id: Uuid::new_v4(),
        tenant_id: "t4".to_string(),
        alert_id: "a4".to_string(),
        severity: "HIGH".to_string(),
        source: "api".to_string(),
        name: "timeout".to_string(),
        context: serde_json::json!({"region": "eu-1"}),
        rule_ids: vec!["r5".to_string(), "r6".to_string()],
        created_at: Utc::now(),
    }
}

fn channel_config() -> ChannelConfig {
    ChannelConfig {
        smtp: SmtpConfig {
            host: Some("smtp.example.com".to_string()),
            port: 587,
            username: None,
            password: None,
            from_address: "alerts@alertpipe.local".to_string(),
        },
        webhook_secret: Some("secret".to_string()),
        http_timeout: std::time::Duration::from_secs(30),
    }
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn standard_registry_covers_all_endpoint_types() {
    let registry = ChannelRegistry::standard(&channel_config()).unwrap();
    assert!(registry.get(EndpointType::Email).is_some());
    assert!(registry.get(EndpointType::Webhook).is_some());
    assert!(registry.get(EndpointType::Chat).is_some());
}

#[tokio::test]
async fn registered_sender_is_the_one_invoked() {
    struct Counting(Arc<AtomicU32>);

    #[async_trait]
    impl ChannelSender for Counting {
        async fn send(&self, _: &str, _: &NotificationPayload) -> Result<(), SendError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let calls = Arc::new(AtomicU32::new(0));
    let registry = ChannelRegistry::empty()
        .with_sender(EndpointType::Webhook, Arc::new(Counting(calls.clone())));

    let sender = registry.get(EndpointType::Webhook).unwrap();
    sender.send("https://h.x.com/a", &payload()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(registry.get(EndpointType::Email).is_none());
}

// =============================================================================
// Permanent validation failures (no network involved)
// =============================================================================

#[tokio::test]
async fn email_rejects_empty_and_malformed_recipients() {
    let sender = EmailSender::new(channel_config().smtp);

    for recipient in ["", "   ", "not-an-address", "@half"] {
        match sender.send(recipient, &payload()).await {
            Err(SendError::Permanent(_)) => {}
            other => panic!("recipient '{}': expected permanent, got {:?}", recipient, other),
        }
    }
}

#[tokio::test]
async fn webhook_rejects_invalid_urls_without_sending() {
    let client = reqwest::Client::new();
    let sender = WebhookSender::new(client, None);

    for target in ["", "not-a-url", "ftp://h.x.com/a"] {
        match sender.send(target, &payload()).await {
            Err(SendError::Permanent(_)) => {}
            other => panic!("url '{}': expected permanent, got {:?}", target, other),
        }
    }
}

#[tokio::test]
async fn chat_rejects_invalid_urls_without_sending() {
    let sender = ChatSender::new(reqwest::Client::new());

    match sender.send("gopher://chat", &payload()).await {
        Err(SendError::Permanent(detail)) => assert!(detail.contains("HTTP or HTTPS")),
        other => panic!("expected permanent, got {:?}", other),
    }
}

// =============================================================================
// Error classification surface
// =============================================================================

#[test]
fn transient_and_permanent_are_distinguishable() {
    assert!(SendError::Transient("timeout".to_string()).is_transient());
    assert!(!SendError::Permanent("bad address".to_string()).is_transient());
}

//! Unit tests for the wire contract of the pipeline topics.

use alertpipe::error::PipelineError;
use alertpipe::events::{
    AlertEvent, MatchedEvent, ReadyEvent, RuleAction, RuleChangedEvent, SCHEMA_VERSION,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use uuid::Uuid;

fn alert() -> AlertEvent {
    AlertEvent {
        alert_id: "a1".to_string(),
        event_ts: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
        severity: "HIGH".to_string(),
        source: "api".to_string(),
        name: "timeout".to_string(),
        context: HashMap::from([("host".to_string(), "web-3".to_string())]),
        schema_version: SCHEMA_VERSION,
    }
}

#[test]
fn every_payload_type_round_trips() {
    let alert = alert();
    assert_eq!(AlertEvent::decode(&alert.encode().unwrap()).unwrap(), alert);

    let matched = MatchedEvent {
        alert_id: alert.alert_id.clone(),
        tenant_id: "t1".to_string(),
        rule_ids: vec!["r1".to_string()],
        severity: alert.severity.clone(),
        source: alert.source.clone(),
        name: alert.name.clone(),
        context: alert.context.clone(),
        event_ts: alert.event_ts,
        schema_version: SCHEMA_VERSION,
    };
    assert_eq!(
        MatchedEvent::decode(&matched.encode().unwrap()).unwrap(),
        matched
    );

    let ready = ReadyEvent {
        notification_id: Uuid::new_v4(),
        tenant_id: "t1".to_string(),
        alert_id: alert.alert_id.clone(),
        schema_version: SCHEMA_VERSION,
    };
    assert_eq!(ReadyEvent::decode(&ready.encode().unwrap()).unwrap(), ready);

    let changed = RuleChangedEvent {
        rule_id: "r1".to_string(),
        tenant_id: "t1".to_string(),
        action: RuleAction::Updated,
        version: 7,
        updated_at: alert.event_ts,
        schema_version: SCHEMA_VERSION,
    };
    assert_eq!(
        RuleChangedEvent::decode(&changed.encode().unwrap()).unwrap(),
        changed
    );
}

#[test]
fn decode_rejects_future_schema_versions() {
    let mut event = alert();
    event.schema_version = SCHEMA_VERSION + 1;
    let payload = serde_json::to_vec(&event).unwrap();

    match AlertEvent::decode(&payload) {
        Err(PipelineError::UnknownSchema(version)) => assert_eq!(version, SCHEMA_VERSION + 1),
        other => panic!("expected UnknownSchema, got {:?}", other),
    }
}

#[test]
fn decode_treats_garbage_as_poison() {
    for garbage in [&b"\x00\x01\x02"[..], b"{}", b"[1,2,3]", b""] {
        let err = MatchedEvent::decode(garbage).unwrap_err();
        assert!(err.is_poison(), "{:?} should be poison", garbage);
    }
}

#[test]
fn rule_actions_parse_from_their_wire_tags() {
    for (tag, action) in [
        ("CREATED", RuleAction::Created),
        ("UPDATED", RuleAction::Updated),
        ("DELETED", RuleAction::Deleted),
        ("DISABLED", RuleAction::Disabled),
    ] {
        let raw = format!(
            "{{\"rule_id\":\"r1\",\"tenant_id\":\"t1\",\"action\":\"{}\",\"version\":1,\
             \"updated_at\":\"2026-01-05T10:00:00Z\",\"schema_version\":{}}}",
            tag, SCHEMA_VERSION
        );
        let event = RuleChangedEvent::decode(raw.as_bytes()).unwrap();
        assert_eq!(event.action, action);
    }
}

#[test]
fn unknown_rule_action_is_poison() {
    let raw = format!(
        "{{\"rule_id\":\"r1\",\"tenant_id\":\"t1\",\"action\":\"EXPLODED\",\"version\":1,\
         \"updated_at\":\"2026-01-05T10:00:00Z\",\"schema_version\":{}}}",
        SCHEMA_VERSION
    );
    assert!(RuleChangedEvent::decode(raw.as_bytes())
        .unwrap_err()
        .is_poison());
}

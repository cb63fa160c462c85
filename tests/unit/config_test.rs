//! Unit tests for configuration parsing
//!
//! Note: These tests modify global environment variables and must run serially.

use std::time::Duration;

use alertpipe::config::{
    BrokerConfig, BuilderConfig, CacheConfig, Config, MatcherConfig, RetryConfig, TopicsConfig,
};
use serial_test::serial;

fn clear_pipeline_env() {
    for key in [
        "PIPELINE_COMPONENTS",
        "KAFKA_BROKERS",
        "KAFKA_GROUP_ID",
        "KAFKA_SESSION_TIMEOUT_SECS",
        "KAFKA_WRITE_TIMEOUT_SECS",
        "KAFKA_DEAD_LETTER_TOPIC",
        "TOPIC_ALERTS",
        "TOPIC_MATCHED",
        "TOPIC_READY",
        "TOPIC_RULE_CHANGED",
        "CACHE_URL",
        "CACHE_SNAPSHOT_KEY",
        "CACHE_VERSION_KEY",
        "DATABASE_URL",
        "BUILDER_REBUILD_THRESHOLD",
        "MATCHER_POLL_INTERVAL_SECS",
        "RETRY_MAX_RETRIES",
        "RETRY_BASE_DELAY_MS",
        "RETRY_MAX_DELAY_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn topics_default_to_the_standard_names() {
    clear_pipeline_env();

    let topics = TopicsConfig::from_env();
    assert_eq!(topics.alerts, "alerts.new");
    assert_eq!(topics.matched, "alerts.matched");
    assert_eq!(topics.ready, "notifications.ready");
    assert_eq!(topics.rule_changed, "rule.changed");
}

#[test]
#[serial]
fn cache_defaults_are_local() {
    clear_pipeline_env();

    let cache = CacheConfig::from_env();
    assert_eq!(cache.url, "redis://127.0.0.1:6379");
    assert_eq!(cache.snapshot_key, "alertpipe:snapshot");
    assert_eq!(cache.version_key, "alertpipe:snapshot:version");
}

#[test]
#[serial]
fn retry_defaults_match_the_documented_budget() {
    clear_pipeline_env();

    let retry = RetryConfig::from_env();
    assert_eq!(retry.max_retries, 3);
    assert_eq!(retry.base_delay, Duration::from_millis(100));
    assert_eq!(retry.max_delay, Duration::from_millis(5000));
}

#[test]
#[serial]
fn retry_overrides_are_honored() {
    clear_pipeline_env();
    std::env::set_var("RETRY_MAX_RETRIES", "7");
    std::env::set_var("RETRY_BASE_DELAY_MS", "250");

    let retry = RetryConfig::from_env();
    assert_eq!(retry.max_retries, 7);
    assert_eq!(retry.base_delay, Duration::from_millis(250));

    clear_pipeline_env();
}

#[test]
#[serial]
fn builder_and_matcher_defaults() {
    clear_pipeline_env();

    assert_eq!(BuilderConfig::from_env().rebuild_threshold, 5);
    assert_eq!(
        MatcherConfig::from_env().poll_interval,
        Duration::from_secs(5)
    );
}

#[test]
#[serial]
fn broker_config_requires_the_broker_list() {
    clear_pipeline_env();
    assert!(BrokerConfig::from_env().is_err());

    std::env::set_var("KAFKA_BROKERS", "kafka-1:9092,kafka-2:9092");
    let broker = BrokerConfig::from_env().unwrap();
    assert_eq!(broker.brokers, "kafka-1:9092,kafka-2:9092");
    assert_eq!(broker.group_id, "alertpipe");
    assert!(broker.dead_letter_topic.is_none());

    clear_pipeline_env();
}

#[test]
#[serial]
fn full_config_requires_broker_and_database() {
    clear_pipeline_env();
    assert!(Config::from_env().is_err());

    std::env::set_var("KAFKA_BROKERS", "kafka-1:9092");
    assert!(Config::from_env().is_err());

    std::env::set_var("DATABASE_URL", "postgres://localhost/alertpipe");
    let config = Config::from_env().unwrap();
    assert_eq!(config.components.len(), 4);

    clear_pipeline_env();
}

#[test]
#[serial]
fn component_selection_narrows_the_process() {
    clear_pipeline_env();
    std::env::set_var("KAFKA_BROKERS", "kafka-1:9092");
    std::env::set_var("DATABASE_URL", "postgres://localhost/alertpipe");
    std::env::set_var("PIPELINE_COMPONENTS", "matcher");

    let config = Config::from_env().unwrap();
    assert_eq!(config.components.len(), 1);

    std::env::set_var("PIPELINE_COMPONENTS", "builder,unknown");
    assert!(Config::from_env().is_err());

    clear_pipeline_env();
}

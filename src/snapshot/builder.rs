//! Snapshot builder: projects the rule table into the shared cache.
//!
//! State machine with two states. INITIALIZING takes a consistent read of the
//! rule store, builds the full projection and publishes it. STEADY consumes
//! rule-changed events and applies them incrementally, bumping the version
//! after every successful apply and committing the offset only once the cache
//! write stuck. A run of failed applies forces a transition back to
//! INITIALIZING.
//!
//! At most ONE builder instance may run at a time. Two writers racing on the
//! snapshot blob would publish inconsistent projections; deploy exactly one
//! process whose `PIPELINE_COMPONENTS` contains `builder`.

use crate::bus::{message_key, message_payload, BusConsumer, BusProducer};
use crate::cache::SnapshotCache;
use crate::config::{BrokerConfig, BuilderConfig, TopicsConfig};
use crate::db::DbPool;
use crate::error::PipelineResult;
use crate::events::{RuleAction, RuleChangedEvent};
use crate::retry::{self, RetryPolicy};
use crate::shutdown::Shutdown;
use crate::snapshot::WorkingSet;
use crate::store::RuleStore;

enum SteadyExit {
    Shutdown,
    Rebuild,
}

/// The C4 process: full rebuild on start, incremental applies thereafter.
pub struct SnapshotBuilder {
    pool: DbPool,
    cache: SnapshotCache,
    producer: BusProducer,
    broker: BrokerConfig,
    topics: TopicsConfig,
    config: BuilderConfig,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl SnapshotBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        cache: SnapshotCache,
        producer: BusProducer,
        broker: BrokerConfig,
        topics: TopicsConfig,
        config: BuilderConfig,
        retry: RetryPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            pool,
            cache,
            producer,
            broker,
            topics,
            config,
            retry,
            shutdown,
        }
    }

    /// Runs until shutdown. Reconnects the rule-changed session on every
    /// rebuild so events that failed to apply are redelivered from the last
    /// committed offset.
    pub async fn run(mut self) -> PipelineResult<()> {
        let group_id = format!("{}-builder", self.broker.group_id);

        while !self.shutdown.is_triggered() {
            // INITIALIZING
            let mut working = match self.rebuild().await {
                Ok(working) => working,
                Err(e) if e.is_transient() => {
                    log::warn!(
                        "Full rebuild failed, retrying in {:?}: {}",
                        self.config.rebuild_backoff,
                        e
                    );
                    let backoff = self.config.rebuild_backoff;
                    tokio::select! {
                        _ = self.shutdown.triggered() => break,
                        _ = tokio::time::sleep(backoff) => continue,
                    }
                }
                Err(e) => return Err(e),
            };

            // STEADY
            let consumer =
                BusConsumer::connect(&self.broker, &group_id, &[&self.topics.rule_changed])?;
            match self.steady(&mut working, &consumer).await? {
                SteadyExit::Shutdown => break,
                SteadyExit::Rebuild => continue,
            }
        }

        log::info!("Snapshot builder drained");
        Ok(())
    }

    /// Takes a consistent read of all enabled rules, builds the projection
    /// and publishes it with a version bump.
    async fn rebuild(&self) -> PipelineResult<WorkingSet> {
        let rules = RuleStore::all_enabled(&self.pool).await?;
        let working = WorkingSet::build(rules);
        working.snapshot().check_invariants()?;

        let bytes = working.snapshot().encode()?;
        let version = self.cache.put_snapshot(&bytes).await?;

        log::info!(
            "Published full snapshot: {} rules, version {}",
            working.snapshot().len(),
            version
        );
        Ok(working)
    }

    /// Applies rule-changed events one at a time, committing after each
    /// successful cache write. Exits on shutdown or once consecutive
    /// failures reach the rebuild threshold.
    async fn steady(
        &mut self,
        working: &mut WorkingSet,
        consumer: &BusConsumer,
    ) -> PipelineResult<SteadyExit> {
        let mut failures = 0u32;

        loop {
            let mut shutdown = self.shutdown.clone();
            let message = tokio::select! {
                _ = shutdown.triggered() => return Ok(SteadyExit::Shutdown),
                received = consumer.recv() => received,
            };

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Rule-changed consume error: {}", e);
                    failures += 1;
                    if failures >= self.config.rebuild_threshold {
                        return Ok(SteadyExit::Rebuild);
                    }
                    tokio::time::sleep(self.retry.delay_for(failures)).await;
                    continue;
                }
            };

            let event = match message_payload(&message).and_then(RuleChangedEvent::decode) {
                Ok(event) => event,
                Err(e) => {
                    // Poison: preserve if possible, then commit to unblock
                    // the partition.
                    log::error!(
                        "Dropping malformed rule-changed event (key '{}'): {}",
                        message_key(&message),
                        e
                    );
                    if let Ok(payload) = message_payload(&message) {
                        self.producer
                            .dead_letter(&self.topics.rule_changed, &message_key(&message), payload)
                            .await;
                    }
                    consumer.commit(&message)?;
                    continue;
                }
            };

            match self.apply(working, &event).await {
                Ok(version) => {
                    consumer.commit(&message)?;
                    failures = 0;
                    log::debug!(
                        "Applied {} for rule '{}' (rule version {}), snapshot version {}",
                        event.action,
                        event.rule_id,
                        event.version,
                        version
                    );
                }
                Err(e) => {
                    // Not committed: after the forced rebuild the session
                    // reconnects and redelivers from the last commit.
                    failures += 1;
                    log::warn!(
                        "Failed to apply {} for rule '{}' ({} consecutive): {}",
                        event.action,
                        event.rule_id,
                        failures,
                        e
                    );
                    if failures >= self.config.rebuild_threshold {
                        log::warn!(
                            "{} consecutive apply failures, forcing full rebuild",
                            failures
                        );
                        return Ok(SteadyExit::Rebuild);
                    }
                    tokio::time::sleep(self.retry.delay_for(failures)).await;
                }
            }
        }
    }

    /// One incremental apply: mutate the working set, then publish the new
    /// blob atomically with the version bump.
    ///
    /// The in-memory mutation is idempotent (upsert replaces, remove of a
    /// missing rule is a no-op), so a retry after a failed cache write simply
    /// re-publishes the already-mutated state.
    async fn apply(
        &self,
        working: &mut WorkingSet,
        event: &RuleChangedEvent,
    ) -> PipelineResult<u64> {
        match event.action {
            RuleAction::Created | RuleAction::Updated => {
                let rule = retry::with_backoff(
                    &self.retry,
                    "rule store read",
                    || RuleStore::get_by_id(&self.pool, &event.rule_id),
                    |e| e.is_transient(),
                )
                .await?;

                match rule {
                    Some(rule) if rule.is_enabled => working.upsert(&rule),
                    // Disabled or already deleted underneath us: converge by
                    // removing; the follow-up event is then a no-op.
                    _ => working.remove(&event.rule_id),
                }
            }
            RuleAction::Deleted | RuleAction::Disabled => working.remove(&event.rule_id),
        }

        let bytes = working.snapshot().encode()?;
        let cache = &self.cache;
        retry::with_backoff(
            &self.retry,
            "snapshot publish",
            || cache.put_snapshot(&bytes),
            |e| e.is_transient(),
        )
        .await
    }
}

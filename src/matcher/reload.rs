//! Hot reload of the matcher index.
//!
//! The live index sits behind an atomic pointer. Readers load the pointer
//! once per alert and keep their reference for the duration of the match;
//! the reloader builds a replacement off-path and swaps it in. A swap never
//! blocks in-flight matches, and the old index is dropped once the last
//! reader releases it.
//!
//! Two triggers detect a newer snapshot: a periodic version poll against the
//! cache, and a push from the rule-changed topic that shortens the detection
//! tail between polls.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bus::BusConsumer;
use crate::cache::SnapshotCache;
use crate::config::{BrokerConfig, MatcherConfig, TopicsConfig};
use crate::error::PipelineResult;
use crate::matcher::MatchIndex;
use crate::shutdown::Shutdown;
use crate::snapshot::Snapshot;

/// Shared handle to the live index.
#[derive(Clone)]
pub struct IndexHandle {
    current: Arc<ArcSwap<MatchIndex>>,
}

impl IndexHandle {
    /// Starts with an empty index; matches nothing until the first load.
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(MatchIndex::empty())),
        }
    }

    /// Takes a reference to the current index for one match operation.
    pub fn load(&self) -> Arc<MatchIndex> {
        self.current.load_full()
    }

    /// Publishes a replacement index. Readers in flight keep their old
    /// reference; new loads see the replacement immediately.
    pub fn swap(&self, index: MatchIndex) {
        self.current.store(Arc::new(index));
    }
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Watches the cache version and swaps the live index when it advances.
pub struct HotReloader {
    cache: SnapshotCache,
    handle: IndexHandle,
    config: MatcherConfig,
    shutdown: Shutdown,
    loaded_version: u64,
}

impl HotReloader {
    pub fn new(
        cache: SnapshotCache,
        handle: IndexHandle,
        config: MatcherConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            cache,
            handle,
            config,
            shutdown,
            loaded_version: 0,
        }
    }

    /// Loads whatever snapshot is currently published. Called once before
    /// the matcher starts consuming; an absent snapshot leaves the empty
    /// index in place rather than failing the boot.
    pub async fn load_initial(&mut self) -> PipelineResult<()> {
        match self.cache.get_snapshot().await? {
            Some((bytes, version)) => self.install(&bytes, version),
            None => {
                log::warn!("No snapshot published yet; matching against an empty index");
                Ok(())
            }
        }
    }

    /// Runs until shutdown, reacting to poll ticks and push nudges.
    pub async fn run(mut self, mut nudges: mpsc::Receiver<()>) -> PipelineResult<()> {
        let mut shutdown = self.shutdown.clone();
        let mut tick = tokio::time::interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut push_open = true;

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = tick.tick() => {}
                nudge = nudges.recv(), if push_open => {
                    if nudge.is_none() {
                        // Push subscription gone; the poll keeps us current.
                        push_open = false;
                        continue;
                    }
                }
            }

            if let Err(e) = self.check_once().await {
                log::warn!("Snapshot reload check failed: {}", e);
            }
        }

        log::info!("Hot reloader drained");
        Ok(())
    }

    /// One detection pass: compare versions, pull and swap when newer.
    async fn check_once(&mut self) -> PipelineResult<()> {
        let published = self.cache.get_version().await?;
        if published <= self.loaded_version {
            return Ok(());
        }

        match self.cache.get_snapshot().await? {
            Some((bytes, version)) if version > self.loaded_version => {
                self.install(&bytes, version)
            }
            _ => Ok(()),
        }
    }

    fn install(&mut self, bytes: &[u8], version: u64) -> PipelineResult<()> {
        let snapshot = Snapshot::decode(bytes)?;
        let index = MatchIndex::from_snapshot(&snapshot);
        log::info!(
            "Swapped in snapshot version {} ({} rules)",
            version,
            index.len()
        );
        self.handle.swap(index);
        self.loaded_version = version;
        Ok(())
    }
}

/// Consumes the rule-changed topic purely as a reload nudge.
///
/// Uses a per-instance consumer group so every matcher replica sees every
/// change; offsets are never committed because missing a nudge only costs
/// one poll interval.
pub async fn nudge_listener(
    broker: BrokerConfig,
    topics: TopicsConfig,
    nudges: mpsc::Sender<()>,
    mut shutdown: Shutdown,
) -> PipelineResult<()> {
    let group_id = format!("{}-reload-{}", broker.group_id, Uuid::new_v4());
    let consumer = BusConsumer::connect(&broker, &group_id, &[&topics.rule_changed])?;

    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            received = consumer.recv() => {
                match received {
                    Ok(_) => {
                        // Full channel means a reload is already pending.
                        let _ = nudges.try_send(());
                    }
                    Err(e) => {
                        log::warn!("Reload subscription error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    Ok(())
}

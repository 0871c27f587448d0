//! Storage collaborator traits.
//!
//! The engine reads versioned snapshots and writes back with
//! compare-and-swap. Implementations decide where the data lives; see
//! [`crate::store::InMemoryStore`] for the reference one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engagement::EngagementEvent;
use crate::model::{AbilityMap, ChapterAbility, ChapterKey};
use crate::weakspot::NodeSnapshot;

/// A value together with the version it was read at.
///
/// Version 0 means the key has never been written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, value: T) -> Self {
        Self { version, value }
    }

    /// A never-written key.
    pub fn absent(value: T) -> Self {
        Self { version: 0, value }
    }
}

/// Per-learner chapter ability persistence.
#[async_trait]
pub trait AbilityStore: Send + Sync {
    /// Load a chapter's ability. Absent chapters return the default prior at
    /// version 0.
    async fn load_chapter(
        &self,
        learner_id: &str,
        chapter: &ChapterKey,
    ) -> anyhow::Result<Versioned<ChapterAbility>>;

    /// Write `next` only if the stored version still equals
    /// `expected_version`. Returns `false` when another writer got there
    /// first.
    async fn compare_and_swap_chapter(
        &self,
        learner_id: &str,
        chapter: &ChapterKey,
        expected_version: u64,
        next: ChapterAbility,
    ) -> anyhow::Result<bool>;

    /// Every chapter the learner has an ability for.
    async fn load_all_chapters(&self, learner_id: &str) -> anyhow::Result<AbilityMap>;
}

/// Per-learner weak-spot node persistence.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Load a node's score and state. Absent nodes are inactive with score 0
    /// at version 0.
    async fn load_node(
        &self,
        learner_id: &str,
        node_id: &str,
    ) -> anyhow::Result<Versioned<NodeSnapshot>>;

    /// Compare-and-swap, as [`AbilityStore::compare_and_swap_chapter`].
    async fn compare_and_swap_node(
        &self,
        learner_id: &str,
        node_id: &str,
        expected_version: u64,
        next: NodeSnapshot,
    ) -> anyhow::Result<bool>;
}

/// Destination for validated engagement events.
#[async_trait]
pub trait EngagementSink: Send + Sync {
    async fn record(&self, event: &EngagementEvent) -> anyhow::Result<()>;
}

//! In-memory store for tests and the CLI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::engagement::EngagementEvent;
use crate::model::{AbilityMap, ChapterAbility, ChapterKey};
use crate::traits::{AbilityStore, EngagementSink, NodeStore, Versioned};
use crate::weakspot::NodeSnapshot;

/// Holds every collaborator contract behind async mutexes.
///
/// Counts lost compare-and-swaps so tests can assert that contention
/// actually happened.
#[derive(Default)]
pub struct InMemoryStore {
    chapters: Mutex<HashMap<(String, ChapterKey), Versioned<ChapterAbility>>>,
    nodes: Mutex<HashMap<(String, String), Versioned<NodeSnapshot>>>,
    events: Mutex<Vec<EngagementEvent>>,
    conflicts: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a learner's abilities, each at version 1.
    pub async fn with_abilities(self, learner_id: &str, abilities: &AbilityMap) -> Self {
        {
            let mut chapters = self.chapters.lock().await;
            for (chapter, ability) in abilities {
                chapters.insert(
                    (learner_id.to_string(), chapter.clone()),
                    Versioned::new(1, *ability),
                );
            }
        }
        self
    }

    /// Seed a node snapshot at version 1.
    pub async fn with_node(self, learner_id: &str, node_id: &str, snapshot: NodeSnapshot) -> Self {
        self.nodes
            .lock()
            .await
            .insert((learner_id.to_string(), node_id.to_string()), Versioned::new(1, snapshot));
        self
    }

    /// Number of compare-and-swaps rejected for a stale version.
    pub fn conflict_count(&self) -> u32 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Events recorded so far, in arrival order.
    pub async fn events(&self) -> Vec<EngagementEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AbilityStore for InMemoryStore {
    async fn load_chapter(
        &self,
        learner_id: &str,
        chapter: &ChapterKey,
    ) -> anyhow::Result<Versioned<ChapterAbility>> {
        let chapters = self.chapters.lock().await;
        Ok(chapters
            .get(&(learner_id.to_string(), chapter.clone()))
            .copied()
            .unwrap_or_else(|| Versioned::absent(ChapterAbility::default())))
    }

    async fn compare_and_swap_chapter(
        &self,
        learner_id: &str,
        chapter: &ChapterKey,
        expected_version: u64,
        next: ChapterAbility,
    ) -> anyhow::Result<bool> {
        let mut chapters = self.chapters.lock().await;
        let key = (learner_id.to_string(), chapter.clone());
        let current = chapters.get(&key).map_or(0, |v| v.version);
        if current != expected_version {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        chapters.insert(key, Versioned::new(current + 1, next));
        Ok(true)
    }

    async fn load_all_chapters(&self, learner_id: &str) -> anyhow::Result<AbilityMap> {
        let chapters = self.chapters.lock().await;
        Ok(chapters
            .iter()
            .filter(|((learner, _), _)| learner == learner_id)
            .map(|((_, chapter), v)| (chapter.clone(), v.value))
            .collect())
    }
}

#[async_trait]
impl NodeStore for InMemoryStore {
    async fn load_node(
        &self,
        learner_id: &str,
        node_id: &str,
    ) -> anyhow::Result<Versioned<NodeSnapshot>> {
        let nodes = self.nodes.lock().await;
        Ok(nodes
            .get(&(learner_id.to_string(), node_id.to_string()))
            .copied()
            .unwrap_or_else(|| Versioned::absent(NodeSnapshot::default())))
    }

    async fn compare_and_swap_node(
        &self,
        learner_id: &str,
        node_id: &str,
        expected_version: u64,
        next: NodeSnapshot,
    ) -> anyhow::Result<bool> {
        let mut nodes = self.nodes.lock().await;
        let key = (learner_id.to_string(), node_id.to_string());
        let current = nodes.get(&key).map_or(0, |v| v.version);
        if current != expected_version {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        nodes.insert(key, Versioned::new(current + 1, next));
        Ok(true)
    }
}

#[async_trait]
impl EngagementSink for InMemoryStore {
    async fn record(&self, event: &EngagementEvent) -> anyhow::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

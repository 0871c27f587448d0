//! Learner engagement events for content capsules and retrieval practice.
//!
//! Only allow-listed event types are accepted; anything else is rejected
//! before it reaches a sink.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// The allow-list of engagement event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementEventType {
    CapsuleDelivered,
    CapsuleOpened,
    CapsuleSaved,
    CapsuleCompleted,
    CapsuleSkipped,
    RetrievalStarted,
    RetrievalCompleted,
}

impl EngagementEventType {
    pub const ALL: [EngagementEventType; 7] = [
        EngagementEventType::CapsuleDelivered,
        EngagementEventType::CapsuleOpened,
        EngagementEventType::CapsuleSaved,
        EngagementEventType::CapsuleCompleted,
        EngagementEventType::CapsuleSkipped,
        EngagementEventType::RetrievalStarted,
        EngagementEventType::RetrievalCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementEventType::CapsuleDelivered => "capsule_delivered",
            EngagementEventType::CapsuleOpened => "capsule_opened",
            EngagementEventType::CapsuleSaved => "capsule_saved",
            EngagementEventType::CapsuleCompleted => "capsule_completed",
            EngagementEventType::CapsuleSkipped => "capsule_skipped",
            EngagementEventType::RetrievalStarted => "retrieval_started",
            EngagementEventType::RetrievalCompleted => "retrieval_completed",
        }
    }
}

impl fmt::Display for EngagementEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngagementEventType {
    type Err = EngineError;

    /// Exact match only; case or whitespace variants are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::InvalidEventType(s.to_string()))
    }
}

/// A validated engagement event, ready for analytics ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub id: Uuid,
    pub learner_id: String,
    pub node_id: String,
    pub event_type: EngagementEventType,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl EngagementEvent {
    /// Validate a raw event type string and build the event.
    pub fn new(
        learner_id: impl Into<String>,
        node_id: impl Into<String>,
        event_type: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let event_type = event_type.parse()?;
        Ok(Self {
            id: Uuid::new_v4(),
            learner_id: learner_id.into(),
            node_id: node_id.into(),
            event_type,
            occurred_at,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

//! Session controller.
//!
//! Reads snapshots from the storage collaborators, runs the pure estimators
//! and writes results back with compare-and-swap. Lost races are retried
//! against a fresh snapshot with exponential backoff.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engagement::EngagementEvent;
use crate::error::StoreError;
use crate::model::{ChapterKey, QuestionItem, ResponseRecord};
use crate::parser::ContentBank;
use crate::report::SessionReport;
use crate::retrieval::{evaluate_retrieval, RetrievalResult};
use crate::selector::{
    adaptive_tolerance, filter_near_ability, select_session, AnswerHistory, SelectedQuestion,
    SelectionRequest,
};
use crate::theta::{
    calculate_chapter_theta_update, calculate_subject_and_overall_theta_update,
    ChapterThetaUpdate, ScoredResponse,
};
use crate::traits::{AbilityStore, EngagementSink, NodeStore};
use crate::weakspot::{evaluate_node, AtlasNode, NodeEvaluation};

/// Upper bound on the backoff between conflicting writes.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

/// One batch of answers to apply for a learner.
#[derive(Debug, Clone, Default)]
pub struct SessionInput {
    pub learner_id: String,
    pub responses: Vec<ResponseRecord>,
    /// Node id → recurrence in [0, 1]. Missing nodes count as 0.
    pub recurrence: BTreeMap<String, f64>,
}

/// The questions chosen for a learner's next session in one chapter.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub chapter: ChapterKey,
    pub theta: f64,
    /// Distance from theta a question may sit and still count as near.
    pub tolerance: f64,
    /// Questions in the chapter before filtering.
    pub candidates: usize,
    /// The near-ability filter left nothing, so the whole chapter was used.
    pub widened: bool,
    pub questions: Vec<SelectedQuestion>,
}

/// Applies sessions, retrievals and engagement events for one content bank.
pub struct AssessmentEngine {
    content: Arc<ContentBank>,
    questions: HashMap<String, QuestionItem>,
    abilities: Arc<dyn AbilityStore>,
    nodes: Arc<dyn NodeStore>,
    engagement: Arc<dyn EngagementSink>,
    config: EngineConfig,
}

impl AssessmentEngine {
    pub fn new(
        content: Arc<ContentBank>,
        abilities: Arc<dyn AbilityStore>,
        nodes: Arc<dyn NodeStore>,
        engagement: Arc<dyn EngagementSink>,
        config: EngineConfig,
    ) -> Self {
        let questions = content.question_index();
        Self {
            content,
            questions,
            abilities,
            nodes,
            engagement,
            config,
        }
    }

    /// Build an engine whose three collaborators are the same store.
    pub fn with_store<S>(content: Arc<ContentBank>, store: Arc<S>, config: EngineConfig) -> Self
    where
        S: AbilityStore + NodeStore + EngagementSink + 'static,
    {
        Self::new(content, store.clone(), store.clone(), store, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn content(&self) -> &ContentBank {
        &self.content
    }

    /// Choose the next session's questions for one chapter.
    ///
    /// Questions near the learner's ability are preferred; when none are
    /// near, the whole chapter is used so a session is never empty for lack
    /// of matching difficulty.
    pub async fn plan_session(
        &self,
        learner_id: &str,
        chapter: &ChapterKey,
        history: &[ResponseRecord],
    ) -> Result<SessionPlan> {
        let ability = self
            .abilities
            .load_chapter(learner_id, chapter)
            .await
            .with_context(|| format!("failed to load ability for {chapter}"))?;
        let theta = ability.value.theta;

        let pool = self.content.questions_in(chapter);
        let near = filter_near_ability(&pool, theta);
        let widened = near.is_empty() && !pool.is_empty();
        let candidates = if widened { &pool } else { &near };

        let history = AnswerHistory::from_responses(history);
        let questions = select_session(
            candidates,
            &history,
            SelectionRequest {
                count: self.config.session_size,
                theta: Some(theta),
            },
        );

        tracing::info!(
            learner = learner_id,
            chapter = %chapter,
            theta,
            pool = pool.len(),
            near = near.len(),
            selected = questions.len(),
            widened,
            "session planned"
        );

        Ok(SessionPlan {
            chapter: chapter.clone(),
            theta,
            tolerance: adaptive_tolerance(pool.len()),
            candidates: pool.len(),
            widened,
            questions,
        })
    }

    /// Apply a batch of responses: chapter abilities, then weak-spot nodes,
    /// then a fresh subject and overall rollup.
    pub async fn record_session(&self, input: &SessionInput) -> Result<SessionReport> {
        let start = Instant::now();
        let learner = input.learner_id.as_str();

        // Group by the bank's chapter for each question
        let mut by_chapter: BTreeMap<ChapterKey, Vec<ScoredResponse>> = BTreeMap::new();
        let mut skipped = 0usize;
        for response in &input.responses {
            match self.questions.get(&response.question_id) {
                Some(question) => by_chapter
                    .entry(question.chapter.clone())
                    .or_default()
                    .push(ScoredResponse {
                        params: question.effective_params(),
                        is_correct: response.is_correct,
                    }),
                None => {
                    tracing::warn!(
                        learner,
                        question_id = %response.question_id,
                        "response references unknown question, skipping"
                    );
                    skipped += 1;
                }
            }
        }

        let chapter_updates: BTreeMap<ChapterKey, ChapterThetaUpdate> =
            try_join_all(by_chapter.iter().map(|(chapter, scored)| async move {
                let update = self.update_chapter(learner, chapter, scored).await?;
                Ok::<_, anyhow::Error>((chapter.clone(), update))
            }))
            .await?
            .into_iter()
            .collect();

        let touched: Vec<&AtlasNode> = self
            .content
            .nodes
            .iter()
            .filter(|node| self.node_touched(node, &input.responses))
            .collect();
        let weak_spots = try_join_all(touched.into_iter().map(|node| {
            let recurrence = input.recurrence.get(&node.id).copied().unwrap_or(0.0);
            self.update_node(learner, node, &input.responses, recurrence)
        }))
        .await?;

        let abilities = self
            .abilities
            .load_all_chapters(learner)
            .await
            .context("failed to load abilities for rollup")?;
        let rollup =
            calculate_subject_and_overall_theta_update(&abilities, &self.content.chapter_weights);

        let triggered = weak_spots.iter().filter(|e| e.triggered).count();
        tracing::info!(
            learner,
            responses = input.responses.len(),
            skipped,
            chapters = chapter_updates.len(),
            nodes = weak_spots.len(),
            triggered,
            overall_theta = rollup.overall.theta,
            "session recorded"
        );

        Ok(SessionReport {
            id: Uuid::new_v4(),
            learner_id: learner.to_string(),
            created_at: Utc::now(),
            responses: input.responses.len(),
            skipped_responses: skipped,
            chapter_updates,
            rollup,
            weak_spots,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Apply a retrieval quiz result to one of the learner's nodes.
    pub async fn record_retrieval(
        &self,
        learner_id: &str,
        node_id: &str,
        correct: u32,
        total: u32,
    ) -> Result<RetrievalResult> {
        let node = self
            .content
            .node(node_id)
            .with_context(|| format!("unknown node: {node_id}"))?;
        let policy = self.config.retrieval.policy();

        let result = self
            .retry_on_conflict(format!("{learner_id}/{node_id}"), move || async move {
                let current = self.nodes.load_node(learner_id, node_id).await?;
                let result =
                    evaluate_retrieval(current.value, correct, total, &node.thresholds, &policy)?;
                let written = self
                    .nodes
                    .compare_and_swap_node(learner_id, node_id, current.version, result.next)
                    .await?;
                Ok(written.then_some(result))
            })
            .await?;

        tracing::info!(
            learner = learner_id,
            node = node_id,
            passed = result.passed,
            score = result.next.score,
            state = %result.next.state,
            "retrieval recorded"
        );
        Ok(result)
    }

    /// Validate and record an engagement event. Unknown event types never
    /// reach the sink.
    pub async fn log_engagement(
        &self,
        learner_id: &str,
        node_id: &str,
        event_type: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<EngagementEvent> {
        let event = EngagementEvent::new(learner_id, node_id, event_type, occurred_at)?;
        self.engagement
            .record(&event)
            .await
            .with_context(|| format!("failed to record {} event", event.event_type))?;
        tracing::debug!(learner = learner_id, node = node_id, event = %event.event_type, "engagement logged");
        Ok(event)
    }

    async fn update_chapter(
        &self,
        learner_id: &str,
        chapter: &ChapterKey,
        scored: &[ScoredResponse],
    ) -> Result<ChapterThetaUpdate> {
        self.retry_on_conflict(format!("{learner_id}/{chapter}"), move || async move {
            let current = self.abilities.load_chapter(learner_id, chapter).await?;
            let update =
                calculate_chapter_theta_update(&current.value, scored, self.config.learning_rate);
            let written = self
                .abilities
                .compare_and_swap_chapter(learner_id, chapter, current.version, update.ability)
                .await?;
            Ok(written.then_some(update))
        })
        .await
    }

    async fn update_node(
        &self,
        learner_id: &str,
        node: &AtlasNode,
        responses: &[ResponseRecord],
        recurrence: f64,
    ) -> Result<NodeEvaluation> {
        self.retry_on_conflict(format!("{learner_id}/{}", node.id), move || async move {
            let current = self.nodes.load_node(learner_id, &node.id).await?;
            let evaluation = evaluate_node(
                node,
                current.value,
                responses,
                &self.content.question_skills,
                &self.content.skills,
                recurrence,
            );
            let written = self
                .nodes
                .compare_and_swap_node(learner_id, &node.id, current.version, evaluation.snapshot())
                .await?;
            Ok(written.then_some(evaluation))
        })
        .await
    }

    /// A node is only rescored when the batch answers one of its skills, so
    /// unrelated sessions leave its score alone.
    fn node_touched(&self, node: &AtlasNode, responses: &[ResponseRecord]) -> bool {
        responses.iter().any(|r| {
            self.content
                .question_skills
                .get(&r.question_id)
                .is_some_and(|skills| !skills.is_disjoint(&node.micro_skills))
        })
    }

    /// Run a read-compute-CAS attempt until it writes. `attempt` returns
    /// `None` when the CAS lost.
    async fn retry_on_conflict<T, F, Fut>(&self, key: String, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let max_attempts = self.config.max_conflict_retries;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);
        for n in 1..=max_attempts {
            if let Some(value) = attempt().await? {
                return Ok(value);
            }
            tracing::debug!(key = %key, attempt = n, "write conflict, reloading");
            if n < max_attempts {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }

        tracing::warn!(key = %key, attempts = max_attempts, "giving up after repeated write conflicts");
        Err(StoreError::ConflictRetriesExhausted {
            key,
            attempts: max_attempts,
        }
        .into())
    }
}

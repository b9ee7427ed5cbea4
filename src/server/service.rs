use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::store::SessionStore;
use crate::config::{Config, LabCatalog};
use crate::lab::{HintReveal, LabAttempt, LabDefinition, ObjectiveEvaluator};
use crate::protocol::{
    CommandOutcome, FlagVerdict, LabError, LabResult, LabStarted, LabSummary, SessionKey, SolutionView,
};
use crate::sandbox::{CommandParser, InputSanitizer, TerminalPolicy};
use crate::security::{AuditLogger, CommandGuard, CommandRecord, LabEvent, LabEventType};

pub const FLAG_ACCEPTED: &str = "Congratulations! Flag accepted!";
pub const FLAG_REJECTED: &str = "Incorrect flag. Try again.";

/// Receives XP earned by completing a lab. The embedding platform owns the
/// actual user profile.
pub trait RewardSink: Send + Sync {
    fn award(&self, user_id: &str, amount: u32, reason: &str);
}

#[derive(Debug, Default)]
pub struct TracingRewardSink;

impl RewardSink for TracingRewardSink {
    fn award(&self, user_id: &str, amount: u32, reason: &str) {
        info!(user = %user_id, xp = amount, reason = %reason, "XP awarded");
    }
}

pub type AttemptHandle = Arc<Mutex<LabAttempt>>;

/// Per-key attempts, laid out like the simulator store.
#[derive(Debug, Default)]
pub struct AttemptBook {
    attempts: RwLock<HashMap<SessionKey, AttemptHandle>>,
}

impl AttemptBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the attempt and whether it was created by this call.
    pub async fn get_or_start(&self, key: &SessionKey) -> (AttemptHandle, bool) {
        if let Some(attempt) = self.attempts.read().await.get(key) {
            return (Arc::clone(attempt), false);
        }

        let mut attempts = self.attempts.write().await;
        match attempts.get(key) {
            Some(attempt) => (Arc::clone(attempt), false),
            None => {
                let attempt = Arc::new(Mutex::new(LabAttempt::new(&key.user_id, &key.lab_id)));
                attempts.insert(key.clone(), Arc::clone(&attempt));
                (attempt, true)
            }
        }
    }

    pub async fn get(&self, key: &SessionKey) -> LabResult<AttemptHandle> {
        self.attempts
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| LabError::AttemptNotFound(key.to_string()))
    }

    /// Seeds an attempt loaded by an external persistence layer.
    pub async fn restore(&self, attempt: LabAttempt) {
        let key = SessionKey::new(&attempt.user_id, &attempt.lab_id);
        self.attempts.write().await.insert(key, Arc::new(Mutex::new(attempt)));
    }

    /// Drops an attempt from memory, typically after it has been persisted.
    pub async fn remove(&self, key: &SessionKey) -> Option<AttemptHandle> {
        self.attempts.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.attempts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.attempts.read().await.is_empty()
    }
}

/// The operations a lab front end calls. Every operation locks the attempt
/// first and the simulator second.
pub struct LabService {
    catalog: LabCatalog,
    policy: TerminalPolicy,
    store: SessionStore,
    attempts: AttemptBook,
    guard: CommandGuard,
    audit: AuditLogger,
    rewards: Arc<dyn RewardSink>,
}

impl LabService {
    pub fn new(config: &Config, catalog: LabCatalog) -> LabResult<Self> {
        Ok(Self {
            catalog,
            policy: TerminalPolicy::from_config(&config.terminal)?,
            store: SessionStore::new(config.terminal.history_limit),
            attempts: AttemptBook::new(),
            guard: CommandGuard::new(&config.terminal),
            audit: AuditLogger::new(&config.security),
            rewards: Arc::new(TracingRewardSink),
        })
    }

    pub fn with_reward_sink(mut self, rewards: Arc<dyn RewardSink>) -> Self {
        self.rewards = rewards;
        self
    }

    pub fn with_guard(mut self, guard: CommandGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn catalog(&self) -> &LabCatalog {
        &self.catalog
    }

    pub fn summaries(&self) -> Vec<LabSummary> {
        self.catalog
            .ids()
            .filter_map(|id| self.catalog.get(id).ok())
            .map(|lab| LabSummary::from(lab.as_ref()))
            .collect()
    }

    pub async fn start_lab(&self, lab_id: &str, user_id: &str) -> LabResult<LabStarted> {
        let lab = self.catalog.get(lab_id)?;
        let key = SessionKey::new(user_id, lab_id);

        let (handle, created) = self.attempts.get_or_start(&key).await;
        let attempt = handle.lock().await;

        let simulator = self.store.get_or_create(&key, &lab).await;
        let prompt = simulator.lock().await.prompt();

        self.audit_event(LabEventType::LabStarted, &key, if created { "started" } else { "resumed" })
            .await;

        Ok(LabStarted {
            lab: LabSummary::from(lab.as_ref()),
            attempt: attempt.clone(),
            prompt,
            resumed: !created,
        })
    }

    pub async fn execute_command(&self, lab_id: &str, user_id: &str, raw: &str) -> LabResult<CommandOutcome> {
        let lab = self.catalog.get(lab_id)?;
        let key = SessionKey::new(user_id, lab_id);

        let handle = self.attempts.get(&key).await?;
        let mut attempt = handle.lock().await;

        if attempt.completed {
            return Err(LabError::LabAlreadyCompleted);
        }

        if let Err(e) = self.guard.admit(&key, attempt.commands_executed).await {
            let event_type = match e {
                LabError::SessionLimit(_) => LabEventType::SessionLimitReached,
                _ => LabEventType::RateLimitExceeded,
            };
            self.audit_event(event_type, &key, e.to_string()).await;
            return Err(e);
        }

        let sanitized = InputSanitizer::sanitize(raw, self.policy.max_input_length());
        let parsed = CommandParser::new(&self.policy, &lab.allowed_commands).parse(&sanitized);

        let (output, prompt) = {
            let simulator = self.store.get_or_create(&key, &lab).await;
            let mut simulator = simulator.lock().await;
            let output = simulator.execute(&parsed);
            (output, simulator.prompt())
        };

        let record = CommandRecord::new(&key, &sanitized, &parsed, &output);
        if let Err(e) = self.audit.log_command(&record).await {
            warn!(session = %key, "Failed to write command log: {}", e);
        }

        // Blocked input counts too.
        attempt.commands_executed += 1;

        let evaluation = ObjectiveEvaluator::evaluate(&attempt, &lab, &parsed, &output);
        attempt.apply(&evaluation);

        if !evaluation.is_empty() {
            debug!(session = %key, objectives = ?evaluation.newly_completed, "Objectives completed");
        }

        if evaluation.now_complete {
            self.finish(&key, &lab, &mut attempt, "objectives").await;
        }

        Ok(CommandOutcome {
            output: output.output,
            return_code: output.return_code,
            is_error: output.is_error,
            prompt,
            objectives_completed: evaluation.newly_completed.into_iter().collect(),
            lab_completed: evaluation.now_complete,
        })
    }

    pub async fn submit_flag(&self, lab_id: &str, user_id: &str, flag: &str) -> LabResult<FlagVerdict> {
        let lab = self.catalog.get(lab_id)?;
        let key = SessionKey::new(user_id, lab_id);

        let handle = self.attempts.get(&key).await?;
        let mut attempt = handle.lock().await;

        let correct = lab.accepts_flag(flag);
        self.audit_event(
            LabEventType::FlagSubmitted,
            &key,
            if correct { "correct" } else { "incorrect" },
        )
        .await;

        if !correct {
            return Ok(FlagVerdict {
                correct: false,
                xp_awarded: 0,
                message: FLAG_REJECTED.to_string(),
            });
        }

        let xp_awarded = if attempt.completed {
            0
        } else {
            self.finish(&key, &lab, &mut attempt, "flag").await
        };

        Ok(FlagVerdict {
            correct: true,
            xp_awarded,
            message: FLAG_ACCEPTED.to_string(),
        })
    }

    pub async fn request_hint(&self, lab_id: &str, user_id: &str) -> LabResult<HintReveal> {
        let lab = self.catalog.get(lab_id)?;
        let key = SessionKey::new(user_id, lab_id);

        let handle = self.attempts.get(&key).await?;
        let reveal = handle.lock().await.reveal_hint(&lab.hints)?;

        self.audit_event(LabEventType::HintRevealed, &key, format!("hint {}", reveal.hint_number))
            .await;
        Ok(reveal)
    }

    pub async fn reset_lab(&self, lab_id: &str, user_id: &str) -> LabResult<LabAttempt> {
        self.catalog.get(lab_id)?;
        let key = SessionKey::new(user_id, lab_id);

        let handle = self.attempts.get(&key).await?;
        let mut attempt = handle.lock().await;

        self.store.reset(&key).await;
        attempt.reset_progress();

        self.audit_event(LabEventType::LabReset, &key, "progress cleared").await;
        Ok(attempt.clone())
    }

    pub async fn view_solution(&self, lab_id: &str, user_id: &str) -> LabResult<SolutionView> {
        let lab = self.catalog.get(lab_id)?;
        let key = SessionKey::new(user_id, lab_id);

        let handle = self.attempts.get(&key).await?;
        handle.lock().await.solution_viewed = true;

        self.audit_event(LabEventType::SolutionViewed, &key, "solution viewed").await;

        Ok(SolutionView {
            solution_guide: lab.solution_guide.clone(),
            original_xp: lab.xp_reward,
            reduced_xp: lab.reward(true),
            penalty_percent: lab.xp_penalty_for_solution,
        })
    }

    /// Snapshot for persistence; the live attempt keeps changing.
    pub async fn attempt(&self, lab_id: &str, user_id: &str) -> LabResult<LabAttempt> {
        let key = SessionKey::new(user_id, lab_id);
        let handle = self.attempts.get(&key).await?;
        let attempt = handle.lock().await.clone();
        Ok(attempt)
    }

    pub async fn restore_attempt(&self, attempt: LabAttempt) -> LabResult<()> {
        self.catalog.get(&attempt.lab_id)?;
        self.attempts.restore(attempt).await;
        Ok(())
    }

    /// Removes the attempt and its simulator and hands back the final
    /// state so the caller can persist it. Later operations on the same
    /// key see `AttemptNotFound` until `start_lab` or `restore_attempt`.
    pub async fn release_attempt(&self, lab_id: &str, user_id: &str) -> LabResult<LabAttempt> {
        let key = SessionKey::new(user_id, lab_id);
        let handle = self
            .attempts
            .remove(&key)
            .await
            .ok_or_else(|| LabError::AttemptNotFound(key.to_string()))?;

        let attempt = handle.lock().await.clone();
        self.store.discard(&key).await;
        debug!(user = %user_id, lab = %lab_id, "Attempt released");
        Ok(attempt)
    }

    pub async fn tracked_attempts(&self) -> usize {
        self.attempts.len().await
    }

    /// Drops idle simulators and expired rate-limit windows. Attempts are
    /// kept; only the simulated environment is rebuilt on next use.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted = self.store.evict_idle(max_idle).await;
        self.guard.cleanup_expired().await;
        if evicted > 0 {
            info!(evicted, "Evicted idle simulators");
        }
        evicted
    }

    pub async fn active_simulators(&self) -> usize {
        self.store.len().await
    }

    /// Audit failures are logged and never fail the request.
    pub async fn record_event(&self, event: LabEvent) {
        if let Err(e) = self.audit.log_event(event).await {
            warn!("Failed to write audit event: {}", e);
        }
    }

    async fn audit_event(&self, event_type: LabEventType, key: &SessionKey, details: impl Into<String>) {
        self.record_event(LabEvent::new(event_type, Some(key), details)).await;
    }

    /// Marks the attempt complete, pays out XP at most once and drops the
    /// simulator. Returns the XP paid by this call.
    async fn finish(&self, key: &SessionKey, lab: &LabDefinition, attempt: &mut LabAttempt, via: &str) -> u32 {
        attempt.mark_completed();
        self.store.discard(key).await;

        let amount = lab.reward(attempt.solution_viewed);
        let paid = attempt.claim_reward(amount).unwrap_or(0);
        if paid > 0 {
            self.rewards
                .award(&key.user_id, paid, &format!("Completed lab: {}", lab.title));
        }

        self.audit_event(LabEventType::LabCompleted, key, format!("via {}, {} xp", via, paid))
            .await;
        paid
    }
}

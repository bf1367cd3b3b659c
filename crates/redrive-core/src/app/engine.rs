//! DlqEngine - enqueue / retry-drive / sweep / stats
//!
//! # フロー（retry-drive）
//! 1. `DlqStore::get()` でレコード取得
//! 2. `check_eligibility()` で前段チェック（resolved / expired / budget / in-progress / not-yet）
//! 3. `Event::Claim` を version 付きで書き込み（負けたら `conflict`、processor は呼ばない）
//! 4. Processor 実行（任意で timeout）
//! 5. `Event::Succeeded` / `Event::Failed` を書き込み、必要ならアラート
//!
//! 内部ループは持ちません。定期実行は外部スケジューラが `redrive_ready` / `sweep_expired` を呼びます。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::config::DlqConfig;
use crate::domain::lifecycle::{self, Eligibility, Event, TransitionError};
use crate::domain::{
    BulkReport, DlqError, DlqMessage, DlqStats, EnqueueContext, ErrorInfo, MessageId,
    MessageStatus, MessageType, OrganizationId, ProcessOutcome, ProcessReason, ResolveResult,
    RetryOverrides,
};
use crate::ports::{
    Alert, AlertSink, Clock, DlqStore, IdGenerator, JitterSource, MessageFilter, MessageQuery,
    SortOrder, StoreError,
};
use crate::retry::RetryPolicy;
use crate::typed::{Processor, ProcessorRegistry};

pub struct DlqEngine {
    store: Arc<dyn DlqStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    jitter: Arc<dyn JitterSource>,
    alerts: Arc<dyn AlertSink>,
    policy: RetryPolicy,
    config: DlqConfig,
    registry: ProcessorRegistry,
}

impl DlqEngine {
    /// Prefer [`super::EngineBuilder`], which validates the config first.
    pub fn new(
        store: Arc<dyn DlqStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        jitter: Arc<dyn JitterSource>,
        alerts: Arc<dyn AlertSink>,
        config: DlqConfig,
        registry: ProcessorRegistry,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            jitter,
            alerts,
            policy: config.retry_policy(),
            config,
            registry,
        }
    }

    pub fn config(&self) -> &DlqConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    // ========================================
    // enqueue
    // ========================================

    /// Record a failed message as PENDING. Nothing is processed here.
    ///
    /// `expires_at` in the past is accepted; the next sweep expires it.
    pub async fn enqueue(
        &self,
        organization_id: OrganizationId,
        message_type: MessageType,
        original_message: impl Into<String>,
        error: ErrorInfo,
        context: EnqueueContext,
    ) -> Result<DlqMessage, DlqError> {
        let now = self.clock.now();
        let max_retries = context.max_retries.unwrap_or(self.config.retry.max_retries);
        let expires_at = match context.expires_at {
            Some(at) => at,
            None => now
                .checked_add_signed(self.config.default_expiration())
                .ok_or_else(|| {
                    DlqError::InvalidInput(
                        "default expiration is out of the representable range".to_string(),
                    )
                })?,
        };

        let message = DlqMessage::new(
            self.ids.generate_message_id(),
            organization_id,
            message_type,
            original_message.into(),
            &error,
            context,
            max_retries,
            expires_at,
            now,
        );
        let stored = self.store.insert(message).await?;

        warn!(
            message_id = %stored.id,
            organization_id = %organization_id,
            message_type = %message_type,
            error = %error,
            max_retries,
            "message added to dead letter queue"
        );

        let alert = Alert::enqueued(&stored, &error.name);
        if let Err(e) = self.alerts.on_enqueued(organization_id, &alert).await {
            warn!(message_id = %stored.id, error = %e, "enqueue alert was not delivered");
        }

        Ok(stored)
    }

    // ========================================
    // retry-drive
    // ========================================

    /// Attempt one redrive of `id` with `processor`.
    ///
    /// Expected failure modes come back as `ProcessOutcome`; `Err` is
    /// reserved for store failures.
    pub async fn process_message(
        &self,
        id: MessageId,
        processor: &dyn Processor,
    ) -> Result<ProcessOutcome, DlqError> {
        self.drive(id, |_| Some(processor)).await
    }

    /// Like `process_message`, picking the processor registered for the
    /// message type. An unregistered type yields `no_processor`.
    pub async fn process_with_registry(&self, id: MessageId) -> Result<ProcessOutcome, DlqError> {
        self.drive(id, |message_type| self.registry.get_ref(message_type))
            .await
    }

    /// Drive each id in order. A store failure on one id is reported in that
    /// item and does not stop the rest.
    pub async fn bulk_process(&self, ids: &[MessageId]) -> BulkReport {
        let mut report = BulkReport::default();
        for &id in ids {
            match self.process_with_registry(id).await {
                Ok(outcome) => report.push(id, outcome.success, outcome.reason.as_str()),
                Err(e) => {
                    warn!(message_id = %id, error = %e, "bulk redrive item failed");
                    report.push(id, false, e.to_string());
                }
            }
        }
        report
    }

    /// One scheduler tick: drive every message that is due now, then any
    /// abandoned claims while `limit` allows.
    pub async fn redrive_ready(&self, limit: usize) -> Result<BulkReport, DlqError> {
        let limit = self.config.cap_limit(limit);
        let mut ids: Vec<MessageId> = self
            .list_ready_to_retry(limit)
            .await?
            .iter()
            .map(|m| m.id)
            .collect();
        if ids.len() < limit {
            let stale = self.list_stale_claims(limit - ids.len()).await?;
            if !stale.is_empty() {
                warn!(count = stale.len(), "reclaiming abandoned claims");
            }
            ids.extend(stale.iter().map(|m| m.id));
        }
        let report = self.bulk_process(&ids).await;
        if !ids.is_empty() {
            info!(
                processed = report.processed,
                failed = report.failed,
                "redrive pass finished"
            );
        }
        Ok(report)
    }

    async fn drive<'p, F>(&self, id: MessageId, select: F) -> Result<ProcessOutcome, DlqError>
    where
        F: FnOnce(MessageType) -> Option<&'p dyn Processor>,
    {
        let Some(message) = self.store.get(id).await? else {
            return Ok(ProcessOutcome::rejected(ProcessReason::NotFound));
        };
        let now = self.clock.now();

        match lifecycle::check_eligibility(&message, now, self.config.stale_claim_after()) {
            Eligibility::Ready => {}
            Eligibility::AlreadyResolved => return Ok(ProcessOutcome::already_resolved()),
            Eligibility::Expired => return Ok(ProcessOutcome::rejected(ProcessReason::Expired)),
            Eligibility::BudgetExhausted => return self.exhaust(&message, now).await,
            Eligibility::InProgress { since } => {
                debug!(message_id = %id, %since, "message is being processed elsewhere");
                return Ok(ProcessOutcome::rejected(ProcessReason::InProgress));
            }
            Eligibility::NotYetEligible { next_retry_at } => {
                return Ok(ProcessOutcome::not_yet_eligible(next_retry_at));
            }
        }

        let Some(processor) = select(message.message_type) else {
            debug!(message_id = %id, message_type = %message.message_type, "no processor registered");
            return Ok(ProcessOutcome::rejected(ProcessReason::NoProcessor));
        };

        let claimed = match self.commit(&message, Event::Claim { at: now }).await {
            Ok(claimed) => claimed,
            Err(e) if e.is_conflict() => {
                debug!(message_id = %id, "lost claim race");
                return Ok(ProcessOutcome::rejected(ProcessReason::Conflict));
            }
            Err(e) => return Err(e),
        };

        let result = self.run_processor(processor, &claimed).await;
        // Never record a completion before the claim, even if the clock stepped back.
        let finished_at = self.clock.now().max(now);

        match result {
            Ok(()) => {
                let resolved = match self
                    .commit(&claimed, Event::Succeeded { at: finished_at })
                    .await
                {
                    Ok(resolved) => resolved,
                    Err(e) if is_lost_write(&e) => {
                        warn!(
                            message_id = %id,
                            error = %e,
                            processor_result = "succeeded",
                            "message changed while the processor ran; result discarded"
                        );
                        return Ok(ProcessOutcome::rejected(ProcessReason::Conflict));
                    }
                    Err(e) => return Err(e),
                };
                info!(
                    message_id = %id,
                    message_type = %resolved.message_type,
                    retry_count = resolved.retry_count,
                    "message redriven"
                );
                Ok(ProcessOutcome::processed(resolved.retry_count))
            }
            Err(failure) => self.record_failure(&claimed, failure, finished_at).await,
        }
    }

    async fn run_processor(
        &self,
        processor: &dyn Processor,
        message: &DlqMessage,
    ) -> Result<(), ErrorInfo> {
        let Some(limit) = self.config.processor_timeout() else {
            return processor.process(message).await;
        };
        match tokio::time::timeout(limit, processor.process(message)).await {
            Ok(result) => result,
            Err(_) => Err(ErrorInfo::new(
                "TimeoutError",
                format!("processor did not finish within {}ms", limit.as_millis()),
            )),
        }
    }

    async fn record_failure(
        &self,
        claimed: &DlqMessage,
        failure: ErrorInfo,
        at: DateTime<Utc>,
    ) -> Result<ProcessOutcome, DlqError> {
        let attempt = claimed.retry_count + 1;
        let next_retry_at = self
            .policy
            .next_retry_time(attempt, at, self.jitter.as_ref());
        let error_message = failure.message.clone();

        let failed = match self
            .commit(
                claimed,
                Event::Failed {
                    at,
                    error: failure,
                    next_retry_at,
                },
            )
            .await
        {
            Ok(failed) => failed,
            Err(e) if is_lost_write(&e) => {
                warn!(
                    message_id = %claimed.id,
                    error = %e,
                    processor_result = "failed",
                    processor_error = %error_message,
                    "message changed while the processor ran; result discarded"
                );
                return Ok(ProcessOutcome::rejected(ProcessReason::Conflict));
            }
            Err(e) => return Err(e),
        };

        error!(
            message_id = %failed.id,
            message_type = %failed.message_type,
            retry_count = failed.retry_count,
            max_retries = failed.max_retries,
            status = %failed.status,
            %next_retry_at,
            error = %error_message,
            "redrive attempt failed"
        );

        if failed.status == MessageStatus::Failed {
            let alert = Alert::terminal_failure(&failed);
            if let Err(e) = self
                .alerts
                .on_terminal_failure(failed.organization_id, &alert)
                .await
            {
                warn!(message_id = %failed.id, error = %e, "terminal failure alert was not delivered");
            }
        }

        Ok(ProcessOutcome::processor_failed(
            failed.retry_count,
            next_retry_at,
            error_message,
        ))
    }

    /// Driven with no budget left: force FAILED without calling a processor.
    /// A record already forced to FAILED this way is left as is.
    async fn exhaust(
        &self,
        message: &DlqMessage,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, DlqError> {
        if message.status == MessageStatus::Failed
            && message.resolution_notes.as_deref() == Some(lifecycle::NOTE_BUDGET_EXHAUSTED)
        {
            return Ok(ProcessOutcome::budget_exhausted(message.retry_count));
        }
        match self.commit(message, Event::BudgetExhausted { at: now }).await {
            Ok(failed) => {
                warn!(
                    message_id = %failed.id,
                    retry_count = failed.retry_count,
                    max_retries = failed.max_retries,
                    "retry budget exhausted"
                );
                Ok(ProcessOutcome::budget_exhausted(failed.retry_count))
            }
            Err(e) if e.is_conflict() => Ok(ProcessOutcome::rejected(ProcessReason::Conflict)),
            Err(e) => Err(e),
        }
    }

    /// Apply `event` and write it conditionally on the version that was read.
    async fn commit(&self, current: &DlqMessage, event: Event) -> Result<DlqMessage, DlqError> {
        let next = lifecycle::apply(current, event)?;
        Ok(self.store.update(next, current.version).await?)
    }

    // ========================================
    // queries
    // ========================================

    pub async fn get(&self, id: MessageId) -> Result<Option<DlqMessage>, DlqError> {
        Ok(self.store.get(id).await?)
    }

    /// PENDING messages, oldest first.
    pub async fn list_pending(
        &self,
        organization_id: Option<OrganizationId>,
        message_type: Option<MessageType>,
        limit: usize,
    ) -> Result<Vec<DlqMessage>, DlqError> {
        let filter = MessageFilter::status(MessageStatus::Pending)
            .in_org(organization_id)
            .of_type(message_type);
        self.find(filter, SortOrder::CreatedAtAsc, limit).await
    }

    /// PENDING messages whose `next_retry_at` is unset or due, oldest first.
    pub async fn list_ready_to_retry(&self, limit: usize) -> Result<Vec<DlqMessage>, DlqError> {
        let filter = MessageFilter::status(MessageStatus::Pending).retry_due_by(self.clock.now());
        self.find(filter, SortOrder::CreatedAtAsc, limit).await
    }

    /// PROCESSING messages whose claim is older than `stale_claim_after`,
    /// oldest first.
    pub async fn list_stale_claims(&self, limit: usize) -> Result<Vec<DlqMessage>, DlqError> {
        let cutoff = self.clock.now() - self.config.stale_claim_after();
        let filter = MessageFilter::status(MessageStatus::Processing).claimed_by(cutoff);
        self.find(filter, SortOrder::CreatedAtAsc, limit).await
    }

    /// FAILED messages, most recently attempted first.
    pub async fn list_failed(
        &self,
        organization_id: Option<OrganizationId>,
        message_type: Option<MessageType>,
        limit: usize,
    ) -> Result<Vec<DlqMessage>, DlqError> {
        let filter = MessageFilter::status(MessageStatus::Failed)
            .in_org(organization_id)
            .of_type(message_type);
        self.find(filter, SortOrder::LastRetryAtDesc, limit).await
    }

    /// PENDING messages already past `expires_at`, oldest first.
    pub async fn list_expired_candidates(
        &self,
        limit: usize,
    ) -> Result<Vec<DlqMessage>, DlqError> {
        let filter =
            MessageFilter::status(MessageStatus::Pending).expires_before(self.clock.now());
        self.find(filter, SortOrder::CreatedAtAsc, limit).await
    }

    async fn find(
        &self,
        filter: MessageFilter,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<DlqMessage>, DlqError> {
        let query = MessageQuery::new(filter, order, self.config.cap_limit(limit));
        Ok(self.store.find(&query).await?)
    }

    // ========================================
    // sweep / stats
    // ========================================

    /// Expire up to `sweep_batch_size` overdue PENDING messages. Messages
    /// changed or deleted concurrently are skipped and not counted.
    pub async fn sweep_expired(&self) -> Result<usize, DlqError> {
        let now = self.clock.now();
        let filter = MessageFilter::status(MessageStatus::Pending).expires_before(now);
        let query = MessageQuery::new(filter, SortOrder::CreatedAtAsc, self.config.sweep_batch_size);
        let candidates = self.store.find(&query).await?;

        let mut swept = 0;
        for message in &candidates {
            match self.commit(message, Event::Expire { at: now }).await {
                Ok(expired) => {
                    warn!(
                        message_id = %expired.id,
                        message_type = %expired.message_type,
                        expires_at = %expired.expires_at,
                        "message expired"
                    );
                    swept += 1;
                }
                Err(DlqError::Store(StoreError::NotFound(_))) => {}
                Err(e) if e.is_conflict() => {
                    debug!(message_id = %message.id, "skipping concurrently modified message");
                }
                Err(e) => return Err(e),
            }
        }

        info!(candidates = candidates.len(), swept, "expiration sweep finished");
        Ok(swept)
    }

    pub async fn stats(
        &self,
        organization_id: Option<OrganizationId>,
    ) -> Result<DlqStats, DlqError> {
        let mut stats = DlqStats {
            total: self
                .store
                .count(&MessageFilter::default().in_org(organization_id))
                .await?,
            ..DlqStats::default()
        };
        for status in MessageStatus::ALL {
            let filter = MessageFilter::status(status).in_org(organization_id);
            stats.set_status_count(status, self.store.count(&filter).await?);
        }
        stats.by_type = self.store.count_by_type(organization_id).await?;
        Ok(stats)
    }

    // ========================================
    // operator operations
    // ========================================

    pub async fn delete(&self, id: MessageId) -> Result<bool, DlqError> {
        let removed = self.store.delete(id).await?;
        if removed {
            info!(message_id = %id, "message deleted");
        }
        Ok(removed)
    }

    /// Close a message by hand.
    pub async fn resolve(
        &self,
        id: MessageId,
        resolved_by: impl Into<String>,
        notes: Option<String>,
    ) -> Result<ResolveResult, DlqError> {
        let Some(message) = self.store.get(id).await? else {
            return Ok(ResolveResult::NotFound);
        };
        if message.is_terminal() {
            return Ok(ResolveResult::AlreadyTerminal(message.status));
        }

        let resolved_by = resolved_by.into();
        let event = Event::Resolve {
            at: self.clock.now(),
            resolved_by: resolved_by.clone(),
            notes,
        };
        let resolved = self.commit(&message, event).await?;
        info!(message_id = %id, %resolved_by, "message resolved by operator");
        Ok(ResolveResult::Resolved(resolved))
    }

    /// Override `max_retries` and/or `expires_at`. Raising the budget of a
    /// FAILED message puts it back to PENDING.
    pub async fn update_retry_settings(
        &self,
        id: MessageId,
        overrides: RetryOverrides,
    ) -> Result<DlqMessage, DlqError> {
        if overrides.is_empty() {
            return Err(DlqError::InvalidInput(
                "at least one of max_retries or expires_at is required".to_string(),
            ));
        }
        let Some(message) = self.store.get(id).await? else {
            return Err(StoreError::NotFound(id).into());
        };

        let event = Event::Reconfigure {
            at: self.clock.now(),
            max_retries: overrides.max_retries,
            expires_at: overrides.expires_at,
        };
        let next = match lifecycle::apply(&message, event) {
            Ok(next) => next,
            Err(e @ TransitionError::BudgetBelowRetryCount { .. }) => {
                return Err(DlqError::InvalidInput(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let updated = self.store.update(next, message.version).await?;
        info!(
            message_id = %id,
            max_retries = updated.max_retries,
            expires_at = %updated.expires_at,
            status = %updated.status,
            "retry settings updated"
        );
        Ok(updated)
    }
}

/// The record was changed or deleted behind a claim the engine still holds.
fn is_lost_write(e: &DlqError) -> bool {
    e.is_conflict() || matches!(e, DlqError::Store(StoreError::NotFound(_)))
}

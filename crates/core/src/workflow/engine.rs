use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::document::{ActorId, Document, DocumentId, DocumentStatus};
use crate::domain::referrer::Referrer;
use crate::domain::step::{ApprovalStep, StepId, StepStatus};
use crate::errors::WorkflowError;
use crate::notify::{NotificationRequest, Notifier};
use crate::store::{StoreError, WorkflowStore};
use crate::workflow::types::{ActionOutcome, ChainView, DraftDocument, StepAction, Submission};

/// Routes documents through their ordered approval chains.
///
/// The engine holds no shared state of its own; the injected store serializes
/// conflicting writes through the document version token, so concurrent
/// callers observe `ConcurrentModification` instead of a double-advanced
/// chain.
pub struct WorkflowEngine<S, N> {
    store: S,
    notifier: N,
}

impl<S, N> WorkflowEngine<S, N>
where
    S: WorkflowStore,
    N: Notifier,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// Create a document and its chain in one atomic write. The first
    /// approver is activated immediately; referrers receive a courtesy copy.
    pub async fn submit(
        &self,
        draft: DraftDocument,
        approver_ids: Vec<ActorId>,
        referrer_ids: Vec<ActorId>,
    ) -> Result<Submission, WorkflowError> {
        if approver_ids.is_empty() {
            return Err(WorkflowError::InvalidChain);
        }

        let now = Utc::now();
        let document = Document {
            id: DocumentId(Uuid::new_v4().to_string()),
            document_type: draft.document_type,
            author_id: draft.author_id,
            content_json: draft.content_json,
            status: DocumentStatus::InProgress,
            current_step: Some(1),
            version: 1,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let total = approver_ids.len() as u32;
        let steps: Vec<ApprovalStep> = approver_ids
            .into_iter()
            .enumerate()
            .map(|(index, approver_id)| ApprovalStep {
                id: StepId(Uuid::new_v4().to_string()),
                document_id: document.id.clone(),
                approver_id,
                sequence: index as u32 + 1,
                status: if index == 0 { StepStatus::Waiting } else { StepStatus::NotReached },
                comment: None,
                processed_at: None,
                created_at: now,
            })
            .collect();

        let referrers: Vec<Referrer> = referrer_ids
            .into_iter()
            .map(|referrer_id| Referrer {
                document_id: document.id.clone(),
                referrer_id,
                created_at: now,
            })
            .collect();

        self.store
            .create_submission(document.clone(), steps.clone(), referrers.clone())
            .await?;

        self.notifier.notify(NotificationRequest::new(
            steps[0].approver_id.clone(),
            document.id.clone(),
            format!(
                "{} `{}` awaits your approval (step 1 of {total})",
                document.document_type.as_str(),
                document.id
            ),
        ));
        for referrer in &referrers {
            self.notifier.notify(NotificationRequest::new(
                referrer.referrer_id.clone(),
                document.id.clone(),
                format!(
                    "you were copied on {} `{}`",
                    document.document_type.as_str(),
                    document.id
                ),
            ));
        }

        Ok(Submission { document, steps, referrers })
    }

    /// Resolve the active step for `document_id` as `actor_id`.
    ///
    /// Preconditions are checked in a fixed order so each failure mode stays
    /// distinct: existence, finalization, chain integrity, authorization,
    /// comment requirement.
    pub async fn process_action(
        &self,
        document_id: &DocumentId,
        actor_id: &ActorId,
        action: StepAction,
        comment: Option<String>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let mut document = self
            .store
            .find_document(document_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(document_id.clone()))?;

        if document.is_terminal() {
            return Err(WorkflowError::AlreadyFinalized(document_id.clone()));
        }

        let steps = self.store.list_steps(document_id).await?;
        let active = active_step(&document, &steps)?;

        if active.approver_id != *actor_id {
            return Err(WorkflowError::NotAuthorized {
                document_id: document_id.clone(),
                actor_id: actor_id.clone(),
            });
        }

        let comment = comment.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        if action == StepAction::Reject && comment.is_none() {
            return Err(WorkflowError::CommentRequired);
        }

        let now = Utc::now();
        let expected_version = document.version;
        document.version += 1;
        document.updated_at = now;

        let mut resolved = active.clone();
        resolved.comment = comment;
        resolved.processed_at = Some(now);

        match action {
            StepAction::Reject => {
                // Short-circuit: later steps stay NotReached forever.
                resolved.status = StepStatus::Rejected;
                document.status = DocumentStatus::Rejected;
                document.completed_at = Some(now);

                self.commit(expected_version, document.clone(), vec![resolved.clone()]).await?;
                self.notify_author(&document, &resolved);

                Ok(ActionOutcome { document, resolved_step: resolved, activated_approver: None })
            }
            StepAction::Approve => {
                resolved.status = StepStatus::Approved;
                let next_sequence = resolved.sequence + 1;

                if let Some(next) = steps.iter().find(|step| step.sequence == next_sequence) {
                    let mut activated = next.clone();
                    activated.status = StepStatus::Waiting;
                    document.current_step = Some(next_sequence);

                    self.commit(
                        expected_version,
                        document.clone(),
                        vec![resolved.clone(), activated.clone()],
                    )
                    .await?;

                    self.notifier.notify(NotificationRequest::new(
                        activated.approver_id.clone(),
                        document.id.clone(),
                        format!(
                            "{} `{}` awaits your approval (step {next_sequence} of {})",
                            document.document_type.as_str(),
                            document.id,
                            steps.len()
                        ),
                    ));

                    Ok(ActionOutcome {
                        document,
                        resolved_step: resolved,
                        activated_approver: Some(activated.approver_id),
                    })
                } else {
                    // Last step: the pointer stays at its final value.
                    document.status = DocumentStatus::Approved;
                    document.completed_at = Some(now);

                    self.commit(expected_version, document.clone(), vec![resolved.clone()])
                        .await?;
                    self.notify_author(&document, &resolved);

                    Ok(ActionOutcome {
                        document,
                        resolved_step: resolved,
                        activated_approver: None,
                    })
                }
            }
        }
    }

    /// `process_action` with a structured audit trail of the applied or
    /// refused transition.
    pub async fn process_action_with_audit<A>(
        &self,
        document_id: &DocumentId,
        actor_id: &ActorId,
        action: StepAction,
        comment: Option<String>,
        sink: &A,
        audit: &AuditContext,
    ) -> Result<ActionOutcome, WorkflowError>
    where
        A: AuditSink,
    {
        let result = self.process_action(document_id, actor_id, action, comment).await;
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        Some(document_id.clone()),
                        audit.correlation_id.clone(),
                        "workflow.action_applied",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("action", action.as_str())
                    .with_metadata("sequence", outcome.resolved_step.sequence.to_string())
                    .with_metadata("document_status", outcome.document.status.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        Some(document_id.clone()),
                        audit.correlation_id.clone(),
                        "workflow.action_refused",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("action", action.as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    /// Author-initiated withdrawal. Terminal like rejection, but no step is
    /// mutated.
    pub async fn cancel(
        &self,
        document_id: &DocumentId,
        actor_id: &ActorId,
    ) -> Result<Document, WorkflowError> {
        let mut document = self
            .store
            .find_document(document_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(document_id.clone()))?;

        if document.author_id != *actor_id {
            return Err(WorkflowError::NotAuthorized {
                document_id: document_id.clone(),
                actor_id: actor_id.clone(),
            });
        }
        if document.is_terminal() {
            return Err(WorkflowError::AlreadyFinalized(document_id.clone()));
        }

        let now = Utc::now();
        let expected_version = document.version;
        document.version += 1;
        document.status = DocumentStatus::Cancelled;
        document.completed_at = Some(now);
        document.updated_at = now;

        self.commit(expected_version, document.clone(), Vec::new()).await?;

        Ok(document)
    }

    /// Read-only projection of a document with its chain and referrers.
    pub async fn load_chain(&self, document_id: &DocumentId) -> Result<ChainView, WorkflowError> {
        let document = self
            .store
            .find_document(document_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(document_id.clone()))?;
        let steps = self.store.list_steps(document_id).await?;
        let referrers = self.store.list_referrers(document_id).await?;

        Ok(ChainView { document, steps, referrers })
    }

    async fn commit(
        &self,
        expected_version: u32,
        document: Document,
        steps: Vec<ApprovalStep>,
    ) -> Result<(), WorkflowError> {
        self.store.commit_transition(expected_version, document, steps).await.map_err(|error| {
            match error {
                StoreError::VersionConflict { document_id, .. } => {
                    WorkflowError::ConcurrentModification(document_id)
                }
                other => WorkflowError::Store(other),
            }
        })
    }

    fn notify_author(&self, document: &Document, resolved: &ApprovalStep) {
        let message = match document.status {
            DocumentStatus::Approved => format!(
                "your {} `{}` was approved",
                document.document_type.as_str(),
                document.id
            ),
            DocumentStatus::Rejected => format!(
                "your {} `{}` was rejected at step {}: {}",
                document.document_type.as_str(),
                document.id,
                resolved.sequence,
                resolved.comment.as_deref().unwrap_or("")
            ),
            _ => return,
        };
        self.notifier
            .notify(NotificationRequest::new(document.author_id.clone(), document.id.clone(), message));
    }
}

fn active_step(document: &Document, steps: &[ApprovalStep]) -> Result<ApprovalStep, WorkflowError> {
    let waiting: Vec<&ApprovalStep> =
        steps.iter().filter(|step| step.status == StepStatus::Waiting).collect();

    match (waiting.as_slice(), document.current_step) {
        ([only], Some(sequence)) if only.sequence == sequence => Ok((*only).clone()),
        _ => Err(WorkflowError::NoActiveStep {
            document_id: document.id.clone(),
            current_step: document.current_step,
        }),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::document::{ActorId, Document, DocumentId, DocumentStatus, DocumentType};
    use crate::domain::referrer::Referrer;
    use crate::domain::step::{ApprovalStep, StepStatus};
    use crate::errors::WorkflowError;
    use crate::notify::InMemoryNotifier;
    use crate::store::{MemoryStore, StoreError, WorkflowStore};
    use crate::workflow::engine::WorkflowEngine;
    use crate::workflow::types::{DraftDocument, StepAction, Submission};

    fn actor(id: &str) -> ActorId {
        ActorId(id.to_string())
    }

    fn draft() -> DraftDocument {
        DraftDocument {
            document_type: DocumentType::ExpenseReport,
            author_id: actor("u-author"),
            content_json: "{\"amount\":120.5}".to_string(),
        }
    }

    fn engine() -> (WorkflowEngine<MemoryStore, InMemoryNotifier>, InMemoryNotifier) {
        let notifier = InMemoryNotifier::default();
        (WorkflowEngine::new(MemoryStore::default(), notifier.clone()), notifier)
    }

    async fn submit_chain(
        engine: &WorkflowEngine<MemoryStore, InMemoryNotifier>,
        approvers: &[&str],
    ) -> Submission {
        engine
            .submit(draft(), approvers.iter().map(|id| actor(id)).collect(), Vec::new())
            .await
            .expect("submit should succeed")
    }

    #[tokio::test]
    async fn submit_activates_the_first_step_and_notifies_approver_and_referrers() {
        let (engine, notifier) = engine();

        let submission = engine
            .submit(
                draft(),
                vec![actor("u-a"), actor("u-b"), actor("u-c")],
                vec![actor("u-cc")],
            )
            .await
            .expect("submit should succeed");

        assert_eq!(submission.document.status, DocumentStatus::InProgress);
        assert_eq!(submission.document.current_step, Some(1));
        assert_eq!(submission.document.version, 1);
        assert_eq!(
            submission.steps.iter().map(|step| step.status).collect::<Vec<_>>(),
            vec![StepStatus::Waiting, StepStatus::NotReached, StepStatus::NotReached]
        );

        let requests = notifier.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].recipient, actor("u-a"));
        assert_eq!(requests[1].recipient, actor("u-cc"));
    }

    #[tokio::test]
    async fn submit_with_empty_chain_fails_and_persists_nothing() {
        let (engine, notifier) = engine();

        let error = engine
            .submit(draft(), Vec::new(), vec![actor("u-cc")])
            .await
            .expect_err("empty chain must be refused");

        assert_eq!(error, WorkflowError::InvalidChain);
        assert!(notifier.requests().is_empty());
    }

    #[tokio::test]
    async fn approval_advances_the_chain_and_notifies_the_next_approver() {
        let (engine, notifier) = engine();
        let submission = submit_chain(&engine, &["u-a", "u-b", "u-c"]).await;
        let before = notifier.requests().len();

        let outcome = engine
            .process_action(
                &submission.document.id,
                &actor("u-a"),
                StepAction::Approve,
                Some("ok".to_string()),
            )
            .await
            .expect("first approval should succeed");

        assert_eq!(outcome.document.status, DocumentStatus::InProgress);
        assert_eq!(outcome.document.current_step, Some(2));
        assert_eq!(outcome.document.version, 2);
        assert_eq!(outcome.resolved_step.status, StepStatus::Approved);
        assert_eq!(outcome.resolved_step.comment.as_deref(), Some("ok"));
        assert!(outcome.resolved_step.processed_at.is_some());
        assert_eq!(outcome.activated_approver, Some(actor("u-b")));

        let chain = engine.load_chain(&submission.document.id).await.expect("load chain");
        assert_eq!(
            chain.steps.iter().map(|step| step.status).collect::<Vec<_>>(),
            vec![StepStatus::Approved, StepStatus::Waiting, StepStatus::NotReached]
        );

        let requests = notifier.requests();
        assert_eq!(requests.len(), before + 1);
        assert_eq!(requests[before].recipient, actor("u-b"));
    }

    #[tokio::test]
    async fn approving_every_step_finalizes_the_document() {
        let (engine, notifier) = engine();
        let submission = submit_chain(&engine, &["u-a", "u-b", "u-c"]).await;
        let id = submission.document.id.clone();

        engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, Some("ok".to_string()))
            .await
            .expect("step 1");
        engine
            .process_action(&id, &actor("u-b"), StepAction::Approve, None)
            .await
            .expect("step 2");
        let outcome = engine
            .process_action(&id, &actor("u-c"), StepAction::Approve, None)
            .await
            .expect("step 3");

        assert_eq!(outcome.document.status, DocumentStatus::Approved);
        assert_eq!(outcome.document.current_step, Some(3));
        assert!(outcome.document.completed_at.is_some());
        assert!(outcome.activated_approver.is_none());

        let last = notifier.requests().into_iter().last().expect("author notification");
        assert_eq!(last.recipient, actor("u-author"));
    }

    #[tokio::test]
    async fn rejection_short_circuits_later_steps() {
        let (engine, _) = engine();
        let submission = submit_chain(&engine, &["u-a", "u-b", "u-c"]).await;
        let id = submission.document.id.clone();

        engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect("step 1");
        let outcome = engine
            .process_action(
                &id,
                &actor("u-b"),
                StepAction::Reject,
                Some("missing receipt".to_string()),
            )
            .await
            .expect("rejection should succeed");

        assert_eq!(outcome.document.status, DocumentStatus::Rejected);
        assert!(outcome.document.completed_at.is_some());
        assert_eq!(outcome.resolved_step.status, StepStatus::Rejected);
        assert_eq!(outcome.resolved_step.comment.as_deref(), Some("missing receipt"));

        let chain = engine.load_chain(&id).await.expect("load chain");
        assert_eq!(chain.steps[2].status, StepStatus::NotReached);
    }

    #[tokio::test]
    async fn only_the_active_approver_may_act() {
        let (engine, notifier) = engine();
        let submission = submit_chain(&engine, &["u-a", "u-b", "u-c"]).await;
        let id = submission.document.id.clone();
        engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect("step 1");

        let before = engine.load_chain(&id).await.expect("chain before");
        let notifications_before = notifier.requests().len();

        let error = engine
            .process_action(&id, &actor("u-c"), StepAction::Approve, None)
            .await
            .expect_err("step 3 approver must not skip step 2");
        assert!(matches!(error, WorkflowError::NotAuthorized { .. }));

        let after = engine.load_chain(&id).await.expect("chain after");
        assert_eq!(before, after);
        assert_eq!(notifier.requests().len(), notifications_before);
    }

    #[tokio::test]
    async fn finalized_documents_refuse_further_actions() {
        let (engine, _) = engine();
        let submission = submit_chain(&engine, &["u-a"]).await;
        let id = submission.document.id.clone();

        engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect("finalizing approval");

        let error = engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect_err("second identical call must fail");
        assert_eq!(error, WorkflowError::AlreadyFinalized(id));
    }

    #[tokio::test]
    async fn rejection_requires_a_non_empty_comment() {
        let (engine, _) = engine();
        let submission = submit_chain(&engine, &["u-a"]).await;
        let id = submission.document.id.clone();

        for comment in [None, Some("".to_string()), Some("   ".to_string())] {
            let error = engine
                .process_action(&id, &actor("u-a"), StepAction::Reject, comment)
                .await
                .expect_err("blank comment must be refused");
            assert_eq!(error, WorkflowError::CommentRequired);
        }

        let chain = engine.load_chain(&id).await.expect("load chain");
        assert_eq!(chain.document.status, DocumentStatus::InProgress);
        assert_eq!(chain.steps[0].status, StepStatus::Waiting);
    }

    #[tokio::test]
    async fn unknown_documents_are_reported_as_not_found() {
        let (engine, _) = engine();
        let missing = DocumentId("no-such-document".to_string());

        let error = engine
            .process_action(&missing, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect_err("missing document");
        assert_eq!(error, WorkflowError::NotFound(missing));
    }

    #[tokio::test]
    async fn the_author_may_cancel_a_document_in_flight() {
        let (engine, _) = engine();
        let submission = submit_chain(&engine, &["u-a", "u-b"]).await;
        let id = submission.document.id.clone();

        let cancelled = engine
            .cancel(&id, &actor("u-author"))
            .await
            .expect("author cancellation should succeed");

        assert_eq!(cancelled.status, DocumentStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        // No step is mutated by a cancellation.
        let chain = engine.load_chain(&id).await.expect("load chain");
        assert_eq!(
            chain.steps.iter().map(|step| step.status).collect::<Vec<_>>(),
            vec![StepStatus::Waiting, StepStatus::NotReached]
        );

        let error = engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect_err("cancelled documents accept no actions");
        assert_eq!(error, WorkflowError::AlreadyFinalized(id));
    }

    #[tokio::test]
    async fn only_the_author_may_cancel() {
        let (engine, _) = engine();
        let submission = submit_chain(&engine, &["u-a", "u-b"]).await;
        let id = submission.document.id.clone();

        let error = engine
            .cancel(&id, &actor("u-a"))
            .await
            .expect_err("approvers cannot withdraw someone else's document");
        assert!(matches!(error, WorkflowError::NotAuthorized { .. }));

        engine.cancel(&id, &actor("u-author")).await.expect("author cancel");
        let error = engine
            .cancel(&id, &actor("u-author"))
            .await
            .expect_err("second cancel must fail");
        assert_eq!(error, WorkflowError::AlreadyFinalized(id));
    }

    #[tokio::test]
    async fn duplicate_approvers_act_once_per_slot() {
        let (engine, _) = engine();
        let submission = submit_chain(&engine, &["u-a", "u-b", "u-a"]).await;
        let id = submission.document.id.clone();

        engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect("slot 1");
        engine
            .process_action(&id, &actor("u-b"), StepAction::Approve, None)
            .await
            .expect("slot 2");
        let outcome = engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect("slot 3, same identity again");

        assert_eq!(outcome.document.status, DocumentStatus::Approved);
    }

    #[tokio::test]
    async fn corrupted_chains_surface_no_active_step() {
        let store = MemoryStore::default();
        let notifier = InMemoryNotifier::default();
        let seeded = WorkflowEngine::new(store, notifier.clone());
        let submission = submit_chain_seeded(&seeded).await;
        let id = submission.document.id.clone();

        // Force the pointer past the only Waiting step.
        let mut broken = submission.document.clone();
        let expected = broken.version;
        broken.version += 1;
        broken.current_step = Some(2);
        seeded
            .store
            .commit_transition(expected, broken, Vec::new())
            .await
            .expect("seed corruption");

        let error = seeded
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect_err("pointer mismatch is corruption");
        assert!(error.is_corruption());
    }

    async fn submit_chain_seeded(
        engine: &WorkflowEngine<MemoryStore, InMemoryNotifier>,
    ) -> Submission {
        engine
            .submit(draft(), vec![actor("u-a"), actor("u-b")], Vec::new())
            .await
            .expect("submit should succeed")
    }

    /// Store double whose next commit reports a version conflict, standing in
    /// for a concurrent writer that won the race.
    struct ContendedStore {
        inner: MemoryStore,
        conflict_once: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl WorkflowStore for ContendedStore {
        async fn find_document(
            &self,
            id: &DocumentId,
        ) -> Result<Option<Document>, StoreError> {
            self.inner.find_document(id).await
        }

        async fn list_steps(
            &self,
            document_id: &DocumentId,
        ) -> Result<Vec<ApprovalStep>, StoreError> {
            self.inner.list_steps(document_id).await
        }

        async fn list_referrers(
            &self,
            document_id: &DocumentId,
        ) -> Result<Vec<Referrer>, StoreError> {
            self.inner.list_referrers(document_id).await
        }

        async fn create_submission(
            &self,
            document: Document,
            steps: Vec<ApprovalStep>,
            referrers: Vec<Referrer>,
        ) -> Result<(), StoreError> {
            self.inner.create_submission(document, steps, referrers).await
        }

        async fn commit_transition(
            &self,
            expected_version: u32,
            document: Document,
            steps: Vec<ApprovalStep>,
        ) -> Result<(), StoreError> {
            if self.conflict_once.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::VersionConflict {
                    document_id: document.id,
                    expected: expected_version,
                });
            }
            self.inner.commit_transition(expected_version, document, steps).await
        }
    }

    #[tokio::test]
    async fn losing_a_write_race_surfaces_concurrent_modification() {
        let store = ContendedStore {
            inner: MemoryStore::default(),
            conflict_once: std::sync::atomic::AtomicBool::new(false),
        };
        let engine = WorkflowEngine::new(store, InMemoryNotifier::default());
        let submission = engine
            .submit(draft(), vec![actor("u-a")], Vec::new())
            .await
            .expect("submit");
        let id = submission.document.id.clone();

        engine.store.conflict_once.store(true, std::sync::atomic::Ordering::SeqCst);
        let error = engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect_err("raced commit must fail");
        assert_eq!(error, WorkflowError::ConcurrentModification(id.clone()));
        assert!(error.is_retryable());

        // The retry observes the untouched chain and succeeds.
        let outcome = engine
            .process_action(&id, &actor("u-a"), StepAction::Approve, None)
            .await
            .expect("retry succeeds");
        assert_eq!(outcome.document.status, DocumentStatus::Approved);
    }

    #[tokio::test]
    async fn audited_actions_emit_applied_and_refused_events() {
        let (engine, _) = engine();
        let submission = submit_chain(&engine, &["u-a"]).await;
        let id = submission.document.id.clone();
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(Some(id.clone()), "req-77", "u-a");

        engine
            .process_action_with_audit(&id, &actor("u-a"), StepAction::Approve, None, &sink, &context)
            .await
            .expect("audited approval");
        let _ = engine
            .process_action_with_audit(&id, &actor("u-a"), StepAction::Approve, None, &sink, &context)
            .await
            .expect_err("already finalized");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "workflow.action_applied");
        assert_eq!(events[0].correlation_id, "req-77");
        assert_eq!(events[1].event_type, "workflow.action_refused");
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    }
}

//! The case workflow engine.
//!
//! [`CaseService`] owns the stage field. Every write goes through the same gate:
//!
//! 1. the case must exist and must not be approved,
//! 2. the submission must be for the stage the case is at,
//! 3. the actor's role must be the role that works that stage,
//! 4. the submission must pass the stage's completion rules,
//!
//! and only then is the new document written, as one compare-and-swap on `revision` with its
//! audit entry. A rejected call leaves the stored case untouched.
//!
//! ## Pure Data Operations
//!
//! No API concerns live here: callers resolve the [`Actor`] and map [`CaseError`] to their
//! own status codes.

use crate::config::CoreConfig;
use crate::constants::CASE_NUMBER_ATTEMPTS;
use crate::error::{CaseError, CaseResult};
use crate::export::export_case;
use crate::model::{
    stage_label, Actor, AuditAction, AuditEntry, Case, DataEntryPayload, Role,
    SeriousnessCriterion, Stage, StagePayload, TriagePayload,
};
use crate::store::{CaseStore, WriteTicket};
use crate::validation::{
    merge_data_entry, validate_data_entry, validate_medical, validate_quality, validate_triage,
};
use chrono::{DateTime, Utc};
use pv_ids::CaseId;
use pv_meddra::Terminology;
use pv_types::non_blank;
use serde::Serialize;
use std::sync::Arc;

/// Number of cases waiting at one stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageCount {
    #[serde(with = "stage_label")]
    pub stage: Stage,
    pub step: u8,
    pub count: usize,
}

/// Dashboard totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStats {
    pub total: usize,
    pub by_stage: Vec<StageCount>,
    /// Cases that went through at least one rework return.
    pub reworked: usize,
    /// Cases whose medical review flagged an Important Medical Event.
    pub ime: usize,
}

/// Whether a mutation produced something worth writing.
enum Outcome {
    Changed,
    Unchanged,
}

#[derive(Clone)]
pub struct CaseService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn CaseStore>,
    terminology: Arc<dyn Terminology>,
    ticket: WriteTicket,
}

impl CaseService {
    /// Creates a workflow engine.
    ///
    /// # Arguments
    ///
    /// * `cfg` - Export identifiers and store timeout.
    /// * `store` - Backend holding the case documents.
    /// * `terminology` - MedDRA coding assist used to check coded events and derive IME.
    ///
    /// # Returns
    ///
    /// A service whose writes are never abandoned; see [`CaseService::with_ticket`].
    pub fn new(
        cfg: Arc<CoreConfig>,
        store: Arc<dyn CaseStore>,
        terminology: Arc<dyn Terminology>,
    ) -> Self {
        Self {
            cfg,
            store,
            terminology,
            ticket: WriteTicket::new(),
        }
    }

    /// A handle on the same store whose writes carry `ticket`.
    ///
    /// Abandoning the ticket before a write commits makes that write fail with
    /// `TransientStore` and leaves the store untouched.
    pub fn with_ticket(&self, ticket: WriteTicket) -> Self {
        Self {
            ticket,
            ..self.clone()
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    /// Creates a case from a triage submission. The case starts at Data Entry.
    ///
    /// # Arguments
    ///
    /// * `actor` - Triage user booking the case in.
    /// * `triage` - The four minimum criteria.
    ///
    /// # Returns
    ///
    /// The stored case with its case number, sequence and first audit entry.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the actor is not in the Triage role
    /// - `IncompleteData` if any of the four minimum criteria is missing
    /// - `Conflict` if no free case number was found
    pub fn create_case(&self, actor: &Actor, triage: &TriagePayload) -> CaseResult<Case> {
        require_role(actor, Role::Triage, "create cases")?;
        let triage = validate_triage(triage).map_err(|issues| {
            tracing::warn!("create case by {} rejected: incomplete triage", actor.username);
            CaseError::IncompleteData(issues)
        })?;

        let now = Utc::now();
        let case = self.insert_new(|id| {
            let mut case = Case::blank(id, now, Stage::Triage);
            case.triage = Some(triage.clone());
            case.record(actor, AuditAction::TriageCompleted, now, None);
            case.stage = Stage::DataEntry;
            case
        })?;
        tracing::info!(
            "case {} created by {} ({}) at {}",
            case.case_number,
            actor.username,
            actor.role,
            case.stage
        );
        Ok(case)
    }

    /// Books in a received report with no triage data yet. The case waits at Triage (`New`).
    pub fn intake_case(&self, actor: &Actor) -> CaseResult<Case> {
        require_role(actor, Role::Triage, "book in cases")?;

        let now = Utc::now();
        let case = self.insert_new(|id| {
            let mut case = Case::blank(id, now, Stage::Triage);
            case.record(actor, AuditAction::CaseBookedIn, now, None);
            case
        })?;
        tracing::info!("case {} booked in by {}", case.case_number, actor.username);
        Ok(case)
    }

    // ------------------------------------------------------------------------
    // Stage work
    // ------------------------------------------------------------------------

    /// Completes the case's current stage with `payload` and advances it one step.
    ///
    /// Data entry submissions are merged over any saved draft before validation.
    ///
    /// # Arguments
    ///
    /// * `id` - Case to advance.
    /// * `actor` - User submitting; must work the case's current stage.
    /// * `payload` - Stage data; its variant names the stage being completed.
    ///
    /// # Returns
    ///
    /// The case as stored after the move, one revision later.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the case does not exist
    /// - `CaseClosed` if the case is approved
    /// - `WrongStage` if the payload or the actor's role does not match the case's stage
    /// - `IncompleteData` if the merged submission fails the stage's rules
    /// - `WrongStage`/`Conflict` if another write landed first
    pub fn submit_stage(
        &self,
        id: &CaseId,
        actor: &Actor,
        payload: &StagePayload,
    ) -> CaseResult<Case> {
        let stage = payload.stage();
        self.mutate(id, actor, stage, |case, now| {
            match payload {
                StagePayload::Triage(p) => {
                    case.triage = Some(validate_triage(p).map_err(CaseError::IncompleteData)?);
                }
                StagePayload::DataEntry(p) => {
                    let (merged, _) = merge_data_entry(&case.data_entry_prefill(), p)
                        .map_err(CaseError::IncompleteData)?;
                    let entry = validate_data_entry(&merged, now.date_naive())
                        .map_err(CaseError::IncompleteData)?;
                    case.data_entry = Some(entry);
                    case.data_entry_draft = None;
                }
                StagePayload::Medical(p) => {
                    let review = validate_medical(p, self.terminology.as_ref())
                        .map_err(CaseError::IncompleteData)?;
                    case.medical = Some(review);
                }
                StagePayload::Quality(p) => {
                    case.quality =
                        Some(validate_quality(p, actor, now).map_err(CaseError::IncompleteData)?);
                }
            }

            let next = stage
                .next()
                .ok_or_else(|| CaseError::CaseClosed(case.case_number.to_string()))?;
            if let Some(action) = AuditAction::completed(stage) {
                case.record(actor, action, now, None);
            }
            case.stage = next;
            Ok(Outcome::Changed)
        })
    }

    /// Saves partial data entry without completing the stage.
    ///
    /// Completeness is not checked, but unknown or repeated seriousness criteria are rejected.
    /// Saving an unchanged form writes nothing.
    pub fn save_data_entry_draft(
        &self,
        id: &CaseId,
        actor: &Actor,
        payload: &DataEntryPayload,
    ) -> CaseResult<Case> {
        self.mutate(id, actor, Stage::DataEntry, |case, now| {
            let (merged, changed) = merge_data_entry(&case.data_entry_prefill(), payload)
                .map_err(CaseError::IncompleteData)?;
            if changed.is_empty() {
                return Ok(Outcome::Unchanged);
            }
            case.data_entry_draft = Some(merged);
            case.record(actor, AuditAction::FieldsEdited, now, Some(changed.join(", ")));
            Ok(Outcome::Changed)
        })
    }

    /// Ticks or clears one seriousness criterion on the data entry draft.
    pub fn toggle_seriousness(
        &self,
        id: &CaseId,
        actor: &Actor,
        criterion: SeriousnessCriterion,
    ) -> CaseResult<Case> {
        self.mutate(id, actor, Stage::DataEntry, |case, now| {
            let mut draft = case.data_entry_prefill();
            let ticked = draft.seriousness_criteria.toggle(criterion);
            case.data_entry_draft = Some(draft);
            let detail = format!(
                "seriousnessCriteria: {} {}",
                criterion,
                if ticked { "ticked" } else { "cleared" }
            );
            case.record(actor, AuditAction::FieldsEdited, now, Some(detail));
            Ok(Outcome::Changed)
        })
    }

    /// Sends a case back one stage for rework: Medical Review → Data Entry, or
    /// Quality Review → Medical Review.
    ///
    /// # Arguments
    ///
    /// * `id` - Case to send back.
    /// * `actor` - Reviewer working the case's current stage.
    /// * `reason` - Recorded on the audit entry; must not be blank.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the case's stage has no return edge
    /// - `IncompleteData` if `reason` is blank
    /// - plus the usual gate errors (`NotFound`, `CaseClosed`, `WrongStage`, `Forbidden`)
    pub fn return_case(&self, id: &CaseId, actor: &Actor, reason: &str) -> CaseResult<Case> {
        let stage = actor
            .role
            .stage()
            .ok_or_else(|| CaseError::Forbidden(format!("{} cannot return cases", actor.role)))?;
        self.mutate(id, actor, stage, |case, now| {
            let target = case.stage.return_target().ok_or_else(|| {
                CaseError::InvalidInput(format!("cases at {} cannot be returned", case.stage))
            })?;
            let reason = non_blank(Some(reason))
                .ok_or_else(|| CaseError::field("reason", "is required"))?;

            case.record(actor, AuditAction::CaseReturned, now, Some(reason.into_inner()));
            case.stage = target;
            case.return_count += 1;
            Ok(Outcome::Changed)
        })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get_case(&self, id: &CaseId) -> CaseResult<Case> {
        self.load(id)
    }

    pub fn audit_log(&self, id: &CaseId) -> CaseResult<Vec<AuditEntry>> {
        Ok(self.load(id)?.audit_log)
    }

    /// Every case, oldest first.
    pub fn list_cases(&self) -> CaseResult<Vec<Case>> {
        self.store.list().map_err(log_store_error)
    }

    /// The work queue for `role`: cases at the stage that role acts on, oldest first.
    ///
    /// An unrecognised role, or one that works no stage, gets an empty queue.
    pub fn cases_for_role(&self, role: &str) -> CaseResult<Vec<Case>> {
        let Some(stage) = Role::parse(role).and_then(Role::stage) else {
            tracing::debug!("no work queue for role '{}'", role);
            return Ok(Vec::new());
        };
        let mut cases = self.list_cases()?;
        cases.retain(|c| c.stage == stage);
        Ok(cases)
    }

    pub fn stats(&self) -> CaseResult<CaseStats> {
        let cases = self.list_cases()?;
        let by_stage = Stage::ALL
            .into_iter()
            .map(|stage| StageCount {
                stage,
                step: stage.step(),
                count: cases.iter().filter(|c| c.stage == stage).count(),
            })
            .collect();
        Ok(CaseStats {
            total: cases.len(),
            by_stage,
            reworked: cases.iter().filter(|c| c.return_count > 0).count(),
            ime: cases
                .iter()
                .filter(|c| c.medical.as_ref().is_some_and(|m| m.ime))
                .count(),
        })
    }

    /// Renders the case as E2B(R3) XML. The case must have reached Medical Review.
    ///
    /// # Returns
    ///
    /// UTF-8 XML bytes of a single-report ICH ICSR batch.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the case does not exist
    /// - `StageTooEarly` if the case is still at Triage or Data Entry
    pub fn export_e2b(&self, id: &CaseId) -> CaseResult<Vec<u8>> {
        let case = self.load(id)?;
        let xml = export_case(&self.cfg, &case, Utc::now()).inspect_err(|e| {
            tracing::warn!("export of case {} refused: {}", case.case_number, e);
        })?;
        tracing::info!("case {} exported as E2B ({} bytes)", case.case_number, xml.len());
        Ok(xml)
    }

    // ------------------------------------------------------------------------
    // Training reset
    // ------------------------------------------------------------------------

    pub fn delete_case(&self, id: &CaseId, actor: &Actor) -> CaseResult<()> {
        require_role(actor, Role::Admin, "delete cases")?;
        if !self.store.delete(id, &self.ticket).map_err(log_store_error)? {
            return Err(CaseError::NotFound(id.to_string()));
        }
        tracing::info!("case {} deleted by {}", id, actor.username);
        Ok(())
    }

    /// Removes every case. Returns how many were removed.
    pub fn reset(&self, actor: &Actor) -> CaseResult<usize> {
        require_role(actor, Role::Admin, "reset the training data")?;
        let removed = self.store.clear(&self.ticket).map_err(log_store_error)?;
        tracing::info!("training reset by {}: {} cases removed", actor.username, removed);
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Inserts the case `build` makes for a fresh id, drawing a new id while the derived case
    /// number is taken.
    fn insert_new<F>(&self, build: F) -> CaseResult<Case>
    where
        F: Fn(CaseId) -> Case,
    {
        let mut attempt = 1;
        loop {
            match self.store.insert(build(CaseId::new()), &self.ticket) {
                Err(CaseError::Conflict(taken)) if attempt < CASE_NUMBER_ATTEMPTS => {
                    tracing::warn!("case {} already exists, drawing a new id", taken);
                    attempt += 1;
                }
                other => return other.map_err(log_store_error),
            }
        }
    }

    fn load(&self, id: &CaseId) -> CaseResult<Case> {
        self.store
            .get(id)
            .map_err(log_store_error)?
            .ok_or_else(|| CaseError::NotFound(id.to_string()))
    }

    /// Reads a snapshot, gates it, applies `apply` to a copy and writes the copy back with a
    /// compare-and-swap on the snapshot's revision.
    fn mutate<F>(&self, id: &CaseId, actor: &Actor, stage: Stage, apply: F) -> CaseResult<Case>
    where
        F: FnOnce(&mut Case, DateTime<Utc>) -> CaseResult<Outcome>,
    {
        let snapshot = self.load(id)?;
        check_gate(&snapshot, actor, stage).inspect_err(|e| {
            tracing::warn!(
                "case {}: {} ({}) rejected: {}",
                snapshot.case_number,
                actor.username,
                actor.role,
                e
            );
        })?;

        let now = Utc::now();
        let mut next = snapshot.clone();
        let outcome = apply(&mut next, now).inspect_err(|e| {
            tracing::warn!("case {}: submission rejected: {}", snapshot.case_number, e);
        })?;
        if let Outcome::Unchanged = outcome {
            return Ok(snapshot);
        }

        if next.stage != snapshot.stage && !snapshot.stage.can_transition_to(next.stage) {
            tracing::error!(
                "case {}: refusing illegal move {} -> {}",
                snapshot.case_number,
                snapshot.stage,
                next.stage
            );
            return Err(CaseError::InvalidInput(format!(
                "illegal stage change {} -> {}",
                snapshot.stage, next.stage
            )));
        }
        next.revision = snapshot.revision + 1;

        if self
            .store
            .compare_and_swap(snapshot.revision, &next, &self.ticket)
            .map_err(log_store_error)?
        {
            if next.stage != snapshot.stage {
                tracing::info!(
                    "case {}: {} -> {} by {} ({})",
                    next.case_number,
                    snapshot.stage,
                    next.stage,
                    actor.username,
                    actor.role
                );
            } else {
                tracing::info!(
                    "case {}: edited at {} by {}",
                    next.case_number,
                    next.stage,
                    actor.username
                );
            }
            return Ok(next);
        }

        // Lost the race: report what happened instead of retrying.
        let current = self.load(id)?;
        let err = if current.stage != snapshot.stage {
            CaseError::WrongStage {
                required: stage,
                actual: current.stage,
            }
        } else {
            CaseError::Conflict(current.case_number.to_string())
        };
        tracing::warn!("case {}: concurrent write lost: {}", current.case_number, err);
        Err(err)
    }
}

fn require_role(actor: &Actor, role: Role, what: &str) -> CaseResult<()> {
    if actor.role == role {
        Ok(())
    } else {
        tracing::warn!("{} ({}) tried to {}", actor.username, actor.role, what);
        Err(CaseError::Forbidden(format!("only the {role} role can {what}")))
    }
}

fn check_gate(case: &Case, actor: &Actor, stage: Stage) -> CaseResult<()> {
    if case.stage.is_terminal() {
        return Err(CaseError::CaseClosed(case.case_number.to_string()));
    }
    if stage != case.stage {
        return Err(CaseError::WrongStage {
            required: stage,
            actual: case.stage,
        });
    }
    match actor.role.stage() {
        Some(role_stage) if role_stage == case.stage => Ok(()),
        Some(role_stage) => Err(CaseError::WrongStage {
            required: role_stage,
            actual: case.stage,
        }),
        None => Err(CaseError::Forbidden(format!("{} does not work cases", actor.role))),
    }
}

fn log_store_error(err: CaseError) -> CaseError {
    if matches!(
        err,
        CaseError::TransientStore(_) | CaseError::CorruptRecord { .. }
    ) {
        tracing::error!("case store failure: {}", err);
    }
    err
}

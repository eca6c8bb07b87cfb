//! Case record storage.
//!
//! The workflow engine talks to storage only through [`CaseStore`]. Two backends exist:
//!
//! - [`MemoryCaseStore`]: a map under an `RwLock`, for tests and throwaway training sessions
//! - [`FileCaseStore`]: one YAML document per case in a sharded directory tree
//!
//! Every write is a whole-document replace guarded by the document's `revision`, so a reader
//! never sees half a case and exactly one of two racing writers wins. Every write also carries
//! a [`WriteTicket`]; a backend claims it under its write lock right before committing and
//! refuses the write if the caller has abandoned it.

mod file;
mod memory;
mod ticket;

pub use file::FileCaseStore;
pub use memory::MemoryCaseStore;
pub use ticket::WriteTicket;

use crate::error::{CaseError, CaseResult};
use crate::model::Case;
use pv_ids::CaseId;

pub trait CaseStore: Send + Sync {
    /// Stores a new case, assigning the next creation sequence and revision 1.
    ///
    /// Fails with `Conflict` if a case with the same id or the same case number already exists.
    fn insert(&self, case: Case, ticket: &WriteTicket) -> CaseResult<Case>;

    fn get(&self, id: &CaseId) -> CaseResult<Option<Case>>;

    /// All cases, oldest first.
    fn list(&self) -> CaseResult<Vec<Case>>;

    /// Replaces the stored case only if its revision still equals `expected_revision`.
    ///
    /// `case.revision` must already be the new revision. Returns `false` when the stored
    /// revision moved on or the case no longer exists.
    fn compare_and_swap(
        &self,
        expected_revision: u64,
        case: &Case,
        ticket: &WriteTicket,
    ) -> CaseResult<bool>;

    /// Removes one case. Returns `false` if it did not exist.
    fn delete(&self, id: &CaseId, ticket: &WriteTicket) -> CaseResult<bool>;

    /// Removes every case and restarts the sequence. Returns how many were removed.
    fn clear(&self, ticket: &WriteTicket) -> CaseResult<usize>;
}

/// Claims `ticket` for a commit, failing if the caller already gave up.
pub(crate) fn claim(ticket: &WriteTicket) -> CaseResult<()> {
    if ticket.begin_commit() {
        Ok(())
    } else {
        Err(CaseError::TransientStore(
            "write abandoned by caller before commit".into(),
        ))
    }
}

/// Sorts by creation sequence, breaking ties on creation time and id.
pub(crate) fn sort_by_creation(cases: &mut [Case]) {
    cases.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share.

    use super::{CaseStore, WriteTicket};
    use crate::error::CaseError;
    use crate::model::{Case, Stage};
    use chrono::{TimeZone, Utc};
    use pv_ids::CaseId;

    pub(crate) fn new_case() -> Case {
        Case::blank(CaseId::new(), Utc::now(), Stage::Triage)
    }

    fn open() -> WriteTicket {
        WriteTicket::new()
    }

    pub(crate) fn insert_assigns_sequence_and_revision(store: &dyn CaseStore) {
        let first = store.insert(new_case(), &open()).unwrap();
        let second = store.insert(new_case(), &open()).unwrap();
        assert_eq!(first.revision, 1);
        assert!(second.sequence > first.sequence);

        let listed: Vec<CaseId> = store.list().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![first.id, second.id]);
    }

    pub(crate) fn insert_rejects_duplicate_id(store: &dyn CaseStore) {
        let case = store.insert(new_case(), &open()).unwrap();
        let err = store.insert(case, &open()).unwrap_err();
        assert!(matches!(err, CaseError::Conflict(_)));
    }

    /// Two ids sharing their first six hex characters, received the same day, yield the same
    /// case number; only the first may be stored until it is deleted.
    pub(crate) fn insert_rejects_duplicate_case_number(store: &dyn CaseStore) {
        let received = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let first_id = CaseId::parse("abcdef00000000000000000000000001").unwrap();
        let second_id = CaseId::parse("abcdef11111111111111111111111112").unwrap();
        let first = Case::blank(first_id, received, Stage::Triage);
        let second = Case::blank(second_id, received, Stage::Triage);
        assert_eq!(first.case_number, second.case_number);

        store.insert(first, &open()).unwrap();
        let err = store.insert(second.clone(), &open()).unwrap_err();
        assert!(matches!(err, CaseError::Conflict(ref n) if n == "PV-20261018-ABCDEF"));
        assert!(store.get(&second_id).unwrap().is_none());
        assert_eq!(store.list().unwrap().len(), 1);

        assert!(store.delete(&first_id, &open()).unwrap());
        let stored = store.insert(second, &open()).unwrap();
        assert_eq!(stored.case_number.as_str(), "PV-20261018-ABCDEF");

        store.clear(&open()).unwrap();
        let again = Case::blank(first_id, received, Stage::Triage);
        assert!(store.insert(again, &open()).is_ok());
    }

    pub(crate) fn compare_and_swap_checks_revision(store: &dyn CaseStore) {
        let stored = store.insert(new_case(), &open()).unwrap();

        let mut next = stored.clone();
        next.stage = Stage::DataEntry;
        next.revision = stored.revision + 1;
        assert!(store.compare_and_swap(stored.revision, &next, &open()).unwrap());

        let mut stale = stored.clone();
        stale.revision = stored.revision + 1;
        stale.stage = Stage::MedicalReview;
        assert!(!store.compare_and_swap(stored.revision, &stale, &open()).unwrap());

        let current = store.get(&stored.id).unwrap().unwrap();
        assert_eq!(current.stage, Stage::DataEntry);
        assert_eq!(current.revision, 2);
    }

    pub(crate) fn delete_and_clear(store: &dyn CaseStore) {
        let a = store.insert(new_case(), &open()).unwrap();
        store.insert(new_case(), &open()).unwrap();
        assert!(store.delete(&a.id, &open()).unwrap());
        assert!(!store.delete(&a.id, &open()).unwrap());
        assert!(store.get(&a.id).unwrap().is_none());
        assert_eq!(store.clear(&open()).unwrap(), 1);
        assert!(store.list().unwrap().is_empty());

        let fresh = store.insert(new_case(), &open()).unwrap();
        assert_eq!(fresh.sequence, 1);
    }

    pub(crate) fn abandoned_writes_are_not_committed(store: &dyn CaseStore) {
        let abandoned = WriteTicket::new();
        assert!(abandoned.abandon());

        let err = store.insert(new_case(), &abandoned).unwrap_err();
        assert!(matches!(err, CaseError::TransientStore(_)));
        assert!(store.list().unwrap().is_empty());

        let stored = store.insert(new_case(), &open()).unwrap();
        let mut next = stored.clone();
        next.stage = Stage::DataEntry;
        next.revision = stored.revision + 1;
        assert!(store.compare_and_swap(stored.revision, &next, &abandoned).is_err());
        assert!(store.delete(&stored.id, &abandoned).is_err());
        assert!(store.clear(&abandoned).is_err());

        let current = store.get(&stored.id).unwrap().unwrap();
        assert_eq!(current.stage, Stage::Triage);
        assert_eq!(current.revision, 1);
    }
}

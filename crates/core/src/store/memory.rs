use super::{claim, sort_by_creation, CaseStore, WriteTicket};
use crate::error::{CaseError, CaseResult};
use crate::model::Case;
use pv_ids::{CaseId, CaseNumber};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    cases: HashMap<CaseId, Case>,
    numbers: HashMap<CaseNumber, CaseId>,
    last_sequence: u64,
}

/// In-memory case store. Cheap to build, lost on exit.
#[derive(Default)]
pub struct MemoryCaseStore {
    inner: RwLock<Inner>,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CaseResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| CaseError::TransientStore("case store lock poisoned".into()))
    }

    fn write(&self) -> CaseResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| CaseError::TransientStore("case store lock poisoned".into()))
    }
}

impl CaseStore for MemoryCaseStore {
    fn insert(&self, mut case: Case, ticket: &WriteTicket) -> CaseResult<Case> {
        let mut inner = self.write()?;
        if inner.cases.contains_key(&case.id) {
            return Err(CaseError::Conflict(case.id.to_string()));
        }
        if inner.numbers.contains_key(&case.case_number) {
            return Err(CaseError::Conflict(case.case_number.to_string()));
        }
        claim(ticket)?;
        inner.last_sequence += 1;
        case.sequence = inner.last_sequence;
        case.revision = 1;
        inner.numbers.insert(case.case_number.clone(), case.id);
        inner.cases.insert(case.id, case.clone());
        Ok(case)
    }

    fn get(&self, id: &CaseId) -> CaseResult<Option<Case>> {
        Ok(self.read()?.cases.get(id).cloned())
    }

    fn list(&self) -> CaseResult<Vec<Case>> {
        let mut cases: Vec<Case> = self.read()?.cases.values().cloned().collect();
        sort_by_creation(&mut cases);
        Ok(cases)
    }

    fn compare_and_swap(
        &self,
        expected_revision: u64,
        case: &Case,
        ticket: &WriteTicket,
    ) -> CaseResult<bool> {
        let mut inner = self.write()?;
        match inner.cases.get_mut(&case.id) {
            Some(stored) if stored.revision == expected_revision => {
                claim(ticket)?;
                *stored = case.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, id: &CaseId, ticket: &WriteTicket) -> CaseResult<bool> {
        let mut inner = self.write()?;
        claim(ticket)?;
        match inner.cases.remove(id) {
            Some(removed) => {
                inner.numbers.remove(&removed.case_number);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear(&self, ticket: &WriteTicket) -> CaseResult<usize> {
        let mut inner = self.write()?;
        claim(ticket)?;
        let removed = inner.cases.len();
        inner.cases.clear();
        inner.numbers.clear();
        inner.last_sequence = 0;
        Ok(removed)
    }
}

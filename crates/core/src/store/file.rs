//! Sharded YAML file store.
//!
//! ## Storage layout
//!
//! ```text
//! <data_dir>/cases/
//!   <s1>/
//!     <s2>/
//!       <32hex-id>/
//!         case.yaml
//! ```
//!
//! where `s1` and `s2` are the first four hex characters of the case id. Writes go to
//! `case.yaml.tmp` and are renamed over `case.yaml`, so readers see either the old or the new
//! document. All writers in the process are serialised by one mutex; that mutex also holds the
//! last issued sequence number and the index of case numbers in use, both rebuilt on open.

use super::{claim, sort_by_creation, CaseStore, WriteTicket};
use crate::constants::{CASES_DIR_NAME, CASE_FILE_NAME, CASE_TMP_SUFFIX};
use crate::error::{CaseError, CaseResult};
use crate::model::Case;
use crate::parse_yaml;
use pv_ids::{CaseId, CaseNumber};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// State owned by the write lock.
#[derive(Default)]
struct Ledger {
    last_sequence: u64,
    numbers: HashMap<CaseNumber, CaseId>,
}

pub struct FileCaseStore {
    cases_dir: PathBuf,
    write_lock: Mutex<Ledger>,
}

impl FileCaseStore {
    /// Opens (creating if needed) the store under `data_dir/cases`.
    ///
    /// Existing documents are scanned once to recover the last issued sequence number and the
    /// case numbers in use.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Root data directory; cases live in its `cases` subdirectory.
    ///
    /// # Errors
    ///
    /// Returns `TransientStore` if the directory cannot be created or listed.
    pub fn open(data_dir: &Path) -> CaseResult<Self> {
        let cases_dir = data_dir.join(CASES_DIR_NAME);
        fs::create_dir_all(&cases_dir)
            .map_err(|e| CaseError::store_io("failed to create cases directory", e))?;

        let store = Self {
            cases_dir,
            write_lock: Mutex::new(Ledger::default()),
        };
        let mut ledger = Ledger::default();
        for case in store.list()? {
            ledger.last_sequence = ledger.last_sequence.max(case.sequence);
            ledger.numbers.insert(case.case_number, case.id);
        }
        tracing::debug!(
            "opened case store at {} ({} cases, last sequence {})",
            store.cases_dir.display(),
            ledger.numbers.len(),
            ledger.last_sequence
        );
        *store.lock()? = ledger;
        Ok(store)
    }

    pub fn cases_dir(&self) -> &Path {
        &self.cases_dir
    }

    fn lock(&self) -> CaseResult<MutexGuard<'_, Ledger>> {
        self.write_lock
            .lock()
            .map_err(|_| CaseError::TransientStore("case store lock poisoned".into()))
    }

    fn case_file(&self, id: &CaseId) -> PathBuf {
        id.sharded_dir(&self.cases_dir).join(CASE_FILE_NAME)
    }

    fn read_case(path: &Path) -> CaseResult<Option<Case>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CaseError::store_io("failed to read case file", e)),
        };
        parse_yaml::<Case>(&text)
            .map(Some)
            .map_err(|message| CaseError::CorruptRecord {
                path: path.to_path_buf(),
                message,
            })
    }

    fn write_case(path: &Path, case: &Case) -> CaseResult<()> {
        let yaml = serde_yaml::to_string(case).map_err(CaseError::YamlSerialization)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaseError::store_io("failed to create case directory", e))?;
        }
        let tmp = path.with_extension(CASE_TMP_SUFFIX);
        fs::write(&tmp, yaml).map_err(|e| CaseError::store_io("failed to write case file", e))?;
        fs::rename(&tmp, path).map_err(|e| CaseError::store_io("failed to replace case file", e))
    }

    /// Every `case.yaml` path under the sharded tree.
    fn case_files(&self) -> CaseResult<Vec<PathBuf>> {
        let mut files = Vec::new();

        let s1_iter = match fs::read_dir(&self.cases_dir) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(CaseError::store_io("failed to list cases", e)),
        };
        for s1 in s1_iter.flatten() {
            let s1_path = s1.path();
            if !s1_path.is_dir() {
                continue;
            }
            let Ok(s2_iter) = fs::read_dir(&s1_path) else {
                continue;
            };
            for s2 in s2_iter.flatten() {
                let s2_path = s2.path();
                if !s2_path.is_dir() {
                    continue;
                }
                let Ok(id_iter) = fs::read_dir(&s2_path) else {
                    continue;
                };
                for id_ent in id_iter.flatten() {
                    let case_path = id_ent.path().join(CASE_FILE_NAME);
                    if case_path.is_file() {
                        files.push(case_path);
                    }
                }
            }
        }

        Ok(files)
    }
}

impl CaseStore for FileCaseStore {
    fn insert(&self, mut case: Case, ticket: &WriteTicket) -> CaseResult<Case> {
        let mut ledger = self.lock()?;
        let path = self.case_file(&case.id);
        if path.exists() {
            return Err(CaseError::Conflict(case.id.to_string()));
        }
        if ledger.numbers.contains_key(&case.case_number) {
            return Err(CaseError::Conflict(case.case_number.to_string()));
        }
        claim(ticket)?;
        case.sequence = ledger.last_sequence + 1;
        case.revision = 1;
        Self::write_case(&path, &case)?;
        ledger.last_sequence = case.sequence;
        ledger.numbers.insert(case.case_number.clone(), case.id);
        Ok(case)
    }

    fn get(&self, id: &CaseId) -> CaseResult<Option<Case>> {
        Self::read_case(&self.case_file(id))
    }

    fn list(&self) -> CaseResult<Vec<Case>> {
        let mut cases = Vec::new();
        for path in self.case_files()? {
            match Self::read_case(&path) {
                Ok(Some(case)) => cases.push(case),
                Ok(None) => {}
                Err(CaseError::CorruptRecord { path, message }) => {
                    tracing::warn!("skipping corrupt case {}: {}", path.display(), message);
                }
                Err(e) => return Err(e),
            }
        }
        sort_by_creation(&mut cases);
        Ok(cases)
    }

    fn compare_and_swap(
        &self,
        expected_revision: u64,
        case: &Case,
        ticket: &WriteTicket,
    ) -> CaseResult<bool> {
        let _guard = self.lock()?;
        let path = self.case_file(&case.id);
        match Self::read_case(&path)? {
            Some(stored) if stored.revision == expected_revision => {
                claim(ticket)?;
                Self::write_case(&path, case)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, id: &CaseId, ticket: &WriteTicket) -> CaseResult<bool> {
        let mut ledger = self.lock()?;
        claim(ticket)?;
        let dir = id.sharded_dir(&self.cases_dir);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                ledger.numbers.retain(|_, owner| owner != id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CaseError::store_io("failed to delete case", e)),
        }
    }

    fn clear(&self, ticket: &WriteTicket) -> CaseResult<usize> {
        let mut ledger = self.lock()?;
        claim(ticket)?;
        let removed = self.case_files()?.len();
        match fs::remove_dir_all(&self.cases_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CaseError::store_io("failed to clear cases", e)),
        }
        fs::create_dir_all(&self.cases_dir)
            .map_err(|e| CaseError::store_io("failed to create cases directory", e))?;
        *ledger = Ledger::default();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, FileCaseStore) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileCaseStore::open(temp_dir.path()).expect("open should succeed");
        (temp_dir, store)
    }

    #[test]
    fn insert_assigns_sequence_and_revision() {
        let (_dir, store) = open_store();
        contract::insert_assigns_sequence_and_revision(&store);
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let (_dir, store) = open_store();
        contract::insert_rejects_duplicate_id(&store);
    }

    #[test]
    fn insert_rejects_duplicate_case_number() {
        let (_dir, store) = open_store();
        contract::insert_rejects_duplicate_case_number(&store);
    }

    #[test]
    fn compare_and_swap_checks_revision() {
        let (_dir, store) = open_store();
        contract::compare_and_swap_checks_revision(&store);
    }

    #[test]
    fn abandoned_writes_are_not_committed() {
        let (_dir, store) = open_store();
        contract::abandoned_writes_are_not_committed(&store);
    }

    #[test]
    fn delete_and_clear() {
        let (_dir, store) = open_store();
        contract::delete_and_clear(&store);
    }

    #[test]
    fn case_is_written_to_sharded_path_without_leftover_tmp() {
        let (_dir, store) = open_store();
        let case = store.insert(contract::new_case(), &WriteTicket::new()).unwrap();

        let id = case.id.to_string();
        let expected = store
            .cases_dir()
            .join(&id[0..2])
            .join(&id[2..4])
            .join(&id)
            .join(CASE_FILE_NAME);
        assert!(expected.is_file());
        assert!(!expected.with_extension(CASE_TMP_SUFFIX).exists());

        let text = fs::read_to_string(&expected).unwrap();
        assert!(text.contains("currentStep: 1"));
        assert!(text.contains("status: New"));
    }

    #[test]
    fn reopen_continues_sequence() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileCaseStore::open(temp_dir.path()).unwrap();
            store.insert(contract::new_case(), &WriteTicket::new()).unwrap();
            store.insert(contract::new_case(), &WriteTicket::new()).unwrap();
        }
        let store = FileCaseStore::open(temp_dir.path()).unwrap();
        let third = store.insert(contract::new_case(), &WriteTicket::new()).unwrap();
        assert_eq!(third.sequence, 3);
    }

    #[test]
    fn reopen_remembers_case_numbers_in_use() {
        let temp_dir = TempDir::new().unwrap();
        let received = chrono::Utc::now();
        let first_id = CaseId::parse("0123450000000000000000000000000a").unwrap();
        let second_id = CaseId::parse("012345ffffffffffffffffffffffffff").unwrap();
        {
            let store = FileCaseStore::open(temp_dir.path()).unwrap();
            let first = Case::blank(first_id, received, crate::model::Stage::Triage);
            store.insert(first, &WriteTicket::new()).unwrap();
        }
        let store = FileCaseStore::open(temp_dir.path()).unwrap();
        let second = Case::blank(second_id, received, crate::model::Stage::Triage);
        let err = store.insert(second, &WriteTicket::new()).unwrap_err();
        assert!(matches!(err, CaseError::Conflict(_)));
    }

    #[test]
    fn corrupt_document_is_reported_on_get_and_skipped_on_list() {
        let (_dir, store) = open_store();
        let good = store.insert(contract::new_case(), &WriteTicket::new()).unwrap();
        let bad = store.insert(contract::new_case(), &WriteTicket::new()).unwrap();
        fs::write(store.case_file(&bad.id), "id: [unclosed").unwrap();

        let err = store.get(&bad.id).unwrap_err();
        assert!(matches!(err, CaseError::CorruptRecord { .. }));

        let listed: Vec<CaseId> = store.list().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![good.id]);
    }
}

//! Hand-off between a caller that may stop waiting and the store that commits.
//!
//! A ticket starts open. The store flips it to committing under its write lock immediately
//! before touching the stored document; a caller that gives up flips it to abandoned. Whichever
//! flip lands first wins, so an abandoned write is never committed and a committing write is
//! never reported as abandoned.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const OPEN: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

#[derive(Clone, Debug, Default)]
pub struct WriteTicket(Arc<AtomicU8>);

impl WriteTicket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the right to commit.
    ///
    /// # Returns
    ///
    /// `false` if the caller already abandoned the write. Claiming twice is allowed, so a
    /// retried insert under the same ticket still commits.
    pub fn begin_commit(&self) -> bool {
        match self
            .0
            .compare_exchange(OPEN, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(state) => state == COMMITTING,
        }
    }

    /// Gives up on the write.
    ///
    /// # Returns
    ///
    /// `true` if nothing will be committed under this ticket; `false` if the store has already
    /// started committing, in which case the caller must wait for the outcome.
    pub fn abandon(&self) -> bool {
        match self
            .0
            .compare_exchange(OPEN, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(state) => state == ABANDONED,
        }
    }
}

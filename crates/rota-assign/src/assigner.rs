use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rota_core::{clock_seed, rows_from_records, shuffled_indices, Assignment, BatchRow, User};
use rota_storage::{next_user, RotationView, Storage};
use tracing::{debug, info, warn};

use crate::AssignError;

/// Single-writer assignment service.
///
/// Each row goes through `Storage::assign_next`, which selects and records in
/// one atomic step in the store. `writer` is additionally held across a whole
/// batch so batches submitted through one `Assigner` come out contiguous.
pub struct Assigner<S: Storage> {
    store: Arc<S>,
    writer: Mutex<()>,
    seed: Option<u64>,
}

impl<S: Storage> Assigner<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, writer: Mutex::new(()), seed: None }
    }

    /// Fixed shuffle seed; `None` reseeds from the clock on every batch.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Who would get the next mission, without recording anything.
    pub fn peek_next(&self) -> Result<Option<User>, AssignError> {
        let _guard = self.writer.lock().map_err(|_| AssignError::LockPoisoned)?;
        next_user(self.store.as_ref()).map_err(AssignError::Persistence)
    }

    /// Validate raw records, then assign them. A malformed record fails the
    /// call before any mission is written.
    pub fn assign_records<T: AsRef<str>>(
        &self,
        records: &[Vec<T>],
        has_header: bool,
    ) -> Result<Vec<Assignment>, AssignError> {
        let rows = rows_from_records(records, has_header)?;
        self.assign(&rows)
    }

    pub fn assign(&self, rows: &[BatchRow]) -> Result<Vec<Assignment>, AssignError> {
        let seed = self.seed.unwrap_or_else(clock_seed);
        self.assign_with_rng(rows, &mut StdRng::seed_from_u64(seed))
    }

    /// Assign every row to the next user in rotation, visiting rows in a
    /// shuffled order. The result follows that shuffled order.
    ///
    /// Each mission is committed as soon as it is assigned; on error the
    /// missions already written stay and the first error is returned.
    pub fn assign_with_rng<R: Rng + ?Sized>(
        &self,
        rows: &[BatchRow],
        rng: &mut R,
    ) -> Result<Vec<Assignment>, AssignError> {
        let _guard = self.writer.lock().map_err(|_| AssignError::LockPoisoned)?;
        if rows.is_empty() {
            return Ok(vec![]);
        }
        if self.store.first_active_user().map_err(AssignError::Persistence)?.is_none() {
            warn!(rows = rows.len(), "refusing batch: no active users");
            return Err(AssignError::NoActiveUsers);
        }

        info!(rows = rows.len(), "assigning batch");
        let mut out = Vec::with_capacity(rows.len());
        for idx in shuffled_indices(rows.len(), rng) {
            let row = &rows[idx];
            let mission = self
                .store
                .assign_next(&row.batch, &row.customer)
                .map_err(AssignError::Persistence)?
                .ok_or(AssignError::NoActiveUsers)?;
            debug!(mission = %mission.id, batch = %mission.batch, customer = %mission.customer, user = %mission.user_name, "assigned");
            out.push(Assignment { batch: mission.batch, customer: mission.customer, user_name: mission.user_name });
        }
        info!(assigned = out.len(), "batch assigned");
        Ok(out)
    }
}

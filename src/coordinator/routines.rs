use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Mutation;
use crate::error::{Error, Result};
use crate::model::{Routine, RoutineDone};
use crate::repository::Repositories;
use crate::state::HouseholdState;

/// Record that a routine was just done
pub struct MarkRoutineDone {
    id: String,
    patch: RoutineDone,
}

impl MarkRoutineDone {
    pub fn new(id: &str, user_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            patch: RoutineDone {
                last_done_at: Some(at),
                last_done_by: Some(user_id.to_string()),
            },
        }
    }
}

#[async_trait]
impl Mutation for MarkRoutineDone {
    type Snapshot = Routine;
    type Output = ();

    fn name(&self) -> &'static str {
        "mark routine done"
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<Routine> {
        let routine = state
            .routines
            .iter_mut()
            .find(|r| r.id == self.id)
            .ok_or_else(|| Error::not_found("routines", &self.id))?;

        let original = routine.clone();
        routine.last_done_at = self.patch.last_done_at;
        routine.last_done_by = self.patch.last_done_by.clone();
        Ok(original)
    }

    async fn commit(&self, repos: &Repositories) -> Result<()> {
        repos.routines.update(&self.id, &self.patch).await
    }

    fn compensate(&self, state: &mut HouseholdState, original: Routine) {
        if let Some(routine) = state.routines.iter_mut().find(|r| r.id == self.id) {
            *routine = original;
        }
    }
}

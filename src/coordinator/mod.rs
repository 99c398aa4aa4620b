//! Optimistic mutations
//!
//! Every user-initiated write is a [`Mutation`]: it edits the local state
//! first, then writes to the store. When the write succeeds the command may
//! fold the stored row back in (swapping a temporary id for the real one);
//! when it fails the edit is undone from the snapshot taken at apply time
//! and the error is returned to the caller.

mod bills;
mod categories;
mod grocery;
mod rows;
mod routines;
mod tasks;

pub use self::bills::{DeleteBill, ToggleBillPaid};
pub use self::categories::DeleteCategory;
pub use self::grocery::UpdateGroceryStatus;
pub use self::rows::{
    AddBill, AddCategory, AddGroceryItem, AddRoutine, CreateTask, DeleteGroceryItem,
    DeleteRoutine, Insert, Listed, Remove,
};
pub use self::routines::MarkRoutineDone;
pub use self::tasks::{CompleteTask, DeleteTask, ReopenTask, TaskList};

use async_trait::async_trait;
use log::{debug, error};

use crate::error::Result;
use crate::repository::Repositories;
use crate::state::{HouseholdState, StateHandle};

/// One optimistic write: apply, commit, then confirm or compensate
#[async_trait]
pub trait Mutation: Send + Sync {
    /// What [`Mutation::compensate`] needs to undo [`Mutation::apply`]
    type Snapshot: Send;
    /// What the store write produced
    type Output: Send;

    fn name(&self) -> &'static str;

    /// Edit the local state. An error here means nothing was changed and
    /// nothing will be written.
    fn apply(&mut self, state: &mut HouseholdState) -> Result<Self::Snapshot>;

    /// Write to the store
    async fn commit(&self, repos: &Repositories) -> Result<Self::Output>;

    /// Fold the store's answer into the local state
    fn confirm(&self, _state: &mut HouseholdState, _output: &Self::Output) {}

    /// Undo [`Mutation::apply`]
    fn compensate(&self, state: &mut HouseholdState, snapshot: Self::Snapshot);
}

/// Runs mutations against one state and store
#[derive(Clone)]
pub struct Coordinator {
    state: StateHandle,
    repos: Repositories,
}

impl Coordinator {
    pub fn new(state: StateHandle, repos: Repositories) -> Self {
        Self { state, repos }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub async fn execute<M: Mutation>(&self, mut mutation: M) -> Result<M::Output> {
        let snapshot = self.state.write(|state| mutation.apply(state))?;

        match mutation.commit(&self.repos).await {
            Ok(output) => {
                self.state.write(|state| mutation.confirm(state, &output));
                debug!("{} committed", mutation.name());
                Ok(output)
            }
            Err(err) => {
                error!("{} failed, rolling back: {}", mutation.name(), err);
                self.state
                    .write(|state| mutation.compensate(state, snapshot));
                Err(err)
            }
        }
    }
}

/// Remove the first element matching `pred`, returning it with its index
pub(crate) fn take<T>(list: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> Option<(usize, T)> {
    let index = list.iter().position(pred)?;
    Some((index, list.remove(index)))
}

/// Put an element back where it was, or at the end if the list shrank
pub(crate) fn restore<T>(list: &mut Vec<T>, index: usize, item: T) {
    let index = index.min(list.len());
    list.insert(index, item);
}

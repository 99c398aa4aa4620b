use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{restore, take, Mutation};
use crate::error::{Error, Result};
use crate::model::{Task, TaskCompletion};
use crate::repository::Repositories;
use crate::state::HouseholdState;

/// Move a pending task to the completed list
pub struct CompleteTask {
    id: String,
    user_id: String,
    at: DateTime<Utc>,
}

impl CompleteTask {
    pub fn new(id: &str, user_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            at,
        }
    }
}

#[async_trait]
impl Mutation for CompleteTask {
    type Snapshot = (usize, Task);
    type Output = ();

    fn name(&self) -> &'static str {
        "complete task"
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<(usize, Task)> {
        let (index, original) = take(&mut state.tasks, |t| t.id == self.id)
            .ok_or_else(|| Error::not_found("tasks", &self.id))?;

        let mut done = original.clone();
        done.complete(&self.user_id, self.at);
        state.completed_tasks.insert(0, done);
        state.completed_this_week += 1;
        Ok((index, original))
    }

    async fn commit(&self, repos: &Repositories) -> Result<()> {
        repos
            .tasks
            .update(&self.id, &TaskCompletion::completed(&self.user_id, self.at))
            .await
    }

    fn compensate(&self, state: &mut HouseholdState, (index, original): (usize, Task)) {
        state.completed_tasks.retain(|t| t.id != self.id);
        state.completed_this_week = state.completed_this_week.saturating_sub(1);
        restore(&mut state.tasks, index, original);
    }
}

/// Move a completed task back to pending
pub struct ReopenTask {
    id: String,
    week_start: DateTime<Utc>,
}

impl ReopenTask {
    /// `week_start` decides whether the completion was counted this week
    pub fn new(id: &str, week_start: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            week_start,
        }
    }
}

#[async_trait]
impl Mutation for ReopenTask {
    type Snapshot = (usize, Task, bool);
    type Output = ();

    fn name(&self) -> &'static str {
        "reopen task"
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<(usize, Task, bool)> {
        let (index, original) = take(&mut state.completed_tasks, |t| t.id == self.id)
            .ok_or_else(|| Error::not_found("tasks", &self.id))?;

        let counted = original
            .completed_at
            .map_or(false, |at| at >= self.week_start);
        if counted {
            state.completed_this_week = state.completed_this_week.saturating_sub(1);
        }

        let mut reopened = original.clone();
        reopened.reopen();
        state.tasks.insert(0, reopened);
        Ok((index, original, counted))
    }

    async fn commit(&self, repos: &Repositories) -> Result<()> {
        repos
            .tasks
            .update(&self.id, &TaskCompletion::pending())
            .await
    }

    fn compensate(
        &self,
        state: &mut HouseholdState,
        (index, original, counted): (usize, Task, bool),
    ) {
        state.tasks.retain(|t| t.id != self.id);
        if counted {
            state.completed_this_week += 1;
        }
        restore(&mut state.completed_tasks, index, original);
    }
}

/// Which list a deleted task came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskList {
    Pending,
    Completed,
}

/// Delete a task from either list
pub struct DeleteTask {
    id: String,
}

impl DeleteTask {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait]
impl Mutation for DeleteTask {
    type Snapshot = (TaskList, usize, Task);
    type Output = ();

    fn name(&self) -> &'static str {
        "delete task"
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<(TaskList, usize, Task)> {
        if let Some((index, task)) = take(&mut state.tasks, |t| t.id == self.id) {
            return Ok((TaskList::Pending, index, task));
        }
        take(&mut state.completed_tasks, |t| t.id == self.id)
            .map(|(index, task)| (TaskList::Completed, index, task))
            .ok_or_else(|| Error::not_found("tasks", &self.id))
    }

    async fn commit(&self, repos: &Repositories) -> Result<()> {
        repos.tasks.delete(&self.id).await
    }

    fn compensate(&self, state: &mut HouseholdState, (list, index, task): (TaskList, usize, Task)) {
        let list = match list {
            TaskList::Pending => &mut state.tasks,
            TaskList::Completed => &mut state.completed_tasks,
        };
        restore(list, index, task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::state::StateHandle;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (Arc<MemoryStore>, Coordinator, Vec<Task>) {
        let store = Arc::new(MemoryStore::new());
        let rows = crate::store::TableStore::insert(
            store.as_ref(),
            "tasks",
            vec![
                json!({"title": "Regar plantas", "assigned_to": "both", "priority": "baja",
                       "status": "pending", "created_by": "u1"}),
                json!({"title": "Cambiar ampolleta", "assigned_to": "u1", "priority": "alta",
                       "status": "pending", "created_by": "u1"}),
            ],
        )
        .await
        .unwrap();
        let tasks: Vec<Task> = rows
            .into_iter()
            .map(|r| serde_json::from_value(r).unwrap())
            .collect();

        let state = StateHandle::new();
        state.write(|s| s.tasks = tasks.clone());
        let coordinator = Coordinator::new(state, Repositories::new(store.clone()));
        (store, coordinator, tasks)
    }

    #[tokio::test]
    async fn test_complete_then_reopen() {
        let (store, coordinator, tasks) = setup().await;
        let at = Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap();
        let week_start = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        coordinator
            .execute(CompleteTask::new(&tasks[1].id, "u1", at))
            .await
            .unwrap();
        let state = coordinator.state().snapshot();
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.completed_tasks[0].completed_at, Some(at));
        assert_eq!(state.completed_this_week, 1);
        assert_eq!(store.rows("tasks")[1]["status"], "completed");

        coordinator
            .execute(ReopenTask::new(&tasks[1].id, week_start))
            .await
            .unwrap();
        let state = coordinator.state().snapshot();
        assert_eq!(state.tasks.len(), 2);
        assert!(state.completed_tasks.is_empty());
        assert_eq!(state.completed_this_week, 0);
        assert!(store.rows("tasks")[1]["completed_at"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_written() {
        let (store, coordinator, _) = setup().await;
        store.fail_always("update", "tasks");

        let result = coordinator
            .execute(CompleteTask::new("missing", "u1", Utc::now()))
            .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(coordinator.state().tasks().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_position() {
        let (store, coordinator, tasks) = setup().await;
        store.fail_next("delete", "tasks");

        let result = coordinator.execute(DeleteTask::new(&tasks[0].id)).await;
        assert!(result.is_err());
        assert_eq!(coordinator.state().tasks(), tasks);
        assert_eq!(store.rows("tasks").len(), 2);
    }
}

//! In-memory household state

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::identity::CurrentUser;
use crate::model::{Bill, BillPayment, Category, GroceryItem, GroceryStatus, Routine, Task};

/// Name shown for anyone but the signed-in user
pub const OTHER_USER: &str = "Otro";

/// A person seen on the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseholdUser {
    pub id: String,
    pub name: String,
}

/// Everything the board shows, as last fetched plus local optimistic edits
#[derive(Debug, Clone, Default)]
pub struct HouseholdState {
    pub user: Option<CurrentUser>,
    pub user_name: String,
    /// Pending tasks, newest first
    pub tasks: Vec<Task>,
    /// Completed tasks, most recently completed first
    pub completed_tasks: Vec<Task>,
    pub categories: Vec<Category>,
    /// Ordered by due day
    pub bills: Vec<Bill>,
    /// Current month only
    pub payments: Vec<BillPayment>,
    pub routines: Vec<Routine>,
    /// Ordered by category, then name
    pub grocery_items: Vec<GroceryItem>,
    /// True until the first fetch settles
    pub loading: bool,
    pub completed_this_week: usize,
    /// User id → display name
    pub user_map: BTreeMap<String, String>,
}

impl HouseholdState {
    pub fn new() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    /// Items marked as needed
    pub fn grocery_needed(&self) -> usize {
        self.grocery_items
            .iter()
            .filter(|i| i.status == GroceryStatus::Needed)
            .count()
    }

    /// Everyone in the user map, signed-in user first
    pub fn users(&self) -> Vec<HouseholdUser> {
        let me = self.user_id();
        let mut users: Vec<HouseholdUser> = self
            .user_map
            .iter()
            .map(|(id, name)| HouseholdUser {
                id: id.clone(),
                name: name.clone(),
            })
            .collect();
        users.sort_by_key(|u| Some(u.id.as_str()) != me);
        users
    }

    pub fn display_name(&self, user_id: &str) -> &str {
        self.user_map
            .get(user_id)
            .map(String::as_str)
            .unwrap_or(OTHER_USER)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn bill(&self, id: &str) -> Option<&Bill> {
        self.bills.iter().find(|b| b.id == id)
    }

    pub fn payment_for(&self, bill_id: &str) -> Option<&BillPayment> {
        self.payments.iter().find(|p| p.bill_id == bill_id)
    }

    /// A task from either list
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .chain(self.completed_tasks.iter())
            .find(|t| t.id == id)
    }

    /// Map the signed-in user to their name and every other creator or
    /// completer on the board to [`OTHER_USER`]
    pub fn rebuild_user_map(&mut self) {
        let mut map = BTreeMap::new();
        if let Some(user) = &self.user {
            map.insert(user.id.clone(), self.user_name.clone());
        }
        for task in self.tasks.iter().chain(self.completed_tasks.iter()) {
            let seen = std::iter::once(&task.created_by).chain(task.completed_by.as_ref());
            for id in seen {
                if !id.is_empty() {
                    map.entry(id.clone()).or_insert_with(|| OTHER_USER.to_string());
                }
            }
        }
        self.user_map = map;
    }
}

/// Shared handle to the household state.
///
/// Closures passed to [`StateHandle::read`] and [`StateHandle::write`] run
/// under the lock and must not block.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<HouseholdState>>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self::from_state(HouseholdState::new())
    }

    pub fn from_state(state: HouseholdState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&HouseholdState) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut HouseholdState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> HouseholdState {
        self.read(HouseholdState::clone)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read(|s| s.tasks.clone())
    }

    pub fn completed_tasks(&self) -> Vec<Task> {
        self.read(|s| s.completed_tasks.clone())
    }

    pub fn categories(&self) -> Vec<Category> {
        self.read(|s| s.categories.clone())
    }

    pub fn bills(&self) -> Vec<Bill> {
        self.read(|s| s.bills.clone())
    }

    pub fn payments(&self) -> Vec<BillPayment> {
        self.read(|s| s.payments.clone())
    }

    pub fn routines(&self) -> Vec<Routine> {
        self.read(|s| s.routines.clone())
    }

    pub fn grocery_items(&self) -> Vec<GroceryItem> {
        self.read(|s| s.grocery_items.clone())
    }

    pub fn loading(&self) -> bool {
        self.read(|s| s.loading)
    }

    pub fn completed_this_week(&self) -> usize {
        self.read(|s| s.completed_this_week)
    }

    pub fn grocery_needed(&self) -> usize {
        self.read(HouseholdState::grocery_needed)
    }

    pub fn user(&self) -> Option<CurrentUser> {
        self.read(|s| s.user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: &str, created_by: &str, completed_by: Option<&str>) -> Task {
        serde_json::from_value(json!({
            "id": id, "title": id, "assigned_to": "both", "priority": "media",
            "status": if completed_by.is_some() { "completed" } else { "pending" },
            "created_by": created_by, "completed_by": completed_by,
            "completed_at": completed_by.map(|_| "2024-03-10T10:00:00Z")
        }))
        .unwrap()
    }

    #[test]
    fn test_user_map_marks_others() {
        let mut state = HouseholdState::new();
        state.user = Some(CurrentUser::new("me", "camila@example.com"));
        state.user_name = "Camila".to_string();
        state.tasks = vec![task("t1", "me", None), task("t2", "partner", None)];
        state.completed_tasks = vec![task("t3", "me", Some("partner"))];

        state.rebuild_user_map();

        assert_eq!(state.display_name("me"), "Camila");
        assert_eq!(state.display_name("partner"), OTHER_USER);
        let users = state.users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "me");
    }

    #[test]
    fn test_handle_writes_are_visible() {
        let handle = StateHandle::new();
        assert!(handle.loading());
        handle.write(|s| {
            s.loading = false;
            s.completed_this_week = 2;
        });
        let clone = handle.clone();
        assert!(!clone.loading());
        assert_eq!(clone.completed_this_week(), 2);
    }
}

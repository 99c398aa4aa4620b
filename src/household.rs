//! The household: state, store and the commands that change them
//!
//! [`Household`] owns the in-memory state and is the only thing that
//! writes to it. Each command runs as an optimistic mutation through the
//! [`Coordinator`]; once the store write has succeeded, any auto-task
//! consequences run as separate best-effort writes. If one of those fails
//! it is logged and left for the next full refresh to repair.

use chrono::{DateTime, Utc};
use log::warn;
use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::config::{Clock, SyncOptions, SystemClock};
use crate::coordinator::{
    AddBill, AddCategory, AddGroceryItem, AddRoutine, CompleteTask, Coordinator, CreateTask,
    DeleteBill, DeleteCategory, DeleteGroceryItem, DeleteRoutine, DeleteTask, MarkRoutineDone,
    ReopenTask, ToggleBillPaid, UpdateGroceryStatus,
};
use crate::error::{Error, Result};
use crate::identity::IdentityProvider;
use crate::model::{
    Bill, BillDraft, BillPayment, Category, GroceryItem, GroceryStatus, NewBill, NewBillPayment,
    NewCategory, NewGroceryItem, NewRoutine, NewTask, Routine, RoutineDraft, Task, TaskDraft,
    TaskSource, TaskStatus,
};
use crate::repository::Repositories;
use crate::rules::RuleEngine;
use crate::seed::{DefaultSeeder, Seeder};
use crate::state::StateHandle;
use crate::store::{Filter, TableStore};

/// Builder for [`Household`]
pub struct HouseholdBuilder {
    store: Arc<dyn TableStore>,
    identity: Arc<dyn IdentityProvider>,
    options: SyncOptions,
    clock: Arc<dyn Clock>,
    seeder: Option<Arc<dyn Seeder>>,
}

impl HouseholdBuilder {
    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn seeder(mut self, seeder: Arc<dyn Seeder>) -> Self {
        self.seeder = Some(seeder);
        self
    }

    pub fn build(self) -> Household {
        let repos = Repositories::new(self.store);
        let state = StateHandle::new();
        let seeder = self.seeder.unwrap_or_else(|| {
            Arc::new(DefaultSeeder {
                currency: self.options.default_currency.clone(),
            })
        });
        Household {
            coordinator: Coordinator::new(state.clone(), repos.clone()),
            rules: RuleEngine::new(repos.clone(), self.options.clone(), self.clock.clone()),
            state,
            repos,
            identity: self.identity,
            seeder,
            clock: self.clock,
            options: self.options,
            fetch_generation: AtomicU64::new(0),
            applied_generation: AtomicU64::new(0),
        }
    }
}

/// Household state plus every command that changes it
pub struct Household {
    pub(crate) state: StateHandle,
    pub(crate) repos: Repositories,
    pub(crate) coordinator: Coordinator,
    pub(crate) rules: RuleEngine,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) seeder: Arc<dyn Seeder>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) options: SyncOptions,
    pub(crate) fetch_generation: AtomicU64,
    pub(crate) applied_generation: AtomicU64,
}

impl Household {
    pub fn builder(
        store: Arc<dyn TableStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> HouseholdBuilder {
        HouseholdBuilder {
            store,
            identity,
            options: SyncOptions::default(),
            clock: Arc::new(SystemClock),
            seeder: None,
        }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Id of the signed-in user, asking the identity provider if no fetch
    /// has established one yet
    pub async fn user_id(&self) -> Result<String> {
        if let Some(id) = self.state.read(|s| s.user_id().map(str::to_string)) {
            return Ok(id);
        }
        let user = self
            .identity
            .current_user()
            .await?
            .ok_or(Error::NotAuthenticated)?;
        let id = user.id.clone();
        self.state.write(|s| {
            s.user_name = user.display_name();
            s.user = Some(user);
        });
        Ok(id)
    }

    async fn best_effort<T>(&self, what: &str, work: impl Future<Output = Result<T>>) -> Option<T> {
        match work.await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("{} failed: {}", what, e);
                None
            }
        }
    }

    // Tasks

    pub async fn complete_task(&self, id: &str) -> Result<()> {
        let user_id = self.user_id().await?;
        self.coordinator
            .execute(CompleteTask::new(id, &user_id, self.now()))
            .await
    }

    pub async fn reopen_task(&self, id: &str) -> Result<()> {
        let week_start = self.options.week_start(self.now());
        self.coordinator
            .execute(ReopenTask::new(id, week_start))
            .await
    }

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(Error::invalid("task title is empty"));
        }
        if draft.budget.map_or(false, |b| b < 0.0) {
            return Err(Error::invalid("task budget is negative"));
        }
        let user_id = self.user_id().await?;

        let new_task = NewTask {
            title: title.to_string(),
            category_id: draft.category_id,
            assigned_to: draft.assigned_to,
            priority: draft.priority,
            due_date: draft.due_date,
            status: TaskStatus::Pending,
            created_by: user_id,
            budget: draft.budget,
            currency: draft
                .currency
                .unwrap_or_else(|| self.options.default_currency.clone()),
            source_kind: None,
            source_id: None,
        };
        self.coordinator
            .execute(CreateTask::new(new_task, self.now()))
            .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.coordinator.execute(DeleteTask::new(id)).await
    }

    // Grocery list

    pub async fn update_grocery_status(&self, id: &str, status: GroceryStatus) -> Result<()> {
        self.user_id().await?;
        self.coordinator
            .execute(UpdateGroceryStatus::new(id, status, self.now()))
            .await?;
        self.after_grocery_change().await;
        Ok(())
    }

    /// New items start out as needed
    pub async fn add_grocery_item(
        &self,
        name: &str,
        category: &str,
        quantity: Option<&str>,
    ) -> Result<GroceryItem> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("grocery item name is empty"));
        }
        let user_id = self.user_id().await?;

        let new_item = NewGroceryItem {
            name: name.to_string(),
            category: category.to_string(),
            status: GroceryStatus::Needed,
            quantity: quantity.map(str::to_string),
            created_by: user_id,
        };
        let item = self
            .coordinator
            .execute(AddGroceryItem::new(new_item, self.now()))
            .await?;
        self.after_grocery_change().await;
        Ok(item)
    }

    pub async fn delete_grocery_item(&self, id: &str) -> Result<()> {
        self.user_id().await?;
        self.coordinator.execute(DeleteGroceryItem::new(id)).await?;
        self.after_grocery_change().await;
        Ok(())
    }

    async fn after_grocery_change(&self) {
        let Ok(user_id) = self.user_id().await else {
            return;
        };
        self.best_effort(
            "supermarket task sync",
            self.rules.sync_grocery_task_with(|| self.state.grocery_items(), &user_id),
        )
        .await;
        self.best_effort("task refresh", self.refresh_tasks()).await;
    }

    // Bills

    /// Flip the payment's paid flag; its linked task follows
    pub async fn toggle_bill_paid(&self, payment_id: &str) -> Result<BillPayment> {
        let user_id = self.user_id().await?;
        let at = self.now();
        let payment = self
            .coordinator
            .execute(ToggleBillPaid::new(payment_id, &user_id, at))
            .await?;

        let linked = self
            .best_effort(
                "bill task update",
                self.rules
                    .set_bill_task_completion(&payment, payment.paid, &user_id, at),
            )
            .await
            .flatten();
        if linked.is_some() {
            self.best_effort("task refresh", self.refresh_tasks()).await;
        }
        Ok(payment)
    }

    /// Add a bill, open its payment for the current month and create its
    /// task if the due day is already near
    pub async fn add_bill(&self, draft: BillDraft) -> Result<Bill> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(Error::invalid("bill name is empty"));
        }
        if !(1..=31).contains(&draft.due_day) {
            return Err(Error::invalid(format!(
                "due day {} is not between 1 and 31",
                draft.due_day
            )));
        }
        if draft.amount.map_or(false, |a| a < 0.0) {
            return Err(Error::invalid("bill amount is negative"));
        }
        let user_id = self.user_id().await?;

        let new_bill = NewBill {
            name: name.to_string(),
            amount: draft.amount,
            due_day: draft.due_day,
            category: draft.category,
            auto_create_task_days: draft
                .auto_create_task_days
                .unwrap_or(self.options.default_auto_create_task_days),
            created_by: user_id.clone(),
        };
        let bill = self
            .coordinator
            .execute(AddBill::new(new_bill, self.now()))
            .await?;

        let (month, year) = self.options.month_year(self.now());
        let payment = self
            .best_effort(
                "payment insert",
                self.repos.payments.insert(&NewBillPayment {
                    bill_id: bill.id.clone(),
                    month,
                    year,
                    paid: false,
                }),
            )
            .await;

        if let Some(payment) = payment {
            self.state.write(|s| s.payments.push(payment.clone()));
            let links = self
                .best_effort(
                    "bill task sync",
                    self.rules
                        .sync_bill_tasks(std::slice::from_ref(&bill), &[payment], &user_id),
                )
                .await
                .unwrap_or_default();
            if !links.is_empty() {
                self.link_payments(&links);
                self.best_effort("task refresh", self.refresh_tasks()).await;
            }
        }
        Ok(bill)
    }

    /// Delete a bill, its payments and its pending task
    pub async fn delete_bill(&self, id: &str) -> Result<()> {
        self.coordinator.execute(DeleteBill::new(id)).await?;
        self.best_effort(
            "payment cleanup",
            self.repos
                .payments
                .delete_where(&[Filter::Eq("bill_id".to_string(), id.into())]),
        )
        .await;
        self.best_effort(
            "bill task cleanup",
            self.rules.drop_source_tasks(TaskSource::Bill, id),
        )
        .await;
        self.best_effort("task refresh", self.refresh_tasks()).await;
        Ok(())
    }

    pub(crate) fn link_payments(&self, links: &[crate::rules::BillTaskLink]) {
        self.state.write(|s| {
            for link in links {
                if let Some(payment) = s.payments.iter_mut().find(|p| p.id == link.payment_id) {
                    payment.task_id = Some(link.task.id.clone());
                }
            }
        });
    }

    // Routines

    /// Record the routine as done now and complete its pending task
    pub async fn mark_routine_done(&self, id: &str) -> Result<()> {
        let user_id = self.user_id().await?;
        let at = self.now();
        self.coordinator
            .execute(MarkRoutineDone::new(id, &user_id, at))
            .await?;

        let Some(routine) = self.state.read(|s| s.routines.iter().find(|r| r.id == id).cloned())
        else {
            return Ok(());
        };
        let completed = self
            .best_effort(
                "routine task completion",
                self.rules.complete_routine_task(&routine, &user_id, at),
            )
            .await
            .flatten();
        if completed.is_some() {
            self.best_effort("task refresh", self.refresh_tasks()).await;
        }
        Ok(())
    }

    /// Add a routine; a routine that was never done gets its task at once
    pub async fn add_routine(&self, draft: RoutineDraft) -> Result<Routine> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(Error::invalid("routine name is empty"));
        }
        if draft.frequency_days < 1 {
            return Err(Error::invalid("routine frequency must be at least one day"));
        }
        let user_id = self.user_id().await?;

        let new_routine = NewRoutine {
            name: name.to_string(),
            frequency_days: draft.frequency_days,
            category: draft.category,
            assigned_to: draft.assigned_to,
            created_by: user_id.clone(),
        };
        let routine = self
            .coordinator
            .execute(AddRoutine::new(new_routine, self.now()))
            .await?;

        let created = self
            .best_effort(
                "routine task sync",
                self.rules
                    .sync_routine_tasks(std::slice::from_ref(&routine), &user_id),
            )
            .await
            .unwrap_or_default();
        if !created.is_empty() {
            self.best_effort("task refresh", self.refresh_tasks()).await;
        }
        Ok(routine)
    }

    /// Delete a routine and its pending task
    pub async fn delete_routine(&self, id: &str) -> Result<()> {
        self.coordinator.execute(DeleteRoutine::new(id)).await?;
        self.best_effort(
            "routine task cleanup",
            self.rules.drop_source_tasks(TaskSource::Routine, id),
        )
        .await;
        self.best_effort("task refresh", self.refresh_tasks()).await;
        Ok(())
    }

    // Categories

    /// Add a category owned by the current user. Names are unique among
    /// the categories on the board, ignoring case.
    pub async fn add_category(&self, name: &str, emoji: &str, color: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("category name is empty"));
        }
        let taken = self.state.read(|s| {
            s.categories
                .iter()
                .any(|c| c.name.to_lowercase() == name.to_lowercase())
        });
        if taken {
            return Err(Error::invalid(format!("category '{}' already exists", name)));
        }
        let user_id = self.user_id().await?;

        let new_category = NewCategory {
            name: name.to_string(),
            emoji: emoji.to_string(),
            color: color.to_string(),
            user_id: Some(user_id),
        };
        self.coordinator
            .execute(AddCategory::new(new_category, self.now()))
            .await
    }

    pub async fn delete_category(&self, id: &str) -> Result<()> {
        let user_id = self.user_id().await?;
        self.coordinator
            .execute(DeleteCategory::new(id, &user_id))
            .await
    }
}

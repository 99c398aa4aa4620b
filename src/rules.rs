//! Auto-task rules
//!
//! Bills, routines and the grocery list each keep a task on the household
//! board without anyone creating it by hand:
//!
//! - a bill gets a "pay" task when its due day is near, linked from that
//!   month's payment row and completed or reopened with the payment
//! - an overdue routine gets a chore task, completed when the routine is
//!   marked done
//! - while there is anything left to buy, one supermarket task carries the
//!   count in its title, and it is completed once the list is empty
//!
//! Auto-tasks carry `source_kind`/`source_id`, so lookups never depend on
//! titles. The decisions are plain functions; [`RuleEngine`] runs them
//! against the store. Every operation can be re-run on the same data
//! without creating duplicates.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{Clock, GroceryTaskPolicy, SyncOptions};
use crate::error::Result;
use crate::model::{
    Assignee, Bill, BillPayment, GroceryItem, GroceryStatus, NewTask, PaymentTaskLink, Priority,
    Routine, Task, TaskCompletion, TaskSource, TaskStatus, TaskTitle,
};
use crate::repository::Repositories;
use crate::store::Query;

pub const BILL_TASK_CATEGORY: &str = "Pagos/Cuentas";
pub const GROCERY_TASK_CATEGORY: &str = "Compras";
pub const GROCERY_TASK_PREFIX: &str = "🛒 Ir al supermercado";

pub fn bill_task_title(bill: &Bill) -> String {
    format!("💰 Pagar {}", bill.name)
}

pub fn routine_task_title(routine: &Routine) -> String {
    format!("🧹 {}", routine.name)
}

pub fn grocery_task_title(open_items: usize) -> String {
    format!("{} ({} items)", GROCERY_TASK_PREFIX, open_items)
}

/// Due date of a bill in the given month. Days past the end of the month
/// fall on its last day.
pub fn bill_due_date(year: i32, month: u32, due_day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = next_month.pred_opt()?.day();
    first.with_day(due_day.clamp(1, last_day))
}

/// Whether a bill's task should exist on `today`: from
/// `auto_create_task_days` before the due day until `grace_days` after it
///
/// The window is measured from the clamped due date, so a bill due on the
/// 31st counts from the last day of shorter months.
pub fn bill_task_due(bill: &Bill, today: NaiveDate, grace_days: i32) -> bool {
    let Some(due) = bill_due_date(today.year(), today.month(), bill.due_day) else {
        return false;
    };
    let days_until = due.day() as i64 - today.day() as i64;
    days_until <= bill.auto_create_task_days as i64 && days_until >= -(grace_days as i64)
}

/// A routine never done is overdue; otherwise it is once strictly more than
/// `frequency_days` have passed
pub fn routine_is_overdue(routine: &Routine, now: DateTime<Utc>) -> bool {
    match routine.last_done_at {
        None => true,
        Some(last_done) => now - last_done > Duration::days(routine.frequency_days),
    }
}

/// Task category for a routine's chore task
pub fn routine_task_category(routine: &Routine) -> &'static str {
    match routine.category.as_str() {
        "Limpieza" | "Mantención" => "Mantención",
        _ => "Hogar",
    }
}

/// Items the supermarket task counts
pub fn grocery_open_count(items: &[GroceryItem], policy: GroceryTaskPolicy) -> usize {
    items
        .iter()
        .filter(|item| match policy {
            GroceryTaskPolicy::NeededOnly => item.status == GroceryStatus::Needed,
            GroceryTaskPolicy::NeededOrInCart => {
                matches!(item.status, GroceryStatus::Needed | GroceryStatus::InCart)
            }
        })
        .count()
}

/// What to do with the supermarket task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroceryPlan {
    Create { title: String },
    Rename { task_id: String, title: String },
    Complete { task_id: String },
    Nothing,
}

pub fn plan_grocery_task(open_items: usize, existing: Option<&Task>) -> GroceryPlan {
    match (open_items, existing) {
        (0, Some(task)) => GroceryPlan::Complete {
            task_id: task.id.clone(),
        },
        (0, None) => GroceryPlan::Nothing,
        (n, Some(task)) => {
            let title = grocery_task_title(n);
            if task.title == title {
                GroceryPlan::Nothing
            } else {
                GroceryPlan::Rename {
                    task_id: task.id.clone(),
                    title,
                }
            }
        }
        (n, None) => GroceryPlan::Create {
            title: grocery_task_title(n),
        },
    }
}

/// A bill task created or re-linked for a payment
#[derive(Debug, Clone)]
pub struct BillTaskLink {
    pub payment_id: String,
    pub task: Task,
}

/// Runs the auto-task rules against the store
pub struct RuleEngine {
    repos: Repositories,
    options: SyncOptions,
    clock: Arc<dyn Clock>,
    // One supermarket task per household: concurrent syncs must not both
    // see "none" and both insert.
    grocery_lock: Mutex<()>,
}

impl RuleEngine {
    pub fn new(repos: Repositories, options: SyncOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            repos,
            options,
            clock,
            grocery_lock: Mutex::new(()),
        }
    }

    async fn category_id(&self, name: &str) -> Result<Option<String>> {
        let category = self
            .repos
            .categories
            .first(Query::new().eq("name", name))
            .await?;
        Ok(category.map(|c| c.id))
    }

    async fn pending_source_tasks(&self, kind: TaskSource) -> Result<Vec<Task>> {
        self.repos
            .tasks
            .list(
                &Query::new()
                    .eq("status", TaskStatus::Pending.as_str())
                    .eq("source_kind", kind.as_str())
                    .order_by("created_at", true),
            )
            .await
    }

    fn new_auto_task(
        &self,
        title: String,
        category_id: Option<String>,
        assigned_to: Assignee,
        priority: Priority,
        source: (TaskSource, Option<String>),
        user_id: &str,
    ) -> NewTask {
        NewTask {
            title,
            category_id,
            assigned_to,
            priority,
            due_date: None,
            status: TaskStatus::Pending,
            created_by: user_id.to_string(),
            budget: None,
            currency: self.options.default_currency.clone(),
            source_kind: Some(source.0),
            source_id: source.1,
        }
    }

    /// Create the pay task for every bill whose current-month payment is
    /// unpaid, unlinked and within the task window
    pub async fn sync_bill_tasks(
        &self,
        bills: &[Bill],
        payments: &[BillPayment],
        user_id: &str,
    ) -> Result<Vec<BillTaskLink>> {
        let today = self.options.local_date(self.clock.now());
        let (month, year) = (today.month(), today.year());
        let mut links = Vec::new();
        let mut category_id = None;

        for bill in bills {
            let Some(payment) = payments
                .iter()
                .find(|p| p.bill_id == bill.id && p.month == month && p.year == year)
            else {
                continue;
            };
            if payment.paid || payment.task_id.is_some() {
                continue;
            }
            if !bill_task_due(bill, today, self.options.bill_overdue_grace_days) {
                continue;
            }

            let due_date = bill_due_date(year, month, bill.due_day);

            // A task from an earlier run whose link write was lost
            let orphan = self
                .repos
                .tasks
                .first(
                    Query::new()
                        .eq("source_kind", TaskSource::Bill.as_str())
                        .eq("source_id", bill.id.as_str())
                        .eq("status", TaskStatus::Pending.as_str())
                        .order_by("created_at", true),
                )
                .await?
                .filter(|task| task.due_date == due_date);

            let task = match orphan {
                Some(task) => {
                    debug!("Re-linking bill task {} to payment {}", task.id, payment.id);
                    task
                }
                None => {
                    if category_id.is_none() {
                        category_id = Some(self.category_id(BILL_TASK_CATEGORY).await?);
                    }
                    let new_task = NewTask {
                        due_date,
                        ..self.new_auto_task(
                            bill_task_title(bill),
                            category_id.clone().flatten(),
                            Assignee::Both,
                            Priority::Alta,
                            (TaskSource::Bill, Some(bill.id.clone())),
                            user_id,
                        )
                    };
                    let task = self.repos.tasks.insert(&new_task).await?;
                    info!("Created bill task '{}' ({})", task.title, task.id);
                    task
                }
            };

            self.repos
                .payments
                .update(
                    &payment.id,
                    &PaymentTaskLink {
                        task_id: Some(task.id.clone()),
                    },
                )
                .await?;
            links.push(BillTaskLink {
                payment_id: payment.id.clone(),
                task,
            });
        }

        Ok(links)
    }

    /// Mirror a payment's paid flag onto its linked task
    pub async fn set_bill_task_completion(
        &self,
        payment: &BillPayment,
        paid: bool,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let Some(task_id) = payment.task_id.as_deref() else {
            return Ok(None);
        };
        let completion = if paid {
            TaskCompletion::completed(user_id, at)
        } else {
            TaskCompletion::pending()
        };
        self.repos.tasks.update(task_id, &completion).await?;
        debug!("Bill task {} set to {}", task_id, completion.status.as_str());
        Ok(Some(task_id.to_string()))
    }

    /// Create a chore task for every overdue routine that has no pending one
    pub async fn sync_routine_tasks(
        &self,
        routines: &[Routine],
        user_id: &str,
    ) -> Result<Vec<Task>> {
        let now = self.clock.now();
        let overdue: Vec<&Routine> = routines
            .iter()
            .filter(|r| routine_is_overdue(r, now))
            .collect();
        if overdue.is_empty() {
            return Ok(Vec::new());
        }

        let covered: HashSet<String> = self
            .pending_source_tasks(TaskSource::Routine)
            .await?
            .into_iter()
            .filter_map(|t| t.source_id)
            .collect();

        let mut created = Vec::new();
        for routine in overdue {
            if covered.contains(&routine.id) {
                continue;
            }
            let category_id = self.category_id(routine_task_category(routine)).await?;
            let assigned_to = routine
                .assigned_to
                .clone()
                .map(Assignee::User)
                .unwrap_or(Assignee::Both);
            let new_task = self.new_auto_task(
                routine_task_title(routine),
                category_id,
                assigned_to,
                Priority::Media,
                (TaskSource::Routine, Some(routine.id.clone())),
                user_id,
            );
            let task = self.repos.tasks.insert(&new_task).await?;
            info!("Created routine task '{}' ({})", task.title, task.id);
            created.push(task);
        }

        Ok(created)
    }

    /// Complete the pending chore task of a routine, returning its id
    pub async fn complete_routine_task(
        &self,
        routine: &Routine,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let linked: Vec<Task> = self
            .pending_source_tasks(TaskSource::Routine)
            .await?
            .into_iter()
            .filter(|t| t.is_from(TaskSource::Routine, Some(&routine.id)))
            .collect();
        if linked.len() > 1 {
            warn!(
                "Routine {} has {} pending tasks; completing the oldest",
                routine.id,
                linked.len()
            );
        }
        let Some(task) = linked.into_iter().next() else {
            return Ok(None);
        };

        self.repos
            .tasks
            .update(&task.id, &TaskCompletion::completed(user_id, at))
            .await?;
        Ok(Some(task.id))
    }

    /// Bring the supermarket task in line with `items`
    pub async fn sync_grocery_task(
        &self,
        items: &[GroceryItem],
        user_id: &str,
    ) -> Result<GroceryPlan> {
        self.sync_grocery_task_with(|| items.to_vec(), user_id).await
    }

    /// Same as [`RuleEngine::sync_grocery_task`], but the items are read
    /// only once the sync lock is held, so the last sync to run always sees
    /// the latest list.
    pub async fn sync_grocery_task_with<F>(&self, items: F, user_id: &str) -> Result<GroceryPlan>
    where
        F: FnOnce() -> Vec<GroceryItem> + Send,
    {
        let _guard = self.grocery_lock.lock().await;

        let items = items();
        let open = grocery_open_count(&items, self.options.grocery_policy);
        let existing = self.pending_source_tasks(TaskSource::Grocery).await?;
        if existing.len() > 1 {
            warn!(
                "{} pending supermarket tasks; keeping the oldest",
                existing.len()
            );
        }

        let plan = plan_grocery_task(open, existing.first());
        match &plan {
            GroceryPlan::Create { title } => {
                let category_id = self.category_id(GROCERY_TASK_CATEGORY).await?;
                let new_task = self.new_auto_task(
                    title.clone(),
                    category_id,
                    Assignee::Both,
                    Priority::Media,
                    (TaskSource::Grocery, None),
                    user_id,
                );
                let task = self.repos.tasks.insert(&new_task).await?;
                info!("Created supermarket task ({})", task.id);
            }
            GroceryPlan::Rename { task_id, title } => {
                self.repos
                    .tasks
                    .update(task_id, &TaskTitle { title: title.clone() })
                    .await?;
            }
            GroceryPlan::Complete { task_id } => {
                self.repos
                    .tasks
                    .update(task_id, &TaskCompletion::completed(user_id, self.clock.now()))
                    .await?;
                info!("Grocery list empty, completed supermarket task {}", task_id);
            }
            GroceryPlan::Nothing => {}
        }

        Ok(plan)
    }

    /// Delete the still-pending auto-tasks of a bill or routine
    pub async fn drop_source_tasks(&self, kind: TaskSource, source_id: &str) -> Result<()> {
        let filters = Query::new()
            .eq("source_kind", kind.as_str())
            .eq("source_id", source_id)
            .eq("status", TaskStatus::Pending.as_str())
            .filters;
        self.repos.tasks.delete_where(&filters).await
    }
}

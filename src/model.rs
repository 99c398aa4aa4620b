//! Household entities and the payloads used to write them

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Alta,
    Media,
    Baja,
}

impl Priority {
    /// Sort key, most urgent first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Alta => 0,
            Priority::Media => 1,
            Priority::Baja => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Alta => "alta",
            Priority::Media => "media",
            Priority::Baja => "baja",
        }
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }
}

/// Stock status of a grocery item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroceryStatus {
    Stocked,
    Low,
    Needed,
    InCart,
}

impl GroceryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroceryStatus::Stocked => "stocked",
            GroceryStatus::Low => "low",
            GroceryStatus::Needed => "needed",
            GroceryStatus::InCart => "in_cart",
        }
    }
}

/// Who a task is for: one user, or everyone in the household.
///
/// Stored as the user id or the literal `"both"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Assignee {
    Both,
    User(String),
}

impl Assignee {
    /// Whether `user_id` is among the assignees
    pub fn includes(&self, user_id: &str) -> bool {
        match self {
            Assignee::Both => true,
            Assignee::User(id) => id == user_id,
        }
    }
}

impl From<String> for Assignee {
    fn from(value: String) -> Self {
        if value == "both" {
            Assignee::Both
        } else {
            Assignee::User(value)
        }
    }
}

impl From<Assignee> for String {
    fn from(value: Assignee) -> Self {
        match value {
            Assignee::Both => "both".to_string(),
            Assignee::User(id) => id,
        }
    }
}

impl fmt::Display for Assignee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assignee::Both => write!(f, "both"),
            Assignee::User(id) => write!(f, "{}", id),
        }
    }
}

/// What generated an auto-task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Bill,
    Routine,
    Grocery,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Bill => "bill",
            TaskSource::Routine => "routine",
            TaskSource::Grocery => "grocery",
        }
    }
}

fn default_currency() -> String {
    "CLP".to_string()
}

fn default_auto_create_task_days() -> i32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub assigned_to: Assignee,
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Set on auto-tasks; `source_id` is the bill, routine or `None` for
    /// the household-wide grocery task
    #[serde(default)]
    pub source_kind: Option<TaskSource>,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Mark completed; keeps status and `completed_by`/`completed_at` in step
    pub fn complete(&mut self, by: &str, at: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_by = Some(by.to_string());
        self.completed_at = Some(at);
    }

    /// Back to pending, clearing the completion stamp
    pub fn reopen(&mut self) {
        self.status = TaskStatus::Pending;
        self.completed_by = None;
        self.completed_at = None;
    }

    /// The completion columns as they stand, ready to write back
    pub fn completion(&self) -> TaskCompletion {
        TaskCompletion {
            status: self.status,
            completed_by: self.completed_by.clone(),
            completed_at: self.completed_at,
        }
    }

    pub fn is_from(&self, kind: TaskSource, source_id: Option<&str>) -> bool {
        self.source_kind == Some(kind) && self.source_id.as_deref() == source_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub color: String,
    /// `None` for shared defaults
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A recurring monthly obligation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub amount: Option<f64>,
    pub due_day: u32,
    pub category: String,
    #[serde(default = "default_auto_create_task_days")]
    pub auto_create_task_days: i32,
    pub created_by: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Whether a bill was paid in a given month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillPayment {
    pub id: String,
    pub bill_id: String,
    pub month: u32,
    pub year: i32,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub paid_by: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    /// Auto-task created for this month's payment
    #[serde(default)]
    pub task_id: Option<String>,
}

impl BillPayment {
    pub fn mark_paid(&mut self, by: &str, at: DateTime<Utc>) {
        self.paid = true;
        self.paid_by = Some(by.to_string());
        self.paid_at = Some(at);
    }

    pub fn mark_unpaid(&mut self) {
        self.paid = false;
        self.paid_by = None;
        self.paid_at = None;
    }

    pub fn status(&self) -> PaymentStatus {
        PaymentStatus {
            paid: self.paid,
            paid_by: self.paid_by.clone(),
            paid_at: self.paid_at,
        }
    }
}

/// A recurring chore; its due state is derived from `last_done_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub id: String,
    pub name: String,
    pub frequency_days: i64,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub last_done_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_done_by: Option<String>,
    pub category: String,
    pub created_by: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub status: GroceryStatus,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub typical_qty: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub frequency_days: Option<i64>,
    #[serde(default)]
    pub last_stocked_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// Insert payloads

#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub title: String,
    pub category_id: Option<String>,
    pub assigned_to: Assignee,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub created_by: String,
    pub budget: Option<f64>,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<TaskSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

/// User input for a new task
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub category_id: Option<String>,
    pub assigned_to: Assignee,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub budget: Option<f64>,
    pub currency: Option<String>,
}

impl TaskDraft {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            category_id: None,
            assigned_to: Assignee::Both,
            priority: Priority::Media,
            due_date: None,
            budget: None,
            currency: None,
        }
    }

    pub fn with_category(mut self, category_id: &str) -> Self {
        self.category_id = Some(category_id.to_string());
        self
    }

    pub fn with_assignee(mut self, assignee: Assignee) -> Self {
        self.assigned_to = assignee;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_budget(mut self, budget: f64, currency: &str) -> Self {
        self.budget = Some(budget);
        self.currency = Some(currency.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCategory {
    pub name: String,
    pub emoji: String,
    pub color: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBill {
    pub name: String,
    pub amount: Option<f64>,
    pub due_day: u32,
    pub category: String,
    pub auto_create_task_days: i32,
    pub created_by: String,
}

/// User input for a new bill
#[derive(Debug, Clone)]
pub struct BillDraft {
    pub name: String,
    pub amount: Option<f64>,
    pub due_day: u32,
    pub category: String,
    pub auto_create_task_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBillPayment {
    pub bill_id: String,
    pub month: u32,
    pub year: i32,
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRoutine {
    pub name: String,
    pub frequency_days: i64,
    pub category: String,
    pub assigned_to: Option<String>,
    pub created_by: String,
}

/// User input for a new routine
#[derive(Debug, Clone)]
pub struct RoutineDraft {
    pub name: String,
    pub frequency_days: i64,
    pub category: String,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewGroceryItem {
    pub name: String,
    pub category: String,
    pub status: GroceryStatus,
    pub quantity: Option<String>,
    pub created_by: String,
}

// Patches

/// Completion columns of a task; written as a unit so status and stamp
/// never disagree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskCompletion {
    pub status: TaskStatus,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskCompletion {
    pub fn completed(by: &str, at: DateTime<Utc>) -> Self {
        Self {
            status: TaskStatus::Completed,
            completed_by: Some(by.to_string()),
            completed_at: Some(at),
        }
    }

    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            completed_by: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskTitle {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentStatus {
    pub paid: bool,
    pub paid_by: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentTaskLink {
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineDone {
    pub last_done_at: Option<DateTime<Utc>>,
    pub last_done_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroceryStatusUpdate {
    pub status: GroceryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stocked_at: Option<DateTime<Utc>>,
}

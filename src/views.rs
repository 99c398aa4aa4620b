//! Read models derived from the household state

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::config::SyncOptions;
use crate::model::{Bill, Routine, Task};
use crate::rules::{bill_due_date, routine_is_overdue};
use crate::state::HouseholdState;

/// Pending tasks for `user_id` that are due by `today` or undated, most
/// urgent first
pub fn today_tasks<'a>(
    state: &'a HouseholdState,
    user_id: &str,
    today: NaiveDate,
) -> Vec<&'a Task> {
    let mut tasks: Vec<&Task> = state
        .tasks
        .iter()
        .filter(|t| !t.is_completed())
        .filter(|t| t.assigned_to.includes(user_id))
        .filter(|t| t.due_date.map_or(true, |due| due <= today))
        .collect();
    // stable: keeps newest-first within a priority
    tasks.sort_by_key(|t| t.priority.rank());
    tasks
}

/// Sum of the budgets on pending tasks
pub fn budget_total(state: &HouseholdState) -> f64 {
    state.tasks.iter().filter_map(|t| t.budget).sum()
}

/// Days from `today` to the bill's due date this month; negative once past
pub fn days_until_due(bill: &Bill, today: NaiveDate) -> Option<i64> {
    let due = bill_due_date(today.year(), today.month(), bill.due_day)?;
    Some((due - today).num_days())
}

/// Unpaid bills due within three days or at most two days late
pub fn urgent_bills(state: &HouseholdState, today: NaiveDate) -> Vec<&Bill> {
    state
        .bills
        .iter()
        .filter(|b| !state.payment_for(&b.id).map_or(false, |p| p.paid))
        .filter(|b| days_until_due(b, today).map_or(false, |d| (-2..=3).contains(&d)))
        .collect()
}

/// How far through its period a routine is, capped at 100. A routine never
/// done is at 100.
pub fn routine_progress(routine: &Routine, now: DateTime<Utc>) -> u8 {
    let Some(last_done) = routine.last_done_at else {
        return 100;
    };
    if routine.frequency_days <= 0 {
        return 100;
    }
    let elapsed_days = (now - last_done).num_seconds().max(0) as f64 / 86_400.0;
    let pct = (elapsed_days / routine.frequency_days as f64 * 100.0).round();
    pct.min(100.0) as u8
}

pub fn overdue_routines(state: &HouseholdState, now: DateTime<Utc>) -> Vec<&Routine> {
    state
        .routines
        .iter()
        .filter(|r| routine_is_overdue(r, now))
        .collect()
}

/// Routines closest to due first
pub fn routines_by_urgency(state: &HouseholdState, now: DateTime<Utc>) -> Vec<(&Routine, u8)> {
    let mut routines: Vec<(&Routine, u8)> = state
        .routines
        .iter()
        .map(|r| (r, routine_progress(r, now)))
        .collect();
    routines.sort_by(|a, b| b.1.cmp(&a.1));
    routines
}

/// Bills paid this month
pub fn paid_count(state: &HouseholdState) -> usize {
    state.payments.iter().filter(|p| p.paid).count()
}

/// Completed tasks per display name
pub fn completions_by_user(state: &HouseholdState) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for task in &state.completed_tasks {
        let Some(by) = task.completed_by.as_deref() else {
            continue;
        };
        *counts.entry(state.display_name(by).to_string()).or_insert(0) += 1;
    }
    counts
}

/// Everything the home screen shows
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub user_name: String,
    pub today: Vec<Task>,
    pub budget_total: f64,
    pub urgent_bills: Vec<Bill>,
    pub overdue_routines: Vec<Routine>,
    pub high_priority: usize,
    pub bills_paid: usize,
    pub bills_total: usize,
    pub completed_this_week: usize,
    pub grocery_needed: usize,
}

impl Dashboard {
    pub fn build(state: &HouseholdState, options: &SyncOptions, now: DateTime<Utc>) -> Self {
        let today = options.local_date(now);
        let user_id = state.user_id().unwrap_or_default();
        Self {
            user_name: state.user_name.clone(),
            today: today_tasks(state, user_id, today).into_iter().cloned().collect(),
            budget_total: budget_total(state),
            urgent_bills: urgent_bills(state, today).into_iter().cloned().collect(),
            overdue_routines: overdue_routines(state, now).into_iter().cloned().collect(),
            high_priority: state
                .tasks
                .iter()
                .filter(|t| t.priority == crate::model::Priority::Alta)
                .count(),
            bills_paid: paid_count(state),
            bills_total: state.bills.len(),
            completed_this_week: state.completed_this_week,
            grocery_needed: state.grocery_needed(),
        }
    }

    pub fn has_urgent(&self) -> bool {
        !self.urgent_bills.is_empty() || !self.overdue_routines.is_empty() || self.high_priority > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CurrentUser;
    use crate::model::BillPayment;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn task(id: &str, assigned_to: &str, priority: &str, due: Option<&str>) -> Task {
        serde_json::from_value(json!({
            "id": id, "title": id, "assigned_to": assigned_to, "priority": priority,
            "due_date": due, "status": "pending", "created_by": "u1"
        }))
        .unwrap()
    }

    fn bill(id: &str, due_day: u32) -> Bill {
        serde_json::from_value(json!({
            "id": id, "name": id, "due_day": due_day, "category": "Servicios",
            "created_by": "u1"
        }))
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_today_tasks_filters_and_sorts() {
        let mut state = HouseholdState::new();
        state.user = Some(CurrentUser::new("u1", "camila@example.com"));
        state.tasks = vec![
            task("baja", "both", "baja", None),
            task("other", "u2", "alta", None),
            task("future", "u1", "alta", Some("2024-03-20")),
            task("alta", "u1", "alta", Some("2024-03-10")),
            task("media", "both", "media", None),
        ];

        let ids: Vec<&str> = today_tasks(&state, "u1", date(2024, 3, 10))
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["alta", "media", "baja"]);
    }

    #[test]
    fn test_urgent_bills_window() {
        let mut state = HouseholdState::new();
        state.bills = vec![bill("soon", 13), bill("late", 8), bill("far", 20), bill("paid", 11)];
        state.payments = vec![BillPayment {
            id: "p1".to_string(),
            bill_id: "paid".to_string(),
            month: 3,
            year: 2024,
            paid: true,
            paid_by: Some("u1".to_string()),
            paid_at: None,
            task_id: None,
        }];

        let ids: Vec<&str> = urgent_bills(&state, date(2024, 3, 10))
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, vec!["soon", "late"]);
    }

    #[test]
    fn test_routine_progress() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let mut routine: Routine = serde_json::from_value(json!({
            "id": "r1", "name": "Sacar basura", "frequency_days": 4,
            "category": "Limpieza", "created_by": "u1"
        }))
        .unwrap();
        assert_eq!(routine_progress(&routine, now), 100);

        routine.last_done_at = Some(now - Duration::days(1));
        assert_eq!(routine_progress(&routine, now), 25);

        routine.last_done_at = Some(now - Duration::days(9));
        assert_eq!(routine_progress(&routine, now), 100);
    }

    #[test]
    fn test_completions_grouped_by_name() {
        let mut state = HouseholdState::new();
        state.user = Some(CurrentUser::new("u1", "camila@example.com"));
        state.user_name = "Camila".to_string();
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        for (id, by) in [("a", "u1"), ("b", "u2"), ("c", "u1")] {
            let mut t = task(id, "both", "media", None);
            t.complete(by, at);
            state.completed_tasks.push(t);
        }
        state.rebuild_user_map();

        let counts = completions_by_user(&state);
        assert_eq!(counts.get("Camila"), Some(&2));
        assert_eq!(counts.get("Otro"), Some(&1));
        assert_eq!(budget_total(&state), 0.0);
    }
}

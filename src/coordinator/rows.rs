//! Plain inserts and deletes of one row

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{restore, take, Mutation};
use crate::error::{Error, Result};
use crate::model::{
    Bill, Category, GroceryItem, NewBill, NewCategory, NewGroceryItem, NewRoutine, NewTask,
    Routine, Task,
};
use crate::repository::{Entity, Repositories, Repository};
use crate::state::HouseholdState;

/// An entity kept as a list in [`HouseholdState`]
pub trait Listed: Entity {
    /// Insert payload
    type New: Serialize + Clone + Send + Sync;

    /// Mutation names used in logs
    const ADD: &'static str;
    const DELETE: &'static str;

    fn list(state: &mut HouseholdState) -> &mut Vec<Self>;

    fn repo(repos: &Repositories) -> &Repository<Self>;

    /// Local stand-in shown until the store assigns the real row
    fn draft(new: &Self::New, id: String, now: DateTime<Utc>) -> Self;

    /// Place a new row; appends unless overridden
    fn place(list: &mut Vec<Self>, row: Self) {
        list.push(row);
    }
}

impl Listed for Task {
    type New = NewTask;
    const ADD: &'static str = "create task";
    const DELETE: &'static str = "delete task";

    fn list(state: &mut HouseholdState) -> &mut Vec<Self> {
        &mut state.tasks
    }

    fn repo(repos: &Repositories) -> &Repository<Self> {
        &repos.tasks
    }

    fn draft(new: &NewTask, id: String, now: DateTime<Utc>) -> Self {
        Task {
            id,
            title: new.title.clone(),
            category_id: new.category_id.clone(),
            assigned_to: new.assigned_to.clone(),
            priority: new.priority,
            due_date: new.due_date,
            status: new.status,
            completed_by: None,
            completed_at: None,
            created_by: new.created_by.clone(),
            budget: new.budget,
            currency: new.currency.clone(),
            created_at: Some(now),
            source_kind: new.source_kind,
            source_id: new.source_id.clone(),
        }
    }

    fn place(list: &mut Vec<Self>, row: Self) {
        list.insert(0, row);
    }
}

impl Listed for Category {
    type New = NewCategory;
    const ADD: &'static str = "add category";
    const DELETE: &'static str = "delete category";

    fn list(state: &mut HouseholdState) -> &mut Vec<Self> {
        &mut state.categories
    }

    fn repo(repos: &Repositories) -> &Repository<Self> {
        &repos.categories
    }

    fn draft(new: &NewCategory, id: String, now: DateTime<Utc>) -> Self {
        Category {
            id,
            name: new.name.clone(),
            emoji: new.emoji.clone(),
            color: new.color.clone(),
            user_id: new.user_id.clone(),
            created_at: Some(now),
        }
    }
}

impl Listed for Bill {
    type New = NewBill;
    const ADD: &'static str = "add bill";
    const DELETE: &'static str = "delete bill";

    fn list(state: &mut HouseholdState) -> &mut Vec<Self> {
        &mut state.bills
    }

    fn repo(repos: &Repositories) -> &Repository<Self> {
        &repos.bills
    }

    fn draft(new: &NewBill, id: String, now: DateTime<Utc>) -> Self {
        Bill {
            id,
            name: new.name.clone(),
            amount: new.amount,
            due_day: new.due_day,
            category: new.category.clone(),
            auto_create_task_days: new.auto_create_task_days,
            created_by: new.created_by.clone(),
            created_at: Some(now),
        }
    }

    fn place(list: &mut Vec<Self>, row: Self) {
        let index = list.partition_point(|b| b.due_day <= row.due_day);
        list.insert(index, row);
    }
}

impl Listed for Routine {
    type New = NewRoutine;
    const ADD: &'static str = "add routine";
    const DELETE: &'static str = "delete routine";

    fn list(state: &mut HouseholdState) -> &mut Vec<Self> {
        &mut state.routines
    }

    fn repo(repos: &Repositories) -> &Repository<Self> {
        &repos.routines
    }

    fn draft(new: &NewRoutine, id: String, now: DateTime<Utc>) -> Self {
        Routine {
            id,
            name: new.name.clone(),
            frequency_days: new.frequency_days,
            assigned_to: new.assigned_to.clone(),
            last_done_at: None,
            last_done_by: None,
            category: new.category.clone(),
            created_by: new.created_by.clone(),
            created_at: Some(now),
        }
    }
}

impl Listed for GroceryItem {
    type New = NewGroceryItem;
    const ADD: &'static str = "add grocery item";
    const DELETE: &'static str = "delete grocery item";

    fn list(state: &mut HouseholdState) -> &mut Vec<Self> {
        &mut state.grocery_items
    }

    fn repo(repos: &Repositories) -> &Repository<Self> {
        &repos.groceries
    }

    fn draft(new: &NewGroceryItem, id: String, now: DateTime<Utc>) -> Self {
        GroceryItem {
            id,
            name: new.name.clone(),
            category: new.category.clone(),
            status: new.status,
            quantity: new.quantity.clone(),
            typical_qty: None,
            brand: None,
            frequency_days: None,
            last_stocked_at: None,
            created_by: new.created_by.clone(),
            created_at: Some(now),
        }
    }

    fn place(list: &mut Vec<Self>, row: Self) {
        let index = list.partition_point(|i| (&i.category, &i.name) <= (&row.category, &row.name));
        list.insert(index, row);
    }
}

/// Insert a row, shown at once under a temporary id
pub struct Insert<E: Listed> {
    new: E::New,
    temp_id: String,
    now: DateTime<Utc>,
}

impl<E: Listed> Insert<E> {
    pub fn new(new: E::New, now: DateTime<Utc>) -> Self {
        Self {
            new,
            temp_id: format!("temp-{}", Uuid::new_v4()),
            now,
        }
    }
}

#[async_trait]
impl<E: Listed> Mutation for Insert<E> {
    type Snapshot = ();
    type Output = E;

    fn name(&self) -> &'static str {
        E::ADD
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<()> {
        let draft = E::draft(&self.new, self.temp_id.clone(), self.now);
        E::place(E::list(state), draft);
        Ok(())
    }

    async fn commit(&self, repos: &Repositories) -> Result<E> {
        E::repo(repos).insert(&self.new).await
    }

    fn confirm(&self, state: &mut HouseholdState, stored: &E) {
        let list = E::list(state);
        match list.iter_mut().find(|row| row.id() == self.temp_id) {
            Some(row) => *row = stored.clone(),
            None => E::place(list, stored.clone()),
        }
    }

    fn compensate(&self, state: &mut HouseholdState, _snapshot: ()) {
        E::list(state).retain(|row| row.id() != self.temp_id);
    }
}

/// Delete a row by id
pub struct Remove<E: Listed> {
    id: String,
    _entity: std::marker::PhantomData<fn() -> E>,
}

impl<E: Listed> Remove<E> {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            _entity: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<E: Listed> Mutation for Remove<E> {
    type Snapshot = (usize, E);
    type Output = ();

    fn name(&self) -> &'static str {
        E::DELETE
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<(usize, E)> {
        take(E::list(state), |row| row.id() == self.id)
            .ok_or_else(|| Error::not_found(E::TABLE, &self.id))
    }

    async fn commit(&self, repos: &Repositories) -> Result<()> {
        E::repo(repos).delete(&self.id).await
    }

    fn compensate(&self, state: &mut HouseholdState, (index, row): (usize, E)) {
        restore(E::list(state), index, row);
    }
}

pub type CreateTask = Insert<Task>;
pub type AddCategory = Insert<Category>;
pub type AddBill = Insert<Bill>;
pub type AddRoutine = Insert<Routine>;
pub type AddGroceryItem = Insert<GroceryItem>;
pub type DeleteRoutine = Remove<Routine>;
pub type DeleteGroceryItem = Remove<GroceryItem>;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Mutation;
use crate::error::{Error, Result};
use crate::model::{GroceryItem, GroceryStatus, GroceryStatusUpdate};
use crate::repository::Repositories;
use crate::state::HouseholdState;

/// Move an item between stocked, low, needed and in cart. Restocking
/// stamps `last_stocked_at`.
pub struct UpdateGroceryStatus {
    id: String,
    patch: GroceryStatusUpdate,
}

impl UpdateGroceryStatus {
    pub fn new(id: &str, status: GroceryStatus, at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            patch: GroceryStatusUpdate {
                status,
                last_stocked_at: (status == GroceryStatus::Stocked).then_some(at),
            },
        }
    }
}

#[async_trait]
impl Mutation for UpdateGroceryStatus {
    type Snapshot = GroceryItem;
    type Output = ();

    fn name(&self) -> &'static str {
        "update grocery status"
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<GroceryItem> {
        let item = state
            .grocery_items
            .iter_mut()
            .find(|i| i.id == self.id)
            .ok_or_else(|| Error::not_found("grocery_items", &self.id))?;

        let original = item.clone();
        item.status = self.patch.status;
        if self.patch.last_stocked_at.is_some() {
            item.last_stocked_at = self.patch.last_stocked_at;
        }
        Ok(original)
    }

    async fn commit(&self, repos: &Repositories) -> Result<()> {
        repos.groceries.update(&self.id, &self.patch).await
    }

    fn compensate(&self, state: &mut HouseholdState, original: GroceryItem) {
        if let Some(item) = state.grocery_items.iter_mut().find(|i| i.id == self.id) {
            *item = original;
        }
    }
}

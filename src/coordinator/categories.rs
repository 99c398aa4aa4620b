use async_trait::async_trait;

use super::{restore, take, Mutation};
use crate::error::{Error, Result};
use crate::model::Category;
use crate::repository::Repositories;
use crate::state::HouseholdState;

/// Delete a category the current user created. Shared defaults have no
/// owner and cannot be deleted.
pub struct DeleteCategory {
    id: String,
    user_id: String,
}

impl DeleteCategory {
    pub fn new(id: &str, user_id: &str) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

#[async_trait]
impl Mutation for DeleteCategory {
    type Snapshot = (usize, Category);
    type Output = ();

    fn name(&self) -> &'static str {
        "delete category"
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<(usize, Category)> {
        let category = state
            .category(&self.id)
            .ok_or_else(|| Error::not_found("categories", &self.id))?;
        if category.user_id.as_deref() != Some(self.user_id.as_str()) {
            return Err(Error::PermissionDenied(format!(
                "category '{}' belongs to someone else",
                category.name
            )));
        }

        take(&mut state.categories, |c| c.id == self.id)
            .ok_or_else(|| Error::not_found("categories", &self.id))
    }

    async fn commit(&self, repos: &Repositories) -> Result<()> {
        repos.categories.delete(&self.id).await
    }

    fn compensate(&self, state: &mut HouseholdState, (index, category): (usize, Category)) {
        restore(&mut state.categories, index, category);
    }
}

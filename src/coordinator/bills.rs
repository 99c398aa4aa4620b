use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{restore, take, Mutation};
use crate::error::{Error, Result};
use crate::model::{Bill, BillPayment};
use crate::repository::Repositories;
use crate::state::HouseholdState;

/// Flip a payment between paid and unpaid
pub struct ToggleBillPaid {
    payment_id: String,
    user_id: String,
    at: DateTime<Utc>,
    toggled: Option<BillPayment>,
}

impl ToggleBillPaid {
    pub fn new(payment_id: &str, user_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            user_id: user_id.to_string(),
            at,
            toggled: None,
        }
    }
}

#[async_trait]
impl Mutation for ToggleBillPaid {
    type Snapshot = BillPayment;
    /// The payment as written
    type Output = BillPayment;

    fn name(&self) -> &'static str {
        "toggle bill paid"
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<BillPayment> {
        let payment = state
            .payments
            .iter_mut()
            .find(|p| p.id == self.payment_id)
            .ok_or_else(|| Error::not_found("bill_payments", &self.payment_id))?;

        let original = payment.clone();
        if payment.paid {
            payment.mark_unpaid();
        } else {
            payment.mark_paid(&self.user_id, self.at);
        }
        self.toggled = Some(payment.clone());
        Ok(original)
    }

    async fn commit(&self, repos: &Repositories) -> Result<BillPayment> {
        let toggled = self
            .toggled
            .clone()
            .ok_or_else(|| Error::invalid("toggle committed before apply"))?;
        repos
            .payments
            .update(&self.payment_id, &toggled.status())
            .await?;
        Ok(toggled)
    }

    fn compensate(&self, state: &mut HouseholdState, original: BillPayment) {
        if let Some(payment) = state.payments.iter_mut().find(|p| p.id == self.payment_id) {
            *payment = original;
        }
    }
}

/// Delete a bill row
///
/// Only the bill is written here. Its payment rows are dropped locally
/// right away, but the store rows stay until the bill delete has landed.
pub struct DeleteBill {
    id: String,
}

impl DeleteBill {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait]
impl Mutation for DeleteBill {
    type Snapshot = (usize, Bill, Vec<BillPayment>);
    type Output = ();

    fn name(&self) -> &'static str {
        "delete bill"
    }

    fn apply(&mut self, state: &mut HouseholdState) -> Result<(usize, Bill, Vec<BillPayment>)> {
        let (index, bill) = take(&mut state.bills, |b| b.id == self.id)
            .ok_or_else(|| Error::not_found("bills", &self.id))?;
        let (payments, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.payments)
            .into_iter()
            .partition(|p| p.bill_id == self.id);
        state.payments = kept;
        Ok((index, bill, payments))
    }

    async fn commit(&self, repos: &Repositories) -> Result<()> {
        repos.bills.delete(&self.id).await
    }

    fn compensate(
        &self,
        state: &mut HouseholdState,
        (index, bill, payments): (usize, Bill, Vec<BillPayment>),
    ) {
        restore(&mut state.bills, index, bill);
        state.payments.extend(payments);
    }
}

//! Pending actions: the typed mutations that travel through the queue.
//!
//! Each variant carries exactly what its remote application needs. Replaying
//! an action is a fixed sequence of remote calls ("steps"); multi-step actions
//! remember how far they got so a retry resumes instead of repeating.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use shopsync_core::{
    BalanceSnapshot, CategoryDraft, Operator, ProductDraft, RecordId, TransactionKind, UserId,
};
use shopsync_infra::{Collection, RemoteError, RemoteStore};

/// Sale row as sent to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePayload {
    pub product_id: RecordId,
    pub quantity: i64,
    pub total_amount: i64,
    pub sold_amount: Option<i64>,
    pub employee_id: UserId,
}

/// Transaction row as sent to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub operator: Operator,
    pub phone_number: String,
    pub amount: i64,
    pub employee_id: UserId,
}

/// A mutation awaiting (or undergoing) remote application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "kebab-case")]
pub enum PendingAction {
    /// Insert the sale, then take the quantity off the product's stock.
    AddSale(SalePayload),
    /// Insert the transaction, then add the amount to the operator's balance.
    AddTransaction(TransactionPayload),
    /// Overwrite balances, keyed by operator.
    UpdateBalance(Vec<BalanceSnapshot>),
    AddProduct(ProductDraft),
    UpdateProduct { id: RecordId, draft: ProductDraft },
    DeleteProduct { id: RecordId },
    AddCategory(CategoryDraft),
    UpdateCategory { id: RecordId, draft: CategoryDraft },
    DeleteCategory { id: RecordId },
}

/// A remote step failed; steps before `completed_steps` went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub completed_steps: u32,
    pub error: RemoteError,
}

impl PendingAction {
    pub fn name(&self) -> &'static str {
        match self {
            PendingAction::AddSale(_) => "add-sale",
            PendingAction::AddTransaction(_) => "add-transaction",
            PendingAction::UpdateBalance(_) => "update-balance",
            PendingAction::AddProduct(_) => "add-product",
            PendingAction::UpdateProduct { .. } => "update-product",
            PendingAction::DeleteProduct { .. } => "delete-product",
            PendingAction::AddCategory(_) => "add-category",
            PendingAction::UpdateCategory { .. } => "update-category",
            PendingAction::DeleteCategory { .. } => "delete-category",
        }
    }

    /// Collections to refetch once this action has been applied remotely.
    pub fn affected(&self) -> &'static [Collection] {
        match self {
            PendingAction::AddSale(_) => &[Collection::Sales, Collection::Products],
            PendingAction::AddTransaction(_) => &[
                Collection::MobileMoneyTransactions,
                Collection::MobileMoneyBalances,
            ],
            PendingAction::UpdateBalance(_) => &[Collection::MobileMoneyBalances],
            PendingAction::AddProduct(_)
            | PendingAction::UpdateProduct { .. }
            | PendingAction::DeleteProduct { .. } => &[Collection::Products],
            PendingAction::AddCategory(_)
            | PendingAction::UpdateCategory { .. }
            | PendingAction::DeleteCategory { .. } => &[Collection::Categories],
        }
    }

    pub fn step_count(&self) -> u32 {
        match self {
            PendingAction::AddSale(_) | PendingAction::AddTransaction(_) => 2,
            _ => 1,
        }
    }

    /// Apply the action remotely, skipping the first `from_step` steps.
    ///
    /// Steps are awaited one after another; the first failure stops the action.
    pub async fn apply(&self, remote: &dyn RemoteStore, from_step: u32) -> Result<(), StepFailure> {
        let mut completed = from_step;

        while completed < self.step_count() {
            self.step(remote, completed)
                .await
                .map_err(|error| StepFailure {
                    completed_steps: completed,
                    error,
                })?;
            completed += 1;
        }

        Ok(())
    }

    async fn step(&self, remote: &dyn RemoteStore, index: u32) -> Result<(), RemoteError> {
        match (self, index) {
            (PendingAction::AddSale(sale), 0) => {
                remote.insert(Collection::Sales, vec![to_row(sale)?]).await?;
                Ok(())
            }
            (PendingAction::AddSale(sale), _) => {
                remote
                    .increment(
                        Collection::Products,
                        "id",
                        &json!(sale.product_id.as_str()),
                        "stock",
                        -sale.quantity,
                    )
                    .await
            }
            (PendingAction::AddTransaction(tx), 0) => {
                remote
                    .insert(Collection::MobileMoneyTransactions, vec![to_row(tx)?])
                    .await?;
                Ok(())
            }
            (PendingAction::AddTransaction(tx), _) => {
                remote
                    .increment(
                        Collection::MobileMoneyBalances,
                        "operator",
                        &json!(tx.operator),
                        tx.kind.balance_field(),
                        tx.amount,
                    )
                    .await
            }
            (PendingAction::UpdateBalance(snapshots), _) => {
                let rows = snapshots
                    .iter()
                    .map(to_row)
                    .collect::<Result<Vec<_>, _>>()?;
                remote
                    .upsert(Collection::MobileMoneyBalances, rows, "operator")
                    .await
            }
            (PendingAction::AddProduct(draft), _) => {
                remote.insert(Collection::Products, vec![to_row(draft)?]).await?;
                Ok(())
            }
            (PendingAction::UpdateProduct { id, draft }, _) => {
                remote.update(Collection::Products, id, to_row(draft)?).await
            }
            (PendingAction::DeleteProduct { id }, _) => {
                remote.delete(Collection::Products, id).await
            }
            (PendingAction::AddCategory(draft), _) => {
                remote
                    .insert(Collection::Categories, vec![to_row(draft)?])
                    .await?;
                Ok(())
            }
            (PendingAction::UpdateCategory { id, draft }, _) => {
                remote.update(Collection::Categories, id, to_row(draft)?).await
            }
            (PendingAction::DeleteCategory { id }, _) => {
                remote.delete(Collection::Categories, id).await
            }
        }
    }
}

fn to_row<T: Serialize>(value: &T) -> Result<JsonValue, RemoteError> {
    serde_json::to_value(value).map_err(|e| RemoteError::Malformed(e.to_string()))
}

//! Commands submitted by dashboard layers.

use shopsync_core::{
    BalanceSnapshot, CategoryDraft, DomainError, DomainResult, ProductDraft, RecordId, SaleDraft,
    TransactionDraft,
};

use crate::types::DashboardScope;

/// A user intent, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RecordSale(SaleDraft),
    RecordTransaction(TransactionDraft),
    /// Overwrite operator balances (admin correction).
    SetBalances(Vec<BalanceSnapshot>),
    AddProduct(ProductDraft),
    UpdateProduct { id: RecordId, draft: ProductDraft },
    DeleteProduct(RecordId),
    AddCategory(CategoryDraft),
    UpdateCategory { id: RecordId, draft: CategoryDraft },
    DeleteCategory(RecordId),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::RecordSale(_) => "record-sale",
            Command::RecordTransaction(_) => "record-transaction",
            Command::SetBalances(_) => "set-balances",
            Command::AddProduct(_) => "add-product",
            Command::UpdateProduct { .. } => "update-product",
            Command::DeleteProduct(_) => "delete-product",
            Command::AddCategory(_) => "add-category",
            Command::UpdateCategory { .. } => "update-category",
            Command::DeleteCategory(_) => "delete-category",
        }
    }

    /// Employees record sales and transactions; everything else is admin work.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, Command::RecordSale(_) | Command::RecordTransaction(_))
    }

    pub fn authorize(&self, scope: &DashboardScope) -> DomainResult<()> {
        if self.requires_admin() && !scope.is_admin() {
            return Err(DomainError::Unauthorized);
        }
        Ok(())
    }
}

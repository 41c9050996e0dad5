//! In-memory record collections and their optimistic transitions.
//!
//! `apply` validates a command completely before touching any collection, so
//! a rejected command leaves state exactly as it was.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use shopsync_core::entity::{find_by_id, remove_by_id, replace_by_id};
use shopsync_core::{
    Category, DomainError, DomainResult, MobileMoneyBalance, MobileMoneyTransaction, Operator,
    Product, RecordId, Sale, TransactionKind, UserId, ensure_category_unused,
};
use shopsync_infra::{Collection, RemoteError};

use crate::actions::{PendingAction, SalePayload, TransactionPayload};
use crate::command::Command;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collections {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    pub sales: Vec<Sale>,
    pub balances: Vec<MobileMoneyBalance>,
    pub transactions: Vec<MobileMoneyTransaction>,
}

/// Per-operator dashboard figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStats {
    pub deposits: i64,
    pub withdrawals: i64,
    pub transaction_count: usize,
    pub deposit_balance: i64,
    pub withdrawal_balance: i64,
}

/// Products at or below this stock level are flagged on the dashboard.
pub const LOW_STOCK_THRESHOLD: i64 = 2;

/// Category holding the operators' phone bundles.
pub const PHONE_PLAN_CATEGORY: &str = "Forfaits téléphoniques";

/// Units sold and amount collected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTotals {
    pub quantity: i64,
    pub total_amount: i64,
}

impl SalesTotals {
    fn add(&mut self, sale: &Sale) {
        self.quantity = self.quantity.saturating_add(sale.quantity);
        self.total_amount = self.total_amount.saturating_add(sale.total_amount);
    }
}

/// One employee's sales of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSalesStats {
    pub product_name: String,
    pub operator: Option<Operator>,
    #[serde(flatten)]
    pub totals: SalesTotals,
}

impl Collections {
    /// Apply a command to local state and return the action that replays it remotely.
    pub fn apply(
        &mut self,
        command: Command,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<PendingAction> {
        match command {
            Command::RecordSale(draft) => {
                let product = find_by_id(&self.products, &draft.product_id)
                    .ok_or_else(|| DomainError::not_found(format!("product {}", draft.product_id)))?;
                let priced = draft.price(product, RecordId::local(), actor.clone(), now)?;

                if let Some(product) = self.products.iter_mut().find(|p| p.id == priced.sale.product_id) {
                    product.stock = priced.remaining_stock;
                }

                let sale = priced.sale;
                let action = PendingAction::AddSale(SalePayload {
                    product_id: sale.product_id.clone(),
                    quantity: sale.quantity,
                    total_amount: sale.total_amount,
                    sold_amount: sale.sold_amount,
                    employee_id: sale.employee_id.clone(),
                });
                self.sales.push(sale);
                Ok(action)
            }
            Command::RecordTransaction(draft) => {
                draft.validate()?;
                let tx = draft.into_transaction(RecordId::local(), actor.clone(), now);

                self.credit_balance(tx.operator, tx.kind, tx.amount, now)?;

                let action = PendingAction::AddTransaction(TransactionPayload {
                    kind: tx.kind,
                    operator: tx.operator,
                    phone_number: tx.phone_number.clone(),
                    amount: tx.amount,
                    employee_id: tx.employee_id.clone(),
                });
                self.transactions.push(tx);
                Ok(action)
            }
            Command::SetBalances(snapshots) => {
                for snapshot in &snapshots {
                    snapshot.validate()?;
                }

                for snapshot in &snapshots {
                    let balance = self.balance_entry(snapshot.operator, now);
                    balance.deposit_balance = snapshot.deposit_balance;
                    balance.withdrawal_balance = snapshot.withdrawal_balance;
                }
                Ok(PendingAction::UpdateBalance(snapshots))
            }
            Command::AddProduct(draft) => {
                draft.validate()?;
                self.products
                    .push(draft.clone().into_product(RecordId::local(), now));
                Ok(PendingAction::AddProduct(draft))
            }
            Command::UpdateProduct { id, draft } => {
                draft.validate()?;
                let updated = find_by_id(&self.products, &id)
                    .ok_or_else(|| DomainError::not_found(format!("product {id}")))?
                    .with_draft(draft.clone());
                replace_by_id(&mut self.products, updated);
                Ok(PendingAction::UpdateProduct { id, draft })
            }
            Command::DeleteProduct(id) => {
                if !remove_by_id(&mut self.products, &id) {
                    return Err(DomainError::not_found(format!("product {id}")));
                }
                Ok(PendingAction::DeleteProduct { id })
            }
            Command::AddCategory(draft) => {
                draft.validate()?;
                self.categories
                    .push(draft.clone().into_category(RecordId::local(), now));
                Ok(PendingAction::AddCategory(draft))
            }
            Command::UpdateCategory { id, draft } => {
                draft.validate()?;
                let updated = find_by_id(&self.categories, &id)
                    .ok_or_else(|| DomainError::not_found(format!("category {id}")))?
                    .with_draft(draft.clone());
                replace_by_id(&mut self.categories, updated);
                Ok(PendingAction::UpdateCategory { id, draft })
            }
            Command::DeleteCategory(id) => {
                if find_by_id(&self.categories, &id).is_none() {
                    return Err(DomainError::not_found(format!("category {id}")));
                }
                ensure_category_unused(&self.products, &id)?;
                remove_by_id(&mut self.categories, &id);
                Ok(PendingAction::DeleteCategory { id })
            }
        }
    }

    /// The single balance record for `operator`, created at zero when missing.
    fn balance_entry(&mut self, operator: Operator, now: DateTime<Utc>) -> &mut MobileMoneyBalance {
        match self.balances.iter().position(|b| b.operator == operator) {
            Some(index) => &mut self.balances[index],
            None => {
                self.balances
                    .push(MobileMoneyBalance::zero(RecordId::local(), operator, now));
                let last = self.balances.len() - 1;
                &mut self.balances[last]
            }
        }
    }

    /// Fails without touching any balance when the new total does not fit.
    fn credit_balance(
        &mut self,
        operator: Operator,
        kind: TransactionKind,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let current = self
            .balances
            .iter()
            .find(|b| b.operator == operator)
            .map_or(0, |b| b.side(kind));
        if current.checked_add(amount).is_none() {
            return Err(DomainError::validation("amount too large"));
        }
        self.balance_entry(operator, now).credit(kind, amount)
    }

    /// Replace one collection with rows fetched from the remote store.
    pub fn overwrite(&mut self, collection: Collection, rows: Vec<JsonValue>) -> Result<(), RemoteError> {
        match collection {
            Collection::Products => self.products = decode(collection, rows)?,
            Collection::Categories => self.categories = decode(collection, rows)?,
            Collection::Sales => self.sales = decode(collection, rows)?,
            Collection::MobileMoneyBalances => self.balances = decode(collection, rows)?,
            Collection::MobileMoneyTransactions => self.transactions = decode(collection, rows)?,
            Collection::Users => {}
        }
        Ok(())
    }

    pub fn sales_on(&self, day: NaiveDate) -> Vec<&Sale> {
        self.sales
            .iter()
            .filter(|s| s.created_at.date_naive() == day)
            .collect()
    }

    pub fn revenue_on(&self, day: NaiveDate) -> i64 {
        self.sales_on(day)
            .iter()
            .fold(0i64, |total, s| total.saturating_add(s.total_amount))
    }

    pub fn today_sales(&self) -> Vec<&Sale> {
        self.sales_on(Utc::now().date_naive())
    }

    pub fn revenue_today(&self) -> i64 {
        self.revenue_on(Utc::now().date_naive())
    }

    /// Transaction totals and current balances, one entry per operator.
    pub fn mobile_money_stats(&self) -> BTreeMap<Operator, OperatorStats> {
        let mut stats: BTreeMap<Operator, OperatorStats> = Operator::ALL
            .iter()
            .map(|op| (*op, OperatorStats::default()))
            .collect();

        for tx in &self.transactions {
            let entry = stats.entry(tx.operator).or_default();
            entry.transaction_count += 1;
            match tx.kind {
                TransactionKind::Deposit => entry.deposits = entry.deposits.saturating_add(tx.amount),
                TransactionKind::Withdrawal => {
                    entry.withdrawals = entry.withdrawals.saturating_add(tx.amount)
                }
            }
        }

        for balance in &self.balances {
            let entry = stats.entry(balance.operator).or_default();
            entry.deposit_balance = balance.deposit_balance;
            entry.withdrawal_balance = balance.withdrawal_balance;
        }

        stats
    }

    pub fn low_stock_products(&self) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|p| p.stock <= LOW_STOCK_THRESHOLD)
            .collect()
    }

    /// Phone-bundle sales per operator.
    ///
    /// Empty when the phone-plan category does not exist; otherwise every
    /// operator has an entry.
    pub fn phone_plan_stats(&self) -> BTreeMap<Operator, SalesTotals> {
        let Some(category) = self.categories.iter().find(|c| c.name == PHONE_PLAN_CATEGORY) else {
            return BTreeMap::new();
        };

        let mut stats: BTreeMap<Operator, SalesTotals> = Operator::ALL
            .iter()
            .map(|op| (*op, SalesTotals::default()))
            .collect();

        for sale in &self.sales {
            let Some(product) = find_by_id(&self.products, &sale.product_id) else {
                continue;
            };
            if product.category_id.as_ref() != Some(&category.id) {
                continue;
            }
            if let Some(operator) = product.operator {
                stats.entry(operator).or_default().add(sale);
            }
        }
        stats
    }

    /// Per employee, the quantity and amount sold of each product.
    ///
    /// Every employee with a sale gets an entry; sales of products no longer
    /// in the catalog are not counted.
    pub fn employee_sales_stats(&self) -> BTreeMap<UserId, BTreeMap<RecordId, ProductSalesStats>> {
        let mut stats: BTreeMap<UserId, BTreeMap<RecordId, ProductSalesStats>> = BTreeMap::new();

        for sale in &self.sales {
            let per_product = stats.entry(sale.employee_id.clone()).or_default();
            let Some(product) = find_by_id(&self.products, &sale.product_id) else {
                continue;
            };
            per_product
                .entry(product.id.clone())
                .or_insert_with(|| ProductSalesStats {
                    product_name: product.name.clone(),
                    operator: product.operator,
                    totals: SalesTotals::default(),
                })
                .totals
                .add(sale);
        }
        stats
    }
}

fn decode<T: DeserializeOwned>(collection: Collection, rows: Vec<JsonValue>) -> Result<Vec<T>, RemoteError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| RemoteError::Malformed(format!("{collection}: {e}")))
        })
        .collect()
}

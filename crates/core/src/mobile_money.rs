//! Mobile-money balances and transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{RecordId, UserId};

/// Mobile-money operators handled by the shop.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "MTN")]
    Mtn,
    Moov,
    Celtis,
}

impl Operator {
    pub const ALL: [Operator; 3] = [Operator::Mtn, Operator::Moov, Operator::Celtis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Mtn => "MTN",
            Operator::Moov => "Moov",
            Operator::Celtis => "Celtis",
        }
    }
}

impl core::fmt::Display for Operator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a mobile-money transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    /// Column of the balance record this kind of transaction moves.
    pub fn balance_field(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit_balance",
            TransactionKind::Withdrawal => "withdrawal_balance",
        }
    }
}

/// Running balances for one operator.
///
/// At most one record exists per operator; writes are keyed by `operator`,
/// never by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyBalance {
    pub id: RecordId,
    pub operator: Operator,
    pub deposit_balance: i64,
    pub withdrawal_balance: i64,
    pub created_at: DateTime<Utc>,
}

impl MobileMoneyBalance {
    pub fn zero(id: RecordId, operator: Operator, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            operator,
            deposit_balance: 0,
            withdrawal_balance: 0,
            created_at,
        }
    }

    pub fn side(&self, kind: TransactionKind) -> i64 {
        match kind {
            TransactionKind::Deposit => self.deposit_balance,
            TransactionKind::Withdrawal => self.withdrawal_balance,
        }
    }

    /// Add `amount` to the side moved by `kind`. The balance is left
    /// untouched when the sum does not fit.
    pub fn credit(&mut self, kind: TransactionKind, amount: i64) -> DomainResult<()> {
        let side = match kind {
            TransactionKind::Deposit => &mut self.deposit_balance,
            TransactionKind::Withdrawal => &mut self.withdrawal_balance,
        };
        *side = side
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("amount too large"))?;
        Ok(())
    }
}

impl Entity for MobileMoneyBalance {
    type Id = RecordId;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// Absolute balance values for one operator, as set by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub operator: Operator,
    pub deposit_balance: i64,
    pub withdrawal_balance: i64,
}

impl BalanceSnapshot {
    pub fn validate(&self) -> DomainResult<()> {
        if self.deposit_balance < 0 || self.withdrawal_balance < 0 {
            return Err(DomainError::validation(format!(
                "balances for {} cannot be negative",
                self.operator
            )));
        }
        Ok(())
    }
}

/// A deposit or withdrawal performed for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyTransaction {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub operator: Operator,
    pub phone_number: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub employee_id: UserId,
}

impl Entity for MobileMoneyTransaction {
    type Id = RecordId;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub operator: Operator,
    pub phone_number: String,
    pub amount: i64,
}

impl TransactionDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.phone_number.trim().is_empty() {
            return Err(DomainError::validation("phone number is required"));
        }
        if self.amount <= 0 {
            return Err(DomainError::validation("amount must be greater than 0"));
        }
        Ok(())
    }

    pub fn into_transaction(
        self,
        id: RecordId,
        employee_id: UserId,
        created_at: DateTime<Utc>,
    ) -> MobileMoneyTransaction {
        MobileMoneyTransaction {
            id,
            kind: self.kind,
            operator: self.operator,
            phone_number: self.phone_number,
            amount: self.amount,
            created_at,
            employee_id,
        }
    }
}

//! Sales records and the stock guard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{RecordId, UserId};

/// A recorded sale of one product line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: RecordId,
    pub product_id: RecordId,
    pub quantity: i64,
    pub total_amount: i64,
    /// Negotiated amount, when it differs from `price * quantity`.
    #[serde(default)]
    pub sold_amount: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub employee_id: UserId,
}

impl Entity for Sale {
    type Id = RecordId;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// Sale input as entered at the counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDraft {
    pub product_id: RecordId,
    pub quantity: i64,
    #[serde(default)]
    pub sold_amount: Option<i64>,
}

/// A validated sale together with the product's remaining stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedSale {
    pub sale: Sale,
    pub remaining_stock: i64,
}

impl SaleDraft {
    /// Validate against the product and build the sale record.
    ///
    /// Rejects before anything is mutated: quantity must be positive and not
    /// exceed stock, and a negotiated amount cannot be negative.
    pub fn price(
        self,
        product: &Product,
        id: RecordId,
        employee_id: UserId,
        created_at: DateTime<Utc>,
    ) -> DomainResult<PricedSale> {
        if self.product_id != product.id {
            return Err(DomainError::invariant("sale priced against a different product"));
        }
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than 0"));
        }
        if self.quantity > product.stock {
            return Err(DomainError::validation(format!(
                "insufficient stock for {}: requested {}, available {}",
                product.name, self.quantity, product.stock
            )));
        }
        if matches!(self.sold_amount, Some(amount) if amount < 0) {
            return Err(DomainError::validation("sold amount cannot be negative"));
        }

        let total_amount = match self.sold_amount {
            Some(amount) => amount,
            None => product
                .price
                .checked_mul(self.quantity)
                .ok_or_else(|| DomainError::validation("amount too large"))?,
        };
        let remaining_stock = product
            .stock
            .checked_sub(self.quantity)
            .ok_or_else(|| DomainError::validation("quantity too large"))?;

        Ok(PricedSale {
            sale: Sale {
                id,
                product_id: self.product_id,
                quantity: self.quantity,
                total_amount,
                sold_amount: self.sold_amount,
                created_at,
                employee_id,
            },
            remaining_stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i64) -> Product {
        Product {
            id: RecordId::new("p-1"),
            name: "Soda".to_string(),
            price: 500,
            stock,
            description: None,
            category_id: Some(RecordId::new("c-1")),
            operator: None,
            created_at: Utc::now(),
        }
    }

    fn draft(quantity: i64, sold_amount: Option<i64>) -> SaleDraft {
        SaleDraft {
            product_id: RecordId::new("p-1"),
            quantity,
            sold_amount,
        }
    }

    #[test]
    fn total_defaults_to_price_times_quantity() {
        let priced = draft(3, None)
            .price(&product(10), RecordId::local(), UserId::new("e-1"), Utc::now())
            .unwrap();
        assert_eq!(priced.sale.total_amount, 1500);
        assert_eq!(priced.remaining_stock, 7);
    }

    #[test]
    fn sold_amount_overrides_total() {
        let priced = draft(2, Some(900))
            .price(&product(10), RecordId::local(), UserId::new("e-1"), Utc::now())
            .unwrap();
        assert_eq!(priced.sale.total_amount, 900);
        assert_eq!(priced.sale.sold_amount, Some(900));
    }

    #[test]
    fn quantity_above_stock_is_rejected() {
        let err = draft(11, None)
            .price(&product(10), RecordId::local(), UserId::new("e-1"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn total_that_does_not_fit_is_rejected() {
        let mut p = product(10);
        p.price = i64::MAX / 2;
        let err = draft(3, None)
            .price(&p, RecordId::local(), UserId::new("e-1"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // A negotiated amount does not depend on the unit price.
        let priced = draft(3, Some(1000))
            .price(&p, RecordId::local(), UserId::new("e-1"), Utc::now())
            .unwrap();
        assert_eq!(priced.sale.total_amount, 1000);
    }

    #[test]
    fn zero_quantity_and_negative_amount_are_rejected() {
        let p = product(10);
        assert!(draft(0, None)
            .price(&p, RecordId::local(), UserId::new("e-1"), Utc::now())
            .is_err());
        assert!(draft(1, Some(-1))
            .price(&p, RecordId::local(), UserId::new("e-1"), Utc::now())
            .is_err());
    }
}

//! Product catalog records: products and categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::RecordId;
use crate::mobile_money::Operator;

/// A sellable product.
///
/// Phone bundles carry the operator they top up; other products leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: RecordId,
    pub name: String,
    /// Unit price in FCFA.
    pub price: i64,
    pub stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category_id: Option<RecordId>,
    pub operator: Option<Operator>,
    pub created_at: DateTime<Utc>,
}

/// Editable product fields (create and update share the same shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub price: i64,
    pub stock: i64,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: Option<RecordId>,
    #[serde(default)]
    pub operator: Option<Operator>,
}

impl ProductDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("product name is required"));
        }
        if self.category_id.is_none() {
            return Err(DomainError::validation("product category is required"));
        }
        if self.price < 0 {
            return Err(DomainError::validation("price cannot be negative"));
        }
        if self.stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }
        Ok(())
    }

    /// Materialize the draft as a new record.
    pub fn into_product(self, id: RecordId, created_at: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name,
            price: self.price,
            stock: self.stock,
            description: self.description,
            category_id: self.category_id,
            operator: self.operator,
            created_at,
        }
    }
}

impl Product {
    /// Overwrite editable fields, keeping identity and creation time.
    pub fn with_draft(&self, draft: ProductDraft) -> Product {
        draft.into_product(self.id.clone(), self.created_at)
    }
}

impl Entity for Product {
    type Id = RecordId;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("category name is required"));
        }
        Ok(())
    }

    pub fn into_category(self, id: RecordId, created_at: DateTime<Utc>) -> Category {
        Category {
            id,
            name: self.name,
            description: self.description,
            created_at,
        }
    }
}

impl Category {
    pub fn with_draft(&self, draft: CategoryDraft) -> Category {
        draft.into_category(self.id.clone(), self.created_at)
    }
}

impl Entity for Category {
    type Id = RecordId;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// Reject deleting a category that products still reference.
pub fn ensure_category_unused(products: &[Product], category_id: &RecordId) -> DomainResult<()> {
    if products
        .iter()
        .any(|p| p.category_id.as_ref() == Some(category_id))
    {
        return Err(DomainError::conflict(format!(
            "category {category_id} still has products"
        )));
    }
    Ok(())
}

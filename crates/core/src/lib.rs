//! `shopsync-core`: domain records for the shop's point of sale.
//!
//! This crate contains **pure domain** types (no storage, no network).

pub mod catalog;
pub mod entity;
pub mod error;
pub mod id;
pub mod mobile_money;
pub mod sales;

pub use catalog::{Category, CategoryDraft, Product, ProductDraft, ensure_category_unused};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{LOCAL_ID_PREFIX, RecordId, UserId};
pub use mobile_money::{
    BalanceSnapshot, MobileMoneyBalance, MobileMoneyTransaction, Operator, TransactionDraft,
    TransactionKind,
};
pub use sales::{PricedSale, Sale, SaleDraft};

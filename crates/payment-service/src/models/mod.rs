//! 支付服务领域模型

pub mod enums;
pub mod ledger;
pub mod order;

pub use enums::{AnomalyKind, AuditSource, Currency, LedgerEntryType, OrderState};
pub use ledger::{LedgerConsistency, LedgerEntry, NewLedgerEntry, User};
pub use order::{
    Anomaly, AuditEntry, AuditMerge, AuditSnapshot, AuditTrail, NewAnomaly, NewOrder, Order, SettleResult,
};

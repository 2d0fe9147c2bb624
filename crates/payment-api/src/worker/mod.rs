//! 后台 Worker

pub mod pending_order_sweeper;

pub use pending_order_sweeper::PendingOrderSweeper;

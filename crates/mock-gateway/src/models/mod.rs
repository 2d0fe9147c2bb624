//! 模拟数据模型

mod payment;

pub use payment::{MockPayment, MockState};

// Transaction layer.
//
// | Module | Responsibility |
// |--------|----------------|
// | [`types`] | Transaction, operation, and status domain types |
// | [`manager`] | Logical clock, tick pipeline, operation execution |
// | [`deadlock`] | Wait-for-graph SCC analysis and victim selection |

pub mod deadlock;
pub mod manager;
pub mod types;

pub use manager::TransactionManager;
pub use types::{
    Observation, OpKind, Operation, Transaction, TransactionKind, TransactionStatus,
};

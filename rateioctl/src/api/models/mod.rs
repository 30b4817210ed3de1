pub mod credits;
pub mod notifications;
pub mod stats;
pub mod transactions;
pub mod users;
pub mod withdrawals;

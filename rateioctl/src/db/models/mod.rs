pub mod credits;
pub mod notifications;
pub mod users;
pub mod withdrawals;

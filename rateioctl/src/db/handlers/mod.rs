pub mod credits;
pub mod notifications;
pub mod repository;
pub mod stats;
pub mod users;
pub mod withdrawals;

pub use credits::Credits;
pub use notifications::Notifications;
pub use repository::Repository;
pub use stats::Stats;
pub use users::Users;
pub use withdrawals::Withdrawals;

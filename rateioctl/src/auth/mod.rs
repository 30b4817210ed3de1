pub mod middleware;
pub mod permissions;

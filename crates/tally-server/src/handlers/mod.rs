//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod audit;
pub mod auth;
pub mod categories;
pub mod chat;
pub mod plans;
pub mod reports;
pub mod system;
pub mod transactions;

// Re-export all handlers for use in router
pub use audit::*;
pub use auth::*;
pub use categories::*;
pub use chat::*;
pub use plans::*;
pub use reports::*;
pub use system::*;
pub use transactions::*;

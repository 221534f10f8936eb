//! Role-based authorization guard.

pub mod error;
pub mod guard;

pub use error::{AuthzError, Result};
pub use guard::PermissionGuard;

pub mod auth;
pub mod authz;
pub mod csrf;

pub use auth::require_auth;
pub use authz::{require_permission, RequiredPermissions};
pub use csrf::require_csrf;

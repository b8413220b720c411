pub mod auth;
pub mod errors;
pub mod response;

pub use auth::{identify, protect, restrict_admin, AuthUser};
pub use errors::{normalize_errors, route_not_found};
pub use response::{ApiResponse, ApiResult};

// Request handlers, grouped by resource. Access tiers (public, optional
// identity, protected, admin) are applied as route layers in `app`.
pub mod auth;
pub mod crud;
pub mod input;
pub mod products;
pub mod reviews;
pub mod users;

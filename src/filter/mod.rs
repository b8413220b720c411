pub mod types;
pub mod filter;
pub mod filter_where;
pub mod filter_order;
pub mod error;
pub mod matcher;
pub mod query_string;

pub use types::*;
pub use filter::Filter;
pub use error::FilterError;
pub use query_string::{FilterApi, QueryMap};

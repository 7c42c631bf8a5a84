//! Single-flight access token refresh.
//!
//! This module provides:
//! - `RefreshSource`: the operation that obtains a new access token
//! - `HttpRefreshSource`: exchanges the refresh cookie at the refresh endpoint
//! - `RefreshCoordinator`: collapses concurrent refresh requests into one
//!   in-flight call whose outcome every caller shares

pub mod coordinator;
pub mod source;

pub use coordinator::RefreshCoordinator;
pub use source::{HttpRefreshSource, RefreshSource};

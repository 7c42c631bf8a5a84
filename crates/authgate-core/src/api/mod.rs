//! Endpoint wrappers built on the [`Gateway`](crate::Gateway).
//!
//! Each wrapper constructs an `OutboundRequest` and sends it; none of them
//! handles authorization failures itself.

pub mod auth;

pub use auth::{
    AuthApi, LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest, UserProfile,
};

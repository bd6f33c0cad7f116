//! Bearer token authentication
//!
//! - Header extraction and token validation (`gate`)
//! - Middleware for protecting routes
//! - Login, refresh and logout (`service`)
//! - Error type rendered as `{"error": ...}` responses

pub mod error;
pub mod gate;
pub mod middleware;
pub mod models;
pub mod service;

pub use error::{AuthError, InvalidReason};
pub use gate::{extract_bearer, AuthGate, AuthenticatedUser, BearerToken};
pub use middleware::{require_auth, require_bearer};
pub use models::{
    LoginRequest, LoginResponse, MeResponse, MessageResponse, RefreshResponse, UserInfo,
};
pub use service::AuthService;

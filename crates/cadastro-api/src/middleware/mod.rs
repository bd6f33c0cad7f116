//! HTTP middleware
//!
//! Authentication middleware lives in [`crate::auth::middleware`].

pub mod fault_injection;

pub use fault_injection::fault_injection_middleware;

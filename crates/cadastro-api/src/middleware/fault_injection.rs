//! Random fault injection for resilience testing
//!
//! When `fault_injection.enabled` is set, a configurable fraction of requests
//! on the wrapped routes fails with `500 {"error": "Erro interno do servidor"}`
//! before the handler runs. Disabled by default.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cadastro_core::config::FaultInjectionConfig;
use std::sync::Arc;

/// Roll the dice for one request
pub fn should_inject(config: &FaultInjectionConfig) -> bool {
    config.enabled && config.error_rate > 0.0 && rand::random::<f64>() < config.error_rate
}

pub async fn fault_injection_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if should_inject(&state.config.fault_injection) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "injected fault"
        );
        return AppError::Internal("injected fault".to_string()).into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_injects() {
        let config = FaultInjectionConfig {
            enabled: false,
            error_rate: 1.0,
        };
        assert!((0..1000).all(|_| !should_inject(&config)));
    }

    #[test]
    fn test_rate_bounds() {
        let always = FaultInjectionConfig {
            enabled: true,
            error_rate: 1.0,
        };
        let never = FaultInjectionConfig {
            enabled: true,
            error_rate: 0.0,
        };
        assert!((0..1000).all(|_| should_inject(&always)));
        assert!((0..1000).all(|_| !should_inject(&never)));
    }
}

//! Server infrastructure module.
//!
//! Router assembly with OpenAPI documentation, liveness/readiness
//! endpoints, and signal-driven graceful shutdown. Apps build their
//! routes, hand them to [`create_router`], merge health and metrics
//! routes at the root, and run via [`create_production_app`].

pub mod app;
pub mod health;
pub mod shutdown;

pub use app::{create_production_app, create_router};
pub use health::{HealthCheckFuture, HealthResponse, health_router, run_health_checks};
pub use shutdown::ShutdownCoordinator;

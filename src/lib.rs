//! Storefront frontend gateway library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod services;

pub use config::schema::FrontendConfig;
pub use http::{HttpServer, Page, PageHandler, UnwiredPages};
pub use lifecycle::Shutdown;
pub use services::ServiceRegistry;

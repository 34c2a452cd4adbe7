pub mod app;
pub mod error;
pub mod handler;
pub mod http;
pub mod injection;
pub mod integration;
pub mod middleware;
pub mod router;
#[cfg(feature = "test")]
pub mod test;
pub mod ws;

// repub
pub use http_body_util;
pub use hyper;
pub use serde;
pub use tokio;
pub use tower;
pub use tracing;
pub use wiring_core;

pub use app::{Application, LifecycleHook, config::ApplicationConfig};
pub use error::{AppError, AppResult, ErrorResponse};
pub use handler::{Arguments, Dependant, HttpConnection};
pub use http::response::{Html, IntoResponse, Json};
pub use injection::{AsyncContainer, ContainerBuilder, Lifetime, ScopedContainer};
pub use integration::{get_app_container, setup, setup_with, SetupOptions};
pub use router::Router;

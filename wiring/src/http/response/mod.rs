pub mod into_response;

pub use into_response::{Html, IntoResponse, Json};

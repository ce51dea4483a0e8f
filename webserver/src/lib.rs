//! HTTP front-end library for the worker pool manager
//!
//! A thin marshalling layer: request bodies become task submissions, the
//! worker's reply becomes the response body. HTTP 200 carries successful
//! replies, HTTP 500 carries error replies.

pub mod error;
pub mod routes;

pub use error::{WebServerError, WebServerResult};
pub use routes::router;

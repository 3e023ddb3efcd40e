//! dog-core: framework-agnostic core for DogRS.
//!
//! - [`pipeline`]: ordered, short-circuiting request/response stages
//! - [`errors`]: structured errors with status codes
//! - [`config`]: string key/value configuration

pub mod config;
pub mod errors;
pub mod pipeline;

pub use config::{DogConfig, DogConfigSnapshot};
pub use errors::{DogError, DogResult, ErrorKind};
pub use pipeline::{Flow, Pipeline, RequestHandler, ResponseHandler};

//! Request/response plumbing between the reconciler and the remote query endpoint.

pub mod contract;
pub mod credentials;
pub mod http;
pub mod scripted;

pub use contract::*;
pub use credentials::*;
pub use http::*;
pub use scripted::*;

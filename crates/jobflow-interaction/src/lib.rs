//! HTTP implementations of the jobflow collaborator traits.

pub mod http_backend;
pub mod response;

pub use http_backend::HttpJobBackend;
pub use response::{map_error_response, map_transport_error};

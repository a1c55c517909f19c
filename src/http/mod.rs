//! The HTTP/1.1 subset spoken by the server.
//!
//! One request per connection: no keep-alive, pipelining, chunked bodies
//! or TLS.

pub mod request;
pub mod response;

pub use request::{Method, Request};
pub use response::Response;

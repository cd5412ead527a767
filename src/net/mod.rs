//! Requests, responses and the network behind the cache.

mod client;
mod request;
mod response;

pub use client::{HttpNetwork, Network};
pub use request::Request;
pub use response::Response;

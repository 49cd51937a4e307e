//! HTTP serving plumbing shared by the controller and the agent.
//!
//! Both roles implement [`may_minihttp::HttpService`] and are started through
//! the [`HttpServer`] wrapper, which hands back a [`ServerHandle`] for tests
//! and for the CLI to join on.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_request, ParsedRequest};
pub use service::ControllerService;

//! TCP echo service on the excubitor reactor.
//!
//! Split from the binary so the service can be driven from tests.

pub mod config;
pub mod server;

pub use config::Config;
pub use server::EchoServer;

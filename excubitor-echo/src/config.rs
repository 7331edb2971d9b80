use clap::Parser;

use std::net::{IpAddr, SocketAddr};

/// Command line configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "excubitor-echo")]
#[command(about = "TCP echo service driven by a single-threaded epoll reactor")]
pub struct Config {
    /// Address that listens
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port that listens
    #[arg(short, long, default_value_t = 5300)]
    pub port: u16,

    /// Priority of the listening socket, lower is more urgent
    #[arg(long, default_value_t = 5)]
    pub listener_priority: i32,

    /// Priority of accepted connections
    #[arg(long, default_value_t = 10)]
    pub connection_priority: i32,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log: String,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

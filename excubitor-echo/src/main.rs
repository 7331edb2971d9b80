use excubitor::{EventLoop, SignalSource};
use excubitor_echo::{Config, EchoServer};

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let config = Config::parse();

    // RUST_LOG wins over --log
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log)),
        )
        .init();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "echo service failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let event_loop = EventLoop::new()?;

    // SIGINT/SIGTERM are queued on a signalfd and, with the default
    // priorities, dispatched ahead of the listener and connections.
    let shutdown = SignalSource::new(&[libc::SIGINT, libc::SIGTERM])?;
    shutdown.set_priority(3);
    let handle = event_loop.downgrade();
    shutdown.set_callback(
        move |fd| {
            info!(signal = ?SignalSource::signal_of(fd), "received signal, quitting");
            handle.quit();
            false
        },
        None,
    );
    event_loop.add_source(&shutdown);
    drop(shutdown);

    let server = EchoServer::bind(
        &event_loop,
        config.listen_addr(),
        config.listener_priority,
        config.connection_priority,
    )?;
    info!(addr = %server.local_addr(), "echo service listening");

    event_loop.run()?;

    info!(connections = server.connections(), "echo service stopped");

    Ok(())
}

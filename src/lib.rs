// Library target exposes the Gateway client plus internal modules for integration tests and for
// the xtask binary (man page generation). The binary entry point is in main.rs.

mod cli;

pub mod client;
pub mod config;
pub mod err;
pub mod error;
pub mod event;
pub mod frame;
pub mod interceptor;
pub mod manager;
pub mod pending;
pub mod reconnect;
pub mod router;
pub mod transport;

/// Returns the clap `Command` definition for man page and completion generation.
///
/// Used by the xtask binary to generate man pages without depending on the binary crate directly.
#[must_use]
pub fn command() -> clap::Command {
    <cli::Cli as clap::CommandFactory>::command()
}

//! Host access for deckhand
//!
//! Everything the engine does to a target machine goes through the
//! [`Connection`] trait:
//!
//! - [`LocalConnection`] runs commands as local processes
//! - [`SshConnection`] runs them through the system `ssh` client
//! - [`MockConnection`] is an in-memory host for tests
//!
//! Commands are described by [`CommandSpec`]. Privileged commands are run
//! through `sudo -n`, so a session without cached or passwordless sudo
//! fails with [`Error::PermissionDenied`] instead of hanging on a prompt.
//! Every command can carry a timeout; on expiry the process is killed and
//! [`Error::Timeout`] is returned.
//!
//! File writes are atomic: content goes to a sibling temporary file that is
//! then renamed over the destination, so a failed or timed-out write never
//! leaves a truncated file behind.

pub mod command;
pub mod connection;
pub mod error;
pub mod local;
pub mod mock;
pub mod process;
pub mod ssh;

pub use command::{CommandOutput, CommandSpec, shell_quote};
pub use connection::{Connection, FileKind, FileStat};
pub use error::{Error, ErrorCategory, Result};
pub use local::LocalConnection;
pub use mock::{MockConnection, MockFile, MockFs};
pub use ssh::{SshConfig, SshConnection};

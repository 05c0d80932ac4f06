//! # scpr - Remote Copy over the Classic scp Wire Protocol
//!
//! scpr speaks the byte-oriented dialog of the venerable `scp` command on
//! top of an established remote-shell session: push a local file or
//! directory tree to a remote host, or pull one back. Files whose content
//! digest already matches on both ends can be skipped, and symbolic links
//! can be recreated remotely instead of being followed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scpr::{CopyOptions, SshSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SshSession::new("backup@files.example.com");
//!     scpr::upload_file(&session, "./site".as_ref(), "/srv/www/site", &CopyOptions::new())
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Options
//!
//! ```rust,ignore
//! use scpr::CopyOptions;
//! use std::time::Duration;
//!
//! let opts = CopyOptions::new()
//!     .symbolic_link(true)
//!     .skip_equal_digest(true)
//!     .timeout(Duration::from_secs(300));
//! ```

pub mod callbacks;
pub mod config;
pub mod digest;
pub mod download;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod upload;
pub mod util;

// Re-export commonly used types and functions
pub use callbacks::{FnObserver, NoObserver, TransferEvent, TransferObserver, TransferOutcome};
pub use config::CopyOptions;
pub use download::download_file;
pub use error::{RemoteSeverity, ScpError, ScpResult};
pub use session::{RemoteExec, RemoteTarget, SshSession};
pub use upload::upload_file;

// vim: ts=4

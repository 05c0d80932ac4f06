//! Per-transfer configuration
//!
//! One `CopyOptions` value configures a single upload or download call.
//! The default is "do nothing special": follow symlinks, always transfer,
//! no observer, no deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::callbacks::{TransferEvent, TransferObserver, TransferOutcome};

/// Options for a single transfer
#[derive(Clone, Default)]
pub struct CopyOptions {
	/// Recreate symbolic links on the peer via a remote `ln` command
	/// instead of following them and sending the target's content
	pub symbolic_link: bool,

	/// Skip regular files whose MD5 digest matches the remote copy
	pub skip_equal_digest: bool,

	/// Abort the whole transfer when this deadline elapses
	pub timeout: Option<Duration>,

	/// Observer invoked around each file/directory operation
	pub observer: Option<Arc<dyn TransferObserver>>,
}

impl CopyOptions {
	pub fn new() -> Self {
		CopyOptions::default()
	}

	/// Enable symbolic-link replication
	pub fn symbolic_link(mut self, enabled: bool) -> Self {
		self.symbolic_link = enabled;
		self
	}

	/// Enable digest-based skipping
	pub fn skip_equal_digest(mut self, enabled: bool) -> Self {
		self.skip_equal_digest = enabled;
		self
	}

	/// Bound the transfer with a deadline
	pub fn timeout(mut self, limit: Duration) -> Self {
		self.timeout = Some(limit);
		self
	}

	/// Attach an observer
	pub fn observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
		self.observer = Some(observer);
		self
	}

	/// Invoke the configured observer, if any
	pub(crate) fn trigger(
		&self,
		event: TransferEvent,
		src: &str,
		dest: &str,
		outcome: &TransferOutcome,
	) {
		if let Some(observer) = &self.observer {
			observer.on_transfer(event, src, dest, outcome);
		}
	}
}

impl fmt::Debug for CopyOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CopyOptions")
			.field("symbolic_link", &self.symbolic_link)
			.field("skip_equal_digest", &self.skip_equal_digest)
			.field("timeout", &self.timeout)
			.field("observer", &self.observer.is_some())
			.finish()
	}
}


// vim: ts=4

//! Observer hooks for per-entry transfer events
//!
//! An observer is invoked synchronously before and after every file or
//! directory operation, carrying the source/destination pair and the
//! outcome. Observers are a pure side channel: they never alter control
//! flow, and when none is configured the hook is a no-op.

use crate::error::{ScpError, ScpResult};

/// Transfer lifecycle events
///
/// The `Send*` variants fire on upload, the `Recv*` variants on download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
	BeforeSendFile,
	AfterSendFile,
	BeforeSendDir,
	AfterSendDir,
	BeforeRecvFile,
	AfterRecvFile,
	BeforeRecvDir,
	AfterRecvDir,
}

/// Outcome record attached to `After*` events
///
/// `Before*` events carry the default (not skipped, no error).
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
	/// The operation was elided (digest match, or an already-correct
	/// remote symlink)
	pub skipped: bool,

	/// Error message when the operation failed
	pub error: Option<String>,
}

impl TransferOutcome {
	/// Outcome of a successfully completed operation
	pub fn ok() -> Self {
		TransferOutcome::default()
	}

	/// Outcome of an elided operation
	pub fn skipped() -> Self {
		TransferOutcome { skipped: true, error: None }
	}

	/// Outcome of a failed operation
	pub fn failed(err: &ScpError) -> Self {
		TransferOutcome { skipped: false, error: Some(err.to_string()) }
	}

	pub(crate) fn from_result<T>(res: &ScpResult<T>) -> Self {
		match res {
			Ok(_) => TransferOutcome::ok(),
			Err(e) => TransferOutcome::failed(e),
		}
	}
}

/// Callback invoked around each file and directory operation
///
/// `src` and `dest` are rendered as strings: on upload `src` is the local
/// path and `dest` the remote one, on download the roles are reversed.
pub trait TransferObserver: Send + Sync {
	fn on_transfer(&self, event: TransferEvent, src: &str, dest: &str, outcome: &TransferOutcome);
}

/// Default observer that does nothing
pub struct NoObserver;

impl TransferObserver for NoObserver {
	fn on_transfer(&self, _event: TransferEvent, _src: &str, _dest: &str, _out: &TransferOutcome) {}
}

/// Adapter turning a closure into an observer
pub struct FnObserver<F> {
	f: F,
}

impl<F> FnObserver<F>
where
	F: Fn(TransferEvent, &str, &str, &TransferOutcome) + Send + Sync,
{
	pub fn new(f: F) -> Self {
		FnObserver { f }
	}
}

impl<F> TransferObserver for FnObserver<F>
where
	F: Fn(TransferEvent, &str, &str, &TransferOutcome) + Send + Sync,
{
	fn on_transfer(&self, event: TransferEvent, src: &str, dest: &str, outcome: &TransferOutcome) {
		(self.f)(event, src, dest, outcome)
	}
}


// vim: ts=4

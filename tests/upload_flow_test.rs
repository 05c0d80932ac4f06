//! Upload flow tests
//!
//! The local driver is exercised against an in-memory sink that plays the
//! remote `scp -t` half of the dialog: it acknowledges the handshake and
//! every header, consumes declared content plus the sentinel byte, and
//! records the exact inbound byte stream for assertions.

use async_trait::async_trait;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt, DuplexStream};

use scpr::callbacks::{FnObserver, TransferEvent, TransferOutcome};
use scpr::config::CopyOptions;
use scpr::error::{ScpError, ScpResult};
use scpr::protocol::Protocol;
use scpr::session::RemoteExec;
use scpr::upload::drive_upload;

// ============================================================================
// Helpers
// ============================================================================

/// Remote-command stub: answers `md5sum` with a fixed digest (or a
/// failure), lets `ln -sf` succeed, and records every command it sees.
struct StubExec {
	md5: Option<String>,
	commands: Mutex<Vec<String>>,
}

impl StubExec {
	fn new(md5: Option<&str>) -> Self {
		StubExec { md5: md5.map(|h| h.to_string()), commands: Mutex::new(Vec::new()) }
	}

	fn commands(&self) -> Vec<String> {
		self.commands.lock().unwrap().clone()
	}
}

#[async_trait]
impl RemoteExec for StubExec {
	async fn run(&self, command: &str) -> ScpResult<String> {
		self.commands.lock().unwrap().push(command.to_string());
		if command.starts_with("md5sum ") {
			match &self.md5 {
				Some(h) => Ok(format!("{}  {}\n", h, &command[7..])),
				None => Err(ScpError::RemoteCommand {
					status: 1,
					message: "md5sum: No such file or directory".to_string(),
				}),
			}
		} else if command.starts_with("readlink ") {
			Err(ScpError::RemoteCommand { status: 1, message: String::new() })
		} else {
			Ok(String::new())
		}
	}
}

/// Minimal scripted `scp -t`: handshake ack, per-header ack, content +
/// sentinel consumption, final ack per file. Returns every byte the
/// driver sent.
async fn scripted_sink(mut remote: DuplexStream) -> Vec<u8> {
	let mut seen = Vec::new();
	remote.write_all(&[0x00]).await.unwrap();
	let mut byte = [0u8; 1];
	loop {
		let mut line = Vec::new();
		loop {
			match remote.read(&mut byte).await {
				Ok(0) => return seen,
				Ok(_) => {
					line.push(byte[0]);
					if byte[0] == b'\n' {
						break;
					}
				}
				Err(_) => return seen,
			}
		}
		seen.extend_from_slice(&line);
		let kind = line[0];
		remote.write_all(&[0x00]).await.unwrap();
		if kind == b'C' {
			let text = String::from_utf8_lossy(&line);
			let mut fields = text.trim_end().splitn(3, ' ');
			fields.next();
			let size: usize = fields.next().unwrap().parse().unwrap();
			let mut remaining = size + 1; // content + sentinel
			let mut chunk = vec![0u8; 4096];
			while remaining > 0 {
				let want = remaining.min(chunk.len());
				let n = remote.read(&mut chunk[..want]).await.unwrap();
				if n == 0 {
					return seen;
				}
				seen.extend_from_slice(&chunk[..n]);
				remaining -= n;
			}
			remote.write_all(&[0x00]).await.unwrap();
		}
	}
}

async fn run_upload(
	src: &Path,
	dest: &str,
	opts: &CopyOptions,
	exec: &StubExec,
) -> (ScpResult<()>, Vec<u8>) {
	let (local, remote) = duplex(1 << 20);
	let (r, w) = split(local);
	let mut proto = Protocol::new(r, w);
	let sink = tokio::spawn(scripted_sink(remote));

	let res = drive_upload(&mut proto, exec, src, dest, opts).await;
	proto.close_send().await.unwrap();
	let seen = sink.await.unwrap();
	(res, seen)
}

/// Split the captured stream into printable frames: header lines, with
/// file content and its sentinel folded into the `C` frame.
fn parse_wire(seen: &[u8]) -> Vec<String> {
	let mut frames = Vec::new();
	let mut i = 0;
	while i < seen.len() {
		let nl = seen[i..].iter().position(|&b| b == b'\n').expect("header line") + i;
		let line = String::from_utf8_lossy(&seen[i..nl]).into_owned();
		i = nl + 1;
		if line.starts_with('C') {
			let size: usize = line.split(' ').nth(1).unwrap().parse().unwrap();
			let content = String::from_utf8_lossy(&seen[i..i + size]).into_owned();
			assert_eq!(seen[i + size], 0x00, "missing sentinel after content of {:?}", line);
			i += size + 1;
			frames.push(format!("{}|{}", line, content));
		} else {
			frames.push(line);
		}
	}
	frames
}

fn set_mode(path: &Path, mode: u32) {
	fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

fn recording_observer() -> (Arc<Mutex<Vec<(TransferEvent, bool)>>>, CopyOptions) {
	let seen: Arc<Mutex<Vec<(TransferEvent, bool)>>> = Arc::new(Mutex::new(Vec::new()));
	let inner = seen.clone();
	let opts = CopyOptions::new().observer(Arc::new(FnObserver::new(
		move |event, _src: &str, _dest: &str, outcome: &TransferOutcome| {
			inner.lock().unwrap().push((event, outcome.skipped));
		},
	)));
	(seen, opts)
}

// ============================================================================
// Wire-level tests
// ============================================================================

#[tokio::test]
async fn test_upload_single_file_wire_bytes() {
	let dir = TempDir::new().unwrap();
	let file = dir.path().join("hello.txt");
	fs::write(&file, b"world").unwrap();
	set_mode(&file, 0o644);

	let exec = StubExec::new(None);
	let (res, seen) = run_upload(&file, "/remote/hello.txt", &CopyOptions::new(), &exec).await;
	res.unwrap();

	assert_eq!(seen, b"C0644 5 hello.txt\nworld\x00");
	// Without the skip option no digest commands run.
	assert!(exec.commands().is_empty());
}

#[tokio::test]
async fn test_upload_directory_tree_framing() {
	// root/{a.txt (5 bytes), sub/{b.txt (0 bytes)}}
	let tmp = TempDir::new().unwrap();
	let root = tmp.path().join("root");
	fs::create_dir(&root).unwrap();
	fs::write(root.join("a.txt"), b"hello").unwrap();
	fs::create_dir(root.join("sub")).unwrap();
	fs::write(root.join("sub/b.txt"), b"").unwrap();
	set_mode(&root, 0o755);
	set_mode(&root.join("sub"), 0o755);
	set_mode(&root.join("a.txt"), 0o644);
	set_mode(&root.join("sub/b.txt"), 0o644);

	let exec = StubExec::new(None);
	let (res, seen) = run_upload(&root, "/remote/root", &CopyOptions::new(), &exec).await;
	res.unwrap();

	let frames = parse_wire(&seen);
	// Pre-order framing: the root directory opens first and closes last.
	assert_eq!(frames.first().map(String::as_str), Some("D0755 0 root"));
	assert_eq!(frames.last().map(String::as_str), Some("E"));
	assert_eq!(frames.iter().filter(|f| *f == "E").count(), 2);

	// Each child appears exactly once; enumeration order is free.
	let a = frames.iter().position(|f| f == "C0644 5 a.txt|hello").expect("a.txt frame");
	let d_sub = frames.iter().position(|f| f == "D0755 0 sub").expect("sub frame");
	let b = frames.iter().position(|f| f == "C0644 0 b.txt|").expect("b.txt frame");

	// b.txt is sub's only entry, so its dir-end follows immediately, and
	// a.txt never lands inside the sub frame.
	assert_eq!(b, d_sub + 1);
	assert_eq!(frames[b + 1], "E");
	assert!(a < d_sub || a > b + 1);
}

#[tokio::test]
async fn test_upload_empty_directory() {
	let tmp = TempDir::new().unwrap();
	let root = tmp.path().join("empty");
	fs::create_dir(&root).unwrap();
	set_mode(&root, 0o700);

	let exec = StubExec::new(None);
	let (res, seen) = run_upload(&root, "/remote/empty", &CopyOptions::new(), &exec).await;
	res.unwrap();
	assert_eq!(seen, b"D0700 0 empty\nE\n");
}

#[tokio::test]
async fn test_remote_warning_aborts_with_message() {
	let tmp = TempDir::new().unwrap();
	let file = tmp.path().join("secret.txt");
	fs::write(&file, b"data").unwrap();

	let (local, remote) = duplex(1 << 16);
	let (r, w) = split(local);
	let mut proto = Protocol::new(r, w);

	let sink = tokio::spawn(async move {
		let mut remote = remote;
		remote.write_all(&[0x00]).await.unwrap();
		let mut byte = [0u8; 1];
		loop {
			let n = remote.read(&mut byte).await.unwrap();
			if n == 0 || byte[0] == b'\n' {
				break;
			}
		}
		remote.write_all(b"\x01permission denied\n").await.unwrap();
		let mut buf = [0u8; 256];
		loop {
			match remote.read(&mut buf).await {
				Ok(0) | Err(_) => break,
				Ok(_) => {}
			}
		}
	});

	let exec = StubExec::new(None);
	let err = drive_upload(&mut proto, &exec, &file, "/remote/secret.txt", &CopyOptions::new())
		.await
		.unwrap_err();
	assert_eq!(err.to_string(), "permission denied");

	proto.close_send().await.unwrap();
	sink.await.unwrap();
}

// ============================================================================
// Skip policy
// ============================================================================

#[tokio::test]
async fn test_skip_equal_digest_sends_nothing() {
	let tmp = TempDir::new().unwrap();
	let file = tmp.path().join("hello.txt");
	fs::write(&file, b"hello").unwrap();

	// MD5("hello")
	let exec = StubExec::new(Some("5d41402abc4b2a76b9719d911017c592"));
	let (seen_events, opts) = recording_observer();
	let opts = opts.skip_equal_digest(true);

	let (res, seen) = run_upload(&file, "/remote/hello.txt", &opts, &exec).await;
	res.unwrap();

	assert!(seen.is_empty(), "no header or content bytes for a skipped file");
	assert_eq!(exec.commands(), vec!["md5sum /remote/hello.txt".to_string()]);
	assert_eq!(
		*seen_events.lock().unwrap(),
		vec![(TransferEvent::BeforeSendFile, false), (TransferEvent::AfterSendFile, true)]
	);
}

#[tokio::test]
async fn test_different_digest_transfers_normally() {
	let tmp = TempDir::new().unwrap();
	let file = tmp.path().join("hello.txt");
	fs::write(&file, b"changed content").unwrap();
	set_mode(&file, 0o644);

	let exec = StubExec::new(Some("5d41402abc4b2a76b9719d911017c592"));
	let opts = CopyOptions::new().skip_equal_digest(true);
	let (res, seen) = run_upload(&file, "/remote/hello.txt", &opts, &exec).await;
	res.unwrap();
	assert_eq!(seen, b"C0644 15 hello.txt\nchanged content\x00");
}

#[tokio::test]
async fn test_unobtainable_digest_transfers_normally() {
	let tmp = TempDir::new().unwrap();
	let file = tmp.path().join("hello.txt");
	fs::write(&file, b"hello").unwrap();
	set_mode(&file, 0o644);

	let exec = StubExec::new(None);
	let opts = CopyOptions::new().skip_equal_digest(true);
	let (res, seen) = run_upload(&file, "/remote/hello.txt", &opts, &exec).await;
	res.unwrap();
	assert_eq!(seen, b"C0644 5 hello.txt\nhello\x00");
}

// ============================================================================
// Symlinks
// ============================================================================

#[tokio::test]
async fn test_symlink_replicated_as_link() {
	let tmp = TempDir::new().unwrap();
	let target = tmp.path().join("target.txt");
	fs::write(&target, b"pointed at").unwrap();
	let link = tmp.path().join("link");
	std::os::unix::fs::symlink(&target, &link).unwrap();

	let exec = StubExec::new(None);
	let opts = CopyOptions::new().symbolic_link(true);
	let (res, seen) = run_upload(&link, "/remote/link", &opts, &exec).await;
	res.unwrap();

	// Nothing crosses the copy channel; the link is created remotely.
	assert!(seen.is_empty());
	let commands = exec.commands();
	assert_eq!(commands.len(), 2);
	assert_eq!(commands[0], "readlink /remote/link");
	assert_eq!(commands[1], format!("ln -sf {} /remote/link", target.display()));
}

#[tokio::test]
async fn test_symlink_followed_by_default() {
	let tmp = TempDir::new().unwrap();
	let target = tmp.path().join("target.txt");
	fs::write(&target, b"pointed at").unwrap();
	set_mode(&target, 0o640);
	let link = tmp.path().join("link");
	std::os::unix::fs::symlink(&target, &link).unwrap();

	let exec = StubExec::new(None);
	let (res, seen) = run_upload(&link, "/remote/link", &CopyOptions::new(), &exec).await;
	res.unwrap();

	// The pointed-to file's mode and size travel with the link's name.
	assert_eq!(seen, b"C0640 10 link\npointed at\x00");
	assert!(exec.commands().is_empty());
}

// ============================================================================
// Observer sequencing
// ============================================================================

#[tokio::test]
async fn test_observer_event_order_for_directory() {
	let tmp = TempDir::new().unwrap();
	let root = tmp.path().join("root");
	fs::create_dir(&root).unwrap();
	fs::write(root.join("a.txt"), b"x").unwrap();

	let exec = StubExec::new(None);
	let (seen_events, opts) = recording_observer();
	let (res, _seen) = run_upload(&root, "/remote/root", &opts, &exec).await;
	res.unwrap();

	assert_eq!(
		*seen_events.lock().unwrap(),
		vec![
			(TransferEvent::BeforeSendDir, false),
			(TransferEvent::BeforeSendFile, false),
			(TransferEvent::AfterSendFile, false),
			(TransferEvent::AfterSendDir, false),
		]
	);
}

// vim: ts=4

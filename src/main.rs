use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::Path;
use std::time::Duration;

use scpr::{download_file, upload_file, CopyOptions, RemoteTarget, SshSession};

fn copy_args(cmd: Command) -> Command {
	cmd.arg(
		Arg::new("links")
			.short('l')
			.long("links")
			.action(ArgAction::SetTrue)
			.help("Recreate symbolic links remotely instead of following them"),
	)
	.arg(
		Arg::new("skip-equal")
			.short('s')
			.long("skip-equal")
			.action(ArgAction::SetTrue)
			.help("Skip files whose MD5 digest already matches the remote copy"),
	)
	.arg(
		Arg::new("timeout")
			.short('t')
			.long("timeout")
			.value_name("SECS")
			.help("Abort the transfer after this many seconds"),
	)
	.arg(
		Arg::new("ssh-arg")
			.long("ssh-arg")
			.value_name("ARG")
			.action(ArgAction::Append)
			.help("Extra argument passed to every ssh invocation (repeatable)"),
	)
}

fn build_options(matches: &clap::ArgMatches) -> Result<CopyOptions, Box<dyn Error>> {
	let mut opts = CopyOptions::new()
		.symbolic_link(matches.get_flag("links"))
		.skip_equal_digest(matches.get_flag("skip-equal"));
	if let Some(secs) = matches.get_one::<String>("timeout") {
		let secs: u64 = secs.parse().map_err(|e| format!("Invalid timeout '{}': {}", secs, e))?;
		opts = opts.timeout(Duration::from_secs(secs));
	}
	Ok(opts)
}

fn build_session(host: &str, matches: &clap::ArgMatches) -> SshSession {
	let session = SshSession::new(host);
	match matches.get_many::<String>("ssh-arg") {
		Some(args) => session.ssh_args(args.map(|a| a.as_str())),
		None => session,
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	scpr::logging::init_tracing();

	let matches = Command::new("scpr")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Remote copy over the classic scp wire protocol")
		.subcommand_required(true)
		.subcommand(copy_args(
			Command::new("push")
				.about("Upload a local file or directory to a remote host")
				.arg(Arg::new("src").required(true).help("Local file or directory"))
				.arg(Arg::new("dest").required(true).help("host:path destination")),
		))
		.subcommand(copy_args(
			Command::new("pull")
				.about("Download a remote file or directory")
				.arg(Arg::new("src").required(true).help("host:path source"))
				.arg(Arg::new("dest").required(true).help("Local destination")),
		))
		.get_matches();

	if let Some(sub) = matches.subcommand_matches("push") {
		let src = sub.get_one::<String>("src").ok_or("push: source argument required")?;
		let dest = sub.get_one::<String>("dest").ok_or("push: destination argument required")?;
		let target = RemoteTarget::parse(dest)
			.ok_or("push: destination must be a remote host:path location")?;
		let session = build_session(&target.host, sub);
		let opts = build_options(sub)?;
		upload_file(&session, Path::new(src), &target.path, &opts).await?;
	} else if let Some(sub) = matches.subcommand_matches("pull") {
		let src = sub.get_one::<String>("src").ok_or("pull: source argument required")?;
		let dest = sub.get_one::<String>("dest").ok_or("pull: destination argument required")?;
		let target =
			RemoteTarget::parse(src).ok_or("pull: source must be a remote host:path location")?;
		let session = build_session(&target.host, sub);
		let opts = build_options(sub)?;
		download_file(&session, &target.path, Path::new(dest), &opts).await?;
	}

	Ok(())
}

// vim: ts=4

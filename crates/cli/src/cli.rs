use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "probe-http")]
#[command(about = "Issue scanning probes against a target and report the responses")]
#[command(version)]
pub struct Cli {
	/// Target URLs to request
	#[arg(required = true, value_name = "URL")]
	pub urls: Vec<String>,

	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Load client settings from a JSON file
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Maximum number of requests in flight
	#[arg(short, long)]
	pub concurrency: Option<usize>,

	/// User agent sent with every request
	#[arg(long)]
	pub user_agent: Option<String>,

	/// Proxy every request through this URL
	#[arg(long)]
	pub proxy: Option<String>,

	/// Username for basic authentication
	#[arg(long)]
	pub user: Option<String>,

	/// Password for basic authentication
	#[arg(long, requires = "user")]
	pub password: Option<String>,

	/// Never send a cookie with this name in cookie requests (repeatable)
	#[arg(long = "exclude-cookie", value_name = "NAME")]
	pub exclude_cookies: Vec<String>,

	/// Netscape cookie file to seed the session with
	#[arg(long, value_name = "FILE")]
	pub cookie_jar: Option<PathBuf>,

	/// Extra session cookies, e.g. "a=1;b=2"
	#[arg(long)]
	pub cookies: Option<String>,

	/// Send a form POST instead of a GET
	#[arg(long)]
	pub post: bool,

	/// Forward responses to the trainer, following one redirect
	#[arg(long)]
	pub train: bool,

	/// Flag responses that look like the target's custom not-found page
	#[arg(long)]
	pub check_not_found: bool,
}

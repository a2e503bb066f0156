use tracing_subscriber::EnvFilter;

/// Logs go to stderr so stdout stays machine readable. `RUST_LOG` wins over
/// the verbosity flag.
pub fn init_logging(verbose: u8) {
	let level = match verbose {
		0 => "warn",
		1 => "info",
		_ => "debug",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(verbose > 1)
		.with_writer(std::io::stderr)
		.try_init();
}

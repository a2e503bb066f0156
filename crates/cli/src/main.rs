use clap::Parser;
use probe_http_cli::{cli::Cli, logging, scan};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let mut stdout = std::io::stdout().lock();
	if let Err(err) = scan::execute(&cli, &mut stdout).await {
		error!(target = "probe", error = %err, "scan failed");
		std::process::exit(1);
	}
}

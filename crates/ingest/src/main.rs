use std::process::ExitCode;

use ingest::runtime::{boot, cli, stop};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    boot::init_logging();

    let args = match cli::CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(usage) => {
            eprintln!("{}", usage);
            return Ok(ExitCode::from(2));
        }
    };

    let (ingestor, config) = boot::boot()?;
    let cancel = CancellationToken::new();
    stop::cancel_on_shutdown(cancel.clone());

    let persister = cli::NdjsonPersister::new(tokio::io::stdout());
    let failed = cli::run(ingestor, &config, args, persister, cancel).await;
    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

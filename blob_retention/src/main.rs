//! Entrypoint of the blob_retention binary
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

use dotenvy::dotenv;
use sweep_logging::{
    Builder,
    cli::{LoggingConfig, LoggingConfigBuilderExt},
};

mod commands {
    pub(crate) mod sweep;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "blob_retention",
    version,
    about = "Deletes analytics blobs older than 90 days from an Azure storage container",
    long_about = r#"Deletes analytics blobs older than 90 days from an Azure storage container

The storage account is taken from the `StorageConnectionString` setting, read
from the environment or from a `.env` file in the working directory.

Examples:
    # Sweep the default container
    StorageConnectionString="DefaultEndpointsProtocol=https;AccountName=...;AccountKey=..." blob_retention

    # Sweep another container against the local storage emulator
    blob_retention --connection-string UseDevelopmentStorage=true --container device-outputs-test

    # Sweep with debug logging on stderr
    blob_retention -vv
"#
)]
struct Config {
    #[clap(flatten)]
    logging_config: LoggingConfig,

    #[clap(flatten)]
    sweep_config: commands::sweep::SweepConfig,
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    tokio_runtime.block_on(async move {
        fn handle_init_logs(r: Result<(), sweep_logging::Error>) {
            if let Err(e) = r {
                eprintln!("Initializing logs failed: {e}");
                std::process::exit(ReturnCode::Failure as _);
            }
        }

        handle_init_logs(init_logs(&config.logging_config));

        if let Err(e) = commands::sweep::command(config.sweep_config).await {
            eprintln!("Sweep failed: {e}");
            std::process::exit(ReturnCode::Failure as _)
        }
    });

    Ok(())
}

fn init_logs(config: &LoggingConfig) -> Result<(), sweep_logging::Error> {
    Builder::new()
        .with_default_log_filter("info")
        .with_logging_config(config)
        .install_global()
}

fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing .env file is fine; the connection string may come from
            // the environment or the command line
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}

//! jsoncache CLI entrypoint.

use clap::Parser;

mod commands;
mod handlers;

use commands::{Commands, LogFormatArg};

#[derive(Parser)]
#[command(name = "jsoncache")]
#[command(author, version, about = "Read a self-refreshing JSON object from S3 or GCS", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    jsoncache::init_logging(cli.log_format.into());

    match cli.command {
        Commands::Get {
            source,
            compact,
            timeout_secs,
        } => handlers::get(&source, !compact, timeout_secs).await?,
        Commands::Watch { source } => handlers::watch(&source).await?,
        Commands::Compress {
            input,
            output,
            format,
        } => handlers::compress_file(&input, output, format)?,
    }

    Ok(())
}

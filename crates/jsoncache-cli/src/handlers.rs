//! Command handlers.

use crate::commands::{FormatArg, SourceArgs};
use console::style;
use jsoncache::{CacheBuilder, ThreadedObjectCache, compress};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Load the object once and print it to stdout.
pub async fn get(
    source: &SourceArgs,
    pretty: bool,
    timeout_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache = start(source)?;

    let loaded =
        tokio::time::timeout(Duration::from_secs(timeout_secs), cache.wait_until_cached()).await;
    let result = match loaded {
        Ok(Ok(())) => match cache.get() {
            Some(document) => print_document(&document, pretty),
            None => Err("cache reported success without a value".into()),
        },
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            let status = cache.status();
            Err(format!(
                "no value loaded after {}s ({} failed attempts, last error: {})",
                timeout_secs,
                status.failures,
                status.last_error.as_deref().unwrap_or("none")
            )
            .into())
        }
    };

    stop(cache).await?;
    result
}

/// Print every new version until interrupted.
pub async fn watch(source: &SourceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cache = start(source)?;

    eprintln!(
        "Watching {} every {}s (Ctrl+C to stop)...",
        style(cache.key()).bold(),
        cache.ttl().as_secs()
    );

    let interrupted = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let printed = print_versions(&cache, interrupted, &mut std::io::stdout()).await;

    info!("Stopping watch");
    stop(cache).await?;
    printed
}

/// Write each published version to `out` until `until` resolves.
async fn print_versions(
    cache: &ThreadedObjectCache,
    until: impl Future<Output = ()>,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut versions = cache.subscribe();
    // Also report a value published before we subscribed.
    versions.mark_changed();
    tokio::pin!(until);

    loop {
        tokio::select! {
            _ = &mut until => break,
            changed = versions.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(current) = cache.current() {
                    eprintln!(
                        "{} version {} fetched at {}",
                        style("✓").green(),
                        current.version,
                        current.fetched_at.to_rfc3339()
                    );
                    writeln!(out, "{}", serde_json::to_string(&*current.value)?)?;
                }
            }
        }
    }
    Ok(())
}

/// Compress a local file.
pub fn compress_file(
    input: &Path,
    output: Option<PathBuf>,
    format: FormatArg,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    let packed = compress(&data, format.into())?;
    let output = output.unwrap_or_else(|| default_output(input, format));
    std::fs::write(&output, &packed)?;

    println!(
        "{} Wrote {} ({} -> {} bytes)",
        style("✓").green(),
        output.display(),
        data.len(),
        packed.len()
    );
    Ok(())
}

fn default_output(input: &Path, format: FormatArg) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(format.suffix());
    PathBuf::from(name)
}

/// Start the cache without blocking; handlers apply their own timeouts.
fn start(source: &SourceArgs) -> Result<ThreadedObjectCache, Box<dyn std::error::Error>> {
    let config = source.load()?;
    Ok(CacheBuilder::from_config(&config)
        .block_until_cached(false)
        .build()?)
}

async fn stop(cache: ThreadedObjectCache) -> Result<(), Box<dyn std::error::Error>> {
    tokio::task::spawn_blocking(move || cache.shutdown()).await??;
    Ok(())
}

fn print_document(document: &Value, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = if pretty {
        serde_json::to_string_pretty(document)?
    } else {
        serde_json::to_string(document)?
    };
    println!("{}", rendered);
    Ok(())
}

//! CLI command definitions.

use clap::{Args, Subcommand, ValueEnum};
use jsoncache::{BackendKind, CacheConfig, Compression, LogFormat};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Load the object once and print it
    Get {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the document on a single line
        #[arg(long)]
        compact: bool,

        /// Give up if nothing has loaded after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// Keep the cache running and print every new version
    Watch {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Compress a local file in a format the cache can decode
    Compress {
        /// File to compress
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to the input plus the format's suffix)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = FormatArg::Gzip)]
        format: FormatArg,
    },
}

/// Where the cached object lives.
#[derive(Args)]
pub struct SourceArgs {
    /// YAML configuration file; other source flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    #[arg(long)]
    pub bucket: Option<String>,

    #[arg(long)]
    pub path: Option<String>,

    /// Seconds between refreshes
    #[arg(long)]
    pub ttl_seconds: Option<u64>,
}

impl SourceArgs {
    /// Merge the config file (if any) with the command-line flags.
    pub fn load(&self) -> Result<CacheConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(file) => CacheConfig::from_file(file)?,
            None => {
                let (Some(backend), Some(bucket), Some(path)) =
                    (self.backend, self.bucket.as_ref(), self.path.as_ref())
                else {
                    return Err("--backend, --bucket and --path are required without --config".into());
                };
                CacheConfig::new(backend.into(), bucket.clone(), path.clone())
            }
        };

        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(ttl) = self.ttl_seconds {
            config.ttl_seconds = ttl;
        }
        Ok(config)
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    S3,
    Gcs,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::S3 => BackendKind::S3,
            BackendArg::Gcs => BackendKind::Gcs,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum FormatArg {
    Gzip,
    Zstd,
    Bzip2,
}

impl FormatArg {
    pub fn suffix(self) -> &'static str {
        match self {
            FormatArg::Gzip => "gz",
            FormatArg::Zstd => "zst",
            FormatArg::Bzip2 => "bz2",
        }
    }
}

impl From<FormatArg> for Compression {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Gzip => Compression::Gzip,
            FormatArg::Zstd => Compression::Zstd,
            FormatArg::Bzip2 => Compression::Bzip2,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn source() -> SourceArgs {
        SourceArgs {
            config: None,
            backend: None,
            bucket: None,
            path: None,
            ttl_seconds: None,
        }
    }

    #[test]
    fn test_flags_without_config() {
        let args = SourceArgs {
            backend: Some(BackendArg::Gcs),
            bucket: Some("models".to_string()),
            path: Some("taar/whitelist.json".to_string()),
            ttl_seconds: Some(60),
            ..source()
        };
        let config = args.load().unwrap();
        assert_eq!(config.backend, BackendKind::Gcs);
        assert_eq!(config.ttl_seconds, 60);
        assert_eq!(config.path, "taar/whitelist.json");
    }

    #[test]
    fn test_missing_flags_rejected() {
        let args = SourceArgs {
            bucket: Some("models".to_string()),
            ..source()
        };
        assert!(args.load().is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend: s3\nbucket: telemetry\npath: doc.json\nttl_seconds: 600").unwrap();

        let args = SourceArgs {
            config: Some(file.path().to_path_buf()),
            path: Some("other.json.gz".to_string()),
            ..source()
        };
        let config = args.load().unwrap();
        assert_eq!(config.bucket, "telemetry");
        assert_eq!(config.path, "other.json.gz");
        assert_eq!(config.ttl_seconds, 600);
    }

    #[test]
    fn test_format_suffix() {
        assert_eq!(FormatArg::Zstd.suffix(), "zst");
        assert_eq!(Compression::from(FormatArg::Bzip2), Compression::Bzip2);
    }
}

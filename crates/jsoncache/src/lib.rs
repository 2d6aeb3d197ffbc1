//! Self-refreshing cache for a JSON document stored in S3 or GCS.
//!
//! A background thread re-fetches the object every TTL, undoes any
//! transport compression, parses it, optionally transforms it, and
//! atomically publishes the result. Readers always get the latest good
//! value without touching the network; failed refreshes are logged and
//! the previous value is kept.

pub mod cache;
pub mod clock;
pub mod compression;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod key;
pub mod state;
pub mod telemetry;
pub mod transform;

pub use cache::{CacheBuilder, ThreadedObjectCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compression::{Compression, compress, decompress};
pub use config::{CacheConfig, DEFAULT_TTL, GcsConfig, S3Config};
pub use decoder::{DecodeHint, decode};
pub use engine::{EngineState, RefreshEngine, RefreshStatus};
pub use error::{DecodeError, Error, FetchError, FetchErrorKind, Result, Stage, TransformError};
pub use fetcher::{
    ConfiguredFetcher, FetchedObject, GcsFetcher, ObjectFetcher, S3Fetcher, StorageBackend,
};
pub use key::{BackendKind, CacheKey};
pub use state::{CacheState, CachedValue};
pub use telemetry::{LogFormat, init_logging};
pub use transform::Transformer;

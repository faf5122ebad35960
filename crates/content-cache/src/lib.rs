//! In-process content cache
//!
//! Serves memory-mapped files and generated blobs by identifier. Every entry
//! carries a refresh policy, deciding when its bytes are brought back in line
//! with the source, and a lifetime policy, deciding when it leaves the cache.
//! Both are driven by a [`tick_scheduler::Scheduler`] owned by the container.
//!
//! ```no_run
//! use content_cache::{CacheConfig, CacheContainer, Duration, LifetimePolicy, RefreshPolicy};
//!
//! # fn main() -> content_cache::Result<()> {
//! let cache = CacheContainer::new(CacheConfig::from_env())?;
//! cache.put_file(
//!     "static/logo.png",
//!     "logo",
//!     RefreshPolicy::UpToDate,
//!     LifetimePolicy::StrictInterval(Duration::from_secs(300)),
//! )?;
//! let _logo = cache.get("logo");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod entry;
pub mod error;
pub mod file;
pub mod generated;
pub mod policy;
pub mod types;

pub use config::CacheConfig;
pub use container::CacheContainer;
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use file::FileBackedEntry;
pub use generated::GeneratedContent;
pub use policy::{LifetimePolicy, RefreshPolicy};
pub use tick_scheduler::Duration;
pub use types::{CacheStats, EntryInfo, EntryKind};

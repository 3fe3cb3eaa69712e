//! # Photoflow
//!
//! Asynchronous image acquisition for UI toolkits.
//!
//! ## Overview
//!
//! A view asks for an image by source (a bundled asset, a local file or a
//! network URL). Photoflow fetches the bytes on a pool of download workers,
//! decodes them on a pool sized to the machine, and hands the pixels back to
//! the thread that owns the graphics resources, reporting every stage along
//! the way. Recent payloads stay in a byte-bounded LRU cache; network
//! payloads that decode are also kept on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Manager                             │
//! │   Owns the consumer side: requesters, bindings, dispatch    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │    Task pool    │ │   Schedulers    │ │  Memory cache   │
//! │                 │ │                 │ │                 │
//! │ • Reuse tasks   │ │ • Download      │ │ • LRU by bytes  │
//! │ • Generations   │ │ • Decode        │ │ • Hit counters  │
//! │ • Cancellation  │ │ • Backpressure  │ │                 │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!          │                   │                   │
//!          └───────────────────┴───────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │     Loader      │ │     Decoder     │ │      Key        │
//! │                 │ │                 │ │                 │
//! │ • Assets, files │ │ • Fit to target │ │ • SHA-256       │
//! │ • HTTP fetch    │ │ • Rotation      │ │ • Base 36       │
//! │ • Disk cache    │ │ • RGBA8         │ │                 │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Pool sizes, cache budget and HTTP settings
//! - [`error`] - Pipeline error type
//! - [`images`] - Memory cache, payload loading and decoding
//! - [`key`] - Content keys and disk cache paths
//! - [`models`] - Image sources, targets and task status
//! - [`pipeline`] - Manager, task pool and worker schedulers
//!
//! ## Example
//!
//! ```no_run
//! use photoflow::{Config, Manager};
//!
//! fn main() -> photoflow::Result<()> {
//!     let mut slot: Option<Manager<u32>> = None;
//!     let manager = Manager::initialize(&mut slot, &Config::default())?;
//!     println!("{} requests pending", manager.pending_requests());
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/photoflow/0.3.1")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::significant_drop_tightening)]

pub mod config;
pub mod error;
pub mod images;
pub mod key;
pub mod models;
pub mod paths;
pub mod pipeline;

// Re-export main types for convenience
pub use config::Config;
pub use error::{PipelineError, Result};
pub use images::{CacheStats, MemoryCache, PixelBuffer};
pub use models::{ImageSource, MediaOrigin, RequestIdentity, Status, Target};
pub use pipeline::{Canceller, Manager, Requester, ResourceManager, TaskHandle};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

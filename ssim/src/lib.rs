//! ssim - a server-side cache of scaled image renditions.
//!
//! Given a source image identified by a uid, [`ImageFinder`] produces resized
//! and re-encoded copies on demand and keeps them in a size-bounded
//! directory cache.
//!
//! ```no_run
//! use ssim::codec::ImageCrateCodec;
//! use ssim::config::{FinderConfig, StoreConfig};
//! use ssim::source::FileSourceResolver;
//! use ssim::ImageFinder;
//! use std::time::Duration;
//!
//! let store = StoreConfig::new("/var/cache/ssim")
//!     .with_max_size_bytes(256 * 1024 * 1024)
//!     .with_cull_interval(Duration::from_secs(300));
//! let finder = ImageFinder::open(
//!     FileSourceResolver::new("/srv/images"),
//!     ImageCrateCodec::new(),
//!     &FinderConfig::new(store),
//! )?;
//!
//! let thumb = finder.find("photos/cat.jpg", Some("image/png"), 128, 128, true)?;
//! let bytes = thumb.read_to_vec()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod config;
pub mod data;
pub mod error;
pub mod finder;
pub mod key;
pub mod logging;
pub mod source;
pub mod spec;
pub mod store;

pub use data::{BufferedImageData, ImageData};
pub use error::SsimError;
pub use finder::{FinderStats, ImageFinder};
pub use key::{KeyRegistry, RenditionKey};
pub use spec::ImageSpec;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

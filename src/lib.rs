//! KePub library
//!
//! A Rust library for converting EPUB eBook files into Kobo KePub files
//! and back.
//!
//! A KePub is an ordinary EPUB whose content documents carry extra markup the
//! Kobo reading system relies on: every sentence and every image is wrapped
//! into a `koboSpan` element with a position identifier, and the body content
//! sits inside two layout divs. This library opens a container, rewrites its
//! content documents in spine order through a pipeline of transforms, and
//! writes the container back, copying every other resource untouched.
//!
//! ## Features
//!
//! - Load EPUB containers, their manifest, spine and metadata record.
//! - Add sentence spans, Kobo divs, hyphenation stylesheets and scripts.
//! - Strip Kobo markup from KePub files to get plain EPUB files back.
//! - Read and replace the metadata record, fix up the cover image.
//! - Structured conversion reports instead of printed messages.
//!
//! ## Quick Start
//!
//! ```rust, no_run
//! # use lib_kepub::{Kepubify, KepubOperations, OutputConfig};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = OutputConfig::new();
//! config.set_hyphenate(false).set_best_effort(true);
//!
//! let report = Kepubify::new().convert_file("book.epub", "book.kepub.epub", &config)?;
//! for line in &report.lines {
//!     println!("{}: {}", line.level, line.message);
//! }
//!
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `cli`: Builds the `kepubify` command line tool.

pub(crate) mod entities;
pub(crate) mod html;
pub(crate) mod utils;

pub mod config;
pub mod container;
pub mod dom;
pub mod error;
pub mod metadata;
pub mod ops;
pub mod pipeline;
pub mod report;
pub mod segment;
pub mod serializer;
pub mod transform;
pub mod types;

pub use config::{HyphenationConfig, InputConfig, MarkerRule, OutputConfig};
pub use error::KepubError;
pub use metadata::KepubMetadata;
pub use ops::{ConversionOutcome, KepubOperations, Kepubify};
pub use report::ConversionReport;
pub use utils::DecodeBytes;

#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`image`]: Image reference validation (`validate_image_name`, `validate_image_tag`)
//! - [`backend`]: Scanner backends (`ScannerBackend` trait, `TrivyBackend`, `ClairBackend`, `AnyBackend`)
//! - [`normalize`]: Output normalization (`normalize`, raw JSON -> `Vec<Vulnerability>`)
//!
//! # Architecture
//!
//! ```text
//! ScanRequest --> validate --> ScannerBackend::scan --> RawScanOutput
//!                                                            |
//!                                                       normalize
//!                                                            |
//!                                                  Vec<Vulnerability>
//! ```

pub mod backend;
pub mod image;
pub mod normalize;

// --- Public API Re-exports ---

pub use backend::clair::ClairBackend;
pub use backend::trivy::TrivyBackend;
pub use backend::{AnyBackend, RawScanOutput, ScannerBackend};
pub use image::validate_image_ref;
pub use normalize::normalize;

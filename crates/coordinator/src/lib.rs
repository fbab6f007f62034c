#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`coordinator`]: Scan lifecycle orchestration (`ScanCoordinator`, `ScanCoordinatorBuilder`)
//! - [`store`]: In-memory scan history and statistics (`ScanStore`, `ScanStatistics`)
//!
//! # Architecture
//!
//! ```text
//! ScanRequest --> validate --> in-flight guard --> ScannerBackend::scan
//!                                                        |
//!                                                   normalize
//!                                                        |
//!                             ScanStore <-- ScanResult --+--> evaluate --> GateDecision
//!                                                        |
//!                                                    ScanEvent
//! ```

pub mod coordinator;
pub mod store;

// --- Public API Re-exports ---

pub use coordinator::{ScanCoordinator, ScanCoordinatorBuilder, ScanOutcome};
pub use store::{ScanStatistics, ScanStore};

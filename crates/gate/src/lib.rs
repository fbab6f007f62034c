#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`resolver`]: Exception resolution (`resolve`, `Resolution`, `ExceptedVulnerability`)
//! - [`aggregate`]: Severity bucketing (`aggregate`)
//! - [`decision`]: Gate verdict (`decide`, `evaluate`)
//! - [`store`]: Exception persistence (`ExceptionStore`, `NewException`)
//!
//! # Architecture
//!
//! ```text
//! Vec<Vulnerability> --> resolve(exceptions) --> Resolution
//!                                                  |
//!                                              aggregate
//!                                                  |
//!                                           SeverityCounts --> decide(threshold) --> GateDecision
//! ```

pub mod aggregate;
pub mod decision;
pub mod resolver;
pub mod store;

// --- Public API Re-exports ---

pub use aggregate::aggregate;
pub use decision::{decide, evaluate};
pub use resolver::{ExceptedVulnerability, Resolution, resolve};
pub use store::{ExceptionStore, NewException};

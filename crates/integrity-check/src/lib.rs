//! integrity-check - concurrent EC2 fleet policy audit
//!
//! Runs a set of independent compliance checks against an EC2 account in
//! parallel and merges their findings and failures into one report.

pub mod aws;
pub mod checker;
pub mod checks;
pub mod config;
pub mod lister;
pub mod output;

pub use checker::{AuditReport, Checker};
pub use checks::{Check, CheckOutcome};

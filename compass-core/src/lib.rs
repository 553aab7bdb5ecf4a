//! compass-core: database-free building blocks for the Compass Caging backend.
//!
//! Holds the pieces that have logic worth testing on their own:
//! money parsing, donor duplicate scoring, CSV import parsing,
//! client policy evaluation and bank reconciliation matching.

pub mod config;
pub mod error;
pub mod import;
pub mod matching;
pub mod money;
pub mod payment;
pub mod policy;
pub mod reconcile;

pub use config::CompassConfig;
pub use error::{CoreError, Result};
pub use money::Amount;
pub use payment::PaymentMethod;

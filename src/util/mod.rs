//! Shared utilities.

pub mod clock;
pub mod report;
pub mod serde;
pub mod telemetry;

pub use self::clock::*;
pub use self::report::*;
pub use self::serde::*;
pub use self::telemetry::*;

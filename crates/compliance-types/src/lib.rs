//! Compliance Dashboard Types
//!
//! Messages, progress records and status projections exchanged between the
//! dashboard core and its observers. Field names are snake_case on the wire.

pub mod message;
pub mod progress;
pub mod remediation;
pub mod results;
pub mod scan;
pub mod status;

pub use message::*;
pub use progress::*;
pub use remediation::*;
pub use results::*;
pub use scan::*;
pub use status::*;

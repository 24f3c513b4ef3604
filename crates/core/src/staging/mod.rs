//! Local staging area for inbound uploads.
//!
//! Every relayed payload is written to a uniquely named file in the staging
//! directory before it is forwarded, and removed once the relay attempt ends.

mod area;
mod error;

pub use area::{StagedFile, StagingArea};
pub use error::StagingError;

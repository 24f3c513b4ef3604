//! Concurrent upload relay.
//!
//! Turns one inbound payload plus one API key into one stored blob URL and
//! one usage-counter increment, under a single deadline:
//!
//! ```text
//!   stage payload ─┐
//!                  ├─ join (or deadline) ─ upload (or deadline) ─ begin/increment ─ deadline check ─ commit
//!   lookup key  ───┘
//! ```
//!
//! Every attempt ends in exactly one [`RelayOutcome`]. The counter is only
//! committed after a successful upload, and the URL is only returned after a
//! successful commit.

mod accounting;
mod outcome;
mod service;

#[cfg(test)]
mod tests;

pub use accounting::{Accounting, AccountingState};
pub use outcome::RelayOutcome;
pub use service::{RelayRequest, RelayService};

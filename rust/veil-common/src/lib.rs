#![warn(missing_docs)]

//! Light weight helpers shared by the veil crates: cross-target `Send`
//! bounds, detached task spawning that works on both native and browser
//! targets, and clock helpers for the millisecond timestamps the ledger uses.

mod sync;
pub use sync::*;

mod r#async;
pub use r#async::*;

pub mod time;

//! Data models for Verdict

mod decision;
mod option;
mod participant;
mod room;
mod vote;

pub use decision::*;
pub use option::*;
pub use participant::*;
pub use room::*;
pub use vote::*;

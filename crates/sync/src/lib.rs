//! Verdict Sync Library
//!
//! Keeps a client's local view of one room current with the shared store.
//!
//! # Architecture
//!
//! - **Projection**: an immutable snapshot of room, participants, options,
//!   votes and decision
//! - **RoomSync**: listens to the store's change-feed and swaps in a new
//!   snapshot whenever a relation changes, re-reading that whole relation
//!
//! # Usage
//!
//! ```ignore
//! let mut sync = RoomSync::enter(store, room_id).await?;
//! loop {
//!     let view = sync.changed().await?;
//!     println!("{} options", view.options.len());
//! }
//! ```

pub mod error;
pub mod projection;
pub mod realtime;

pub use error::{Error, Result};
pub use projection::Projection;
pub use realtime::RoomSync;

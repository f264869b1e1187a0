//! The store and its surfaces.
//!
//! - [`store`] - [`Store`], its builder, reads, writes and lifecycle
//! - [`cursor`] - Scoped views
//! - [`actions`] - Named actions and `trigger`
//! - [`events`] - Change notifications
//! - [`export`] - JSON export and the serialisability map

pub mod actions;
pub mod cursor;
pub mod events;
pub mod export;
#[allow(clippy::module_inception)]
pub mod store;

pub use actions::{Action, ActionFuture, ActionRegistry};
pub use cursor::Cursor;
pub use events::StoreEvent;
pub use export::Serialisability;
pub use store::{GetOptions, Store, StoreBuilder};

//! The data tree.
//!
//! - [`key`] - Path keys and the separator
//! - [`node`] - Tree values, including aliases
//! - [`accessor`] - Reading and writing nodes at a key

pub mod accessor;
pub mod key;
pub mod node;

pub use accessor::AccessMode;
pub use key::{Key, SEPARATOR};
pub use node::Node;

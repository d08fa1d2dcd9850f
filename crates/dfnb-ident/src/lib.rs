//! Identifier model for dataflow notebooks
//!
//! Every cell gets an opaque, stable [`CellId`] when it is created. Reference
//! tokens embedded in other cells' source never spell the full identifier;
//! they use a short form handed out by the [`IdentifierRegistry`], which
//! guarantees that two distinct identifiers never share a short form.
//!
//! A cell may also carry a human-readable [`Tag`], which is preferred over the
//! short form whenever an explicit reference has to be written.
//!
//! # Example
//!
//! ```rust
//! use dfnb_ident::IdentifierRegistry;
//!
//! let mut registry = IdentifierRegistry::new(8);
//! let id = registry.new_identifier();
//! let short = registry.truncate(id).unwrap().to_string();
//!
//! assert_eq!(short.len(), 8);
//! assert_eq!(registry.resolve(&short), Some(id));
//! ```

#![warn(missing_docs)]

pub mod cell_id;
pub mod registry;
pub mod tag;

// Re-exports
pub use cell_id::{CellId, InternalId};
pub use registry::{IdentError, IdentifierRegistry, DEFAULT_SHORT_LEN};
pub use tag::{is_identifier, Tag, TagError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Reference codec for dataflow notebook cells
//!
//! Cell source may bind an occurrence of a variable to one specific producing
//! cell by appending a reference token: `name$ref`, where `ref` is a cell's
//! truncated identifier or its tag.
//!
//! # Overview
//!
//! - [`parse_references`]: every identifier occurrence, with its explicit
//!   reference if it carries one
//! - [`render_reference`]: `name` or `name$ref`
//! - [`rewrite`]: offset-keyed suffix substitution; text outside the touched
//!   suffixes is left byte-identical
//!
//! # Example
//!
//! ```rust
//! use dfnb_codec::{parse_references, rewrite, Substitution};
//!
//! let source = "b=a$1f2e3d4c+9";
//! let occurrences = parse_references(source);
//! let a = &occurrences[1];
//! assert_eq!(a.reference_text(), Some("1f2e3d4c"));
//!
//! let tagged = rewrite(source, &[Substitution::new(a.position(), "a", Some("testTag"))]).unwrap();
//! assert_eq!(tagged, "b=a$testTag+9");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod reference;
pub mod rewrite;
mod scanner;

// Re-exports
pub use error::CodecError;
pub use reference::{
    parse_references, render_reference, resolve_reference, strip_references, ExplicitRef,
    Occurrence,
};
pub use rewrite::{rewrite, Substitution};

/// Reserved reference separator; never adjacent to an identifier in cell code
pub const SEPARATOR: char = '$';

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for codec operations
    pub use crate::{
        parse_references, render_reference, rewrite, CodecError, ExplicitRef, Occurrence,
        Substitution, SEPARATOR,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

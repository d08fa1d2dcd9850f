//! Cell dependency graph
//!
//! [`DependencyGraph`] holds one [`DependencyNode`] per executed cell and the
//! producer → consumer edges between them. Edges are derived data: they are
//! replaced wholesale from each cell's latest successful execution, so the
//! edge set converges regardless of execution order.
//!
//! # Example
//!
//! ```rust
//! use dfnb_graph::{DependencyGraph, DependencyNode};
//! use dfnb_ident::CellId;
//!
//! let mut graph = DependencyGraph::new();
//! let (producer, consumer) = (CellId::new(), CellId::new());
//! graph.upsert_node(DependencyNode::new(producer).with_exports(["a"]));
//! graph.upsert_node(DependencyNode::new(consumer).with_consumes(["a"]));
//! graph.add_edge(producer, consumer, "a").unwrap();
//!
//! assert_eq!(graph.downstream_of(producer).unwrap(), vec![consumer]);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod node;
pub mod store;

// Re-exports
pub use error::GraphError;
pub use node::{DependencyNode, Edge};
pub use store::DependencyGraph;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

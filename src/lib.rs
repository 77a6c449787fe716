//! Layered, dot-addressable configuration trees.
//!
//! `figtree` keeps configuration in two interchangeable shapes. [`Tree`] is
//! a nested container addressed by dotted paths (`server.http.port`), with
//! recursive merge semantics and a filtered export that keeps private fields
//! out of rendered documents. [`FlatStore`] keeps the same dotted keys flat
//! in a pluggable [`Backend`] (in-memory, or persistent via [`SledBackend`])
//! and hands out branch views that share the backing store.
//!
//! On top of either shape, [`LayerStack`] stacks sources in priority order:
//! reads take the first layer that knows a key, writes always land in the
//! top layer. The [`Loader`] fills layers from mappings, document text,
//! files, directory trees, or registered resource bundles, auto-detecting
//! which is which.
//!
//! ```
//! use figtree::{FlatStore, LayerStack, Loader};
//!
//! let mut defaults = FlatStore::in_memory();
//! Loader::new()
//!     .load(&mut defaults, "server:\n  host: localhost\n  port: 8080\n")
//!     .unwrap();
//!
//! let mut stack = LayerStack::new();
//! stack.push(Box::new(FlatStore::in_memory())); // user overrides
//! stack.push(Box::new(defaults));
//!
//! stack.set("server.port", 9000).unwrap();
//! assert_eq!(stack.get("server.port").unwrap(), 9000.into());
//! assert_eq!(stack.get("server.host").unwrap(), "localhost".into());
//! ```

pub mod error;

mod backend;
mod db;
mod flat;
mod loader;
mod merge;
mod path;
mod persist;
mod stack;
mod tree;
mod value;

pub use backend::{Backend, MemoryBackend};
pub use db::SledBackend;
pub use error::FigtreeError;
pub use flat::{FlatStore, MissingKey};
pub use loader::{
    DirCache, Loader, PackageRegistry, ResourceBundle, Source, StaticBundle, load_file,
    load_mapping, load_text,
};
pub use merge::{MergePolicy, merge_tree, merge_value};
pub use persist::{load_into, load_new, parse_document, render_document, save};
pub use stack::{Layer, LayerStack, TreeLayer};
pub use tree::{PRIVATE_PREFIX, Tree};
pub use value::Value;

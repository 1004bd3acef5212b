//! weft-core: templating and data-recovery core library.
//!
//! Weft turns a caller-owned state tree (a `serde_json::Value`) into prompt
//! text for a generative text service and turns the service's free-text
//! reply back into structured values written at caller-specified paths.
//! This crate holds the pure, synchronous pieces of that pipeline:
//!
//! - [`Resolver`] -- expands `{...}` reference expressions in template
//!   text, including nested references and computed array indices
//! - [`Recovery`] -- extracts a well-formed value from noisy, possibly
//!   malformed output via a layered strategy
//! - [`tokenize`] / [`Token`] -- turns a path expression into key/index
//!   tokens, resolving embedded references first
//! - [`write`] -- stores a value into the tree along a token path,
//!   creating missing containers on the way
//!
//! Nothing here performs I/O; external documents arrive through the
//! [`DocumentLoader`] trait and the generation service lives entirely in
//! the `weft-cycle` crate. All components operate on one tree at a time
//! and never retain references across calls.

pub mod path;
pub mod recover;
pub mod resolve;
pub mod store;

// ── Convenience re-exports: key types ────────────────────────────────

pub use path::{PathError, Token};
pub use recover::{Recovery, RecoveryResult};
pub use resolve::{DocumentLoader, Resolver, StaticDocumentLoader};
pub use store::{StructuralConflict, WriteError};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use path::{lookup, parse_tokens, tokenize};
pub use resolve::stringify;
pub use store::{write, write_path};

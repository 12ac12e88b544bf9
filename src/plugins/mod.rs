//! Internal "plugin" modules (crate-local sub-systems).
//!
//! These are regular Rust modules with a stable boundary so the session and
//! the CLI can depend on them without tight coupling.

pub mod store;

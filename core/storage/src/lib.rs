//! Filesystem access for docsync.
//!
//! This module provides the local and remote document roots the sync engine
//! reads from and writes to, along with the atomic write and locking
//! primitives used for the registry file.
//!
//! # Design Principles
//! - Flat roots: only files directly inside a root are considered
//! - Atomic replacement: content lands via write-to-temp then rename
//! - Missing files are values, not errors, when reading timestamps

pub mod atomic;
pub mod local;
pub mod lock;

pub use atomic::replace_file;
pub use local::DocumentRoot;
pub use lock::RootLock;

//! The slot's lock, swapped for loom's under the `loom_test` feature.

#[cfg(feature = "loom_test")]
pub(crate) use loom::sync::RwLock;

#[cfg(not(feature = "loom_test"))]
pub(crate) use std::sync::RwLock;

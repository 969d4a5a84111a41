// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling watch binding patterns.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing bursts of changes per binding.
//! - (Optionally) content hashing so a binding does not fire when its
//!   watched files haven't actually changed.
//!
//! It does **not** run anything; it only turns filesystem changes into
//! `RuntimeEvent::BindingTriggered` events.

pub mod cache;
pub mod debounce;
pub mod event_handler;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use cache::{ContentCheck, ContentGate};
pub use debounce::spawn_debouncer;
pub use hash::{FileHashStore, HASH_FILE_PATH, HashStore, MemoryHashStore, hash_store_for};
pub use patterns::{WatchBinding, build_bindings_from_config};
pub use watcher::{WatcherHandle, spawn_watcher};

// src/fs/mod.rs

pub mod atomic;

pub use atomic::{write_atomic, write_atomic_guarded};

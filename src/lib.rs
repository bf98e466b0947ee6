//! Portable utility layer for networked servers and clients
//!
//! - [`xmalloc`]: allocation that reports the call site on failure
//! - [`vector`]: owning and borrowing string sequences with split/join
//! - [`message`]: severity-routed diagnostics with pluggable sinks
//! - [`net`]: dual-stack binding, connecting and address helpers
//! - [`fdflag`] and [`xwrite`]: descriptor flags and complete writes

pub mod fdflag;
pub mod message;
pub mod net;
pub mod vector;
pub mod xmalloc;
pub mod xwrite;

pub use message::{Handler, Record, Reporter, Severity};
pub use vector::{CVector, Vector};
pub use xmalloc::{AllocError, AllocFailure, Allocator, DieOnFailure, FailureHandler, Recover};

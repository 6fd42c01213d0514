//! `modules` crate — the `ModuleHandler` contract, the capability registry
//! and the built-in module implementations.
//!
//! Every step implementation — built-in stand-in and real scanner alike —
//! must implement [`ModuleHandler`]. The engine crate dispatches execution
//! through this trait object, looked up in a [`ModuleRegistry`].

pub mod builtin;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use error::ModuleError;
pub use registry::ModuleRegistry;
pub use traits::{ModuleHandler, Record, RunOptions};

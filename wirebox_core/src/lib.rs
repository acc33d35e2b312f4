//! Core types shared by the `wirebox` crates.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[doc(hidden)]
#[macro_use]
pub mod macros;

pub mod erased;
pub mod error;
pub mod key;

pub use erased::Erased;
pub use error::{Error, Result};
pub use key::Key;

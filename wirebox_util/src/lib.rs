//! Convenience components built on top of `wirebox`.
#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod combine;
pub mod conditional;
pub mod value;
pub mod with_circuit;

pub use combine::Combine;
pub use conditional::{Branch, Conditional, ConditionalAsync, Select, SelectAsync};
pub use value::{AsyncDynamic, AsyncValue, Dynamic, Produce, ProduceAsync, Value};
pub use with_circuit::{CircuitSource, WithCircuit};

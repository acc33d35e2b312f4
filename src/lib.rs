//! Type-keyed dependency injection with lazy, shared, optionally asynchronous construction.
//!
//! Components are wired once, in a process-wide [`Registry`], and resolved from any number of
//! [`Circuit`]s. Each circuit builds a component at most once and hands out the shared instance
//! on every later tap.
//!
//! ```
//! use std::sync::Arc;
//!
//! use wirebox::{Circuit, Construct, component, set_requires, set_standalone};
//!
//! #[derive(Default)]
//! struct Config;
//!
//! struct Database {
//!     config: Arc<Config>,
//! }
//!
//! component!(Config, Database);
//!
//! impl Construct<(Config,)> for Database {
//!     fn construct((config,): (Arc<Config>,)) -> Self {
//!         Self { config }
//!     }
//! }
//!
//! set_standalone::<Config>();
//! set_requires::<Database, (Config,)>();
//!
//! let circuit = Circuit::new();
//! let database = circuit.tap::<Database>().unwrap();
//! assert!(Arc::ptr_eq(&database.config, &circuit.tap::<Config>().unwrap()));
//! ```
#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
pub(crate) mod macros;

pub mod circuit;
pub mod component;
pub mod context;
pub mod definition;
pub mod dependencies;
pub mod provider;

pub use wirebox_core::{Erased, Error, Key, Result};

pub use circuit::{Circuit, CircuitBuilder, DEFAULT_MAX_DEPTH, tap, tap_async};
pub use component::Component;
pub use context::{Context, current_circuit, current_context, link};
pub use definition::{
    Definition, Registry, is_wired, set_preconstruct, set_preconstruct_async, set_preloads,
    set_requires, set_setup, set_setup_factory, set_singleton, set_standalone, unwire,
};
pub use dependencies::{Construct, Dependencies};
pub use provider::{BoxFuture, Providable, Provided, Provider};

//! Named callable handler registry (spec.md §4.F, replacing the teacher's
//! `lgn-provers` "prover registered by task type" slot with a registry
//! resolved by a short string key, per spec.md REDESIGN FLAGS).

pub mod domain;
mod registry;

pub use registry::CallableHandler;
pub use registry::HandlerError;
pub use registry::HandlerRegistry;

pub mod examples;

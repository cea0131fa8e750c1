//! Four-way signalized intersection simulation
//!
//! The [`simulation`] module holds the synchronous world model. [`engine`]
//! wraps it in a tokio-driven clock with a serialized command surface and a
//! snapshot subscription.

pub mod config;
pub mod engine;
pub mod error;
pub mod simulation;
pub mod sink;

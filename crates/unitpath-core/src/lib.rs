//! unitpath-core: answer evaluation, progression and unlock engine.
//!
//! This crate defines the data model, the collaborator traits and the
//! policy logic that the rest of unitpath builds on:
//!
//! - [`evaluator`] grades answers per exercise kind,
//! - [`attempt`] applies the one-retry attempt policy,
//! - [`progress`] folds durable answers into unit progress,
//! - [`gate`] decides which units are accessible,
//! - [`placement`] plans and scores placement tests,
//! - [`engine`] wires them to a [`traits::ContentSource`] and a
//!   [`traits::ProgressStore`].

pub mod attempt;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod model;
pub mod parser;
pub mod placement;
pub mod policy;
pub mod progress;
pub mod session;
pub mod traits;

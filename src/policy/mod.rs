//! Routing policy: task metadata and rules in, one decision with a
//! machine-checkable reason code out.
//!
//! The evaluator is a pure function so every decision is reproducible
//! from logged inputs; fixture regression keeps deployed rule files
//! honest against the engine.

pub mod evaluator;
pub mod fixtures;

pub use evaluator::{evaluate, PolicyDecision, PolicyRuleSet, Reason, Route, TaskRequest};

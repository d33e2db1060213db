//! slmgate: routing gatekeeper and conformance probes for local LLM runtimes.
//!
//! Two subsystems back every decision:
//! - the **routing policy evaluator** decides whether a coding task may run
//!   on a locally hosted runtime or must be routed to a cloud model, from
//!   task metadata, a declarative rule set, and a live VRAM signal;
//! - the **probe harness** verifies that a candidate runtime is actually
//!   usable before that decision is trusted: tool-call conformant,
//!   responsive, and not VRAM-starved.

pub mod cli;
pub mod config;
pub mod policy;
pub mod probe;
pub mod vram;

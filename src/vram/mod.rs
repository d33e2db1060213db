//! GPU memory-pressure signals.
//!
//! The sampler shells out to an external GPU query tool and reduces
//! per-GPU rows to a worst-case signal the routing policy consumes; the
//! guard refuses to share the GPU with a conflicting runtime. Neither
//! touches driver APIs directly.

pub mod guard;
pub mod sampler;

pub use sampler::{GpuSample, VramSnapshot};

use serde::{Deserialize, Serialize};

/// Normalized GPU memory-pressure signal.
///
/// Field absence means "not observed" and is distinct from zero; the
/// policy evaluator treats the two differently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VramSignal {
    /// Worst-case free VRAM across GPUs, in MiB.
    pub free_mib: Option<i64>,
    /// Worst-case free VRAM ratio across GPUs, in [0, 1].
    pub free_ratio: Option<f64>,
}

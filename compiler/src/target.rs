// target.rs — Build targets
//
// Identifies the hardware family a strategy implementation is selected for,
// and the few machine parameters the built-in schedules consult.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::ElementType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86,
    Arm,
    #[value(name = "nvgpu")]
    NvGpu,
}

impl Arch {
    pub fn name(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::Arm => "arm",
            Arch::NvGpu => "nvgpu",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target '{0}' (expected x86, arm or nvgpu)")]
pub struct UnknownTarget(pub String);

/// A concrete build target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub arch: Arch,
    /// SIMD register width in bits; 0 when the target has no host vector unit.
    pub vector_bits: u32,
    /// Upper bound on threads per block; 0 on CPU targets.
    pub max_threads_per_block: u32,
}

impl Target {
    /// x86-64 with AVX2.
    pub fn x86() -> Self {
        Target {
            arch: Arch::X86,
            vector_bits: 256,
            max_threads_per_block: 0,
        }
    }

    /// AArch64 with NEON.
    pub fn arm() -> Self {
        Target {
            arch: Arch::Arm,
            vector_bits: 128,
            max_threads_per_block: 0,
        }
    }

    pub fn nvgpu() -> Self {
        Target {
            arch: Arch::NvGpu,
            vector_bits: 0,
            max_threads_per_block: 1024,
        }
    }

    pub fn for_arch(arch: Arch) -> Self {
        match arch {
            Arch::X86 => Target::x86(),
            Arch::Arm => Target::arm(),
            Arch::NvGpu => Target::nvgpu(),
        }
    }

    pub fn is_gpu(&self) -> bool {
        self.arch == Arch::NvGpu
    }

    /// SIMD lanes for `dtype`; 1 when the target cannot vectorize it.
    pub fn vector_lanes(&self, dtype: ElementType) -> u32 {
        (self.vector_bits / dtype.bits()).max(1)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arch.name())
    }
}

impl FromStr for Target {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" | "x86_64" => Ok(Target::x86()),
            "arm" | "aarch64" => Ok(Target::arm()),
            "nvgpu" | "cuda" => Ok(Target::nvgpu()),
            _ => Err(UnknownTarget(s.to_string())),
        }
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Resource limits of a single stage
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Limits {
    /// wall clock cap
    pub timeout_millis: u64,
    /// resident memory of the whole process tree
    pub memory_bytes: u64,
    /// cpu time of the whole process tree
    pub cpu_millis: u64,
    /// bytes kept from each of stdout and stderr
    pub max_output_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout_millis: 5000,
            memory_bytes: 256 * 1024 * 1024,
            cpu_millis: 3000,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl Limits {
    /// upper bound applied to caller supplied overrides
    pub fn ceiling() -> Self {
        Self {
            timeout_millis: 60 * 1000,
            memory_bytes: 2 * 1024 * 1024 * 1024,
            cpu_millis: 30 * 1000,
            max_output_bytes: 16 * 1024 * 1024,
        }
    }
    pub fn walltime(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
    pub fn cpu(&self) -> Duration {
        Duration::from_millis(self.cpu_millis)
    }
    /// replace every field that `overrides` sets
    pub fn with(mut self, overrides: &LimitOverrides) -> Self {
        macro_rules! try_fill {
            ($($f:ident),+) => {
                $(
                    if let Some(x) = overrides.$f {
                        self.$f = x;
                    }
                )+
            };
        }
        try_fill!(timeout_millis, memory_bytes, cpu_millis, max_output_bytes);
        self
    }
    pub fn clamp(self, ceiling: &Limits) -> Self {
        Self {
            timeout_millis: self.timeout_millis.min(ceiling.timeout_millis),
            memory_bytes: self.memory_bytes.min(ceiling.memory_bytes),
            cpu_millis: self.cpu_millis.min(ceiling.cpu_millis),
            max_output_bytes: self.max_output_bytes.min(ceiling.max_output_bytes),
        }
    }
}

/// Partial [`Limits`], layered over defaults with [`Limits::with`]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LimitOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<u64>,
}

impl LimitOverrides {
    pub fn timeout_millis(mut self, value: u64) -> Self {
        self.timeout_millis = Some(value);
        self
    }
    pub fn memory_bytes(mut self, value: u64) -> Self {
        self.memory_bytes = Some(value);
        self
    }
    pub fn cpu_millis(mut self, value: u64) -> Self {
        self.cpu_millis = Some(value);
        self
    }
    pub fn max_output_bytes(mut self, value: u64) -> Self {
        self.max_output_bytes = Some(value);
        self
    }
}

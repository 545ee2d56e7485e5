//! Provide ability to limit resource such as memory limit, cpu limit, walltime limit and output limit
mod hier;
mod mem_cpu;
mod output;
mod procfs;
mod stat;
mod walltime;

use std::{fmt::Display, time::Duration};

pub use hier::Accounting;
pub use output::Capture;
pub use stat::*;

use super::Error;
type Result<T> = std::result::Result<T, Error>;

pub trait Monitor {
    type Resource;
    /// wait until the resource is exhausted
    ///
    /// must be cancellation safe, callers poll it inside `select!` loops
    async fn wait_exhaust(&mut self) -> MonitorKind;
    /// check exhaustion once, without waiting
    fn poll_exhaust(&mut self) -> Option<MonitorKind>;
    async fn stat(self) -> Self::Resource;
}

/// Reason the monitor killed the process
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MonitorKind {
    Memory,
    Walltime,
    Cpu,
}

impl Display for MonitorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Cpu => "cpu time",
                Self::Walltime => "wall time",
                Self::Memory => "memory",
            }
        )
    }
}

/// composite monitor
pub struct StatMonitor {
    mem_cpu: mem_cpu::Monitor,
    walltime: walltime::Monitor,
}

impl Monitor for StatMonitor {
    type Resource = Stat;

    async fn wait_exhaust(&mut self) -> MonitorKind {
        tokio::select! {
            x = self.mem_cpu.wait_exhaust() => x,
            x = self.walltime.wait_exhaust() => x,
        }
    }

    fn poll_exhaust(&mut self) -> Option<MonitorKind> {
        macro_rules! check_exhaust {
            ($f:ident) => {
                if let Some(reason) = self.$f.poll_exhaust() {
                    return Some(reason);
                }
            };
        }

        check_exhaust!(mem_cpu);
        check_exhaust!(walltime);

        None
    }

    async fn stat(self) -> Self::Resource {
        let (memory, cpu) = self.mem_cpu.stat().await;
        let walltime = self.walltime.stat().await;

        Stat {
            memory,
            cpu,
            walltime,
        }
    }
}

impl StatMonitor {
    pub fn builder() -> StatMonitorBuilder {
        StatMonitorBuilder::default()
    }
    /// start accounting for the freshly spawned process `pid`
    pub fn attach(&mut self, pid: u32) -> Result<()> {
        self.walltime.start();
        self.mem_cpu.attach(pid)
    }
    /// kill everything the accounting backend knows about
    pub fn kill(&self) {
        self.mem_cpu.kill();
    }
    /// mark the process tree as reaped
    pub fn disarm(&mut self) {
        self.mem_cpu.disarm();
    }
    /// path of the control group relative to the hierarchy root, if any
    pub fn get_cg_path(&self) -> Option<&str> {
        self.mem_cpu.get_cg_path()
    }
}

#[derive(Default)]
pub struct StatMonitorBuilder {
    mem_cpu: Option<mem_cpu::Monitor>,
    walltime: Option<walltime::Monitor>,
}

impl StatMonitorBuilder {
    pub fn mem_cpu(
        mut self,
        accounting: Accounting,
        cg_name: &str,
        memory: u64,
        cpu: Duration,
    ) -> Result<Self> {
        self.mem_cpu = Some(mem_cpu::Monitor::new(accounting, cg_name, memory, cpu)?);
        Ok(self)
    }
    pub fn walltime(mut self, walltime: Duration) -> Self {
        self.walltime = Some(walltime::Monitor::new(walltime));
        self
    }
    pub fn build(self) -> StatMonitor {
        StatMonitor {
            mem_cpu: self
                .mem_cpu
                .expect("mem_cpu is required to be set, use mem_cpu method to set it"),
            walltime: self
                .walltime
                .expect("walltime is required to be set, use walltime method to set it"),
        }
    }
}

use super::{procfs::ProcessTree, stat::*, *};
use cgroups_rs::{
    cgroup_builder::CgroupBuilder, cpu::CpuController, hierarchies, memory::MemController, Cgroup,
    CgroupPid,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::{task::JoinHandle, time::*};

/// maximum allow time deviation for cpu monitor
pub(super) const MONITOR_ACCURACY: Duration = Duration::from_millis(80);

enum Probe {
    Procfs(ProcessTree),
    Cgroup(Arc<Cgroup>),
}

struct Sample {
    memory: Memory,
    cpu: Cpu,
    oom: bool,
}

impl Probe {
    fn sample(&self) -> Sample {
        match self {
            Probe::Procfs(tree) => {
                let (memory, cpu) = tree.usage();
                Sample {
                    memory,
                    cpu,
                    oom: false,
                }
            }
            Probe::Cgroup(cgroup) => {
                let mut sample = Sample {
                    memory: Memory::default(),
                    cpu: Cpu::default(),
                    oom: false,
                };
                if let Some(controller) = cgroup.controller_of::<MemController>() {
                    let stat = controller.memory_stat();
                    sample.memory = Memory {
                        current: stat.usage_in_bytes,
                        peak: stat.max_usage_in_bytes,
                    };
                    sample.oom = stat.oom_control.oom_kill != 0;
                }
                if let Some(controller) = cgroup.controller_of::<CpuController>() {
                    sample.cpu = Cpu::from_raw(&controller.cpu().stat);
                }
                sample
            }
        }
    }
}

/// highest usage observed by the polling task
#[derive(Default)]
struct Usage {
    memory: AtomicU64,
    cpu: AtomicU64,
}

impl Usage {
    fn record(&self, sample: &Sample) {
        self.memory
            .fetch_max(sample.memory.peak.max(sample.memory.current), Ordering::AcqRel);
        self.cpu.fetch_max(sample.cpu.total, Ordering::AcqRel);
    }
}

async fn monitor(probe: Arc<Probe>, usage: Arc<Usage>, memory: u64, cpu: Duration) -> MonitorKind {
    loop {
        sleep(MONITOR_ACCURACY / 2).await;

        let sample = probe.sample();
        usage.record(&sample);

        if sample.oom || sample.memory.current > memory {
            log::trace!("memory exhausted: {} bytes", sample.memory.current);
            return MonitorKind::Memory;
        }
        if Cpu::out_of_resources(cpu, &sample.cpu) {
            log::trace!("cpu exhausted: {} us", sample.cpu.total);
            return MonitorKind::Cpu;
        }
    }
}

/// monitor resource of cpu and memory
pub struct Monitor {
    cgroup: Option<Arc<Cgroup>>,
    probe: Option<Arc<Probe>>,
    memory: u64,
    cpu: Duration,
    usage: Arc<Usage>,
    monitor_task: Option<JoinHandle<MonitorKind>>,
    reason: Option<MonitorKind>,
    /// whether process tree may still be alive
    armed: bool,
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(monitor_task) = &self.monitor_task {
            monitor_task.abort();
        }
        if self.armed {
            self.kill();
        }
        if let Some(cgroup) = self.cgroup.take() {
            cgroup.kill().ok();
            poll_delete(cgroup);
        }
    }
}

/// delete the control group, retrying in background while it is still busy
fn poll_delete(cgroup: Arc<Cgroup>) {
    if cgroup.delete().is_ok() {
        return;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        log::warn!("cgroup {} is left behind", cgroup.path());
        return;
    };
    handle.spawn(async move {
        for _ in 0..50 {
            sleep(Duration::from_millis(10)).await;
            if cgroup.delete().is_ok() {
                return;
            }
            log::debug!("cgroup delete failed, retrying...");
        }
        log::warn!("cgroup {} cannot be deleted", cgroup.path());
    });
}

impl Monitor {
    /// create a new limiter, the control group (if any) exists from here on
    pub fn new(accounting: Accounting, cg_name: &str, memory: u64, cpu: Duration) -> Result<Self> {
        let cgroup = match accounting.resolve() {
            Accounting::Cgroup => Some(Arc::new(
                CgroupBuilder::new(cg_name)
                    .memory()
                    .memory_hard_limit(memory as i64)
                    .memory_swap_limit(0)
                    .done()
                    .build(hierarchies::auto())?,
            )),
            _ => None,
        };

        Ok(Self {
            cgroup,
            probe: None,
            memory,
            cpu,
            usage: Arc::default(),
            monitor_task: None,
            reason: None,
            armed: false,
        })
    }
    pub fn attach(&mut self, pid: u32) -> Result<()> {
        let probe = match &self.cgroup {
            Some(cgroup) => {
                cgroup.add_task_by_tgid(CgroupPid::from(pid as u64))?;
                Probe::Cgroup(cgroup.clone())
            }
            None => Probe::Procfs(ProcessTree::new(pid)),
        };
        let probe = Arc::new(probe);
        self.monitor_task = Some(tokio::spawn(monitor(
            probe.clone(),
            self.usage.clone(),
            self.memory,
            self.cpu,
        )));
        self.probe = Some(probe);
        self.armed = true;
        Ok(())
    }
    /// the root process has been reaped and the tree killed, skip the kill on drop
    ///
    /// a reaped pid may be reused, so killing the group again is unsafe
    pub fn disarm(&mut self) {
        self.armed = false;
    }
    pub fn kill(&self) {
        match self.probe.as_deref() {
            Some(Probe::Procfs(tree)) => tree.kill(),
            Some(Probe::Cgroup(cgroup)) => {
                if let Err(err) = cgroup.kill() {
                    log::warn!("cgroup.kill failed: {}", err);
                }
            }
            None => {}
        }
    }
    pub fn get_cg_path(&self) -> Option<&str> {
        self.cgroup.as_ref().map(|x| x.path())
    }
}

impl super::Monitor for Monitor {
    type Resource = (Memory, Cpu);
    /// wait for resource to exhaust
    ///
    /// Actively limit(notify) cpu resource is achieved by polling,
    /// the delay is only guaranteed to below limitation provided + [`MONITOR_ACCURACY`].
    ///
    /// This method is cancellation safe
    async fn wait_exhaust(&mut self) -> MonitorKind {
        if let Some(reason) = self.reason {
            return reason;
        }
        let Some(task) = self.monitor_task.as_mut() else {
            return std::future::pending().await;
        };
        match task.await {
            Ok(reason) => {
                self.monitor_task = None;
                self.reason = Some(reason);
                reason
            }
            Err(err) => {
                log::warn!("monitor task stopped: {}", err);
                self.monitor_task = None;
                std::future::pending().await
            }
        }
    }
    fn poll_exhaust(&mut self) -> Option<MonitorKind> {
        if self.reason.is_some() {
            return self.reason;
        }
        if let Some(Probe::Cgroup(_)) = self.probe.as_deref() {
            let sample = self.probe.as_ref()?.sample();
            self.usage.record(&sample);
            if sample.oom {
                return Some(MonitorKind::Memory);
            }
        }
        if self.usage.memory.load(Ordering::Acquire) > self.memory {
            return Some(MonitorKind::Memory);
        }
        let cpu = Cpu {
            total: self.usage.cpu.load(Ordering::Acquire),
            ..Default::default()
        };
        if Cpu::out_of_resources(self.cpu, &cpu) {
            return Some(MonitorKind::Cpu);
        }
        None
    }
    /// get the final resource usage
    ///
    /// the values are sampled, so they lag the real usage by up to [`MONITOR_ACCURACY`]
    async fn stat(self) -> Self::Resource {
        if let Some(probe) = &self.probe {
            if let Probe::Cgroup(_) = probe.as_ref() {
                self.usage.record(&probe.sample());
            }
        }
        let peak = self.usage.memory.load(Ordering::Acquire);
        (
            Memory {
                current: 0,
                peak,
            },
            Cpu {
                total: self.usage.cpu.load(Ordering::Acquire),
                ..Default::default()
            },
        )
    }
}

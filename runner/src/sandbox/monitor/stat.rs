use std::time::Duration;

/// resource usage of a finished stage
#[derive(Debug, Clone, Default)]
pub struct Stat {
    pub memory: Memory,
    pub cpu: Cpu,
    pub walltime: Duration,
}

/// memory usage in bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    pub current: u64,
    pub peak: u64,
}

/// cpu usage in microseconds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cpu {
    pub kernel: u64,
    pub user: u64,
    pub total: u64,
}

impl Cpu {
    pub(super) fn out_of_resources(limit: Duration, stat: &Self) -> bool {
        u128::from(stat.total) > limit.as_micros()
    }
    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.total)
    }
    /// parse `cpu.stat` of cgroup v2
    pub(super) fn from_raw(raw: &str) -> Self {
        let mut cpu = Cpu::default();

        for (key, value) in raw.split('\n').filter_map(|stmt| stmt.split_once(' ')) {
            let Ok(value) = value.trim().parse() else {
                continue;
            };
            match key {
                "usage_usec" => cpu.total = value,
                "user_usec" => cpu.user = value,
                "system_usec" => cpu.kernel = value,
                _ => {}
            };
        }

        cpu
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    /// Test the [`Cpu::from_raw`] function
    fn cpu_from_raw() {
        let raw = "usage_usec 158972260000\nuser_usec 115998852000\nsystem_usec 42973408000\ncore_sched.force_idle_usec 0\nnr_periods 0\nnr_throttled 0\nthrottled_usec 0\nnr_bursts 0\nburst_usec 0\n";
        let cpu = Cpu::from_raw(raw);
        assert_eq!(cpu.kernel, 42973408000);
        assert_eq!(cpu.user, 115998852000);
        assert_eq!(cpu.total, 158972260000);
    }
    #[test]
    fn cpu_limit_is_exclusive() {
        let cpu = Cpu {
            total: 1000,
            ..Default::default()
        };
        assert!(!Cpu::out_of_resources(Duration::from_millis(1), &cpu));
        assert!(Cpu::out_of_resources(Duration::from_micros(999), &cpu));
    }
}

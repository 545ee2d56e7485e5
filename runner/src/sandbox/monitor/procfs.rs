use std::{collections::BTreeMap, fs};

use rustix::process::{kill_process, kill_process_group, Pid, Signal};

use super::stat::{Cpu, Memory};

/// the fields of `/proc/<pid>/stat` needed for accounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: i32,
    pub ppid: i32,
    pub pgrp: i32,
    /// utime + cutime
    pub user_ticks: u64,
    /// stime + cstime
    pub kernel_ticks: u64,
    pub rss_pages: u64,
}

impl ProcStat {
    pub fn from_raw(raw: &str) -> Option<Self> {
        // comm may contain spaces and parentheses, only the last `)` is reliable
        let (head, tail) = raw.rsplit_once(')')?;
        let pid = head.split_once('(')?.0.trim().parse().ok()?;
        let fields: Vec<&str> = tail.split_whitespace().collect();
        // numbering follows proc(5), the first field after comm is number 3
        let field = |n: usize| -> Option<u64> { fields.get(n - 3)?.parse().ok() };

        Some(Self {
            pid,
            ppid: field(4)? as i32,
            pgrp: field(5)? as i32,
            user_ticks: field(14)? + field(16)?,
            kernel_ticks: field(15)? + field(17)?,
            rss_pages: field(24)?,
        })
    }
    fn read(pid: &str) -> Option<Self> {
        let raw = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        Self::from_raw(&raw)
    }
}

/// Processes spawned by one stage: the process group led by `root`
/// plus every descendant of `root`, including those that left the group
pub struct ProcessTree {
    root: i32,
}

impl ProcessTree {
    pub fn new(root: u32) -> Self {
        Self { root: root as i32 }
    }
    pub fn members(&self) -> Vec<ProcStat> {
        let Ok(dir) = fs::read_dir("/proc") else {
            log::warn!("/proc is not readable, process tree accounting is unavailable");
            return Vec::new();
        };
        let all: BTreeMap<i32, ProcStat> = dir
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                if !name.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                ProcStat::read(name)
            })
            .map(|stat| (stat.pid, stat))
            .collect();

        all.values()
            .filter(|stat| stat.pgrp == self.root || self.descends(stat.pid, &all))
            .cloned()
            .collect()
    }
    fn descends(&self, mut pid: i32, all: &BTreeMap<i32, ProcStat>) -> bool {
        // bounded walk, a pid cycle is impossible but a racing snapshot may be inconsistent
        for _ in 0..128 {
            if pid == self.root {
                return true;
            }
            match all.get(&pid) {
                Some(stat) if stat.ppid > 0 => pid = stat.ppid,
                _ => return false,
            }
        }
        false
    }
    pub fn usage(&self) -> (Memory, Cpu) {
        let members = self.members();
        usage_of(&members)
    }
    /// SIGKILL the process group and every descendant still alive
    pub fn kill(&self) {
        if let Some(pgid) = Pid::from_raw(self.root) {
            kill_process_group(pgid, Signal::Kill).ok();
        }
        for stat in self.members() {
            if let Some(pid) = Pid::from_raw(stat.pid) {
                kill_process(pid, Signal::Kill).ok();
            }
        }
    }
}

fn usage_of(members: &[ProcStat]) -> (Memory, Cpu) {
    let page = rustix::param::page_size() as u64;
    let hz = rustix::param::clock_ticks_per_second().max(1);
    let to_us = |ticks: u64| ticks.saturating_mul(1_000_000) / hz;

    let rss: u64 = members.iter().map(|x| x.rss_pages * page).sum();
    let user: u64 = members.iter().map(|x| x.user_ticks).sum();
    let kernel: u64 = members.iter().map(|x| x.kernel_ticks).sum();

    (
        Memory {
            current: rss,
            peak: rss,
        },
        Cpu {
            kernel: to_us(kernel),
            user: to_us(user),
            total: to_us(user + kernel),
        },
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_stat_with_odd_comm() {
        let raw = "4242 (a) b (c)) S 4241 4242 4242 0 -1 4194304 120 0 0 0 7 3 2 1 20 0 1 0 123456 4321000 345 18446744073709551615";
        let stat = ProcStat::from_raw(raw).unwrap();
        assert_eq!(stat.pid, 4242);
        assert_eq!(stat.ppid, 4241);
        assert_eq!(stat.pgrp, 4242);
        assert_eq!(stat.user_ticks, 9);
        assert_eq!(stat.kernel_ticks, 4);
        assert_eq!(stat.rss_pages, 345);
    }
    #[test]
    fn reject_truncated_stat() {
        assert!(ProcStat::from_raw("12 (sh) S 1 12").is_none());
        assert!(ProcStat::from_raw("garbage").is_none());
    }
    #[test]
    fn current_process_is_visible() {
        let tree = ProcessTree::new(std::process::id());
        let members = tree.members();
        assert!(members.iter().any(|x| x.pid == std::process::id() as i32));
        let (memory, _) = usage_of(&members);
        assert!(memory.current > 0);
    }
}

use super::super::monitor::{Capture, MonitorKind, Stat};

/// Raw outcome of a sandboxed process
pub struct Corpse {
    /// exit code, if the process exited by itself
    pub(super) code: Option<i32>,
    /// terminating signal
    pub(super) signal: Option<i32>,
    /// exit reason reported by monitor
    pub(super) reason: Option<MonitorKind>,
    pub(super) cancelled: bool,
    pub(super) stdout: Capture,
    pub(super) stderr: Capture,
    pub(super) stat: Stat,
}

impl Corpse {
    /// get the exit status of the process
    ///
    /// if the process is killed by resource limit mechanism, return the reason
    pub fn status(&self) -> Result<Option<i32>, MonitorKind> {
        match self.reason {
            Some(reason) => Err(reason),
            None => Ok(self.code),
        }
    }
    pub fn code(&self) -> Option<i32> {
        self.code
    }
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
    /// the process tree was killed because the caller cancelled the run
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }
    /// get the stdout of the process
    ///
    /// If the process is killed by resource limit mechanism,
    /// the stdout may be incomplete(but ordered)
    pub fn stdout(&self) -> &[u8] {
        self.stdout.as_bytes()
    }
    pub fn stderr(&self) -> &[u8] {
        self.stderr.as_bytes()
    }
    /// either stream exceeded the output limit
    pub fn truncated(&self) -> bool {
        self.stdout.truncated() || self.stderr.truncated()
    }
    /// get the resource usage of the process
    pub fn stat(&self) -> &Stat {
        &self.stat
    }
}

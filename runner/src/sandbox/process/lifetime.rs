use std::{
    ffi::CString,
    io,
    os::unix::{ffi::OsStrExt, process::ExitStatusExt},
    path::Path,
    pin::pin,
    process::Stdio,
};

use tokio::{
    io::AsyncWriteExt,
    process::{Child, Command},
    time,
};
use tokio_util::sync::CancellationToken;

use super::{
    super::{monitor::*, Limits},
    corpse::Corpse,
    nsjail::*,
    setup::{ChildSetup, Confinement},
    Backend, Context, Error, Policy,
};

/// how long output may keep flowing after the process tree is killed
const DRAIN_GRACE: time::Duration = time::Duration::from_millis(500);
const CGROUP_ROOT: &str = "/sys/fs/cgroup";

enum Exit {
    Exited(std::process::ExitStatus),
    Exhausted(MonitorKind),
    Cancelled,
}

/// A monitored, not yet launched process
pub struct Process<'a, C: Context> {
    policy: &'a Policy,
    limits: &'a Limits,
    context: &'a C,
    monitor: StatMonitor,
}

impl<'a, C: Context> Process<'a, C> {
    pub fn new(policy: &'a Policy, limits: &'a Limits, context: &'a C) -> Result<Self, Error> {
        if context.get_args().is_empty() {
            return Err(Error::EmptyCommand);
        }
        let cg_name = format!(
            "{}/{}",
            policy.root_cgroup,
            uuid::Uuid::new_v4().simple()
        );
        let monitor = StatMonitor::builder()
            .mem_cpu(policy.accounting, &cg_name, limits.memory_bytes, limits.cpu())?
            .walltime(limits.walltime())
            .build();
        Ok(Self {
            policy,
            limits,
            context,
            monitor,
        })
    }
    fn get_env(&self) -> Vec<(String, String)> {
        let cwd = self.context.get_cwd().to_string_lossy().into_owned();
        let mut env = vec![
            ("PATH".to_owned(), self.policy.path.clone()),
            ("HOME".to_owned(), cwd.clone()),
            ("TMPDIR".to_owned(), cwd),
            ("LANG".to_owned(), "C.UTF-8".to_owned()),
        ];
        env.extend(self.context.get_env().iter().cloned());
        env
    }
    fn cpu_secs(&self) -> u64 {
        // rounded up, plus one so the monitor fires first
        self.limits.cpu_millis.div_ceil(1000) + 1
    }
    fn get_command(&self) -> Command {
        let args = self.context.get_args();
        let env = self.get_env();
        match self.policy.backend {
            Backend::Direct => {
                let mut cmd = Command::new(&args[0]);
                cmd.args(&args[1..]).env_clear().envs(env);
                cmd
            }
            Backend::Nsjail => {
                let arg_factory = ArgFactory::default()
                    .add(BaseArg)
                    .add(MountArg {
                        root: self.context.get_cwd().parent(),
                        workspace: self.context.get_cwd(),
                    })
                    .add(NetworkArg {
                        allow: self.policy.network,
                    })
                    .add(EnvArg { env: &env })
                    .add(RlimitArg {
                        cpu_secs: self.cpu_secs(),
                        walltime_secs: self.limits.walltime().as_secs() + 1,
                        file_size: self.policy.file_size,
                    })
                    .add(InnerProcessArg {
                        inner_args: args.iter().map(String::as_str),
                    });
                let mut cmd = Command::new(&self.policy.nsjail);
                cmd.args(arg_factory.build()).env_clear();
                cmd
            }
        }
    }
    /// `RLIMIT_DATA` backstop, loose enough that the monitor usually reports first
    fn data_limit(&self) -> Option<u64> {
        self.context
            .limit_data()
            .then(|| self.limits.memory_bytes.saturating_mul(2))
    }
    /// hide sibling workspaces, nsjail does the same with its own mounts
    fn confinement(&self) -> Result<Option<Confinement>, Error> {
        if self.policy.backend != Backend::Direct {
            return Ok(None);
        }
        let cwd = self.context.get_cwd();
        // the parent gets covered, it must not be `/`
        let root = cwd
            .parent()
            .filter(|root| cwd.is_absolute() && root.parent().is_some())
            .ok_or_else(|| Error::Unconfinable(cwd.to_path_buf()))?;
        Ok(Some(Confinement::new(c_path(root)?, c_path(cwd)?)))
    }
    /// spawn a raw process
    fn spawn_raw_process(&mut self) -> Result<Child, Error> {
        let mut cmd = self.get_command();
        cmd.current_dir(self.context.get_cwd())
            .kill_on_drop(true)
            .process_group(0)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let cgroup_procs = match self.monitor.get_cg_path() {
            Some(path) => Some(
                CString::new(format!("{}/{}/cgroup.procs", CGROUP_ROOT, path))
                    .map_err(io::Error::from)?,
            ),
            None => None,
        };
        let setup = ChildSetup {
            cpu_secs: self.cpu_secs(),
            file_size: self.policy.file_size,
            data: self.data_limit(),
            confine: self.confinement()?,
            // nsjail unshares by itself
            isolate_network: !self.policy.network && self.policy.backend == Backend::Direct,
            is_root: rustix::process::getuid().is_root(),
            cgroup_procs,
        };
        unsafe {
            cmd.pre_exec(move || setup.apply());
        }

        log::trace!("spawn process with args: {:?}", self.context.get_args());
        Ok(cmd.spawn()?)
    }
    /// spawn a process and wait for it to finish
    pub async fn wait(mut self, input: Vec<u8>, cancel: &CancellationToken) -> Result<Corpse, Error> {
        let mut process = self.spawn_raw_process()?;
        let pid = process.id().ok_or(Error::CapturedPipe)?;
        self.monitor.attach(pid)?;

        let mut stdin = process.stdin.take().ok_or(Error::CapturedPipe)?;
        tokio::spawn(async move {
            if let Err(err) = stdin.write_all(&input).await {
                log::trace!("stdin closed early: {}", err);
            }
        });
        let mut stdout = process.stdout.take().ok_or(Error::CapturedPipe)?;
        let mut stderr = process.stderr.take().ok_or(Error::CapturedPipe)?;

        let mut stdout_capture = Capture::new(self.limits.max_output_bytes);
        let mut stderr_capture = Capture::new(self.limits.max_output_bytes);

        let (exit, status) = {
            let mut io = pin!(async {
                let (x, y) = tokio::join!(
                    stdout_capture.drain(&mut stdout),
                    stderr_capture.drain(&mut stderr)
                );
                if let Err(err) = x.and(y) {
                    log::debug!("Fail forwarding buffer: {}", err);
                }
            });
            let mut io_done = false;

            let exit = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Exit::Cancelled,
                    reason = self.monitor.wait_exhaust() => break Exit::Exhausted(reason),
                    status = process.wait() => break Exit::Exited(status?),
                    _ = &mut io, if !io_done => io_done = true,
                }
            };

            // no descendant may outlive the stage, even after a clean exit
            self.monitor.kill();
            let status = match exit {
                Exit::Exited(status) => status,
                _ => {
                    process.start_kill().ok();
                    process.wait().await?
                }
            };
            self.monitor.disarm();

            if !io_done && time::timeout(DRAIN_GRACE, &mut io).await.is_err() {
                log::debug!("output still open after the process tree was killed");
            }
            (exit, status)
        };

        let (reason, cancelled) = match exit {
            Exit::Exited(_) => (self.monitor.poll_exhaust(), false),
            Exit::Exhausted(reason) => (Some(reason), false),
            Exit::Cancelled => (None, true),
        };
        let (code, signal) = decode(self.policy.backend, status);
        log::debug!(
            "process {} finished, code: {:?}, signal: {:?}, reason: {:?}",
            pid,
            code,
            signal,
            reason
        );

        Ok(Corpse {
            code,
            signal,
            reason,
            cancelled,
            stdout: stdout_capture,
            stderr: stderr_capture,
            stat: self.monitor.stat().await,
        })
    }
}

fn c_path(path: &Path) -> Result<CString, Error> {
    CString::new(path.as_os_str().as_bytes()).map_err(|err| Error::IO(err.into()))
}

/// split an exit status into exit code and terminating signal
fn decode(backend: Backend, status: std::process::ExitStatus) -> (Option<i32>, Option<i32>) {
    if let Some(signal) = status.signal() {
        return (None, Some(signal));
    }
    match (backend, status.code()) {
        // nsjail reports a signaled child as 128 + signal
        (Backend::Nsjail, Some(code)) if code > 128 && code <= 128 + 64 => {
            (None, Some(code - 128))
        }
        (_, code) => (code, None),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_nsjail_signal() {
        let killed = std::process::ExitStatus::from_raw(137 << 8);
        assert_eq!(decode(Backend::Nsjail, killed), (None, Some(9)));
        assert_eq!(decode(Backend::Direct, killed), (Some(137), None));
    }
    #[test]
    fn decode_raw_signal() {
        let killed = std::process::ExitStatus::from_raw(libc::SIGXCPU);
        assert_eq!(decode(Backend::Direct, killed), (None, Some(libc::SIGXCPU)));
    }
}

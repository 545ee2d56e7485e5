use std::{
    ffi::{CStr, CString},
    io, ptr,
};

use rustix::{
    process::{setrlimit, Resource, Rlimit},
    thread::{unshare, UnshareFlags},
};

/// Setup applied inside the forked child, right before `exec`
///
/// Everything is prepared before the fork, [`ChildSetup::apply`] must not allocate.
pub struct ChildSetup {
    /// soft `RLIMIT_CPU`, the hard limit is one second above to deliver `SIGXCPU` first
    pub cpu_secs: u64,
    pub file_size: u64,
    /// `RLIMIT_DATA`, for languages that opt in
    pub data: Option<u64>,
    pub isolate_network: bool,
    pub is_root: bool,
    /// `cgroup.procs` of the control group the child joins
    pub cgroup_procs: Option<CString>,
    pub confine: Option<Confinement>,
}

/// Hide every sibling workspace behind an empty tmpfs and bind the own one back
///
/// Runs in a fresh mount namespace, owned by a fresh user namespace unless we are root.
pub struct Confinement {
    /// directory holding every workspace
    pub root: CString,
    /// absolute path of the workspace, a direct child of `root`
    pub workspace: CString,
    /// `/proc/self/uid_map` and `gid_map` content mapping the caller onto itself
    pub uid_map: Vec<u8>,
    pub gid_map: Vec<u8>,
}

impl Confinement {
    pub fn new(root: CString, workspace: CString) -> Self {
        let uid = rustix::process::getuid().as_raw();
        let gid = rustix::process::getgid().as_raw();
        Self {
            root,
            workspace,
            uid_map: format!("{} {} 1", uid, uid).into_bytes(),
            gid_map: format!("{} {} 1", gid, gid).into_bytes(),
        }
    }
    fn map_ids(&self) -> io::Result<()> {
        // gid_map is refused until setgroups is disabled
        write_file(c"/proc/self/setgroups", b"deny")?;
        write_file(c"/proc/self/uid_map", &self.uid_map)?;
        write_file(c"/proc/self/gid_map", &self.gid_map)
    }
    fn apply(&self) -> io::Result<()> {
        // cwd is still the workspace, it stays reachable as "." once covered
        unsafe {
            check(libc::mount(
                ptr::null(),
                c"/".as_ptr(),
                ptr::null(),
                libc::MS_REC | libc::MS_PRIVATE,
                ptr::null(),
            ))?;
            check(libc::mount(
                c"tmpfs".as_ptr(),
                self.root.as_ptr(),
                c"tmpfs".as_ptr(),
                libc::MS_NOSUID | libc::MS_NODEV,
                ptr::null(),
            ))?;
            check(libc::mkdir(self.workspace.as_ptr(), 0o700))?;
            check(libc::mount(
                c".".as_ptr(),
                self.workspace.as_ptr(),
                ptr::null(),
                libc::MS_BIND | libc::MS_REC,
                ptr::null(),
            ))?;
            check(libc::chdir(self.workspace.as_ptr()))?;
        }
        Ok(())
    }
}

fn check(ret: libc::c_int) -> io::Result<()> {
    match ret {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

fn write_file(path: &CStr, content: &[u8]) -> io::Result<()> {
    unsafe {
        let fd = libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let written = libc::write(fd, content.as_ptr().cast(), content.len());
        let err = io::Error::last_os_error();
        libc::close(fd);
        if written != content.len() as isize {
            return Err(err);
        }
    }
    Ok(())
}

fn limit(resource: Resource, soft: u64, hard: u64) -> io::Result<()> {
    setrlimit(
        resource,
        Rlimit {
            current: Some(soft),
            maximum: Some(hard),
        },
    )?;
    Ok(())
}

impl ChildSetup {
    pub fn apply(&self) -> io::Result<()> {
        if let Some(procs) = &self.cgroup_procs {
            // writing "0" moves the writing process
            write_file(procs, b"0")?;
        }

        limit(Resource::Cpu, self.cpu_secs, self.cpu_secs + 1)?;
        limit(Resource::Fsize, self.file_size, self.file_size)?;
        limit(Resource::Core, 0, 0)?;
        if let Some(data) = self.data {
            limit(Resource::Data, data, data)?;
        }

        let mut flags = UnshareFlags::empty();
        if self.isolate_network {
            flags |= UnshareFlags::NEWNET;
        }
        if self.confine.is_some() {
            flags |= UnshareFlags::NEWNS;
        }
        if flags.is_empty() {
            return Ok(());
        }
        if !self.is_root {
            flags |= UnshareFlags::NEWUSER;
        }

        match (unshare(flags), &self.confine) {
            (Ok(()), Some(confine)) => {
                if !self.is_root {
                    confine.map_ids()?;
                }
                confine.apply()
            }
            (Ok(()), None) => Ok(()),
            // network isolation alone is best-effort, not every host allows namespaces
            (Err(_), None) => Ok(()),
            (Err(err), Some(_)) => Err(err.into()),
        }
    }
}

use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    os::unix::ffi::OsStrExt,
    path::Path,
};

pub trait Argument {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>>;
}

#[derive(Default)]
pub struct ArgFactory {
    args: Vec<Cow<'static, OsStr>>,
}

impl ArgFactory {
    pub fn add(mut self, arg: impl Argument) -> Self {
        self.args.extend(arg.get_args());
        self
    }

    pub fn build(self) -> Vec<OsString> {
        self.args.into_iter().map(|x| x.into_owned()).collect()
    }
}

fn flag(x: &'static [u8]) -> Cow<'static, OsStr> {
    Cow::Borrowed(OsStr::from_bytes(x))
}

fn owned(x: impl Into<OsString>) -> Cow<'static, OsStr> {
    Cow::Owned(x.into())
}

pub struct BaseArg;

impl Argument for BaseArg {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        vec![
            flag(b"--mode"),
            flag(b"o"),
            flag(b"--quiet"),
            flag(b"--disable_clone_newcgroup"),
        ]
        .into_iter()
    }
}

/// read-only view of the host, the workspace is the only writable path
///
/// `root` holds every workspace and is covered by an empty tmpfs before the
/// workspace is bound back, nsjail mounts in command line order.
pub struct MountArg<'a> {
    pub root: Option<&'a Path>,
    pub workspace: &'a Path,
}

impl<'a> Argument for MountArg<'a> {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        let mut args = vec![
            flag(b"--chroot"),
            flag(b"/"),
            flag(b"--tmpfsmount"),
            flag(b"/tmp"),
        ];
        if let Some(root) = self.root {
            args.extend([flag(b"--tmpfsmount"), owned(root)]);
        }
        args.extend([
            flag(b"--bindmount"),
            owned(self.workspace),
            flag(b"--cwd"),
            owned(self.workspace),
        ]);
        args.into_iter()
    }
}

pub struct NetworkArg {
    pub allow: bool,
}

impl Argument for NetworkArg {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        match self.allow {
            true => vec![flag(b"--disable_clone_newnet")],
            false => Vec::new(),
        }
        .into_iter()
    }
}

pub struct EnvArg<'a> {
    pub env: &'a [(String, String)],
}

impl<'a> Argument for EnvArg<'a> {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        self.env
            .iter()
            .flat_map(|(k, v)| [flag(b"--env"), owned(format!("{}={}", k, v))])
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// kernel side backstops, the monitor is expected to fire first
pub struct RlimitArg {
    pub cpu_secs: u64,
    pub walltime_secs: u64,
    pub file_size: u64,
}

impl Argument for RlimitArg {
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        // nsjail takes the file size limit in MiB
        let fsize = self.file_size.div_ceil(1024 * 1024).max(1);
        vec![
            flag(b"--rlimit_as"),
            flag(b"max"),
            flag(b"--rlimit_core"),
            flag(b"0"),
            flag(b"--rlimit_cpu"),
            owned(self.cpu_secs.to_string()),
            flag(b"--rlimit_fsize"),
            owned(fsize.to_string()),
            flag(b"--time_limit"),
            owned(self.walltime_secs.to_string()),
        ]
        .into_iter()
    }
}

pub struct InnerProcessArg<'a, I>
where
    I: Iterator<Item = &'a str>,
{
    pub inner_args: I,
}

impl<'a, I> Argument for InnerProcessArg<'a, I>
where
    I: Iterator<Item = &'a str>,
{
    fn get_args(self) -> impl Iterator<Item = Cow<'static, OsStr>> {
        vec![flag(b"--")]
            .into_iter()
            .chain(self.inner_args.map(owned))
    }
}

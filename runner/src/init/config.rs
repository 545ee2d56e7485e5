use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tokio::{fs, sync::OnceCell};

use super::Error;
use crate::{
    language::LangSpec,
    sandbox::{Accounting, Backend, LimitOverrides, Limits, Policy, DEFAULT_PATH},
};

pub static CONFIG: OnceCell<GlobalConfig> = OnceCell::const_new();

// config
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GlobalConfig {
    /// 0 trace, 1 debug, 2 info, 3 warn, 4 error
    #[serde(default = "default_log_level")]
    pub log_level: usize,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub nsjail: Nsjail,
    /// default limits, unset fields fall back to [`Limits::default`]
    #[serde(default)]
    pub limits: LimitOverrides,
    /// upper bound of caller overrides, unset fields fall back to [`Limits::ceiling`]
    #[serde(default)]
    pub ceiling: LimitOverrides,
    /// added to the built-in languages, replacing those with the same name
    #[serde(default)]
    pub language: Vec<LangSpec>,
}

fn default_log_level() -> usize {
    2
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            runtime: Runtime::default(),
            nsjail: Nsjail::default(),
            limits: LimitOverrides::default(),
            ceiling: LimitOverrides::default(),
            language: Vec::new(),
        }
    }
}

impl FromStr for GlobalConfig {
    type Err = Error;

    fn from_str(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }
}

impl GlobalConfig {
    pub fn limits(&self) -> Limits {
        Limits::default().with(&self.limits)
    }
    pub fn ceiling(&self) -> Limits {
        Limits::ceiling().with(&self.ceiling)
    }
    pub fn policy(&self) -> Policy {
        Policy {
            backend: self.runtime.backend,
            accounting: self.runtime.accounting,
            network: self.runtime.network,
            nsjail: self.nsjail.path.clone(),
            root_cgroup: self.runtime.root_cgroup.clone(),
            file_size: self.runtime.file_size_bytes,
            path: self.runtime.path.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Runtime {
    /// root of every workspace
    pub temp: PathBuf,
    /// submissions running at the same time
    pub concurrency: usize,
    pub accounting: Accounting,
    pub root_cgroup: String,
    pub backend: Backend,
    pub network: bool,
    pub file_size_bytes: u64,
    /// `PATH` inside the sandbox, also used to find toolchains
    pub path: String,
}

impl Default for Runtime {
    fn default() -> Self {
        let policy = Policy::default();
        Self {
            temp: PathBuf::from(".temp"),
            concurrency: 4,
            accounting: policy.accounting,
            root_cgroup: policy.root_cgroup,
            backend: policy.backend,
            network: policy.network,
            file_size_bytes: policy.file_size,
            path: DEFAULT_PATH.to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Nsjail {
    pub path: PathBuf,
}

impl Default for Nsjail {
    fn default() -> Self {
        Self {
            path: Policy::default().nsjail,
        }
    }
}

/// load config from `path`, defaults are used when the file does not exist
pub async fn load(path: &Path) -> Result<GlobalConfig, Error> {
    match fs::read_to_string(path).await {
        Ok(content) => content.parse(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            println!("Unable to find {}, using default config", path.display());
            Ok(GlobalConfig::default())
        }
        Err(err) => Err(Error::ConfigIo(path.to_path_buf(), err)),
    }
}

pub async fn init(path: &Path) -> Result<&'static GlobalConfig, Error> {
    CONFIG.get_or_try_init(|| load(path)).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_round_trip() {
        let config = GlobalConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(text.parse::<GlobalConfig>().unwrap(), config);
    }
    #[test]
    fn empty_is_default() {
        assert_eq!("".parse::<GlobalConfig>().unwrap(), GlobalConfig::default());
    }
    #[test]
    fn partial_sections() {
        let config: GlobalConfig = r#"
            logLevel = 0

            [runtime]
            temp = "/var/tmp/coderun"
            concurrency = 8
            accounting = "procfs"
            rootCgroup = "coderun"
            backend = "nsjail"
            network = false
            fileSizeBytes = 1024
            path = "/usr/bin:/bin"

            [limits]
            timeoutMillis = 1000

            [ceiling]
            memoryBytes = 1048576
            "#
        .parse()
        .unwrap();
        assert_eq!(config.runtime.backend, Backend::Nsjail);
        assert_eq!(config.runtime.accounting, Accounting::Procfs);
        assert_eq!(config.limits().timeout_millis, 1000);
        assert_eq!(config.limits().cpu_millis, Limits::default().cpu_millis);
        assert_eq!(config.ceiling().memory_bytes, 1048576);
        assert_eq!(config.ceiling().timeout_millis, Limits::ceiling().timeout_millis);
    }
    #[test]
    fn reject_unknown_key() {
        assert!("bind = \"0.0.0.0:8080\"".parse::<GlobalConfig>().is_err());
    }
    #[tokio::test]
    async fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("config.toml")).await.unwrap();
        assert_eq!(config, GlobalConfig::default());
    }
}

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;

use super::spec::LangSpec;
use crate::{Error, Result};

/// A language whose binaries have been found on the sandbox `PATH`
#[derive(Debug)]
pub struct Toolchain {
    spec: LangSpec,
    compile: Option<Vec<String>>,
    run: Vec<String>,
    env: Vec<(String, String)>,
}

/// commands starting with `./` refer to a file produced inside the workspace
fn in_workspace(program: &str) -> bool {
    program.starts_with("./")
}

/// turn the program of `command` into an absolute path
fn resolve(command: &[String], path: &str) -> Option<Vec<String>> {
    let (program, args) = command.split_first()?;
    let program = if in_workspace(program) {
        program.clone()
    } else {
        let found: PathBuf = which::which_in(program, Some(path), "/").ok()?;
        found.to_string_lossy().into_owned()
    };
    Some(std::iter::once(program).chain(args.iter().cloned()).collect())
}

/// anchor workspace relative programs at `cwd`
fn locate(command: &[String], cwd: &Path) -> Vec<String> {
    command
        .iter()
        .enumerate()
        .map(|(i, arg)| match i == 0 && in_workspace(arg) {
            true => cwd.join(&arg[2..]).to_string_lossy().into_owned(),
            false => arg.clone(),
        })
        .collect()
}

impl Toolchain {
    fn new(spec: LangSpec, path: &str) -> Option<Self> {
        let compile = match &spec.compile {
            Some(command) => Some(resolve(command, path)?),
            None => None,
        };
        let run = resolve(&spec.run, path)?;
        let env = spec
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self {
            spec,
            compile,
            run,
            env,
        })
    }
    pub fn spec(&self) -> &LangSpec {
        &self.spec
    }
    /// compile command for a workspace at `cwd`, `None` for interpreted languages
    pub fn compile_command(&self, cwd: &Path) -> Option<Vec<String>> {
        self.compile.as_deref().map(|x| locate(x, cwd))
    }
    pub fn run_command(&self, cwd: &Path) -> Vec<String> {
        locate(&self.run, cwd)
    }
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

/// Entry of [`Registry::list`]
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LangStatus {
    pub name: String,
    pub aliases: Vec<String>,
    pub info: String,
    pub available: bool,
}

/// Immutable table of every known language
pub struct Registry {
    specs: Vec<LangSpec>,
    toolchains: Vec<Arc<Toolchain>>,
}

impl Registry {
    /// resolve the binaries of every spec against `path`
    pub fn new(specs: Vec<LangSpec>, path: &str) -> Self {
        let toolchains: Vec<Arc<Toolchain>> = specs
            .iter()
            .filter_map(|spec| match Toolchain::new(spec.clone(), path) {
                Some(x) => Some(Arc::new(x)),
                None => {
                    log::info!("toolchain of {} is unavailable", spec.name);
                    None
                }
            })
            .collect();
        log::debug!(
            "{} of {} languages available",
            toolchains.len(),
            specs.len()
        );
        Self { specs, toolchains }
    }
    /// look up by name or alias
    ///
    /// unknown languages and languages whose binaries are missing both fail
    /// with [`Error::ToolchainUnavailable`]
    pub fn get(&self, name: &str) -> Result<Arc<Toolchain>> {
        self.toolchains
            .iter()
            .find(|x| x.spec.matches(name))
            .cloned()
            .ok_or_else(|| Error::ToolchainUnavailable(name.to_owned()))
    }
    pub fn list(&self) -> Vec<LangStatus> {
        self.specs
            .iter()
            .map(|spec| LangStatus {
                name: spec.name.clone(),
                aliases: spec.aliases.clone(),
                info: spec.info.clone(),
                available: self.toolchains.iter().any(|x| x.spec.name == spec.name),
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn spec(content: &str) -> Vec<LangSpec> {
        LangSpec::parse(content).unwrap()
    }

    #[test]
    fn resolve_on_path() {
        let registry = Registry::new(
            spec(
                r#"
                [[language]]
                name = "shell"
                aliases = ["sh"]
                file = "main.sh"
                run = ["sh", "main.sh"]
                "#,
            ),
            crate::sandbox::DEFAULT_PATH,
        );
        let toolchain = registry.get("SH").unwrap();
        let command = toolchain.run_command(Path::new("/ws"));
        assert!(Path::new(&command[0]).is_absolute());
        assert_eq!(command[1], "main.sh");
        assert!(toolchain.compile_command(Path::new("/ws")).is_none());
    }
    #[test]
    fn missing_binary_is_unavailable() {
        let registry = Registry::new(
            spec(
                r#"
                [[language]]
                name = "ghost"
                file = "main.gh"
                compile = ["definitely-not-a-compiler-42", "main.gh"]
                run = ["./main"]
                "#,
            ),
            crate::sandbox::DEFAULT_PATH,
        );
        assert!(matches!(
            registry.get("ghost"),
            Err(Error::ToolchainUnavailable(_))
        ));
        assert!(matches!(
            registry.get("cobol"),
            Err(Error::ToolchainUnavailable(_))
        ));
        assert!(!registry.list()[0].available);
    }
    #[test]
    fn workspace_program_is_anchored() {
        let registry = Registry::new(
            spec(
                r#"
                [[language]]
                name = "fakec"
                file = "main.fc"
                compile = ["sh", "-c", "cp main.fc main"]
                run = ["./main", "arg"]
                "#,
            ),
            crate::sandbox::DEFAULT_PATH,
        );
        let toolchain = registry.get("fakec").unwrap();
        assert_eq!(
            toolchain.run_command(Path::new("/ws")),
            vec!["/ws/main".to_owned(), "arg".to_owned()]
        );
    }
}

mod run;

use std::path::Path;

use crate::{
    language::LangSpec,
    sandbox::{Accounting, Policy, DEFAULT_PATH},
    Registry, Runner,
};

/// languages every test host can run
const TEST_LANGS: &str = r#"
[[language]]
name = "shell"
file = "main.sh"
run = ["sh", "main.sh"]

[[language]]
name = "fakec"
file = "main.fc"
compile = ["sh", "-c", "grep -q 'ok;' main.fc || { echo 'main.fc:1: error: expected ;' >&2; exit 1; }; cp main.fc main"]
run = ["sh", "main"]

[[language]]
name = "native"
file = "main.fc"
compile = ["sh", "-c", "cp main.fc main && chmod +x main"]
run = ["./main"]

[[language]]
name = "scriptc"
file = "main.sc"
compile = ["sh", "main.sc"]
run = ["sh", "-c", "echo ran"]
"#;

fn policy() -> Policy {
    Policy {
        accounting: Accounting::Procfs,
        ..Default::default()
    }
}

fn test_runner(root: &Path) -> Runner {
    let registry = Registry::new(LangSpec::parse(TEST_LANGS).unwrap(), DEFAULT_PATH);
    Runner::builder(registry)
        .temp(root)
        .policy(policy())
        .build()
}

fn builtin_runner(root: &Path) -> Runner {
    let registry = Registry::new(LangSpec::builtin().unwrap(), DEFAULT_PATH);
    Runner::builder(registry)
        .temp(root)
        .policy(policy())
        .build()
}

fn count(root: &Path) -> usize {
    std::fs::read_dir(root).unwrap().count()
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sandbox::LimitOverrides;

static BUILTIN: &str = include_str!("langs.toml");

/// How to build and run one language
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LangSpec {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// name of the source file inside the workspace
    pub file: String,
    #[serde(default)]
    pub info: String,
    /// absent for interpreted languages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<Vec<String>>,
    pub run: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub compile_limits: LimitOverrides,
    #[serde(default)]
    pub run_limits: LimitOverrides,
    /// cap the data segment of the program, for native code that never reserves large heaps
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub limit_data: bool,
}

#[derive(Deserialize)]
struct Raw {
    #[serde(default)]
    language: Vec<LangSpec>,
}

impl LangSpec {
    /// parse a list of `[[language]]` tables
    pub fn parse(content: &str) -> Result<Vec<Self>, toml::de::Error> {
        let raw: Raw = toml::from_str(content)?;
        Ok(raw.language)
    }
    /// languages shipped with the crate
    pub fn builtin() -> Result<Vec<Self>, toml::de::Error> {
        Self::parse(BUILTIN)
    }
    /// `name` matches the name or one of the aliases, ignoring case
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|x| x.eq_ignore_ascii_case(name))
    }
    pub fn need_compile(&self) -> bool {
        self.compile.is_some()
    }
}

/// replace every spec in `base` that shares a name with one in `extra`, append the rest
pub fn merge(mut base: Vec<LangSpec>, extra: Vec<LangSpec>) -> Vec<LangSpec> {
    for spec in extra {
        match base.iter_mut().find(|x| x.name == spec.name) {
            Some(x) => *x = spec,
            None => base.push(spec),
        }
    }
    base
}

//! Configuration model: parsing, normalization, and validation.
//!
//! A [`Project`] is the validated, normalized value the rest of the core
//! operates on. Loading goes through two passes: deserialize the YAML
//! document into the `*File` shapes that mirror the on-disk schema, then
//! normalize (shorthand expansion, env merge, default-filling) and validate
//! into the immutable [`Project`]/[`ServiceSpec`] model.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;

use crate::duration::parse_duration_ms;
use crate::error::ProcessManagerError;
use crate::resolver;

/// Wait condition attached to a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    /// The dependency only needs to have been spawned (`running` or `healthy`).
    Started,
    /// The dependency must reach `healthy`.
    Healthy,
}

/// Restart policy for a service's child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart automatically.
    #[default]
    No,
    /// Restart only on non-zero exit.
    OnFailure,
    /// Restart regardless of exit code.
    Always,
}

/// A fixed palette of display colors. Opaque to the core; carried through
/// for the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

/// Normalized healthcheck / poller probe spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSpec {
    pub cmd: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub retries: u32,
}

const DEFAULT_PROBE_INTERVAL_MS: u64 = 2_000;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PROBE_RETRIES: u32 = 10;

/// On-disk shorthand or full form of a healthcheck.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum HealthcheckFile {
    Shorthand(String),
    Full {
        cmd: String,
        #[serde(default)]
        interval: Option<String>,
        #[serde(default)]
        timeout: Option<String>,
        #[serde(default)]
        retries: Option<u32>,
    },
}

impl HealthcheckFile {
    fn normalize(&self) -> Result<ProbeSpec, ProcessManagerError> {
        match self {
            HealthcheckFile::Shorthand(cmd) => Ok(ProbeSpec {
                cmd: cmd.clone(),
                interval_ms: DEFAULT_PROBE_INTERVAL_MS,
                timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
                retries: DEFAULT_PROBE_RETRIES,
            }),
            HealthcheckFile::Full {
                cmd,
                interval,
                timeout,
                retries,
            } => Ok(ProbeSpec {
                cmd: cmd.clone(),
                interval_ms: match interval {
                    Some(s) => parse_duration_ms(s)?,
                    None => DEFAULT_PROBE_INTERVAL_MS,
                },
                timeout_ms: match timeout {
                    Some(s) => parse_duration_ms(s)?,
                    None => DEFAULT_PROBE_TIMEOUT_MS,
                },
                retries: retries.unwrap_or(DEFAULT_PROBE_RETRIES),
            }),
        }
    }
}

/// On-disk shorthand or full form of `depends_on`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DependsOnFile {
    Shorthand(Vec<String>),
    Full(IndexMap<String, WaitCondition>),
}

impl DependsOnFile {
    fn normalize(&self) -> IndexMap<String, WaitCondition> {
        match self {
            DependsOnFile::Shorthand(names) => names
                .iter()
                .map(|n| (n.clone(), WaitCondition::Started))
                .collect(),
            DependsOnFile::Full(map) => map.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceFile {
    cmd: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: Option<IndexMap<String, String>>,
    #[serde(default)]
    depends_on: Option<DependsOnFile>,
    #[serde(default)]
    healthcheck: Option<HealthcheckFile>,
    #[serde(default)]
    restart: RestartPolicy,
    #[serde(default)]
    color: Option<Color>,
    #[serde(default)]
    stop_signal: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectFile {
    name: String,
    #[serde(default)]
    env: Option<IndexMap<String, String>>,
    #[serde(default)]
    dotenv: Option<String>,
    #[serde(default)]
    groups: Option<IndexMap<String, Vec<String>>>,
    services: IndexMap<String, ServiceFile>,
}

/// A fully resolved, immutable service definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    pub cmd: String,
    pub cwd: PathBuf,
    pub env: IndexMap<String, String>,
    pub depends_on: IndexMap<String, WaitCondition>,
    pub healthcheck: Option<ProbeSpec>,
    pub restart: RestartPolicy,
    pub stop_signal: String,
    pub color: Option<Color>,
    pub group: Option<String>,
}

/// A fully resolved, immutable project definition.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub env: IndexMap<String, String>,
    pub services: IndexMap<String, ServiceSpec>,
    pub groups: IndexMap<String, Vec<String>>,
    pub config_path: PathBuf,
}

/// Expands `${VAR}` / `$VAR` references in a string against the process environment.
///
/// Unlike the teacher's version, a missing variable is left untouched rather
/// than panicking: configuration loading must return a `Result`, never abort
/// the process.
fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

/// Parses a dotenv-style file into a key-value map. Lines without `=` and
/// lines starting with `#` are ignored.
fn load_dotenv_file(path: &Path) -> Result<IndexMap<String, String>, ProcessManagerError> {
    let content = fs::read_to_string(path)?;
    let mut vars = IndexMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let mut value = value.trim();
            if (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''))
            {
                value = &value[1..value.len().saturating_sub(1)];
            }
            vars.insert(key, value.to_string());
        }
    }
    Ok(vars)
}

/// Merges global env, dotenv, and per-service env: service overrides global
/// overrides dotenv.
fn merge_env(
    dotenv: &IndexMap<String, String>,
    global: &IndexMap<String, String>,
    service: Option<&IndexMap<String, String>>,
) -> IndexMap<String, String> {
    let mut merged = dotenv.clone();
    for (k, v) in global {
        merged.insert(k.clone(), v.clone());
    }
    if let Some(service) = service {
        for (k, v) in service {
            merged.insert(k.clone(), v.clone());
        }
    }
    for v in merged.values_mut() {
        *v = expand_env_vars(v);
    }
    merged
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

/// Loads, parses, normalizes, and validates a [`Project`] from a YAML file.
pub fn load_project(config_path: &Path) -> Result<Project, ProcessManagerError> {
    let content = fs::read_to_string(config_path).map_err(|e| {
        ProcessManagerError::ConfigReadError(std::io::Error::new(
            e.kind(),
            format!("{e} ({})", config_path.display()),
        ))
    })?;

    let file: ProjectFile = serde_yaml::from_str(&content)
        .map_err(|e| ProcessManagerError::InvalidConfig(format!("yaml: {e}")))?;

    let base_path = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    if file.services.is_empty() {
        return Err(ProcessManagerError::InvalidConfig(
            "project must declare at least one service".to_string(),
        ));
    }

    let dotenv = match &file.dotenv {
        Some(rel) => {
            let path = resolve_relative(&base_path, rel);
            load_dotenv_file(&path)?
        }
        None => IndexMap::new(),
    };

    let global_env = file.env.clone().unwrap_or_default();

    let mut group_of: HashMap<String, String> = HashMap::new();
    if let Some(groups) = &file.groups {
        for (group_name, members) in groups {
            for member in members {
                if let Some(existing) = group_of.insert(member.clone(), group_name.clone()) {
                    if existing != *group_name {
                        return Err(ProcessManagerError::InvalidConfig(format!(
                            "service '{member}' belongs to multiple groups: '{existing}' and '{group_name}'"
                        )));
                    }
                }
            }
        }
    }

    let mut services = IndexMap::with_capacity(file.services.len());
    for (name, svc) in &file.services {
        let cwd = match &svc.cwd {
            Some(rel) => resolve_relative(&base_path, rel),
            None => base_path.clone(),
        };

        let env = merge_env(&dotenv, &global_env, svc.env.as_ref());

        let depends_on = svc
            .depends_on
            .as_ref()
            .map(DependsOnFile::normalize)
            .unwrap_or_default();

        let healthcheck = svc
            .healthcheck
            .as_ref()
            .map(HealthcheckFile::normalize)
            .transpose()?;

        let stop_signal = svc.stop_signal.clone().unwrap_or_else(default_stop_signal);

        services.insert(
            name.clone(),
            ServiceSpec {
                name: name.clone(),
                cmd: svc.cmd.clone(),
                cwd,
                env,
                depends_on,
                healthcheck,
                restart: svc.restart,
                stop_signal,
                color: svc.color,
                group: group_of.get(name).cloned(),
            },
        );
    }

    validate(&services)?;
    resolver::topological_order(&services)?;

    let groups = file.groups.unwrap_or_default();

    Ok(Project {
        name: file.name,
        env: global_env,
        services,
        groups,
        config_path: config_path.to_path_buf(),
    })
}

fn resolve_relative(base: &Path, rel: &str) -> PathBuf {
    let path = Path::new(rel);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Validates invariants that don't require graph traversal (cycle detection
/// lives in `resolver.rs`, which every valid load must also pass).
fn validate(services: &IndexMap<String, ServiceSpec>) -> Result<(), ProcessManagerError> {
    for (name, spec) in services {
        for (dep, condition) in &spec.depends_on {
            let dep_spec = services.get(dep).ok_or_else(|| {
                ProcessManagerError::InvalidConfig(format!(
                    "service '{name}' depends on unknown service '{dep}'"
                ))
            })?;

            if *condition == WaitCondition::Healthy && dep_spec.healthcheck.is_none() {
                return Err(ProcessManagerError::InvalidConfig(format!(
                    "service '{name}' depends on '{dep}' becoming healthy, but '{dep}' has no healthcheck"
                )));
            }
        }
    }
    Ok(())
}

/// The subset of a service's fields whose change triggers a restart on reload.
///
/// `cmd`, `cwd`, `env` (key-by-key), `dependsOn`, `restart`, and `group`.
/// Per an explicit design decision (see DESIGN.md), `healthcheck` is
/// deliberately excluded, matching the upstream system's existing behavior.
pub fn service_changed(old: &ServiceSpec, new: &ServiceSpec) -> bool {
    old.cmd != new.cmd
        || old.cwd != new.cwd
        || old.env != new.env
        || old.depends_on != new.depends_on
        || old.restart != new.restart
        || old.group != new.group
}

//! Capability resolution.
//!
//! Capabilities are named native function packages compiled into the binary.
//! Whether a package is *enabled* is decided by manifest files in the
//! capability directory, scanned once at startup. `resolve` only ever
//! consults that startup snapshot: a capability installed mid-run is not
//! visible until the process restarts, which is exactly the contract the
//! restart-on-install flow relies on.
//!
//! Resolution outcomes:
//! - enabled and known: [`Resolution::Ready`] with the package's functions;
//! - enabled but unknown to this build: an ordinary error, surfaced as a
//!   fragment failure;
//! - not installed: the configured installer runs synchronously, then
//!   [`Resolution::NeedsRestart`] tells the caller to terminate so the
//!   supervisor can restart into a process that sees the new manifest.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::CapabilityConfig;
use crate::eval::evaluator::EvalResult;
use crate::eval::expression::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("no native package named {name} in this build")]
    UnknownPackage { name: String },

    #[error("installer failed for {name}: {reason}")]
    InstallFailed { name: String, reason: String },

    #[error("capability manifest {path} unreadable: {reason}")]
    Manifest { path: String, reason: String },

    #[error("capability directory unreadable: {0}")]
    Io(String),
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Native functions are plain pure functions over script values.
pub type NativeFunction = fn(&[Value]) -> EvalResult<Value>;

/// A resolved capability: the package name and its callable surface.
#[derive(Debug)]
pub struct CapabilityHandle {
    name: String,
    functions: HashMap<String, NativeFunction>,
}

impl CapabilityHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> &HashMap<String, NativeFunction> {
        &self.functions
    }
}

/// Outcome of a capability request.
#[derive(Clone, Debug)]
pub enum Resolution {
    Ready(Arc<CapabilityHandle>),
    /// Installation ran; this process must not try to use the capability.
    NeedsRestart,
}

/// On-disk marker that a capability is installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

pub struct CapabilityResolver {
    installed: HashMap<String, CapabilityManifest>,
    installer: Vec<String>,
    // One cell per name: concurrent requests coalesce into a single attempt,
    // and a successful resolution is reused for the process lifetime.
    resolutions: DashMap<String, Arc<OnceCell<Resolution>>>,
}

impl CapabilityResolver {
    pub fn with_manifests(manifests: Vec<CapabilityManifest>, installer: Vec<String>) -> Self {
        Self {
            installed: manifests
                .into_iter()
                .map(|manifest| (manifest.name.clone(), manifest))
                .collect(),
            installer,
            resolutions: DashMap::new(),
        }
    }

    /// Scans the capability directory once. A missing directory just means
    /// nothing is installed yet.
    pub fn load(config: &CapabilityConfig) -> CapabilityResult<Self> {
        let mut manifests = Vec::new();
        match std::fs::read_dir(&config.dir) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %config.dir.display(), "no capability directory; nothing installed");
            }
            Err(e) => return Err(CapabilityError::Io(e.to_string())),
            Ok(entries) => {
                for entry in entries {
                    let path = entry.map_err(|e| CapabilityError::Io(e.to_string()))?.path();
                    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                        continue;
                    }
                    let text = std::fs::read_to_string(&path).map_err(|e| {
                        CapabilityError::Manifest {
                            path: path.display().to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    let manifest: CapabilityManifest =
                        serde_json::from_str(&text).map_err(|e| CapabilityError::Manifest {
                            path: path.display().to_string(),
                            reason: e.to_string(),
                        })?;
                    debug!(name = %manifest.name, "capability manifest loaded");
                    manifests.push(manifest);
                }
            }
        }
        Ok(Self::with_manifests(manifests, config.installer.clone()))
    }

    /// Resolves a capability by name, memoized for the process lifetime.
    /// `hint` overrides what is passed to the installer when the capability
    /// is not installed yet.
    pub async fn resolve(&self, name: &str, hint: Option<&str>) -> CapabilityResult<Resolution> {
        let cell = self
            .resolutions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_try_init(|| self.acquire(name, hint))
            .await
            .cloned()
    }

    async fn acquire(&self, name: &str, hint: Option<&str>) -> CapabilityResult<Resolution> {
        if self.installed.contains_key(name) {
            let handle = native_package(name)
                .ok_or_else(|| CapabilityError::UnknownPackage {
                    name: name.to_string(),
                })?;
            debug!(name, "capability ready");
            return Ok(Resolution::Ready(Arc::new(handle)));
        }

        let target = hint.unwrap_or(name);
        self.install(name, target).await?;
        info!(name, "capability installed; restart required before use");
        Ok(Resolution::NeedsRestart)
    }

    async fn install(&self, name: &str, target: &str) -> CapabilityResult<()> {
        let mut parts = self.installer.iter();
        let program = parts.next().ok_or_else(|| CapabilityError::InstallFailed {
            name: name.to_string(),
            reason: "no installer configured".to_string(),
        })?;

        info!(name, target, "installing capability");
        let status = tokio::process::Command::new(program)
            .args(parts)
            .arg(target)
            .status()
            .await
            .map_err(|e| CapabilityError::InstallFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(CapabilityError::InstallFailed {
                name: name.to_string(),
                reason: format!("installer exited with {}", status),
            });
        }
        Ok(())
    }
}

/// The packages this build knows how to provide.
fn native_package(name: &str) -> Option<CapabilityHandle> {
    let functions: &[(&str, NativeFunction)] = match name {
        "text" => &[
            ("upper", text_upper),
            ("lower", text_lower),
            ("trim", text_trim),
        ],
        "math" => &[("abs", math_abs), ("min", math_min), ("max", math_max)],
        "clock" => &[("now", clock_now)],
        _ => return None,
    };
    Some(CapabilityHandle {
        name: name.to_string(),
        functions: functions
            .iter()
            .map(|(fn_name, fn_ptr)| (fn_name.to_string(), *fn_ptr))
            .collect(),
    })
}

mod native {
    use super::*;
    use crate::eval::evaluator::EvalError;

    pub(super) fn expect_arity(function: &str, args: &[Value], expected: usize) -> EvalResult<()> {
        if args.len() != expected {
            return Err(EvalError::ArityMismatch {
                function: function.to_string(),
                expected,
                got: args.len(),
            });
        }
        Ok(())
    }

    pub(super) fn expect_string<'a>(
        function: &str,
        args: &'a [Value],
        index: usize,
    ) -> EvalResult<&'a str> {
        match &args[index] {
            Value::String(s) => Ok(s),
            other => Err(EvalError::TypeMismatch {
                expected: format!("string argument for {}", function),
                actual: other.type_name().to_string(),
            }),
        }
    }

    pub(super) fn expect_numeric(function: &str, args: &[Value], index: usize) -> EvalResult<f64> {
        match &args[index] {
            Value::Integer(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(EvalError::TypeMismatch {
                expected: format!("numeric argument for {}", function),
                actual: other.type_name().to_string(),
            }),
        }
    }

    pub(super) fn both_integers(args: &[Value]) -> bool {
        args.iter().all(|v| matches!(v, Value::Integer(_)))
    }
}

fn text_upper(args: &[Value]) -> EvalResult<Value> {
    native::expect_arity("upper", args, 1)?;
    Ok(Value::String(
        native::expect_string("upper", args, 0)?.to_uppercase(),
    ))
}

fn text_lower(args: &[Value]) -> EvalResult<Value> {
    native::expect_arity("lower", args, 1)?;
    Ok(Value::String(
        native::expect_string("lower", args, 0)?.to_lowercase(),
    ))
}

fn text_trim(args: &[Value]) -> EvalResult<Value> {
    native::expect_arity("trim", args, 1)?;
    Ok(Value::String(
        native::expect_string("trim", args, 0)?.trim().to_string(),
    ))
}

fn math_abs(args: &[Value]) -> EvalResult<Value> {
    native::expect_arity("abs", args, 1)?;
    match &args[0] {
        Value::Integer(i) => Ok(Value::Integer(i.abs())),
        _ => Ok(Value::Float(native::expect_numeric("abs", args, 0)?.abs())),
    }
}

fn math_min(args: &[Value]) -> EvalResult<Value> {
    native::expect_arity("min", args, 2)?;
    let a = native::expect_numeric("min", args, 0)?;
    let b = native::expect_numeric("min", args, 1)?;
    if native::both_integers(args) {
        Ok(Value::Integer(a.min(b) as i64))
    } else {
        Ok(Value::Float(a.min(b)))
    }
}

fn math_max(args: &[Value]) -> EvalResult<Value> {
    native::expect_arity("max", args, 2)?;
    let a = native::expect_numeric("max", args, 0)?;
    let b = native::expect_numeric("max", args, 1)?;
    if native::both_integers(args) {
        Ok(Value::Integer(a.max(b) as i64))
    } else {
        Ok(Value::Float(a.max(b)))
    }
}

fn clock_now(args: &[Value]) -> EvalResult<Value> {
    native::expect_arity("now", args, 0)?;
    Ok(Value::String(chrono::Utc::now().to_rfc3339()))
}

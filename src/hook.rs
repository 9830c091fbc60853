//! Host lifecycle hooks.
//!
//! A hook is bound to one of a closed set of points around a connection
//! and is either a Lua callback run in-process or a command string handed
//! to the remote side.

use crate::error::{CallbackError, EsshError};
use mlua::{Function, Lua, RegistryKey, Value};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::warn;

/// Points in a host connection's lifecycle where hooks can run.
///
/// Variants are declared in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[derive(Display, EnumString, EnumIter, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HookPoint {
    /// Deprecated alias of `before_connect`
    Before,
    BeforeConnect,
    /// Runs on the remote side after the connection is up
    AfterConnect,
    /// Deprecated alias of `after_disconnect`
    After,
    AfterDisconnect,
}

impl HookPoint {
    /// Whether this point only accepts remote commands.
    pub fn is_remote_only(&self) -> bool {
        matches!(self, Self::AfterConnect)
    }

    /// The point that supersedes a deprecated alias.
    pub fn replacement(&self) -> Option<HookPoint> {
        match self {
            Self::Before => Some(Self::BeforeConnect),
            Self::After => Some(Self::AfterDisconnect),
            _ => None,
        }
    }
}

/// A Lua function kept alive in the runtime registry.
///
/// The runtime is passed explicitly on each call.
#[derive(Clone)]
pub struct Callback(Rc<RegistryKey>);

impl Callback {
    pub fn new(lua: &Lua, func: Function) -> mlua::Result<Self> {
        Ok(Self(Rc::new(lua.create_registry_value(func)?)))
    }

    pub(crate) fn function(&self, lua: &Lua) -> mlua::Result<Function> {
        lua.registry_value(&self.0)
    }

    /// Protected call with no arguments; the return value is ignored.
    pub fn call(&self, lua: &Lua) -> Result<(), CallbackError> {
        self.function(lua)
            .and_then(|f| f.call::<()>(()))
            .map_err(CallbackError::Runtime)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(<function>)")
    }
}

/// Behavior bound to a hook point.
#[derive(Debug, Clone)]
pub enum Hook {
    /// Lua function run inside this process
    Native(Callback),
    /// Command executed on the remote target, stored verbatim
    Remote(String),
}

impl Hook {
    pub fn as_command(&self) -> Option<&str> {
        match self {
            Self::Remote(cmd) => Some(cmd),
            Self::Native(_) => None,
        }
    }
}

impl Serialize for Hook {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Native(_) => serializer.serialize_str("<function>"),
            Self::Remote(cmd) => serializer.serialize_str(cmd),
        }
    }
}

pub type Hooks = BTreeMap<HookPoint, Hook>;

/// Register `raw` at `point`. Nil is a no-op; functions become native
/// callbacks and strings remote commands.
pub fn register_hook(
    lua: &Lua,
    hooks: &mut Hooks,
    point: HookPoint,
    raw: Value,
) -> Result<(), EsshError> {
    let hook = match raw {
        Value::Nil => return Ok(()),
        Value::Function(func) => Hook::Native(Callback::new(lua, func).map_err(EsshError::Lua)?),
        Value::String(s) => Hook::Remote(s.to_string_lossy().to_string()),
        other => return Err(invalid_hook(point, &other)),
    };
    insert(hooks, point, hook);
    Ok(())
}

/// Like [`register_hook`] but only accepts strings, for points that run
/// out of process.
pub fn register_remote_hook(
    hooks: &mut Hooks,
    point: HookPoint,
    raw: Value,
) -> Result<(), EsshError> {
    let hook = match raw {
        Value::Nil => return Ok(()),
        Value::String(s) => Hook::Remote(s.to_string_lossy().to_string()),
        other => return Err(invalid_hook(point, &other)),
    };
    insert(hooks, point, hook);
    Ok(())
}

fn insert(hooks: &mut Hooks, point: HookPoint, hook: Hook) {
    if let Some(replacement) = point.replacement() {
        warn!("hook '{}' is deprecated, use '{}'", point, replacement);
    }
    hooks.insert(point, hook);
}

fn invalid_hook(point: HookPoint, value: &Value) -> EsshError {
    EsshError::validation(format!(
        "invalid hook type {} for '{}'",
        value.type_name(),
        point
    ))
}

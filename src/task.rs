//! Task definitions.
//!
//! A task captures the intent of a unit of work: what to run (`script` or
//! `file`), where (`on` hosts or `foreach` sources) and how (`pty`,
//! `parallel`, `privileged`, `prefix`). Running it is the executor's job.

use crate::context::TaskContext;
use crate::error::{CallbackError, EsshError};
use crate::hook::Callback;
use crate::value::{as_bool, as_callback, as_sequence, as_string, DynamicValue};
use mlua::{Lua, Table, Value};
use serde::Serialize;
use tracing::debug;

/// Output prefix used for tasks that run against hosts.
pub const DEFAULT_PREFIX_REMOTE: &str = "[remote:{{.Host.Name}}] ";

/// Output prefix used for tasks that run locally.
pub const DEFAULT_PREFIX_LOCAL: &str = "[local:{{.Host.Name}}] ";

#[derive(Debug, Clone, Default, Serialize)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub pty: bool,
    pub parallel: bool,
    pub privileged: bool,
    pub script: String,
    pub file: String,
    pub on: Vec<String>,
    pub foreach: Vec<String>,
    pub prefix: String,
    #[serde(skip)]
    pub prepare: Option<Prepare>,
}

impl Task {
    /// A zero-valued task named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Remote tasks target hosts through `on` or `foreach`.
    pub fn is_remote_task(&self) -> bool {
        !self.on.is_empty() || !self.foreach.is_empty()
    }

    /// Targets of the task, whichever of `on`/`foreach` is in use.
    pub fn targets(&self) -> &[String] {
        if self.on.is_empty() {
            &self.foreach
        } else {
            &self.on
        }
    }
}

/// Script-defined `prepare` callback.
#[derive(Debug, Clone)]
pub struct Prepare(Callback);

impl Prepare {
    /// Run the callback with a handle to `ctx`.
    ///
    /// `nil` or `true` is success, `false` is [`CallbackError::ReturnedFalse`]
    /// and a runtime failure is returned verbatim. Any other return value
    /// counts as success.
    pub fn call(&self, lua: &Lua, ctx: &mut TaskContext) -> Result<(), CallbackError> {
        let func = self.0.function(lua).map_err(CallbackError::Runtime)?;
        let ret = lua
            .scope(|scope| {
                let handle = scope.create_userdata_ref_mut(ctx)?;
                func.call::<Value>(handle)
            })
            .map_err(CallbackError::Runtime)?;

        match ret {
            Value::Boolean(false) => Err(CallbackError::ReturnedFalse),
            _ => Ok(()),
        }
    }
}

/// Build a task from its configuration table.
pub fn build_task(lua: &Lua, name: &str, config: &Table) -> Result<Task, EsshError> {
    let mut task = Task::new(name);

    if let Some(description) = as_string(&field(config, "description")) {
        task.description = description;
    }
    if let Some(pty) = as_bool(&field(config, "pty")) {
        task.pty = pty;
    }
    if let Some(parallel) = as_bool(&field(config, "parallel")) {
        task.parallel = parallel;
    }
    if let Some(privileged) = as_bool(&field(config, "privileged")) {
        task.privileged = privileged;
    }
    if let Some(script) = as_string(&field(config, "script")) {
        task.script = script;
    }
    if let Some(file) = as_string(&field(config, "file")) {
        task.file = file;
    }

    if !task.file.is_empty() && !task.script.is_empty() {
        return Err(EsshError::validation(
            "invalid task definition: can't use 'file' and 'script' at the same time.",
        ));
    }

    task.on = string_list(&field(config, "on"));
    task.foreach = string_list(&field(config, "foreach"));

    if !task.on.is_empty() && !task.foreach.is_empty() {
        return Err(EsshError::validation(
            "invalid task definition: can't use 'foreach' and 'on' at the same time.",
        ));
    }

    let prefix = field(config, "prefix");
    if let Some(enabled) = as_bool(&prefix) {
        if enabled {
            task.prefix = if task.is_remote_task() {
                DEFAULT_PREFIX_REMOTE.to_string()
            } else {
                DEFAULT_PREFIX_LOCAL.to_string()
            };
        }
    } else if let Some(prefix) = as_string(&prefix) {
        task.prefix = prefix;
    }

    let prepare = field(config, "prepare");
    if !prepare.is_nil() {
        let func = as_callback(&prepare)
            .ok_or_else(|| EsshError::validation("prepare have to be function."))?;
        task.prepare = Some(Prepare(Callback::new(lua, func).map_err(EsshError::Lua)?));
    }

    debug!(task = %task.name, remote = task.is_remote_task(), "built task");
    Ok(task)
}

fn field(config: &Table, key: &str) -> Value {
    config.raw_get(key).unwrap_or(Value::Nil)
}

/// A single string, or the string elements of a sequence. Other elements
/// are dropped.
fn string_list(value: &Value) -> Vec<String> {
    if let Some(s) = as_string(value) {
        return vec![s];
    }
    as_sequence(value)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match item {
            DynamicValue::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(lua: &Lua, src: &str) -> Result<Task, EsshError> {
        let config: Table = lua.load(src).eval().unwrap();
        build_task(lua, "t", &config)
    }

    #[test]
    fn test_defaults() {
        let lua = Lua::new();
        let task = build(&lua, "{}").unwrap();
        assert_eq!(task.name, "t");
        assert!(!task.pty && !task.parallel && !task.privileged);
        assert!(task.script.is_empty() && task.file.is_empty());
        assert!(task.on.is_empty() && task.foreach.is_empty());
        assert!(task.prefix.is_empty());
        assert!(task.prepare.is_none());
        assert!(!task.is_remote_task());
    }

    #[test]
    fn test_populates_flags() {
        let lua = Lua::new();
        let task = build(
            &lua,
            "{ description = 'deploy', pty = true, parallel = true, privileged = true, script = 'make' }",
        )
        .unwrap();
        assert_eq!(task.description, "deploy");
        assert!(task.pty && task.parallel && task.privileged);
        assert_eq!(task.script, "make");
    }

    #[test]
    fn test_shape_mismatch_is_absent() {
        let lua = Lua::new();
        let task = build(&lua, "{ pty = 'yes', description = 12 }").unwrap();
        assert!(!task.pty);
        assert!(task.description.is_empty());
    }

    #[test]
    fn test_file_and_script_conflict() {
        let lua = Lua::new();
        let err = build(&lua, "{ file = 'run.sh', script = 'ls' }").unwrap_err();
        assert!(err.to_string().contains("can't use 'file' and 'script'"));
    }

    #[test]
    fn test_empty_script_does_not_conflict() {
        let lua = Lua::new();
        let task = build(&lua, "{ file = 'run.sh', script = '' }").unwrap();
        assert_eq!(task.file, "run.sh");
    }

    #[test]
    fn test_on_coercion() {
        let lua = Lua::new();
        let task = build(&lua, "{ on = 'web' }").unwrap();
        assert_eq!(task.on, ["web"]);

        let task = build(&lua, "{ on = {'web', 1, 'db', true} }").unwrap();
        assert_eq!(task.on, ["web", "db"]);
        assert!(task.is_remote_task());
    }

    #[test]
    fn test_nested_targets_are_dropped() {
        let lua = Lua::new();
        let task = build(&lua, "local t = { 'web' }; t[2] = t; return { on = t }").unwrap();
        assert_eq!(task.on, ["web"]);

        let task = build(&lua, "{ foreach = { 'a', { 'b' }, 'c' } }").unwrap();
        assert_eq!(task.foreach, ["a", "c"]);
    }

    #[test]
    fn test_on_and_foreach_conflict() {
        let lua = Lua::new();
        let err = build(&lua, "{ on = 'web', foreach = {'db'} }").unwrap_err();
        assert!(err.to_string().contains("can't use 'foreach' and 'on'"));

        // a foreach with no string elements is empty and does not conflict
        let task = build(&lua, "{ on = 'web', foreach = {1, 2} }").unwrap();
        assert!(task.foreach.is_empty());
    }

    #[test]
    fn test_prefix_resolution() {
        let lua = Lua::new();
        assert_eq!(build(&lua, "{ prefix = true }").unwrap().prefix, DEFAULT_PREFIX_LOCAL);
        assert_eq!(
            build(&lua, "{ prefix = true, on = 'web' }").unwrap().prefix,
            DEFAULT_PREFIX_REMOTE
        );
        assert_eq!(
            build(&lua, "{ prefix = true, foreach = {'a'} }").unwrap().prefix,
            DEFAULT_PREFIX_REMOTE
        );
        assert_eq!(build(&lua, "{ prefix = false }").unwrap().prefix, "");
        assert_eq!(build(&lua, "{ prefix = '>> ' }").unwrap().prefix, ">> ");
    }

    #[test]
    fn test_prepare_must_be_function() {
        let lua = Lua::new();
        let err = build(&lua, "{ prepare = 'nope' }").unwrap_err();
        assert_eq!(err.to_string(), "prepare have to be function.");
    }

    #[test]
    fn test_prepare_outcomes() {
        let lua = Lua::new();
        let outcome = |body: &str| {
            let task = build(&lua, &format!("{{ prepare = function(ctx) {} end }}", body)).unwrap();
            let mut ctx = TaskContext::new();
            task.prepare.unwrap().call(&lua, &mut ctx)
        };

        assert!(outcome("").is_ok());
        assert!(outcome("return nil").is_ok());
        assert!(outcome("return true").is_ok());
        assert!(outcome("return 'anything'").is_ok());
        assert!(matches!(outcome("return false"), Err(CallbackError::ReturnedFalse)));

        let err = outcome("error('broken prepare')").unwrap_err();
        assert!(matches!(err, CallbackError::Runtime(_)));
        assert!(err.to_string().contains("broken prepare"));
    }

    #[test]
    fn test_prepare_writes_payload() {
        let lua = Lua::new();
        let task = build(&lua, "{ prepare = function(ctx) ctx:payload('ready') end }").unwrap();
        let mut ctx = TaskContext::new();
        task.prepare.unwrap().call(&lua, &mut ctx).unwrap();
        assert_eq!(ctx.payload, "ready");
    }

    #[test]
    fn test_returned_false_message() {
        assert_eq!(
            CallbackError::ReturnedFalse.to_string(),
            "returned false from the prepare function."
        );
    }
}

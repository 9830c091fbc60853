//! Configuration session.
//!
//! A [`Session`] owns one Lua runtime together with the hosts and tasks its
//! scripts define and the modules they require. Everything runs on the
//! thread that owns the session.
//!
//! # Lifecycle
//!
//! ```text
//! Session::new(loader)
//!     ↓
//! load_file / load_str      (scripts call Host, Task, essh.require)
//!     ↓
//! hosts / tasks             (read by the executor)
//!     ↓
//! fire_hook / prepare       (callbacks run back inside the runtime)
//!
//! reset() clears hosts and tasks; loaded modules stay cached.
//! ```

use crate::context::TaskContext;
use crate::error::Result;
use crate::hook::{Hook, HookPoint};
use crate::host::Host;
use crate::module::{ModuleLoader, ModuleRegistry};
use crate::runtime::init_lua_state;
use crate::task::Task;
use mlua::Lua;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Hosts and tasks defined so far, in definition order.
#[derive(Debug, Default)]
pub struct Inventory {
    pub hosts: Vec<Host>,
    pub tasks: Vec<Task>,
}

impl Inventory {
    pub fn clear(&mut self) {
        self.hosts.clear();
        self.tasks.clear();
    }
}

/// What happened when a hook point was fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    /// Nothing registered at this point
    Skipped,
    /// A native callback ran to completion
    Ran,
    /// A command the executor must run on the remote side
    Remote(String),
}

pub struct Session {
    lua: Lua,
}

impl Session {
    pub fn new(loader: impl ModuleLoader + 'static) -> Result<Self> {
        let lua = Lua::new();
        lua.set_app_data(Inventory::default());
        lua.set_app_data(ModuleRegistry::new(loader));
        init_lua_state(&lua)?;
        Ok(Self { lua })
    }

    /// The underlying runtime, for callers that need to evaluate ad hoc code.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Evaluate a configuration file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "evaluating configuration");
        let source = fs::read_to_string(path)?;
        self.eval(&source, &format!("@{}", path.display()))
    }

    /// Evaluate configuration source; `name` appears in error messages.
    pub fn load_str(&self, source: &str, name: &str) -> Result<()> {
        debug!(chunk = name, "evaluating configuration chunk");
        self.eval(source, name)
    }

    fn eval(&self, source: &str, name: &str) -> Result<()> {
        self.lua.load(source).set_name(name).exec()?;
        let (hosts, tasks) = self.counts();
        debug!(hosts, tasks, "configuration evaluated");
        Ok(())
    }

    fn counts(&self) -> (usize, usize) {
        self.lua
            .app_data_ref::<Inventory>()
            .map(|inv| (inv.hosts.len(), inv.tasks.len()))
            .unwrap_or_default()
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.lua
            .app_data_ref::<Inventory>()
            .map(|inv| inv.hosts.clone())
            .unwrap_or_default()
    }

    /// Hosts not marked `hidden`.
    pub fn hosts_visible(&self) -> Vec<Host> {
        self.hosts().into_iter().filter(|h| !h.hidden).collect()
    }

    pub fn hosts_by_tag(&self, tag: &str) -> Vec<Host> {
        self.hosts().into_iter().filter(|h| h.has_tag(tag)).collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lua
            .app_data_ref::<Inventory>()
            .map(|inv| inv.tasks.clone())
            .unwrap_or_default()
    }

    /// The last host defined under `name`.
    pub fn host(&self, name: &str) -> Option<Host> {
        self.hosts().into_iter().rev().find(|h| h.name == name)
    }

    /// The last task defined under `name`.
    pub fn task(&self, name: &str) -> Option<Task> {
        self.tasks().into_iter().rev().find(|t| t.name == name)
    }

    /// Hosts matched by `targets`, each of which is a host name or a tag.
    /// Every host appears once, in definition order.
    pub fn resolve_targets(&self, targets: &[String]) -> Vec<Host> {
        self.hosts()
            .into_iter()
            .filter(|h| targets.iter().any(|t| *t == h.name || h.has_tag(t)))
            .collect()
    }

    /// Clear hosts and tasks. Loaded modules stay cached.
    pub fn reset(&self) {
        if let Some(mut inventory) = self.lua.app_data_mut::<Inventory>() {
            inventory.clear();
        }
        debug!("inventory reset");
    }

    /// Names of the modules loaded so far.
    pub fn loaded_modules(&self) -> Vec<String> {
        self.lua
            .app_data_ref::<ModuleRegistry>()
            .map(|registry| registry.names())
            .unwrap_or_default()
    }

    /// Fire `point` for `host`. A failing native callback is reported as
    /// [`EsshError::Callback`](crate::EsshError::Callback).
    pub fn fire_hook(&self, host: &Host, point: HookPoint) -> Result<HookAction> {
        match host.hooks.get(&point) {
            None => Ok(HookAction::Skipped),
            Some(Hook::Native(callback)) => {
                debug!(host = %host.name, %point, "running hook");
                callback.call(&self.lua)?;
                Ok(HookAction::Ran)
            }
            Some(Hook::Remote(cmd)) => Ok(HookAction::Remote(cmd.clone())),
        }
    }

    /// Run the task's `prepare` callback, if any, against `ctx`.
    pub fn prepare(&self, task: &Task, ctx: &mut TaskContext) -> Result<()> {
        match &task.prepare {
            Some(prepare) => {
                debug!(task = %task.name, "running prepare");
                Ok(prepare.call(&self.lua, ctx)?)
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (hosts, tasks) = self.counts();
        f.debug_struct("Session")
            .field("hosts", &hosts)
            .field("tasks", &tasks)
            .field("modules", &self.loaded_modules())
            .finish()
    }
}

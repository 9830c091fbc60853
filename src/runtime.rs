//! Lua runtime bootstrap.
//!
//! Registers the entry points configuration scripts use:
//!
//! ```lua
//! Host "web01" { HostName = "192.168.0.10", tags = { "web" } }   -- DSL style
//! Task("deploy", { on = "web", script = "make deploy" })         -- procedural
//!
//! local base = essh.require("acme/base")
//! essh.reset()
//!
//! local json = require("essh.json")   -- see `library` for the others
//! ```

use crate::error::EsshError;
use crate::host::build_host;
use crate::library;
use crate::module;
use crate::session::Inventory;
use crate::task::build_task;
use mlua::{Function, Lua, Table};

/// Name of the namespace table exposed to scripts.
pub const NAMESPACE: &str = "essh";

type Builder = fn(&Lua, &str, &Table) -> Result<(), EsshError>;

/// Install globals, the `essh` namespace and library modules into `lua`.
///
/// The caller is responsible for attaching an [`Inventory`] and a
/// [`module::ModuleRegistry`] as app data.
pub fn init_lua_state(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    let host = entry_point(lua, define_host)?;
    let task = entry_point(lua, define_task)?;
    globals.set("Host", host.clone())?;
    globals.set("Task", task.clone())?;

    let namespace = lua.create_table()?;
    namespace.set("host", host)?;
    namespace.set("task", task)?;
    namespace.set(
        "require",
        lua.create_function(|lua, name: String| {
            module::require(lua, &name).map_err(EsshError::into_lua)
        })?,
    )?;
    namespace.set(
        "reset",
        lua.create_function(|lua, ()| {
            if let Some(mut inventory) = lua.app_data_mut::<Inventory>() {
                inventory.clear();
            }
            Ok(())
        })?,
    )?;
    globals.set(NAMESPACE, namespace)?;

    library::preload_all(lua)?;
    Ok(())
}

/// `Name(name, table)` defines immediately; `Name(name)` returns a
/// function that takes the table.
fn entry_point(lua: &Lua, build: Builder) -> mlua::Result<Function> {
    lua.create_function(move |lua, (name, config): (String, Option<Table>)| {
        match config {
            Some(config) => {
                build(lua, &name, &config).map_err(EsshError::into_lua)?;
                Ok(None)
            }
            None => {
                let deferred = lua.create_function(move |lua, config: Table| {
                    build(lua, &name, &config).map_err(EsshError::into_lua)
                })?;
                Ok(Some(deferred))
            }
        }
    })
}

fn define_host(lua: &Lua, name: &str, config: &Table) -> Result<(), EsshError> {
    let host = build_host(lua, name, config)?;
    inventory(lua)?.hosts.push(host);
    Ok(())
}

fn define_task(lua: &Lua, name: &str, config: &Table) -> Result<(), EsshError> {
    let task = build_task(lua, name, config)?;
    inventory(lua)?.tasks.push(task);
    Ok(())
}

fn inventory(lua: &Lua) -> Result<mlua::AppDataRefMut<'_, Inventory>, EsshError> {
    lua.app_data_mut::<Inventory>()
        .ok_or_else(|| EsshError::config("host/task inventory is not initialized"))
}

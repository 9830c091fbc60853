//! Library modules preloaded into the runtime.
//!
//! Scripts load them with `require`:
//!
//! | Module          | Functions                                                  |
//! |-----------------|------------------------------------------------------------|
//! | `essh.json`     | `encode(value)`, `decode(text)`                            |
//! | `essh.yaml`     | `dump(value)`, `parse(text)`                               |
//! | `essh.fs`       | `exists`, `isdir`, `isfile`, `read`, `write`, `mkdir`,     |
//! |                 | `remove`, `readdir`, `dirname`, `basename`                 |
//! | `essh.template` | `dostring(text, data)`, `dofile(path, data)`               |
//!
//! Fallible functions return their result, or `nil` and an error message;
//! they do not raise. Decoded `null`s become `nil`.

use crate::template;
use crate::value::convert;
use mlua::{IntoLuaMulti, Lua, LuaSerdeExt, MultiValue, SerializeOptions, Table, Value};
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tracing::debug;

type Loader = fn(&Lua, ()) -> mlua::Result<Table>;

/// Every library module, by the name scripts require it under.
const MODULES: [(&str, Loader); 4] = [
    ("essh.json", json_loader as Loader),
    ("essh.yaml", yaml_loader as Loader),
    ("essh.fs", fs_loader as Loader),
    ("essh.template", template_loader as Loader),
];

/// Register every library module in `package.preload`.
pub fn preload_all(lua: &Lua) -> mlua::Result<()> {
    let package: Table = lua.globals().get("package")?;
    let preload: Table = package.get("preload")?;
    for (name, loader) in MODULES {
        preload.set(name, lua.create_function(loader)?)?;
        debug!(module = name, "preloaded library module");
    }
    Ok(())
}

fn to_lua_options() -> SerializeOptions {
    SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false)
}

fn failure(lua: &Lua, err: impl Display) -> mlua::Result<MultiValue> {
    (Value::Nil, err.to_string()).into_lua_multi(lua)
}

fn returned<T: IntoLuaMulti>(lua: &Lua, result: Result<T, impl Display>) -> mlua::Result<MultiValue> {
    match result {
        Ok(value) => value.into_lua_multi(lua),
        Err(err) => failure(lua, err),
    }
}

// ============================================================================
// essh.json / essh.yaml
// ============================================================================

fn json_loader(lua: &Lua, _: ()) -> mlua::Result<Table> {
    let json = lua.create_table()?;
    json.set(
        "encode",
        lua.create_function(|lua, value: Value| {
            let encoded = lua
                .from_value::<serde_json::Value>(value)
                .map_err(|e| e.to_string())
                .and_then(|v| serde_json::to_string(&v).map_err(|e| e.to_string()));
            returned(lua, encoded)
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, text: String| {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => lua.to_value_with(&value, to_lua_options())?.into_lua_multi(lua),
                Err(err) => failure(lua, err),
            }
        })?,
    )?;
    Ok(json)
}

fn yaml_loader(lua: &Lua, _: ()) -> mlua::Result<Table> {
    let yaml = lua.create_table()?;
    yaml.set(
        "dump",
        lua.create_function(|lua, value: Value| {
            let dumped = lua
                .from_value::<serde_yaml::Value>(value)
                .map_err(|e| e.to_string())
                .and_then(|v| serde_yaml::to_string(&v).map_err(|e| e.to_string()));
            returned(lua, dumped)
        })?,
    )?;
    yaml.set(
        "parse",
        lua.create_function(|lua, text: String| {
            match serde_yaml::from_str::<serde_yaml::Value>(&text) {
                Ok(value) => lua.to_value_with(&value, to_lua_options())?.into_lua_multi(lua),
                Err(err) => failure(lua, err),
            }
        })?,
    )?;
    Ok(yaml)
}

// ============================================================================
// essh.fs
// ============================================================================

fn fs_loader(lua: &Lua, _: ()) -> mlua::Result<Table> {
    let module = lua.create_table()?;

    module.set(
        "exists",
        lua.create_function(|_, path: String| Ok(Path::new(&path).exists()))?,
    )?;
    module.set(
        "isdir",
        lua.create_function(|_, path: String| Ok(Path::new(&path).is_dir()))?,
    )?;
    module.set(
        "isfile",
        lua.create_function(|_, path: String| Ok(Path::new(&path).is_file()))?,
    )?;
    module.set(
        "read",
        lua.create_function(|lua, path: String| match fs::read(&path) {
            Ok(bytes) => lua.create_string(bytes)?.into_lua_multi(lua),
            Err(err) => failure(lua, err),
        })?,
    )?;
    module.set(
        "write",
        lua.create_function(|lua, (path, content): (String, mlua::String)| {
            returned(lua, fs::write(&path, content.as_bytes()).map(|()| true))
        })?,
    )?;
    module.set(
        "mkdir",
        lua.create_function(|lua, (path, recursive): (String, Option<bool>)| {
            let result = if recursive.unwrap_or(false) {
                fs::create_dir_all(&path)
            } else {
                fs::create_dir(&path)
            };
            returned(lua, result.map(|()| true))
        })?,
    )?;
    module.set(
        "remove",
        lua.create_function(|lua, (path, recursive): (String, Option<bool>)| {
            let path = Path::new(&path);
            let result = if path.is_dir() {
                if recursive.unwrap_or(false) {
                    fs::remove_dir_all(path)
                } else {
                    fs::remove_dir(path)
                }
            } else {
                fs::remove_file(path)
            };
            returned(lua, result.map(|()| true))
        })?,
    )?;
    module.set(
        "readdir",
        lua.create_function(|lua, path: String| {
            let names = fs::read_dir(&path).and_then(|entries| {
                let mut names = entries
                    .map(|entry| entry.map(|e| e.file_name().to_string_lossy().to_string()))
                    .collect::<std::io::Result<Vec<_>>>()?;
                names.sort();
                Ok(names)
            });
            returned(lua, names)
        })?,
    )?;
    module.set(
        "dirname",
        lua.create_function(|_, path: String| {
            let parent = match Path::new(&path).parent() {
                Some(p) if p.as_os_str().is_empty() => ".".to_string(),
                Some(p) => p.to_string_lossy().to_string(),
                None => path.clone(),
            };
            Ok(parent)
        })?,
    )?;
    module.set(
        "basename",
        lua.create_function(|_, path: String| {
            Ok(Path::new(&path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default())
        })?,
    )?;

    Ok(module)
}

// ============================================================================
// essh.template
// ============================================================================

fn template_loader(lua: &Lua, _: ()) -> mlua::Result<Table> {
    let module = lua.create_table()?;
    module.set(
        "dostring",
        lua.create_function(|lua, (text, data): (String, Value)| {
            returned(lua, template::render(&text, &convert(&data)))
        })?,
    )?;
    module.set(
        "dofile",
        lua.create_function(|lua, (path, data): (String, Value)| {
            match fs::read_to_string(&path) {
                Ok(text) => returned(lua, template::render(&text, &convert(&data))),
                Err(err) => failure(lua, err),
            }
        })?,
    )?;
    Ok(module)
}

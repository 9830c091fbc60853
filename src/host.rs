//! Host definitions.
//!
//! Only configuration keys starting with an upper-case letter are kept in
//! [`Host::config`]; those are the values exported to remote templating
//! (`User`, `HostName`, `Port`, ...). Lower-case keys (`hooks`, `tags`,
//! `description`, `hidden`) drive the host itself.

use crate::error::EsshError;
use crate::hook::{register_hook, register_remote_hook, HookPoint, Hooks};
use crate::value::{as_bool, as_string, as_table, convert, DynamicValue};
use mlua::{Lua, Table, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Host {
    pub name: String,
    pub config: BTreeMap<String, DynamicValue>,
    pub hooks: Hooks,
    pub description: String,
    pub hidden: bool,
    pub tags: Vec<String>,
}

impl Host {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Whether `key` is exported: its first character is upper-case.
pub fn is_exported_key(key: &str) -> bool {
    key.chars().next().is_some_and(char::is_uppercase)
}

/// Build a host from its configuration table.
pub fn build_host(lua: &Lua, name: &str, config: &Table) -> Result<Host, EsshError> {
    let mut host = Host {
        name: name.to_string(),
        ..Host::default()
    };

    for (key, value) in config.pairs::<Value, Value>().flatten() {
        let Some(key) = as_string(&key) else { continue };
        if is_exported_key(&key) {
            host.config.insert(key, convert(&value));
        }
    }

    // the first bad hook aborts the rest, in declaration order
    if let Some(hooks) = as_table(&field(config, "hooks")) {
        for point in HookPoint::iter() {
            let raw = field(&hooks, point.as_ref());
            if point.is_remote_only() {
                register_remote_hook(&mut host.hooks, point, raw)?;
            } else {
                register_hook(lua, &mut host.hooks, point, raw)?;
            }
        }
    }

    if let Some(description) = as_string(&field(config, "description")) {
        host.description = description;
    }
    if let Some(hidden) = as_bool(&field(config, "hidden")) {
        host.hidden = hidden;
    }

    host.tags = tags(&field(config, "tags"))?;

    debug!(host = %host.name, hooks = host.hooks.len(), tags = ?host.tags, "built host");
    Ok(host)
}

fn field(table: &Table, key: &str) -> Value {
    table.raw_get(key).unwrap_or(Value::Nil)
}

fn tags(value: &Value) -> Result<Vec<String>, EsshError> {
    let unsupported = || EsshError::validation("unsupported format of tags.");
    match convert(value) {
        DynamicValue::Nil => Ok(Vec::new()),
        DynamicValue::Mapping(m) if m.is_empty() => Ok(Vec::new()),
        DynamicValue::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                DynamicValue::String(s) => Ok(s),
                _ => Err(unsupported()),
            })
            .collect(),
        _ => Err(unsupported()),
    }
}

//! Execution state shared with script callbacks.

use mlua::{IntoLuaMulti, MultiValue, UserData, UserDataMethods};

/// Live, mutable state of a running task.
///
/// Scripts receive a handle to it inside `prepare`; the handle stops
/// working once the callback returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskContext {
    pub payload: String,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

impl UserData for TaskContext {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // ctx:payload() reads, ctx:payload(s) writes and returns nothing
        methods.add_method_mut("payload", |lua, this, value: Option<String>| {
            match value {
                Some(value) => {
                    this.payload = value;
                    Ok(MultiValue::new())
                }
                None => this.payload.clone().into_lua_multi(lua),
            }
        });
    }
}

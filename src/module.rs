//! Name-addressed configuration modules.
//!
//! `essh.require(name)` asks a [`ModuleLoader`] for the module's index
//! script, evaluates it once and caches the value it returns. Later requires
//! of the same name replay the cached value without touching the loader.
//!
//! Modules that require themselves, directly or through other modules, are
//! rejected with [`EsshError::Cycle`].

use crate::error::{find_essh_error, EsshError, LoaderError};
use mlua::{Lua, RegistryKey, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File evaluated when a module is required.
pub const INDEX_FILE: &str = "index.lua";

/// Locates (and, for remote sources, fetches) a module's index script.
///
/// Implementations must tolerate being asked for the same name twice.
pub trait ModuleLoader {
    fn materialize(&self, name: &str) -> Result<PathBuf, LoaderError>;
}

/// Resolves `name` to `<root>/<name>/index.lua` across a list of roots,
/// first match wins.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLoader {
    roots: Vec<PathBuf>,
}

impl DirectoryLoader {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ModuleLoader for DirectoryLoader {
    fn materialize(&self, name: &str) -> Result<PathBuf, LoaderError> {
        self.roots
            .iter()
            .map(|root| root.join(name))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(INDEX_FILE))
            .ok_or_else(|| LoaderError::NotFound {
                name: name.to_string(),
            })
    }
}

/// A loaded module and its cached value.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub index_file: PathBuf,
    value: RegistryKey,
}

/// Process-lifetime cache of loaded modules. Never cleared by `reset`.
pub struct ModuleRegistry {
    loader: Box<dyn ModuleLoader>,
    loaded: HashMap<String, Module>,
    /// Names whose index script is being evaluated, outermost first
    loading: Vec<String>,
}

impl ModuleRegistry {
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            loaded: HashMap::new(),
            loading: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.loaded.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.keys().cloned().collect();
        names.sort();
        names
    }
}

enum Lookup {
    Cached(Value),
    Load(PathBuf),
}

/// Require `name`, evaluating its index script on first use.
///
/// The registry lives in the runtime's app data; no borrow of it is held
/// while the index script runs, so nested requires are allowed.
pub fn require(lua: &Lua, name: &str) -> Result<Value, EsshError> {
    let lookup = {
        let mut registry = lua
            .app_data_mut::<ModuleRegistry>()
            .ok_or_else(|| EsshError::loader(name, "module registry is not initialized"))?;

        if let Some(module) = registry.loaded.get(name) {
            debug!(module = name, "module cache hit");
            Lookup::Cached(lua.registry_value(&module.value).map_err(EsshError::Lua)?)
        } else if registry.loading.iter().any(|n| n == name) {
            let mut chain = registry.loading.clone();
            chain.push(name.to_string());
            return Err(EsshError::Cycle { chain });
        } else {
            let index = registry
                .loader
                .materialize(name)
                .map_err(|e| EsshError::loader(name, e))?;
            registry.loading.push(name.to_string());
            Lookup::Load(index)
        }
    };

    let index = match lookup {
        Lookup::Cached(value) => return Ok(value),
        Lookup::Load(index) => index,
    };

    let result = evaluate(lua, name, &index);

    let mut registry = lua
        .app_data_mut::<ModuleRegistry>()
        .ok_or_else(|| EsshError::loader(name, "module registry is not initialized"))?;
    registry.loading.retain(|n| n != name);
    let value = result?;

    let key = lua.create_registry_value(value.clone()).map_err(EsshError::Lua)?;
    registry.loaded.insert(
        name.to_string(),
        Module {
            name: name.to_string(),
            index_file: index,
            value: key,
        },
    );
    info!(module = name, "loaded module");
    Ok(value)
}

fn evaluate(lua: &Lua, name: &str, index: &Path) -> Result<Value, EsshError> {
    if let Err(e) = fs::metadata(index) {
        let reason = LoaderError::MissingIndex {
            path: index.to_path_buf(),
        };
        debug!(module = name, error = %e, "index file not accessible");
        return Err(EsshError::loader(name, reason));
    }

    let source = fs::read_to_string(index).map_err(|e| EsshError::loader(name, e))?;
    debug!(module = name, index = %index.display(), "evaluating module");
    lua.load(source)
        .set_name(format!("@{}", index.display()))
        .eval::<Value>()
        .map_err(|err| match find_essh_error(&err) {
            // definitions inside the module already name their construct
            Some(inner) => inner.clone(),
            None => EsshError::loader(name, err),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct CountingLoader {
        inner: DirectoryLoader,
        calls: Arc<AtomicUsize>,
    }

    impl ModuleLoader for CountingLoader {
        fn materialize(&self, name: &str) -> Result<PathBuf, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.materialize(name)
        }
    }

    fn write_module(root: &Path, name: &str, source: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(INDEX_FILE), source).unwrap();
    }

    fn setup(root: &Path) -> (Lua, Arc<AtomicUsize>) {
        let lua = Lua::new();
        let calls = Arc::new(AtomicUsize::new(0));
        lua.set_app_data(ModuleRegistry::new(CountingLoader {
            inner: DirectoryLoader::new([root.to_path_buf()]),
            calls: calls.clone(),
        }));
        (lua, calls)
    }

    #[test]
    fn test_directory_loader_resolution() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write_module(second.path(), "acme/base", "return 1");

        let loader = DirectoryLoader::new([first.path().to_path_buf(), second.path().to_path_buf()]);
        let index = loader.materialize("acme/base").unwrap();
        assert_eq!(index, second.path().join("acme/base").join(INDEX_FILE));

        assert_eq!(
            loader.materialize("acme/missing"),
            Err(LoaderError::NotFound {
                name: "acme/missing".to_string()
            })
        );
    }

    #[test]
    fn test_require_is_memoized() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "m", "loads = (loads or 0) + 1; return { answer = 42 }");
        let (lua, calls) = setup(dir.path());

        let first = require(&lua, "m").unwrap();
        let second = require(&lua, "m").unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lua.globals().get::<i64>("loads").unwrap(), 1);
        assert_eq!(lua.app_data_ref::<ModuleRegistry>().unwrap().names(), ["m"]);
    }

    #[test]
    fn test_missing_module() {
        let dir = TempDir::new().unwrap();
        let (lua, _) = setup(dir.path());
        let err = require(&lua, "nope").unwrap_err();
        assert!(matches!(err, EsshError::Loader { ref module, .. } if module == "nope"));
    }

    #[test]
    fn test_missing_index_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        let (lua, _) = setup(dir.path());
        let err = require(&lua, "empty").unwrap_err();
        assert!(err.to_string().contains("is not accessible"));
    }

    #[test]
    fn test_script_error_names_module() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "broken", "error('bad module')");
        let (lua, _) = setup(dir.path());
        let err = require(&lua, "broken").unwrap_err();
        assert!(matches!(err, EsshError::Loader { ref module, .. } if module == "broken"));
        assert!(err.to_string().contains("bad module"));

        // a failed load is not cached and can be retried
        assert!(lua.app_data_ref::<ModuleRegistry>().unwrap().get("broken").is_none());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "a", "return require_module('b')");
        write_module(dir.path(), "b", "return require_module('a')");
        let (lua, _) = setup(dir.path());
        let require_fn = lua
            .create_function(|lua, name: String| require(lua, &name).map_err(EsshError::into_lua))
            .unwrap();
        lua.globals().set("require_module", require_fn).unwrap();

        let err = require(&lua, "a").unwrap_err();
        match err {
            EsshError::Cycle { chain } => assert_eq!(chain, ["a", "b", "a"]),
            other => panic!("expected cycle error, got {other}"),
        }
        assert!(lua.app_data_ref::<ModuleRegistry>().unwrap().loading.is_empty());
    }
}

//! Native module boundary: named tables of host functions that `Vm::import`
//! registers as global native-function values.

mod stdlib;

use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use crate::value::{NativeFn, ObjString, Value};

pub use stdlib::{DEV, IO};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unknown module '{0}'")]
    UnknownModule(String),
}

/// Failure raised by a native function; the VM turns it into a runtime fault.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What a native function may see of the running VM.
pub struct NativeContext<'vm> {
    pub globals: &'vm HashMap<Rc<ObjString>, Value>,
    /// Whole operand stack, bottom first. Includes the callee and arguments.
    pub stack: &'vm [Value],
    pub out: &'vm mut dyn Write,
}

#[derive(Debug, Clone, Copy)]
pub struct NativeSymbol {
    pub name: &'static str,
    pub doc: &'static str,
    pub function: NativeFn,
}

#[derive(Debug)]
pub struct NativeModule {
    pub name: &'static str,
    pub symbols: &'static [NativeSymbol],
}

impl NativeModule {
    pub fn symbol(&self, name: &str) -> Option<&NativeSymbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}

/// Resolves a module name to its symbol table.
pub trait ModuleLoader {
    fn load(&self, name: &str) -> Result<&NativeModule, ImportError>;
}

/// Loader for the modules compiled into this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinModules;

impl BuiltinModules {
    pub fn all() -> [&'static NativeModule; 2] {
        [&IO, &DEV]
    }
}

impl ModuleLoader for BuiltinModules {
    fn load(&self, name: &str) -> Result<&NativeModule, ImportError> {
        Self::all()
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| ImportError::UnknownModule(name.to_string()))
    }
}

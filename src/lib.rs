//! ff: a small dynamically typed scripting language. Source text is compiled
//! in one pass to bytecode and executed on a stack virtual machine.

pub mod chunk;
pub mod compiler;
pub mod config;
pub mod debug;
pub mod diagnostic;
pub mod lexer;
pub mod module;
pub mod value;
pub mod vm;

pub use compiler::{compile, CompileError, CompileErrors};
pub use config::VmConfig;
pub use value::Value;
pub use vm::{InterpretError, RuntimeError, RuntimeErrorKind, Vm};

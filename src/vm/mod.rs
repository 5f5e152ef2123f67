use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use log::{debug, info, log_enabled, trace, Level};

use crate::chunk::OpCode;
use crate::compiler::{self, CompileErrors};
use crate::config::VmConfig;
use crate::debug::disassemble_instruction;
use crate::module::{BuiltinModules, ImportError, ModuleLoader, NativeContext};
use crate::value::{format_number, Data, Interner, NativeFn, Obj, ObjFunction, ObjNative, ObjString, Value};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeErrorKind {
    #[error("operands must be numbers")]
    OperandsMustBeNumbers,
    #[error("operand must be a number")]
    OperandMustBeNumber,
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("cannot assign to const variable{}", quoted(.0))]
    AssignToConst(Option<String>),
    #[error("expected {expected} arguments but got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("can only call functions")]
    NotCallable,
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("invalid constant index {0}")]
    InvalidConstant(usize),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("malformed bytecode: {0}")]
    MalformedBytecode(&'static str),
    #[error("{name}: {message}")]
    Native { name: String, message: String },
    #[error("output error: {0}")]
    Io(#[from] io::Error),
}

fn quoted(name: &Option<String>) -> String {
    name.as_ref().map(|n| format!(" '{n}'")).unwrap_or_default()
}

/// A fault that stopped execution, with the line of the failing instruction.
#[derive(Debug, thiserror::Error)]
#[error("[line {line}] RuntimeError: {kind}")]
pub struct RuntimeError {
    pub line: usize,
    pub kind: RuntimeErrorKind,
    /// Active calls at the time of the fault, innermost first.
    pub trace: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileErrors),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

type VmResult<T> = Result<T, RuntimeErrorKind>;

/// One active invocation. The running frame is held by `execute`; suspended
/// callers live in `Vm::frames`.
#[derive(Debug)]
struct CallFrame {
    function: Rc<ObjFunction>,
    ip: usize,
    /// Offset of the instruction being executed, for line lookup.
    op_start: usize,
    /// Stack index of the callee; arguments start at `base + 1`.
    base: usize,
}

impl CallFrame {
    fn new(function: Rc<ObjFunction>, base: usize) -> Self {
        CallFrame { function, ip: 0, op_start: 0, base }
    }

    fn read_byte(&mut self) -> VmResult<u8> {
        let byte = *self
            .function
            .chunk
            .code
            .get(self.ip)
            .ok_or(RuntimeErrorKind::MalformedBytecode("unexpected end of code"))?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> VmResult<u16> {
        let value = self
            .function
            .chunk
            .read_u16(self.ip)
            .ok_or(RuntimeErrorKind::MalformedBytecode("truncated jump operand"))?;
        self.ip += 2;
        Ok(value)
    }

    fn read_index(&mut self, long: bool) -> VmResult<usize> {
        if !long {
            return self.read_byte().map(usize::from);
        }
        let value = self
            .function
            .chunk
            .read_u32(self.ip)
            .ok_or(RuntimeErrorKind::MalformedBytecode("truncated constant operand"))?;
        self.ip += 4;
        Ok(value as usize)
    }

    fn read_constant(&mut self, long: bool) -> VmResult<Value> {
        let index = self.read_index(long)?;
        self.function
            .chunk
            .constants
            .get(index)
            .cloned()
            .ok_or(RuntimeErrorKind::InvalidConstant(index))
    }

    fn read_name(&mut self, long: bool) -> VmResult<Rc<ObjString>> {
        let index = self.read_index(long)?;
        self.function
            .chunk
            .constants
            .get(index)
            .and_then(Value::as_string)
            .cloned()
            .ok_or(RuntimeErrorKind::InvalidConstant(index))
    }

    fn line(&self) -> usize {
        self.function.chunk.line_at(self.op_start)
    }
}

enum Flow {
    Continue,
    Finished,
}

pub struct Vm {
    config: VmConfig,
    frames: Vec<CallFrame>,
    stack: Vec<Value>,
    globals: HashMap<Rc<ObjString>, Value>,
    strings: Interner,
    out: Box<dyn Write>,
    loader: Box<dyn ModuleLoader>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Vm {
            stack: Vec::with_capacity(config.max_stack.min(1024)),
            frames: Vec::new(),
            config,
            globals: HashMap::new(),
            strings: Interner::new(),
            out: Box::new(io::stdout()),
            loader: Box::new(BuiltinModules),
        }
    }

    /// Sends `print` and native output to `out` instead of stdout.
    pub fn with_output(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn strings(&mut self) -> &mut Interner {
        &mut self.strings
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.iter().find(|(k, _)| k.as_str() == name).map(|(_, v)| v)
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Registers a host function as a global.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let name = self.strings.intern(name);
        let native = Rc::new(ObjNative { name: Rc::clone(&name), function });
        self.globals.insert(name, Value::from(native));
    }

    /// Resolves a module through the loader and registers every symbol.
    /// Returns the number of symbols registered.
    pub fn import(&mut self, name: &str) -> Result<usize, ImportError> {
        let symbols = self.loader.load(name)?.symbols;
        for symbol in symbols {
            self.define_native(symbol.name, symbol.function);
        }
        info!("imported module '{name}' ({} symbols)", symbols.len());
        Ok(symbols.len())
    }

    /// Compiles against this VM's string table without running.
    pub fn compile(&mut self, source: &str) -> Result<Rc<ObjFunction>, CompileErrors> {
        compiler::compile(source, &mut self.strings)
    }

    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let script = self.compile(source)?;
        self.run(script)?;
        Ok(())
    }

    /// Executes a compiled script. On a fault the stack and frames are reset.
    pub fn run(&mut self, script: Rc<ObjFunction>) -> Result<(), RuntimeError> {
        self.stack.clear();
        self.frames.clear();
        self.stack.push(Value::from(Rc::clone(&script)));

        let mut frame = CallFrame::new(script, 0);
        let result = self
            .execute(&mut frame)
            .and_then(|()| self.out.flush().map_err(RuntimeErrorKind::from));
        match result {
            Ok(()) => {
                debug!("script finished, {} globals", self.globals.len());
                Ok(())
            }
            Err(kind) => {
                let error = self.runtime_error(&frame, kind);
                let _ = self.out.flush();
                self.stack.clear();
                self.frames.clear();
                Err(error)
            }
        }
    }

    fn runtime_error(&self, frame: &CallFrame, kind: RuntimeErrorKind) -> RuntimeError {
        let trace = std::iter::once(frame)
            .chain(self.frames.iter().rev())
            .map(|f| match &f.function.name {
                Some(name) => format!("[line {}] in {name}()", f.line()),
                None => format!("[line {}] in script", f.line()),
            })
            .collect();
        RuntimeError { line: frame.line(), kind, trace }
    }

    fn execute(&mut self, frame: &mut CallFrame) -> VmResult<()> {
        let tracing = self.config.trace_execution && log_enabled!(Level::Trace);
        loop {
            if tracing {
                self.trace_instruction(frame);
            }
            match self.step(frame)? {
                Flow::Continue => {}
                Flow::Finished => return Ok(()),
            }
        }
    }

    fn trace_instruction(&self, frame: &CallFrame) {
        let stack: String = self.stack.iter().map(|v| format!("[ {v} ]")).collect();
        trace!("          {stack}");
        let (text, _) = disassemble_instruction(&frame.function.chunk, frame.ip);
        trace!("{text}");
    }

    fn step(&mut self, frame: &mut CallFrame) -> VmResult<Flow> {
        frame.op_start = frame.ip;
        let byte = frame.read_byte()?;
        let op = OpCode::try_from(byte).map_err(RuntimeErrorKind::UnknownOpcode)?;

        match op {
            OpCode::Constant | OpCode::ConstantLong => {
                let value = frame.read_constant(op == OpCode::ConstantLong)?;
                self.push(value)?;
            }
            OpCode::Null => self.push(Value::NULL)?,
            OpCode::True => self.push(Value::bool(true))?,
            OpCode::False => self.push(Value::bool(false))?,
            OpCode::Pop => {
                self.pop()?;
            }

            OpCode::DefineGlobal | OpCode::DefineGlobalLong => {
                let name = frame.read_name(op == OpCode::DefineGlobalLong)?;
                let value = self.pop()?;
                self.globals.insert(name, value);
            }
            OpCode::GetGlobal | OpCode::GetGlobalLong => {
                let name = frame.read_name(op == OpCode::GetGlobalLong)?;
                let value = match self.globals.get(&name) {
                    Some(value) => value.to_assignable(),
                    None => return Err(RuntimeErrorKind::UndefinedVariable(name.to_string())),
                };
                self.push(value)?;
            }
            OpCode::SetGlobal | OpCode::SetGlobalLong => {
                let name = frame.read_name(op == OpCode::SetGlobalLong)?;
                let value = self.peek(0)?.clone();
                match self.globals.get_mut(&name) {
                    None => return Err(RuntimeErrorKind::UndefinedVariable(name.to_string())),
                    Some(slot) if !slot.assignable => {
                        return Err(RuntimeErrorKind::AssignToConst(Some(name.to_string())));
                    }
                    Some(slot) => *slot = value,
                }
            }
            OpCode::GetLocal => {
                let slot = frame.base + frame.read_byte()? as usize;
                let value = self.stack.get(slot).ok_or(RuntimeErrorKind::StackUnderflow)?.to_assignable();
                self.push(value)?;
            }
            OpCode::SetLocal => {
                let slot = frame.base + frame.read_byte()? as usize;
                let value = self.peek(0)?.clone();
                let target = self.stack.get_mut(slot).ok_or(RuntimeErrorKind::StackUnderflow)?;
                if !target.assignable {
                    return Err(RuntimeErrorKind::AssignToConst(None));
                }
                *target = value;
            }
            OpCode::MakeConst => {
                let value = self.pop()?.into_const();
                self.push(value)?;
            }

            OpCode::Not => {
                let value = self.pop()?;
                self.push(Value::bool(value.is_falsey()))?;
            }
            OpCode::Negate => {
                let n = self.peek(0)?.as_number().ok_or(RuntimeErrorKind::OperandMustBeNumber)?;
                self.pop()?;
                self.push(Value::number(-n))?;
            }
            OpCode::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::bool(a == b))?;
            }
            OpCode::Greater => self.binary_number(|a, b| Value::bool(a > b))?,
            OpCode::Less => self.binary_number(|a, b| Value::bool(a < b))?,
            OpCode::Add => self.add()?,
            OpCode::Subtract => self.binary_number(|a, b| Value::number(a - b))?,
            OpCode::Multiply => self.binary_number(|a, b| Value::number(a * b))?,
            OpCode::Divide => self.binary_number(|a, b| Value::number(a / b))?,

            OpCode::Jump => {
                let offset = frame.read_u16()?;
                frame.ip += offset as usize;
            }
            OpCode::JumpIfFalse => {
                let offset = frame.read_u16()?;
                if self.peek(0)?.is_falsey() {
                    frame.ip += offset as usize;
                }
            }
            OpCode::Loop => {
                let offset = frame.read_u16()?;
                frame.ip = frame
                    .ip
                    .checked_sub(offset as usize)
                    .ok_or(RuntimeErrorKind::MalformedBytecode("loop before start of code"))?;
            }

            OpCode::Call => {
                let arg_count = frame.read_byte()?;
                self.call_value(frame, arg_count as usize)?;
            }
            OpCode::Print => {
                let value = self.pop()?;
                writeln!(self.out, "{value}")?;
            }
            OpCode::Return => {
                let result = self.pop()?;
                self.stack.truncate(frame.base);
                match self.frames.pop() {
                    None => return Ok(Flow::Finished),
                    Some(caller) => {
                        self.push(result)?;
                        *frame = caller;
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn call_value(&mut self, frame: &mut CallFrame, arg_count: usize) -> VmResult<()> {
        let callee_index = self
            .stack
            .len()
            .checked_sub(arg_count + 1)
            .ok_or(RuntimeErrorKind::StackUnderflow)?;

        match &self.stack[callee_index].data {
            Data::Obj(Obj::Function(function)) => {
                if arg_count != function.arity {
                    return Err(RuntimeErrorKind::ArityMismatch { expected: function.arity, got: arg_count });
                }
                // suspended callers + the running frame + the new one
                if self.frames.len() + 2 > self.config.max_frames {
                    return Err(RuntimeErrorKind::StackOverflow);
                }
                let callee = CallFrame::new(Rc::clone(function), callee_index);
                let caller = mem::replace(frame, callee);
                self.frames.push(caller);
                Ok(())
            }
            Data::Obj(Obj::Native(native)) => {
                let native = Rc::clone(native);
                let result = {
                    let mut ctx = NativeContext { globals: &self.globals, stack: &self.stack, out: &mut *self.out };
                    (native.function)(&mut ctx, &self.stack[callee_index + 1..])
                };
                let result = result.map_err(|e| RuntimeErrorKind::Native {
                    name: native.name.to_string(),
                    message: e.to_string(),
                })?;
                self.stack.truncate(callee_index);
                self.push(result)
            }
            _ => Err(RuntimeErrorKind::NotCallable),
        }
    }

    fn add(&mut self) -> VmResult<()> {
        enum Sum {
            Number(f64),
            Text(String),
        }

        let len = self.stack.len();
        if len < 2 {
            return Err(RuntimeErrorKind::StackUnderflow);
        }
        let sum = match (&self.stack[len - 2].data, &self.stack[len - 1].data) {
            (Data::Number(a), Data::Number(b)) => Sum::Number(a + b),
            (Data::Obj(Obj::String(a)), Data::Obj(Obj::String(b))) => Sum::Text(format!("{a}{b}")),
            (Data::Obj(Obj::String(a)), Data::Number(b)) => Sum::Text(format!("{a}{}", format_number(*b))),
            (Data::Number(a), Data::Obj(Obj::String(b))) => Sum::Text(format!("{}{b}", format_number(*a))),
            _ => return Err(RuntimeErrorKind::OperandsMustBeNumbers),
        };
        self.stack.truncate(len - 2);

        let value = match sum {
            Sum::Number(n) => Value::number(n),
            Sum::Text(text) => Value::from(self.strings.intern(&text)),
        };
        self.push(value)
    }

    fn binary_number(&mut self, op: impl Fn(f64, f64) -> Value) -> VmResult<()> {
        let (Some(a), Some(b)) = (self.peek(1)?.as_number(), self.peek(0)?.as_number()) else {
            return Err(RuntimeErrorKind::OperandsMustBeNumbers);
        };
        self.stack.truncate(self.stack.len() - 2);
        self.push(op(a, b))
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= self.config.max_stack {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    /// distance 0 is the top of the stack
    fn peek(&self, distance: usize) -> VmResult<&Value> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or(RuntimeErrorKind::StackUnderflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn vm_with_capture(config: VmConfig) -> (Vm, Capture) {
        let capture = Capture::default();
        let vm = Vm::with_config(config).with_output(Box::new(capture.clone()));
        (vm, capture)
    }

    fn run(source: &str) -> String {
        let (mut vm, out) = vm_with_capture(VmConfig::default());
        if let Err(e) = vm.interpret(source) {
            panic!("interpret failed: {e}\noutput so far:\n{}", out.text());
        }
        out.text()
    }

    fn run_err(source: &str) -> RuntimeError {
        let (mut vm, _) = vm_with_capture(VmConfig::default());
        match vm.interpret(source) {
            Err(InterpretError::Runtime(e)) => e,
            Err(InterpretError::Compile(e)) => panic!("unexpected compile error: {e}"),
            Ok(()) => panic!("expected runtime error for: {source}"),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(run("print 1 + 2 * 3;"), "7\n");
        assert_eq!(run("print (1 + 2) * 3;"), "9\n");
        assert_eq!(run("print 10 - 4 - 3;"), "3\n");
        assert_eq!(run("print -2 * 3;"), "-6\n");
        assert_eq!(run("print 7 / 2;"), "3.5\n");
    }

    #[test]
    fn comparisons_and_equality() {
        assert_eq!(run("print 1 < 2; print 2 <= 2; print 3 > 4; print 3 >= 4;"), "true\ntrue\nfalse\nfalse\n");
        assert_eq!(run("print 1 == 1; print 1 != 1; print null == false;"), "true\nfalse\nfalse\n");
        assert_eq!(run(r#"print "a" == "a"; print "a" == "b";"#), "true\nfalse\n");
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(run("print true and 2; print false and undefined;"), "2\nfalse\n");
        assert_eq!(run("print null or 3; print 1 or undefined;"), "3\n1\n");
        assert_eq!(run("print !0; print !1;"), "true\nfalse\n");
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(run(r#"print "a" + "b" + "c";"#), "abc\n");
        assert_eq!(run(r#"print "n=" + 1.5; print 2 + "x";"#), "n=1.5\n2x\n");
    }

    #[test]
    fn concatenation_is_interned() {
        let (mut vm, _) = vm_with_capture(VmConfig::default());
        vm.interpret(r#"var s = "ab" + "c";"#).unwrap();
        let s = vm.global("s").and_then(Value::as_string).cloned().unwrap();
        assert!(Rc::ptr_eq(&s, &vm.strings().intern("abc")));
    }

    #[test]
    fn type_errors() {
        let err = run_err("print 1 - \"a\";");
        assert!(matches!(err.kind, RuntimeErrorKind::OperandsMustBeNumbers));
        assert_eq!(err.to_string(), "[line 1] RuntimeError: operands must be numbers");

        let err = run_err("print -true;");
        assert!(matches!(err.kind, RuntimeErrorKind::OperandMustBeNumber));

        let err = run_err("print true + 1;");
        assert!(matches!(err.kind, RuntimeErrorKind::OperandsMustBeNumbers));
    }

    #[test]
    fn undefined_variable_reports_line() {
        let err = run_err("var a = 1;\nprint b;");
        assert_eq!(err.line, 2);
        assert_eq!(err.to_string(), "[line 2] RuntimeError: undefined variable 'b'");

        let err = run_err("b = 1;");
        assert!(matches!(err.kind, RuntimeErrorKind::UndefinedVariable(ref n) if n == "b"));
    }

    #[test]
    fn const_global_cannot_be_assigned() {
        let err = run_err("const x = 1; x = 2;");
        assert_eq!(err.to_string(), "[line 1] RuntimeError: cannot assign to const variable 'x'");
        assert_eq!(run("var x = 1; x = 2; print x;"), "2\n");
    }

    #[test]
    fn const_local_cannot_be_assigned() {
        let err = run_err("{ const x = 1; x = 2; }");
        assert!(matches!(err.kind, RuntimeErrorKind::AssignToConst(None)));
    }

    #[test]
    fn copy_of_const_is_mutable() {
        assert_eq!(run("const c = 1; var y = c; y = 5; print y; print c;"), "5\n1\n");
    }

    #[test]
    fn calls_and_returns() {
        assert_eq!(run("fn add(a, b) { return a + b; } print add(1, 2);"), "3\n");
        assert_eq!(run("fn nothing() {} print nothing();"), "null\n");
        assert_eq!(
            run("fn fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);"),
            "55\n"
        );
    }

    #[test]
    fn arity_mismatch() {
        let err = run_err("fn f(a, b) {} f(1);");
        assert!(matches!(err.kind, RuntimeErrorKind::ArityMismatch { expected: 2, got: 1 }));
        assert_eq!(err.kind.to_string(), "expected 2 arguments but got 1");
    }

    #[test]
    fn calling_non_function() {
        let err = run_err("var x = 1; x();");
        assert!(matches!(err.kind, RuntimeErrorKind::NotCallable));
        let err = run_err(r#""text"();"#);
        assert!(matches!(err.kind, RuntimeErrorKind::NotCallable));
    }

    #[test]
    fn unbounded_recursion_overflows() {
        let (mut vm, _) = vm_with_capture(VmConfig::with_max_frames(16));
        let err = vm.interpret("fn f() { f(); } f();").unwrap_err();
        match err {
            InterpretError::Runtime(e) => {
                assert!(matches!(e.kind, RuntimeErrorKind::StackOverflow));
                assert_eq!(e.trace.len(), 16);
                assert_eq!(e.trace.last().map(String::as_str), Some("[line 1] in script"));
                assert_eq!(e.trace[0], "[line 1] in f()");
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn runtime_error_trace_names_functions() {
        let err = run_err("fn inner() {\n  return 1 + nil_value;\n}\nfn outer() {\n  inner();\n}\nouter();");
        assert_eq!(err.line, 2);
        assert_eq!(err.trace, vec!["[line 2] in inner()", "[line 5] in outer()", "[line 7] in script"]);
    }

    #[test]
    fn native_functions_receive_arguments() {
        let (mut vm, out) = vm_with_capture(VmConfig::default());
        vm.import("io").unwrap();
        vm.interpret(r#"println("sum:", 1 + 2); var r = println(); print r;"#).unwrap();
        assert_eq!(out.text(), "sum: 3 \n\nnull\n");
    }

    #[test]
    fn native_sees_stack() {
        let (mut vm, out) = vm_with_capture(VmConfig::default());
        vm.import("dev").unwrap();
        vm.interpret("print_stack();").unwrap();
        // script slot, then the callee itself
        assert_eq!(out.text(), "<native fn>\n<script>\n");
    }

    #[test]
    fn import_unknown_module() {
        let mut vm = Vm::new();
        assert!(matches!(vm.import("nope"), Err(ImportError::UnknownModule(_))));
    }

    #[test]
    fn globals_persist_between_runs() {
        let (mut vm, out) = vm_with_capture(VmConfig::default());
        vm.interpret("var count = 1;").unwrap();
        vm.interpret("count = count + 1; print count;").unwrap();
        assert_eq!(out.text(), "2\n");
    }

    #[test]
    fn stack_is_empty_after_run_and_after_fault() {
        let (mut vm, _) = vm_with_capture(VmConfig::default());
        vm.interpret("{ var a = 1; var b = 2; print a + b; }").unwrap();
        assert_eq!(vm.stack_len(), 0);
        assert!(vm.interpret("print 1 + nil;").is_err());
        assert_eq!(vm.stack_len(), 0);
    }

    fn many_globals(keyword: &str) -> String {
        (0..300).map(|i| format!("{keyword} g{i} = {i};\n")).collect()
    }

    #[test]
    fn long_global_operands() {
        let source = format!("{}g299 = g299 + 1;\nprint g299;", many_globals("var"));
        let (mut vm, out) = vm_with_capture(VmConfig::default());

        let script = vm.compile(&source).unwrap();
        let listing = crate::debug::disassemble_function(&script);
        for op in ["OP_DEFINE_GLOBAL_LONG", "OP_GET_GLOBAL_LONG", "OP_SET_GLOBAL_LONG"] {
            assert!(listing.contains(op), "{op} not emitted");
        }

        vm.run(script).unwrap();
        assert_eq!(out.text(), "300\n");
    }

    #[test]
    fn long_const_global_cannot_be_assigned() {
        let source = format!("{}print g299;\ng299 = 1;", many_globals("const"));
        let (mut vm, out) = vm_with_capture(VmConfig::default());
        match vm.interpret(&source) {
            Err(InterpretError::Runtime(e)) => {
                assert_eq!(e.line, 302);
                assert!(matches!(e.kind, RuntimeErrorKind::AssignToConst(Some(ref n)) if n == "g299"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(out.text(), "299\n");
    }

    #[test]
    fn top_level_return_ends_script() {
        assert_eq!(run("print 1; return; print 2;"), "1\n");
    }

    #[test]
    fn division_by_zero_is_infinite() {
        assert_eq!(run("print 1 / 0;"), "inf\n");
    }

    #[test]
    fn compile_errors_are_returned() {
        let (mut vm, _) = vm_with_capture(VmConfig::default());
        match vm.interpret("print ;") {
            Err(InterpretError::Compile(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected: {other:?}"),
        }
    }
}

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::debug;

use ff::compiler::CompileErrors;
use ff::config::{VmConfig, FRAMES_MAX};
use ff::debug::disassemble_function;
use ff::diagnostic::ansi::AnsiRenderer;
use ff::diagnostic::{json, Diagnostic};
use ff::vm::{RuntimeError, Vm};

// sysexits.h
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;
const EX_IOERR: u8 = 74;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum ErrorFormat {
    /// `[line N] Error at 'x': message`
    #[default]
    Plain,
    /// Message with the offending source line
    Pretty,
    /// One JSON object per error
    Json,
}

#[derive(Parser)]
#[command(name = "ff", version)]
#[command(about = "Run ff scripts, or start a REPL when no file is given", long_about = None)]
struct Cli {
    /// Script to run
    file: Option<PathBuf>,

    /// Register a native module before running (repeatable); `io` is always loaded
    #[arg(long = "import", value_name = "MODULE")]
    imports: Vec<String>,

    /// Print the bytecode of every compiled function to stderr before running
    #[arg(long)]
    dump: bool,

    /// How compile and runtime errors are written to stderr
    #[arg(long, value_enum, default_value = "plain")]
    error_format: ErrorFormat,

    /// Maximum call depth
    #[arg(long, default_value_t = FRAMES_MAX)]
    max_frames: usize,

    /// Log every executed instruction and the stack (trace level)
    #[arg(long)]
    trace: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

struct Reporter {
    format: ErrorFormat,
    use_color: bool,
}

impl Reporter {
    fn emit(&self, diagnostic: Diagnostic, plain: &[String]) {
        match self.format {
            ErrorFormat::Plain => {
                for line in plain {
                    eprintln!("{line}");
                }
            }
            ErrorFormat::Pretty => eprint!("{}", AnsiRenderer { use_color: self.use_color }.render(&diagnostic)),
            ErrorFormat::Json => eprintln!("{}", json::render(&diagnostic)),
        }
    }

    fn compile_errors(&self, errors: &CompileErrors, source: &str) {
        for error in errors {
            self.emit(Diagnostic::from(error).with_source(source), &[error.to_string()]);
        }
    }

    fn runtime_error(&self, error: &RuntimeError, source: &str) {
        let mut plain = vec![error.to_string()];
        plain.extend(error.trace.iter().cloned());
        self.emit(Diagnostic::from(error).with_source(source), &plain);
    }
}

enum Failure {
    Compile,
    Runtime,
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::Compile => EX_DATAERR,
            Failure::Runtime => EX_SOFTWARE,
        }
    }
}

struct Session {
    vm: Vm,
    reporter: Reporter,
    dump: bool,
}

impl Session {
    fn execute(&mut self, source: &str) -> Result<(), Failure> {
        let script = match self.vm.compile(source) {
            Ok(script) => script,
            Err(errors) => {
                self.reporter.compile_errors(&errors, source);
                return Err(Failure::Compile);
            }
        };
        if self.dump {
            eprint!("{}", disassemble_function(&script));
        }
        self.vm.run(script).map_err(|e| {
            self.reporter.runtime_error(&e, source);
            Failure::Runtime
        })
    }

    fn run_file(&mut self, path: &Path) -> u8 {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("could not read file '{}': {e}", path.display());
                return EX_IOERR;
            }
        };
        debug!("running {} ({} bytes)", path.display(), source.len());
        match self.execute(&source) {
            Ok(()) => 0,
            Err(failure) => failure.exit_code(),
        }
    }

    fn repl(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("> ");
            io::stdout().flush()?;

            let Some(line) = lines.next().transpose()? else {
                println!();
                return Ok(());
            };
            // errors were already reported; the session keeps going
            let _ = self.execute(&line);
        }
    }
}

fn init_logging(cli: &Cli) {
    let default = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { EX_USAGE } else { 0 });
        }
    };
    init_logging(&cli);

    let config = VmConfig { trace_execution: cli.trace, ..VmConfig::with_max_frames(cli.max_frames) };
    let mut vm = Vm::with_config(config);
    for module in std::iter::once("io").chain(cli.imports.iter().map(String::as_str)) {
        if let Err(e) = vm.import(module) {
            eprintln!("{e}");
            return ExitCode::from(EX_USAGE);
        }
    }

    let mut session = Session {
        vm,
        reporter: Reporter { format: cli.error_format, use_color: io::stderr().is_terminal() },
        dump: cli.dump,
    };

    match &cli.file {
        Some(path) => ExitCode::from(session.run_file(path)),
        None => match session.repl() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{e}");
                ExitCode::from(EX_IOERR)
            }
        },
    }
}

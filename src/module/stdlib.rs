use super::{NativeContext, NativeError, NativeModule, NativeSymbol};
use crate::value::Value;

pub static IO: NativeModule = NativeModule {
    name: "io",
    symbols: &[
        NativeSymbol {
            name: "println",
            doc: "Write every argument followed by a space, then a newline.",
            function: println,
        },
        NativeSymbol { name: "printf", doc: "Alias of println.", function: println },
    ],
};

pub static DEV: NativeModule = NativeModule {
    name: "dev",
    symbols: &[
        NativeSymbol {
            name: "print_globals",
            doc: "Write `name = value` for every global, sorted by name.",
            function: print_globals,
        },
        NativeSymbol {
            name: "print_stack",
            doc: "Write the operand stack, top first.",
            function: print_stack,
        },
    ],
};

fn println(ctx: &mut NativeContext<'_>, args: &[Value]) -> Result<Value, NativeError> {
    for arg in args {
        write!(ctx.out, "{arg} ")?;
    }
    writeln!(ctx.out)?;
    Ok(Value::NULL)
}

fn print_globals(ctx: &mut NativeContext<'_>, _args: &[Value]) -> Result<Value, NativeError> {
    let mut entries: Vec<_> = ctx.globals.iter().collect();
    entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    for (name, value) in entries {
        writeln!(ctx.out, "{name} = {value}")?;
    }
    Ok(Value::bool(true))
}

fn print_stack(ctx: &mut NativeContext<'_>, _args: &[Value]) -> Result<Value, NativeError> {
    for value in ctx.stack.iter().rev() {
        writeln!(ctx.out, "{value}")?;
    }
    Ok(Value::bool(true))
}

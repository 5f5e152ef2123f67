use std::fmt::Write;

use super::{Diagnostic, SourceMap};

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        let header = self.bold_red(&format!("{} error", d.kind));
        let _ = writeln!(out, "{header}: {}", self.bold(&d.message));

        if let (Some(label), Some(source)) = (&d.label, &d.source) {
            let map = SourceMap::new(source);
            let (line, col) = if label.has_span() { map.lookup(label.span.start) } else { (label.line, 1) };
            let line_text = map.line_text(source, line).trim_end_matches(['\r', '\n']);

            let gutter = line.to_string().len();
            let pipe = self.cyan("|");
            let pad = " ".repeat(gutter);

            let _ = writeln!(out, "  {} {line}:{col}", self.cyan("-->"));
            let _ = writeln!(out, "{pad} {pipe}");
            let _ = writeln!(out, "{} {pipe} {line_text}", self.cyan(&format!("{line:>gutter$}")));

            if label.has_span() {
                let indent = " ".repeat(col.saturating_sub(1));
                let carets = self.bold_red(&"^".repeat(label.span.len().max(1)));
                if label.message.is_empty() {
                    let _ = writeln!(out, "{pad} {pipe} {indent}{carets}");
                } else {
                    let _ = writeln!(out, "{pad} {pipe} {indent}{carets} {}", self.bold_red(&label.message));
                }
            }
            let _ = writeln!(out, "{pad} {pipe}");
        } else if let Some(line) = d.line() {
            let _ = writeln!(out, "  {} line {line}", self.cyan("-->"));
        }

        for note in &d.notes {
            let _ = writeln!(out, "  {} {note}", self.dim("="));
        }

        out
    }
}

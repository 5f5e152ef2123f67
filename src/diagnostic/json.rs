use serde::Serialize;

use super::{Diagnostic, SourceMap};

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: &'static str,
    kind: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<JsonLabel<'a>>,
    notes: &'a [String],
}

#[derive(Serialize)]
struct JsonLabel<'a> {
    line: usize,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    col: Option<usize>,
}

/// One diagnostic as a single-line JSON object.
pub fn render(d: &Diagnostic) -> String {
    let label = d.label.as_ref().map(|l| {
        let span = l.has_span().then_some(l.span);
        JsonLabel {
            line: l.line,
            message: &l.message,
            start: span.map(|s| s.start),
            end: span.map(|s| s.end),
            col: span.zip(d.source.as_deref()).map(|(s, source)| SourceMap::new(source).lookup(s.start).1),
        }
    });
    let json = JsonDiagnostic {
        severity: "error",
        kind: d.kind,
        message: &d.message,
        label,
        notes: &d.notes,
    };

    serde_json::to_string(&json)
        .unwrap_or_else(|_| r#"{"severity":"error","message":"internal error serializing diagnostic"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Span;

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn render_basic_error() {
        let v = parse_json(&render(&Diagnostic::error("runtime", "stack overflow")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["kind"], "runtime");
        assert_eq!(v["message"], "stack overflow");
        assert!(v.get("label").is_none());
    }

    #[test]
    fn render_span_with_column() {
        let d = Diagnostic::error("compile", "expected expression")
            .with_span(1, Span { start: 8, end: 9 }, "at ';'")
            .with_source("var x = ;");
        let v = parse_json(&render(&d));
        let label = &v["label"];
        assert_eq!(label["line"], 1);
        assert_eq!(label["start"], 8);
        assert_eq!(label["end"], 9);
        assert_eq!(label["col"], 9);
        assert_eq!(label["message"], "at ';'");
    }

    #[test]
    fn render_line_only_label() {
        let d = Diagnostic::error("runtime", "undefined variable 'x'")
            .with_line(3, "")
            .with_note("[line 3] in script");
        let v = parse_json(&render(&d));
        assert_eq!(v["label"]["line"], 3);
        assert!(v["label"].get("start").is_none());
        assert_eq!(v["notes"][0], "[line 3] in script");
    }

    #[test]
    fn output_is_one_line() {
        let d = Diagnostic::error("compile", "multi\nline").with_note("a\nb");
        assert!(!render(&d).contains('\n'));
    }
}

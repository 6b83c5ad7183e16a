//! The value tree written back to the host document.
//!
//! Results round-trip into the document as Typst source that
//! `eval(read(file))` accepts, so every variant knows how to print itself as
//! a Typst literal.

use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Str(String),
    Int(i64),
    /// Ordered sequence, printed as an array literal.
    Array(Vec<Value>),
    /// Ordered mapping, printed as a dictionary literal.
    Dict(Vec<(String, Value)>),
    /// Raw (monospace) content.
    Raw(String),
    /// Content tinted with a fill color (hex digits, no leading `#`).
    Text { fill: String, body: Box<Value> },
    Linebreak,
    /// Content pieces joined into one sequence.
    Seq(Vec<Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Typst literal source for this value.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) {
        match self {
            Value::None => out.push_str("none"),
            Value::Str(s) => write_str(out, s),
            Value::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Array(items) => write_items(out, items, ")"),
            Value::Dict(entries) => {
                if entries.is_empty() {
                    out.push_str("(:)");
                    return;
                }
                out.push('(');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_key(out, key);
                    out.push_str(": ");
                    value.write_repr(out);
                }
                out.push(')');
            }
            Value::Raw(s) => {
                out.push_str("raw(");
                write_str(out, s);
                out.push(')');
            }
            Value::Text { fill, body } => {
                out.push_str("text(fill: rgb(");
                write_str(out, &format!("#{fill}"));
                out.push_str("), ");
                body.write_repr(out);
                out.push(')');
            }
            Value::Linebreak => out.push_str("linebreak()"),
            // An array of content joined into one sequence; join() of an
            // empty array evaluates to none, which displays as nothing.
            Value::Seq(items) => write_items(out, items, ").join()"),
        }
    }
}

fn write_items(out: &mut String, items: &[Value], close: &str) {
    out.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out);
    }
    // A one-element tuple needs the trailing comma to stay an array.
    if items.len() == 1 {
        out.push(',');
    }
    out.push_str(close);
}

fn write_key(out: &mut String, key: &str) {
    let identifier = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if identifier {
        out.push_str(key);
    } else {
        write_str(out, key);
    }
}

fn write_str(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || matches!(c, '\u{0085}' | '\u{2028}' | '\u{2029}') => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

//! `serde_json` formatter honouring [`JsonOptions`].
//!
//! Compact output matches `serde_json::ser::CompactFormatter`. With an indent
//! prefix or value configured, every nested element starts on a new line made
//! of the prefix followed by one indent value per nesting level. The first
//! line carries no prefix.
//!
//! Keys are written in the order the value serializes them. Map keys are not
//! sorted: a `HashMap` payload comes out in arbitrary order, so use a
//! `BTreeMap` (or a struct) when responses must be stable.

use std::io;

use serde_json::ser::Formatter;

use super::JsonOptions;

/// Formatter used for every encoded response.
pub(crate) struct ResponseFormatter<'a> {
    escape_html: bool,
    /// `(prefix, indent)` when pretty printing.
    indent: Option<(&'a [u8], &'a [u8])>,
    depth: usize,
    has_value: bool,
}

impl<'a> ResponseFormatter<'a> {
    pub(crate) fn new(options: &'a JsonOptions) -> Self {
        let indent = options
            .is_indented()
            .then(|| (options.indent_prefix.as_bytes(), options.indent_value.as_bytes()));
        Self {
            escape_html: options.escape_html,
            indent,
            depth: 0,
            has_value: false,
        }
    }

    fn newline<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        if let Some((prefix, indent)) = self.indent {
            writer.write_all(b"\n")?;
            writer.write_all(prefix)?;
            for _ in 0..self.depth {
                writer.write_all(indent)?;
            }
        }
        Ok(())
    }

    fn begin_nested<W: ?Sized + io::Write>(&mut self, writer: &mut W, open: &[u8]) -> io::Result<()> {
        self.depth += 1;
        self.has_value = false;
        writer.write_all(open)
    }

    fn end_nested<W: ?Sized + io::Write>(&mut self, writer: &mut W, close: &[u8]) -> io::Result<()> {
        self.depth -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(close)
    }

    fn begin_element<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if !first {
            writer.write_all(b",")?;
        }
        self.newline(writer)
    }
}

impl Formatter for ResponseFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.begin_nested(writer, b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.end_nested(writer, b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.begin_element(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.begin_nested(writer, b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.end_nested(writer, b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.begin_element(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        if self.indent.is_some() {
            writer.write_all(b": ")
        } else {
            writer.write_all(b":")
        }
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            let escaped: &[u8] = match ch {
                '<' if self.escape_html => b"\\u003c",
                '>' if self.escape_html => b"\\u003e",
                '&' if self.escape_html => b"\\u0026",
                '\u{2028}' => b"\\u2028",
                '\u{2029}' => b"\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..i].as_bytes())?;
            writer.write_all(escaped)?;
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    fn format<T: Serialize>(value: &T, options: &JsonOptions) -> String {
        let mut out = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut out, ResponseFormatter::new(options));
        value.serialize(&mut ser).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_compact_matches_serde_json() {
        let value = serde_json::json!({"a": [1, 2, {"b": null}], "c": "d"});
        assert_eq!(
            format(&value, &JsonOptions::default()),
            serde_json::to_string(&value).unwrap()
        );
    }

    #[test]
    fn test_html_escaping() {
        let options = JsonOptions {
            escape_html: true,
            ..JsonOptions::default()
        };
        assert_eq!(
            format(&"<a href=\"x\">&</a>", &options),
            r#""\u003ca href=\"x\"\u003e\u0026\u003c/a\u003e""#
        );
    }

    #[test]
    fn test_html_left_alone_by_default() {
        assert_eq!(format(&"<b>&</b>", &JsonOptions::default()), r#""<b>&</b>""#);
    }

    #[test]
    fn test_line_separators_always_escaped() {
        assert_eq!(
            format(&"a\u{2028}b\u{2029}c", &JsonOptions::default()),
            r#""a\u2028b\u2029c""#
        );
    }

    #[test]
    fn test_escaped_keys() {
        let options = JsonOptions {
            escape_html: true,
            ..JsonOptions::default()
        };
        let value = serde_json::json!({"<k>": 1});
        assert_eq!(format(&value, &options), r#"{"\u003ck\u003e":1}"#);
    }

    #[test]
    fn test_indent_with_prefix() {
        let options = JsonOptions {
            indent_prefix: "> ".to_string(),
            indent_value: "\t".to_string(),
            ..JsonOptions::default()
        };
        let value = serde_json::json!({"a": [1, 2], "b": {}});
        assert_eq!(
            format(&value, &options),
            "{\n> \t\"a\": [\n> \t\t1,\n> \t\t2\n> \t],\n> \t\"b\": {}\n> }"
        );
    }

    #[test]
    fn test_indent_empty_containers() {
        let options = JsonOptions {
            indent_value: "  ".to_string(),
            ..JsonOptions::default()
        };
        assert_eq!(format(&serde_json::json!([]), &options), "[]");
        assert_eq!(format(&serde_json::json!([[]]), &options), "[\n  []\n]");
    }
}

use anyhow::Result;
use std::io::Write;

/// Generic incremental JSON token sink. The encoder only ever talks to this
/// interface; the transport behind it (HTTP chunked response, file, buffer)
/// is the caller's business.
pub trait JsonSink {
    fn start_object(&mut self) -> Result<()>;
    fn end_object(&mut self) -> Result<()>;
    fn start_array(&mut self) -> Result<()>;
    fn end_array(&mut self) -> Result<()>;
    fn field_name(&mut self, name: &str) -> Result<()>;
    fn string_value(&mut self, value: &str) -> Result<()>;
    fn int_value(&mut self, value: i64) -> Result<()>;
    fn float_value(&mut self, value: f64) -> Result<()>;
    fn bool_value(&mut self, value: bool) -> Result<()>;
    fn null_value(&mut self) -> Result<()>;
    /// Pre-formatted token, written verbatim.
    fn raw_value(&mut self, token: &str) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

struct Frame {
    array: bool,
    items: usize,
}

/// Token writer over any [`Write`], tracking nesting for separator placement.
/// Compact by default, optionally pretty-printed with two-space indents.
pub struct JsonTokenWriter<W: Write> {
    out: W,
    pretty: bool,
    stack: Vec<Frame>,
    field_pending: bool,
}

impl<W: Write> JsonTokenWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pretty: false,
            stack: Vec::new(),
            field_pending: false,
        }
    }

    pub fn pretty(out: W) -> Self {
        Self {
            pretty: true,
            ..Self::new(out)
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_indent(&mut self, depth: usize) -> Result<()> {
        self.out.write_all(b"\n")?;
        for _ in 0..depth {
            self.out.write_all(b"  ")?;
        }
        Ok(())
    }

    // Separator handling for a value or container opening in the current
    // position: nothing after a field name, comma plus indent between array
    // elements.
    fn begin_value(&mut self) -> Result<()> {
        if self.field_pending {
            self.field_pending = false;
            return Ok(());
        }
        let in_array = self.stack.last().map(|f| f.array).unwrap_or(false);
        if in_array {
            let first = self.stack.last().map(|f| f.items == 0).unwrap_or(true);
            if !first {
                self.out.write_all(b",")?;
            }
            if self.pretty {
                self.write_indent(self.stack.len())?;
            }
            if let Some(frame) = self.stack.last_mut() {
                frame.items += 1;
            }
        }
        Ok(())
    }

    fn close(&mut self, token: &[u8]) -> Result<()> {
        let frame = self.stack.pop();
        if self.pretty {
            if let Some(frame) = frame {
                if frame.items > 0 {
                    self.write_indent(self.stack.len())?;
                }
            }
        }
        self.out.write_all(token)?;
        Ok(())
    }
}

impl<W: Write> JsonSink for JsonTokenWriter<W> {
    fn start_object(&mut self) -> Result<()> {
        self.begin_value()?;
        self.out.write_all(b"{")?;
        self.stack.push(Frame {
            array: false,
            items: 0,
        });
        Ok(())
    }

    fn end_object(&mut self) -> Result<()> {
        self.close(b"}")
    }

    fn start_array(&mut self) -> Result<()> {
        self.begin_value()?;
        self.out.write_all(b"[")?;
        self.stack.push(Frame {
            array: true,
            items: 0,
        });
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        self.close(b"]")
    }

    fn field_name(&mut self, name: &str) -> Result<()> {
        let first = self.stack.last().map(|f| f.items == 0).unwrap_or(true);
        if !first {
            self.out.write_all(b",")?;
        }
        if self.pretty {
            self.write_indent(self.stack.len())?;
        }
        if let Some(frame) = self.stack.last_mut() {
            frame.items += 1;
        }
        serde_json::to_writer(&mut self.out, name)?;
        let colon: &[u8] = if self.pretty { b": " } else { b":" };
        self.out.write_all(colon)?;
        self.field_pending = true;
        Ok(())
    }

    fn string_value(&mut self, value: &str) -> Result<()> {
        self.begin_value()?;
        serde_json::to_writer(&mut self.out, value)?;
        Ok(())
    }

    fn int_value(&mut self, value: i64) -> Result<()> {
        self.begin_value()?;
        write!(self.out, "{}", value)?;
        Ok(())
    }

    fn float_value(&mut self, value: f64) -> Result<()> {
        self.begin_value()?;
        if value.is_finite() {
            serde_json::to_writer(&mut self.out, &value)?;
        } else {
            self.out.write_all(b"null")?;
        }
        Ok(())
    }

    fn bool_value(&mut self, value: bool) -> Result<()> {
        self.begin_value()?;
        let token: &[u8] = if value { b"true" } else { b"false" };
        self.out.write_all(token)?;
        Ok(())
    }

    fn null_value(&mut self) -> Result<()> {
        self.begin_value()?;
        self.out.write_all(b"null")?;
        Ok(())
    }

    fn raw_value(&mut self, token: &str) -> Result<()> {
        self.begin_value()?;
        self.out.write_all(token.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compact(write: impl FnOnce(&mut JsonTokenWriter<Vec<u8>>) -> Result<()>) -> String {
        let mut writer = JsonTokenWriter::new(Vec::new());
        write(&mut writer).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn writes_compact_object() {
        let out = compact(|w| {
            w.start_object()?;
            w.field_name("type")?;
            w.string_value("Feature")?;
            w.field_name("count")?;
            w.int_value(3)?;
            w.end_object()
        });
        assert_eq!(out, r#"{"type":"Feature","count":3}"#);
    }

    #[test]
    fn separates_array_elements() {
        let out = compact(|w| {
            w.start_array()?;
            w.int_value(1)?;
            w.int_value(2)?;
            w.start_array()?;
            w.raw_value("3.5")?;
            w.end_array()?;
            w.end_array()
        });
        assert_eq!(out, "[1,2,[3.5]]");
    }

    #[test]
    fn escapes_strings() {
        let out = compact(|w| {
            w.start_object()?;
            w.field_name("a\"b")?;
            w.string_value("line\nbreak")?;
            w.end_object()
        });
        assert_eq!(out, "{\"a\\\"b\":\"line\\nbreak\"}");
    }

    #[test]
    fn non_finite_floats_become_null() {
        let out = compact(|w| {
            w.start_array()?;
            w.float_value(f64::NAN)?;
            w.float_value(1.5)?;
            w.end_array()
        });
        assert_eq!(out, "[null,1.5]");
    }

    #[test]
    fn bool_and_null_tokens() {
        let out = compact(|w| {
            w.start_object()?;
            w.field_name("a")?;
            w.bool_value(true)?;
            w.field_name("b")?;
            w.null_value()?;
            w.end_object()
        });
        assert_eq!(out, r#"{"a":true,"b":null}"#);
    }

    #[test]
    fn pretty_prints_with_indents() {
        let mut writer = JsonTokenWriter::pretty(Vec::new());
        writer.start_object().unwrap();
        writer.field_name("type").unwrap();
        writer.string_value("FeatureCollection").unwrap();
        writer.field_name("features").unwrap();
        writer.start_array().unwrap();
        writer.start_object().unwrap();
        writer.field_name("type").unwrap();
        writer.string_value("Feature").unwrap();
        writer.end_object().unwrap();
        writer.end_array().unwrap();
        writer.end_object().unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        let expected = "{\n  \"type\": \"FeatureCollection\",\n  \"features\": [\n    {\n      \"type\": \"Feature\"\n    }\n  ]\n}";
        assert_eq!(out, expected);
    }

    #[test]
    fn empty_containers_close_inline() {
        let out = compact(|w| {
            w.start_object()?;
            w.field_name("features")?;
            w.start_array()?;
            w.end_array()?;
            w.end_object()
        });
        assert_eq!(out, r#"{"features":[]}"#);
    }
}

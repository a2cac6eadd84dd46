use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;

/// JSON text in the host's conventional layout: `", "` between items and
/// `": "` after keys, optionally escaping every non-ASCII character.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostJsonFormatter {
    ascii_only: bool,
}

impl HostJsonFormatter {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }
}

impl Formatter for HostJsonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !self.ascii_only || fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0_u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                let mut buf = [0_u8; 1];
                writer.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
                continue;
            }
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
        }
        Ok(())
    }
}

pub fn to_host_json_string<T>(value: &T, ascii_only: bool) -> Result<String, serde_json::Error>
where
    T: ?Sized + Serialize,
{
    let mut out = Vec::with_capacity(128);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, HostJsonFormatter::new(ascii_only));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(out.as_slice()).into_owned())
}

/// Serializing an in-memory `Value` into a byte buffer cannot fail; the compact
/// encoding is the fallback should that ever change.
pub fn value_to_host_json(value: &Value, ascii_only: bool) -> String {
    to_host_json_string(value, ascii_only).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn separates_items_and_keys_with_spaces() {
        let text = value_to_host_json(&json!({"a": [1, 2, 3], "b": {"c": null}}), false);
        assert_eq!(text, r#"{"a": [1, 2, 3], "b": {"c": null}}"#);
    }

    #[test]
    fn keeps_non_ascii_when_not_escaping() {
        let text = value_to_host_json(&json!({"prompt": "кот в шляпе"}), false);
        assert_eq!(text, r#"{"prompt": "кот в шляпе"}"#);
    }

    #[test]
    fn escapes_non_ascii_with_lowercase_utf16_units() {
        let text = value_to_host_json(&json!("café 😀"), true);
        assert_eq!(text, r#""caf\u00e9 \ud83d\ude00""#);
    }

    #[test]
    fn still_escapes_control_characters() {
        let text = value_to_host_json(&json!("a\"b\nc"), true);
        assert_eq!(text, r#""a\"b\nc""#);
    }

    #[test]
    fn empty_containers_have_no_separators() {
        assert_eq!(value_to_host_json(&json!({}), false), "{}");
        assert_eq!(value_to_host_json(&json!([]), false), "[]");
    }
}

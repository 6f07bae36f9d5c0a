use std::io;

use serde::Serialize;
use serde_json::ser::{CharEscape, CompactFormatter, Formatter};

use crate::Record;

// ════════════════════════════════════════════════════════════════
//  Canonical JSON form
// ════════════════════════════════════════════════════════════════

/// Compact JSON formatter with the dashboard's string escaping:
/// `\\`, `\"`, `\n`, `\r`, `\t` use short escapes, every other control
/// character below 0x20 is written as lowercase `\u00xx`.
///
/// Differs from serde_json's default only for backspace and form feed,
/// which serde_json writes as `\b` / `\f`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct WindowJsonFormatter;

impl Formatter for WindowJsonFormatter {
    fn write_char_escape<W>(&mut self, writer: &mut W, char_escape: CharEscape) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        match char_escape {
            CharEscape::Backspace => write_unicode_escape(writer, 0x08),
            CharEscape::FormFeed => write_unicode_escape(writer, 0x0c),
            CharEscape::AsciiControl(byte) => write_unicode_escape(writer, byte),
            other => CompactFormatter.write_char_escape(writer, other),
        }
    }
}

fn write_unicode_escape<W>(writer: &mut W, byte: u8) -> io::Result<()>
where
    W: ?Sized + io::Write,
{
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let buf = [
        b'\\',
        b'u',
        b'0',
        b'0',
        HEX[(byte >> 4) as usize],
        HEX[(byte & 0x0f) as usize],
    ];
    writer.write_all(&buf)
}

fn to_vec_canonical<T: Serialize + ?Sized>(value: &T, capacity: usize) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::with_capacity(capacity);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, WindowJsonFormatter);
    value.serialize(&mut ser)?;
    Ok(out)
}

/// Serialize a snapshot as a JSON array, newest-first as given.
pub fn records_to_json(records: &[Record]) -> Result<Vec<u8>, serde_json::Error> {
    to_vec_canonical(records, 2 + records.len() * 96)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(r: &Record) -> String {
        String::from_utf8(to_vec_canonical(r, 96).unwrap()).unwrap()
    }

    #[test]
    fn exact_field_layout() {
        let r = Record::new(5, 0, 3, Some("k".into()), "v");
        assert_eq!(
            one(&r),
            r#"{"ts":5,"partition":0,"offset":3,"key":"k","value":"v"}"#
        );
    }

    #[test]
    fn absent_key_is_null() {
        let r = Record::new(5, 1, 0, None, "v");
        assert_eq!(
            one(&r),
            r#"{"ts":5,"partition":1,"offset":0,"key":null,"value":"v"}"#
        );
    }

    #[test]
    fn escapes_match_dashboard_rules() {
        let r = Record::new(0, 0, 0, Some("a\"b\\c".into()), "l1\nl2\r\t\u{0008}\u{000c}\u{0001}\u{001f}");
        let json = one(&r);
        assert!(json.contains(r#""key":"a\"b\\c""#), "{json}");
        assert!(
            json.contains(r#""value":"l1\nl2\r\t\u0008\u000c\u0001\u001f""#),
            "{json}"
        );
    }

    #[test]
    fn non_ascii_passes_through_unescaped() {
        let r = Record::new(0, 0, 0, None, "привет ✓ /");
        let json = one(&r);
        assert!(json.contains(r#""value":"привет ✓ /""#), "{json}");
    }

    #[test]
    fn control_characters_round_trip() {
        let key = "k\u{0000}\u{0007}\"\\";
        let value = "\u{0008}\u{000b}\u{000c}\r\n\t\u{001b}[0m end";
        let records = vec![
            Record::new(2, 0, 1, Some(key.into()), value),
            Record::new(1, 0, 0, None, "plain"),
        ];

        let bytes = records_to_json(&records).unwrap();
        let parsed: Vec<Record> = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed, records);
        assert_eq!(parsed[0].key(), Some(key));
        assert_eq!(parsed[0].value(), value);
    }

    #[test]
    fn empty_snapshot_is_empty_array() {
        assert_eq!(records_to_json(&[]).unwrap(), b"[]");
    }
}

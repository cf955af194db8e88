//! Escape handling for quoted access log fields.
//!
//! The load balancer writes quoted fields as double quoted strings using `\xHH` escapes for
//! quotes and backslashes (`"user\x22agent"`). Those are decoded here and re-quoted with the
//! short escapes (`\"`, `\\`) so the output reads naturally and stays valid JSON.

/// Decodes a double quoted string literal. Returns `None` when `s` is not one.
///
/// Byte escapes that do not form valid UTF-8 decode to U+FFFD.
pub fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    if !inner.contains(['\\', '"', '\n']) {
        return Some(inner.to_owned());
    }

    let mut out: Vec<u8> = Vec::with_capacity(inner.len());
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\n' => return None,
            b'\\' => {
                let escape = *bytes.get(i + 1)?;
                i += 2;
                match escape {
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'v' => out.push(0x0b),
                    b'\\' => out.push(b'\\'),
                    b'"' => out.push(b'"'),
                    b'x' => {
                        out.push(u8::try_from(digits(inner.get(i..i + 2)?, 16)?).ok()?);
                        i += 2;
                    }
                    b'0'..=b'7' => {
                        out.push(u8::try_from(digits(inner.get(i - 1..i + 2)?, 8)?).ok()?);
                        i += 2;
                    }
                    b'u' => {
                        push_char(&mut out, inner.get(i..i + 4)?)?;
                        i += 4;
                    }
                    b'U' => {
                        push_char(&mut out, inner.get(i..i + 8)?)?;
                        i += 8;
                    }
                    _ => return None,
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    Some(String::from_utf8_lossy(&out).into_owned())
}

fn digits(s: &str, radix: u32) -> Option<u32> {
    s.chars()
        .try_fold(0u32, |acc, c| Some(acc * radix + c.to_digit(radix)?))
}

fn push_char(out: &mut Vec<u8>, hex: &str) -> Option<()> {
    let c = char::from_u32(digits(hex, 16)?)?;
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    Some(())
}

/// Wraps `s` in double quotes, escaping quotes, backslashes and control characters.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    push_quoted(&mut out, s);
    out
}

pub fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c.is_control() && (c as u32) < 0x80 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

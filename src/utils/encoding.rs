//! Binary primitives shared by every on-disk file.
//!
//! All integers are big-endian. Strings are written as a 2-byte encoded
//! length followed by the string in modified UTF-8: each UTF-16 code unit
//! takes 1 byte (U+0001..=U+007F), 2 bytes (U+0000 and U+0080..=U+07FF) or
//! 3 bytes (everything else, including each half of a surrogate pair).
//! Page capacity accounting relies on [`encoded_len`] agreeing byte for byte
//! with [`write_str`].

use std::io::{self, Read, Write};

/// Largest encoded string that fits behind the 2-byte length prefix
pub const MAX_ENCODED_LEN: usize = u16::MAX as usize;

/// Number of bytes `s` occupies once encoded (without the length prefix)
pub fn encoded_len(s: &str) -> usize {
    s.encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Encode `s` into `buf` without a length prefix
pub fn encode_str(s: &str, buf: &mut Vec<u8>) {
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => buf.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buf.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                buf.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                buf.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                buf.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                buf.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
}

/// Decode a modified UTF-8 byte sequence
pub fn decode_str(bytes: &[u8]) -> io::Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        match b0 >> 4 {
            0x0..=0x7 => {
                units.push(b0);
                i += 1;
            }
            0xC | 0xD => {
                let b1 = continuation(bytes, i + 1)?;
                units.push(((b0 & 0x1F) << 6) | b1);
                i += 2;
            }
            0xE => {
                let b1 = continuation(bytes, i + 1)?;
                let b2 = continuation(bytes, i + 2)?;
                units.push(((b0 & 0x0F) << 12) | (b1 << 6) | b2);
                i += 3;
            }
            _ => return Err(malformed(i)),
        }
    }

    String::from_utf16(&units)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn continuation(bytes: &[u8], at: usize) -> io::Result<u16> {
    match bytes.get(at) {
        Some(&b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
        _ => Err(malformed(at)),
    }
}

fn malformed(at: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed string encoding at byte {}", at),
    )
}

/// Write a length-prefixed string, returning the number of bytes written
pub fn write_str<W: Write>(writer: &mut W, s: &str) -> io::Result<usize> {
    let mut buf = Vec::with_capacity(s.len() + 2);
    encode_str(s, &mut buf);
    if buf.len() > MAX_ENCODED_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("encoded string too long: {} bytes", buf.len()),
        ));
    }
    writer.write_all(&(buf.len() as u16).to_be_bytes())?;
    writer.write_all(&buf)?;
    Ok(buf.len() + 2)
}

/// Read a length-prefixed string
pub fn read_str<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_u16_be(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    decode_str(&buf)
}

/// Read a u16 in big-endian format
pub fn read_u16_be<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Read an i16 in big-endian format
pub fn read_i16_be<R: Read>(reader: &mut R) -> io::Result<i16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

/// Write an i32 in big-endian format
pub fn write_i32_be<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

/// Read an i32 in big-endian format
pub fn read_i32_be<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Write an i64 in big-endian format
pub fn write_i64_be<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

/// Read an i64 in big-endian format
pub fn read_i64_be<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encoded_len_widths() {
        assert_eq!(encoded_len("abc"), 3);
        assert_eq!(encoded_len("\u{0}"), 2);
        assert_eq!(encoded_len("é"), 2);
        assert_eq!(encoded_len("כלב"), 6);
        assert_eq!(encoded_len("€"), 3);
        // Supplementary characters are two surrogates of 3 bytes each
        assert_eq!(encoded_len("😀"), 6);
    }

    #[test]
    fn test_encoded_len_matches_writer() {
        for s in ["", "hello", "שלום", "naïve", "a\u{0}b", "😀x"] {
            let mut out = Vec::new();
            let written = write_str(&mut out, s).unwrap();
            assert_eq!(written, encoded_len(s) + 2, "mismatch for {:?}", s);
            assert_eq!(out.len(), written);
        }
    }

    #[test]
    fn test_string_roundtrip() {
        let mut out = Vec::new();
        write_str(&mut out, "report").unwrap();
        write_str(&mut out, "דוח 😀").unwrap();

        let mut cursor = Cursor::new(out);
        assert_eq!(read_str(&mut cursor).unwrap(), "report");
        assert_eq!(read_str(&mut cursor).unwrap(), "דוח 😀");
    }

    #[test]
    fn test_decode_rejects_truncated_sequence() {
        assert!(decode_str(&[0xE0, 0x80]).is_err());
        assert!(decode_str(&[0xFF]).is_err());
    }

    #[test]
    fn test_read_str_eof() {
        let mut cursor = Cursor::new(vec![0x00, 0x05, b'a']);
        let err = read_str(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut out = Vec::new();
        write_i32_be(&mut out, 1).unwrap();
        out.extend_from_slice(&(-1i16).to_be_bytes());
        write_i64_be(&mut out, 2).unwrap();
        assert_eq!(&out[..4], &[0, 0, 0, 1]);
        assert_eq!(&out[4..6], &[0xFF, 0xFF]);

        let mut cursor = Cursor::new(out);
        assert_eq!(read_i32_be(&mut cursor).unwrap(), 1);
        assert_eq!(read_i16_be(&mut cursor).unwrap(), -1);
        assert_eq!(read_i64_be(&mut cursor).unwrap(), 2);
    }
}

//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of mhbox.
//
// mhbox is free software: you can redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// mhbox is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// mhbox. If not, see <http://www.gnu.org/licenses/>.

//! Primitive fields of the cache and mark file formats.
//!
//! There are exactly two kinds of field:
//!
//! - u32 LE: an unsigned integer.
//! - u32 LE length, followed by that many bytes: a string. There is no
//!   terminator. An absent string is written with length 0, so it reads back
//!   exactly like an empty one.
//!
//! Any short read is reported as `Error::CorruptData`. Callers treat that as
//! poisoning the whole file, not just the record being read.

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::support::error::Error;
use crate::support::file_ops::ReadUninterruptibly;

/// The longest string that will be accepted from a data file.
pub const MAX_STRING_LEN: u32 = 16 << 20;

const READ_CHUNK: usize = 4096;

pub fn write_int(w: &mut impl Write, value: u32) -> io::Result<()> {
    w.write_u32::<LittleEndian>(value)
}

pub fn write_string(w: &mut impl Write, value: Option<&str>) -> io::Result<()> {
    let bytes = value.map(str::as_bytes).unwrap_or(&[]);
    // Strings longer than the reader accepts would poison the whole file,
    // so clip them here; cut back to a char boundary so the tail stays valid.
    let mut len = bytes.len().min(MAX_STRING_LEN as usize);
    if let Some(s) = value {
        while !s.is_char_boundary(len) {
            len -= 1;
        }
    }

    write_int(w, len as u32)?;
    w.write_all(&bytes[..len])
}

/// Read an integer which must be present.
pub fn read_int(r: &mut impl Read) -> Result<u32, Error> {
    read_int_or_eof(r)?.ok_or(Error::CorruptData)
}

/// Read an integer, or return `None` if the stream is cleanly at EOF.
///
/// This is used for the first field of a record, where EOF means there are
/// no more records.
pub fn read_int_or_eof(r: &mut impl Read) -> Result<Option<u32>, Error> {
    let mut buf = [0u8; 4];
    match r.read_uninteruptibly(&mut buf)? {
        0 => Ok(None),
        4 => Ok(Some(LittleEndian::read_u32(&buf))),
        _ => Err(Error::CorruptData),
    }
}

/// Read a string.
///
/// A zero-length string is returned as `None`. Invalid UTF-8 is replaced
/// rather than rejected since header text is not always well-formed.
pub fn read_string(r: &mut impl Read) -> Result<Option<String>, Error> {
    let len = read_int(r)?;
    if len > MAX_STRING_LEN {
        return Err(Error::CorruptData);
    }

    if 0 == len {
        return Ok(None);
    }

    let mut remaining = len as usize;
    let mut data = Vec::with_capacity(remaining.min(READ_CHUNK));
    let mut chunk = [0u8; READ_CHUNK];
    while remaining > 0 {
        let want = remaining.min(READ_CHUNK);
        let nread = r.read_uninteruptibly(&mut chunk[..want])?;
        if nread != want {
            return Err(Error::CorruptData);
        }

        data.extend_from_slice(&chunk[..nread]);
        remaining -= nread;
    }

    Ok(Some(match String::from_utf8(data) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn int_layout() {
        let mut buf = Vec::new();
        write_int(&mut buf, 0x01020304).unwrap();
        assert_eq!(vec![4, 3, 2, 1], buf);
        assert_eq!(0x01020304, read_int(&mut &buf[..]).unwrap());
    }

    #[test]
    fn string_layout() {
        let mut buf = Vec::new();
        write_string(&mut buf, Some("abc")).unwrap();
        assert_eq!(vec![3, 0, 0, 0, b'a', b'b', b'c'], buf);
    }

    #[test]
    fn absent_and_empty_strings_are_the_same() {
        let mut buf = Vec::new();
        write_string(&mut buf, None).unwrap();
        write_string(&mut buf, Some("")).unwrap();
        assert_eq!(vec![0u8; 8], buf);

        let mut r = &buf[..];
        assert_eq!(None, read_string(&mut r).unwrap());
        assert_eq!(None, read_string(&mut r).unwrap());
        assert_eq!(None, read_int_or_eof(&mut r).unwrap());
    }

    #[test]
    fn long_strings_span_chunks() {
        let long = "x".repeat(READ_CHUNK * 3 + 17);
        let mut buf = Vec::new();
        write_string(&mut buf, Some(&long)).unwrap();
        assert_eq!(Some(long), read_string(&mut &buf[..]).unwrap());
    }

    #[test]
    fn short_reads_are_corrupt() {
        assert_matches!(Err(Error::CorruptData), read_int(&mut &[1u8, 2][..]));
        assert_matches!(
            Err(Error::CorruptData),
            read_int_or_eof(&mut &[1u8, 2, 3][..])
        );
        assert_matches!(Ok(None), read_int_or_eof(&mut &[][..]));
        assert_matches!(Err(Error::CorruptData), read_int(&mut &[][..]));

        let mut buf = Vec::new();
        write_string(&mut buf, Some("hello")).unwrap();
        buf.truncate(buf.len() - 1);
        assert_matches!(Err(Error::CorruptData), read_string(&mut &buf[..]));
    }

    #[test]
    fn oversized_length_is_corrupt() {
        let mut buf = Vec::new();
        write_int(&mut buf, MAX_STRING_LEN + 1).unwrap();
        buf.extend_from_slice(b"data");
        assert_matches!(Err(Error::CorruptData), read_string(&mut &buf[..]));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let buf = [2u8, 0, 0, 0, b'a', 0xFF];
        assert_eq!(
            Some("a\u{FFFD}".to_owned()),
            read_string(&mut &buf[..]).unwrap()
        );
    }
}

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

//! The built-in header parser for filling in message summaries.
//!
//! Only the header block is read, then handed to `mailparse`, which unfolds
//! continuation lines and decodes encoded words. Bodies are never looked at.

use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use chrono::DateTime;
use log::debug;
use mailparse::{MailAddr, MailHeader, MailHeaderMap};

use super::collab::HeaderParser;
use super::model::*;
use crate::support::file_ops;

/// Header values longer than this are truncated.
const MAX_HEADER_LEN: usize = 64 * 1024;
/// Parsing stops after this many bytes even if the header block has not
/// ended.
const MAX_HEADER_BLOCK: u64 = 1024 * 1024;

/// The built-in `HeaderParser`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleHeaderParser;

impl HeaderParser for SimpleHeaderParser {
    fn parse_message_file(
        &self,
        path: &Path,
        default_flags: MsgFlags,
        full_scan: bool,
    ) -> Option<MessageRecord> {
        let num = MsgNum::from_path(path)?;
        match parse_file(path, num, default_flags, full_scan) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn parse_file(
    path: &Path,
    num: MsgNum,
    flags: MsgFlags,
    full_scan: bool,
) -> io::Result<MessageRecord> {
    let file = fs::File::open(path)?;
    let md = file.metadata()?;

    let mut record = MessageRecord::new(num);
    record.size = md.len().min(u32::MAX as u64) as u32;
    record.mtime = file_ops::epoch_secs_u32(md.modified()?);
    record.flags = flags;

    let mut reader = BufReader::new(file).take(MAX_HEADER_BLOCK);
    let block = read_header_block(&mut reader)?;
    let (headers, _) = mailparse::parse_headers(&block)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fill_record(&mut record, &headers, full_scan);

    Ok(record)
}

/// Read the raw header block from `r`, up to and including the blank line
/// that ends it.
///
/// A leading mbox-style `From ` line is dropped.
pub fn read_header_block(r: &mut impl BufRead) -> io::Result<Vec<u8>> {
    let mut block = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if 0 == r.read_until(b'\n', &mut line)? {
            break;
        }

        if block.is_empty() && line.starts_with(b"From ") {
            continue;
        }

        block.extend_from_slice(&line);
        if b"\n" == &line[..] || b"\r\n" == &line[..] {
            break;
        }
    }

    Ok(block)
}

fn fill_record(
    record: &mut MessageRecord,
    headers: &[MailHeader<'_>],
    full_scan: bool,
) {
    let value = |name: &str| first_value(headers, name).map(|(_, v)| v);

    if let Some((header, from)) = first_value(headers, "From") {
        record.from_name =
            Some(display_name(header).unwrap_or_else(|| from.clone()));
        record.from = Some(from);
    }
    record.to = value("To");
    record.newsgroups = value("Newsgroups");
    record.subject = value("Subject");
    record.msgid =
        value("Message-ID").map(|v| msg_ids(&v).into_iter().next().unwrap_or(v));

    if let Some(date) = value("Date") {
        record.date_t = parse_date(&date);
        record.date = Some(date);
    }

    if full_scan {
        record.in_reply_to = value("In-Reply-To")
            .and_then(|v| msg_ids(&v).into_iter().next());
        record.references =
            value("References").map(|v| msg_ids(&v)).unwrap_or_default();
    }
}

/// Find the first non-empty header called `name`.
fn first_value<'a, 'h>(
    headers: &'a [MailHeader<'h>],
    name: &str,
) -> Option<(&'a MailHeader<'a>, String)> {
    let header = headers.get_first_header(name)?;
    let value = header_value(header);
    if value.is_empty() {
        None
    } else {
        Some((header, value))
    }
}

fn header_value(header: &MailHeader<'_>) -> String {
    let mut value = header.get_value().trim().to_owned();
    if value.len() > MAX_HEADER_LEN {
        let mut end = MAX_HEADER_LEN;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}

/// Extract the human-readable part of an address header.
///
/// `"Jane Doe" <jane@example.com>` yields `Jane Doe`; a bare address yields
/// the address itself. Returns `None` if the header does not parse as an
/// address list.
pub fn display_name(header: &MailHeader<'_>) -> Option<String> {
    let addrs = mailparse::addrparse_header(header).ok()?;
    let single = match addrs.iter().next()? {
        MailAddr::Single(ref info) => info,
        MailAddr::Group(ref group) => match group.addrs.first() {
            Some(info) => info,
            None => return Some(group.group_name.clone()),
        },
    };

    Some(
        single
            .display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| single.addr.clone()),
    )
}

/// Return every message ID in `s`, in order, without the brackets.
fn msg_ids(s: &str) -> Vec<String> {
    mailparse::msgidparse(s)
        .map(|ids| ids.iter().filter(|id| !id.is_empty()).cloned().collect())
        .unwrap_or_default()
}

fn parse_date(s: &str) -> u32 {
    DateTime::parse_from_rfc2822(s)
        .map(|dt| dt.timestamp())
        .or_else(|_| mailparse::dateparse(s))
        .map(|t| t.max(0).min(u32::MAX as i64) as u32)
        .unwrap_or(0)
}

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

use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroU32;
use std::path::Path;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Identifies a message within a single folder.
///
/// The message number is also the name of the file holding the message. 0 is
/// never a valid message number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MsgNum(pub NonZeroU32);

impl MsgNum {
    pub fn of(num: u32) -> Option<Self> {
        NonZeroU32::new(num).map(MsgNum)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Parse a directory entry name as a message number.
    ///
    /// Only names consisting entirely of ASCII digits and denoting a strictly
    /// positive number that fits in 32 bits are accepted. The name must be
    /// exactly what `to_string()` gives back for the number, so zero-padded
    /// names are rejected.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.is_empty()
            || name.starts_with('0')
            || !name.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        name.parse::<u32>().ok().and_then(MsgNum::of)
    }

    /// Like `from_file_name()`, but for the final component of a path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(MsgNum::from_file_name)
    }

    #[cfg(test)]
    pub fn u(num: u32) -> Self {
        MsgNum::of(num).unwrap()
    }
}

impl fmt::Display for MsgNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Flags which persist in the mark file.
    pub struct PermFlags: u32 {
        const NEW = 1 << 0;
        const UNREAD = 1 << 1;
        const MARKED = 1 << 2;
        const DELETED = 1 << 3;
        const REPLIED = 1 << 4;
        const FORWARDED = 1 << 5;
        /// Three bits holding a colour label from 0 (none) to 7.
        const CLABEL = 0b111 << 7;
    }
}

const CLABEL_SHIFT: u32 = 7;

impl PermFlags {
    pub fn color_label(self) -> u8 {
        ((self & PermFlags::CLABEL).bits() >> CLABEL_SHIFT) as u8
    }

    pub fn with_color_label(self, label: u8) -> Self {
        (self - PermFlags::CLABEL)
            | PermFlags::from_bits_truncate(
                (u32::from(label) << CLABEL_SHIFT) & PermFlags::CLABEL.bits(),
            )
    }
}

impl FromStr for PermFlags {
    type Err = String;

    /// Parse a single flag name, as used on the command line.
    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "new" => Ok(PermFlags::NEW),
            "unread" => Ok(PermFlags::UNREAD),
            "marked" => Ok(PermFlags::MARKED),
            "deleted" => Ok(PermFlags::DELETED),
            "replied" => Ok(PermFlags::REPLIED),
            "forwarded" => Ok(PermFlags::FORWARDED),
            _ => Err(format!("Unknown flag: {}", s)),
        }
    }
}

bitflags! {
    /// Flags which describe the current session's view of a message.
    ///
    /// Only the bits in `CACHED_MASK` are written to the summary cache; the
    /// rest are recomputed every time a message list is built.
    pub struct TmpFlags: u32 {
        const MOVE = 1 << 0;
        const COPY = 1 << 1;
        const QUEUED = 1 << 16;
        const DRAFT = 1 << 17;
        const ENCRYPTED = 1 << 18;
        const SIGNED = 1 << 21;
        const FLAG_CHANGED = 1 << 23;
        /// The record came from the summary cache rather than a fresh parse.
        const CACHED = 1 << 26;
        const MIME = 1 << 29;
        const MIME_HTML = 1 << 30;

        const CACHED_MASK = Self::MIME.bits | Self::MIME_HTML.bits
            | Self::ENCRYPTED.bits | Self::SIGNED.bits;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsgFlags {
    pub perm: PermFlags,
    pub tmp: TmpFlags,
}

impl MsgFlags {
    /// The flags given to a message nobody has looked at yet.
    pub fn received() -> Self {
        MsgFlags {
            perm: PermFlags::NEW | PermFlags::UNREAD,
            tmp: TmpFlags::empty(),
        }
    }
}

impl Default for MsgFlags {
    fn default() -> Self {
        MsgFlags {
            perm: PermFlags::empty(),
            tmp: TmpFlags::empty(),
        }
    }
}

/// The summary of one message, as kept in the cache.
///
/// Header strings are `None` when the header was absent. The cache format
/// cannot tell an absent header from an empty one, so an empty header also
/// reads back from the cache as `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub num: MsgNum,
    pub size: u32,
    /// Modification time of the message file, in seconds since the epoch.
    pub mtime: u32,
    /// The parsed `Date` header, in seconds since the epoch, or 0.
    pub date_t: u32,
    pub flags: MsgFlags,

    pub from_name: Option<String>,
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub newsgroups: Option<String>,
    pub subject: Option<String>,
    pub msgid: Option<String>,
    pub in_reply_to: Option<String>,
    /// Message IDs from the `References` header, oldest first.
    pub references: Vec<String>,
}

impl MessageRecord {
    /// Create a record with no header information.
    pub fn new(num: MsgNum) -> Self {
        MessageRecord {
            num,
            size: 0,
            mtime: 0,
            date_t: 0,
            flags: MsgFlags::default(),
            from_name: None,
            date: None,
            from: None,
            to: None,
            newsgroups: None,
            subject: None,
            msgid: None,
            in_reply_to: None,
            references: Vec::new(),
        }
    }
}

/// The field by which message lists are sorted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Number,
    Size,
    Date,
    From,
    To,
    Subject,
    Unread,
    Mark,
    Label,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Number
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "number" => Ok(SortKey::Number),
            "size" => Ok(SortKey::Size),
            "date" => Ok(SortKey::Date),
            "from" => Ok(SortKey::From),
            "to" => Ok(SortKey::To),
            "subject" => Ok(SortKey::Subject),
            "unread" => Ok(SortKey::Unread),
            "mark" => Ok(SortKey::Mark),
            "label" => Ok(SortKey::Label),
            _ => Err(format!("Unknown sort key: {}", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Ascending
    }
}

/// Sort `list` in place.
///
/// The sort is stable and ties are broken by message number, so the result
/// does not depend on the order in which records were discovered.
pub fn sort_message_list(
    list: &mut [MessageRecord],
    key: SortKey,
    order: SortOrder,
) {
    fn header(s: &Option<String>) -> String {
        s.as_deref().unwrap_or("").to_lowercase()
    }

    let cmp = |a: &MessageRecord, b: &MessageRecord| -> Ordering {
        let primary = match key {
            SortKey::Number => Ordering::Equal,
            SortKey::Size => a.size.cmp(&b.size),
            SortKey::Date => a.date_t.cmp(&b.date_t),
            SortKey::From => header(&a.from_name).cmp(&header(&b.from_name)),
            SortKey::To => header(&a.to).cmp(&header(&b.to)),
            SortKey::Subject => header(&a.subject).cmp(&header(&b.subject)),
            SortKey::Unread => b
                .flags
                .perm
                .contains(PermFlags::UNREAD)
                .cmp(&a.flags.perm.contains(PermFlags::UNREAD)),
            SortKey::Mark => b
                .flags
                .perm
                .contains(PermFlags::MARKED)
                .cmp(&a.flags.perm.contains(PermFlags::MARKED)),
            SortKey::Label => {
                a.flags.perm.color_label().cmp(&b.flags.perm.color_label())
            }
        };
        primary.then(a.num.cmp(&b.num))
    };

    match order {
        SortOrder::Ascending => list.sort_by(cmp),
        SortOrder::Descending => list.sort_by(|a, b| cmp(b, a)),
    }
}

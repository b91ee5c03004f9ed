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

//! The per-folder mark file, which records the permanent flags of each
//! message.
//!
//! The file is a log of `(num, flags)` records. Individual flag changes are
//! appended; the whole file is rewritten whenever the table is rebuilt from a
//! message list.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, info};

use super::codec;
use super::data_file;
use super::model::*;
use super::tree::FolderId;
use super::MhFolder;
use crate::support::error::Error;

pub const MARK_VERSION: u32 = 2;

pub type MarkTable = HashMap<MsgNum, PermFlags>;

/// Aggregate counts over a mark table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkSummary {
    pub new: u32,
    pub unread: u32,
    pub total: u32,
    pub min: Option<MsgNum>,
    pub max: Option<MsgNum>,
}

/// Read the mark file at `path`.
///
/// Returns `None` if there is no usable mark file, including when it is
/// truncated in the middle of a record.
pub fn read_mark_file(path: &Path) -> Result<Option<MarkTable>, Error> {
    let mut reader = match data_file::open_for_read(path, MARK_VERSION)? {
        Some(r) => r,
        None => return Ok(None),
    };

    match read_marks(&mut reader) {
        Ok(table) => Ok(Some(table)),
        Err(Error::CorruptData) => {
            info!("{} is corrupt; ignoring it", path.display());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn read_marks(r: &mut impl Read) -> Result<MarkTable, Error> {
    let mut table = MarkTable::new();
    while let Some(num) = codec::read_int_or_eof(r)? {
        let flags = PermFlags::from_bits_truncate(codec::read_int(r)?);
        if let Some(num) = MsgNum::of(num) {
            table.insert(num, flags);
        }
    }

    Ok(table)
}

/// Write `entries` as mark records, in order.
pub fn write_marks<'a>(
    w: &mut impl Write,
    entries: impl IntoIterator<Item = &'a (MsgNum, PermFlags)>,
) -> Result<(), Error> {
    for &(num, flags) in entries {
        codec::write_int(w, num.get())?;
        codec::write_int(w, flags.bits())?;
    }
    Ok(())
}

/// Replace the mark file at `path` with exactly `entries`.
pub fn write_mark_file(
    path: &Path,
    entries: &[(MsgNum, PermFlags)],
) -> Result<(), Error> {
    let mut writer = data_file::open_for_write(path, MARK_VERSION)?;
    write_marks(&mut writer, entries)?;
    data_file::finish(writer)
}

/// Add `entries` to the end of the mark file at `path`.
pub fn append_mark_file(
    path: &Path,
    entries: &[(MsgNum, PermFlags)],
) -> Result<(), Error> {
    let mut writer = data_file::open_for_append(path, MARK_VERSION)?;
    write_marks(&mut writer, entries)?;
    data_file::finish(writer)
}

/// Summarise the entries of `table` numbered `first` or higher.
pub fn summarize(table: &MarkTable, first: u32) -> MarkSummary {
    let mut summary = MarkSummary::default();
    for (&num, &flags) in table {
        if num.get() < first {
            continue;
        }

        summary.total += 1;
        if flags.contains(PermFlags::NEW) {
            summary.new += 1;
        }
        if flags.contains(PermFlags::UNREAD) {
            summary.unread += 1;
        }
        summary.min = Some(summary.min.map_or(num, |m| m.min(num)));
        summary.max = Some(summary.max.map_or(num, |m| m.max(num)));
    }
    summary
}

fn sorted_entries(table: &MarkTable) -> Vec<(MsgNum, PermFlags)> {
    let mut entries = table
        .iter()
        .map(|(&num, &flags)| (num, flags))
        .collect::<Vec<_>>();
    entries.sort_unstable_by_key(|&(num, _)| num);
    entries
}

impl MhFolder {
    /// Load the mark table of the folder, with any queued mark updates
    /// applied on top.
    ///
    /// If anything is queued, every message loaded from the file loses its
    /// `NEW` flag before the queue is applied, so that only the messages the
    /// queue mentions can still be new. If the folder is closed, the merged
    /// table then replaces the mark file and the queue is dropped.
    ///
    /// Returns `None` if there is neither a mark file nor anything queued.
    pub fn read_mark_table(
        &mut self,
        id: FolderId,
    ) -> Result<Option<MarkTable>, Error> {
        let path = self.mark_path(id)?;
        let table = read_mark_file(&path)?;

        let item = self.item(id)?;
        let open = item.is_open();
        let pending = item.queue.pending_marks();
        if pending.is_empty() {
            return Ok(table);
        }

        let mut table = table.unwrap_or_default();
        for flags in table.values_mut() {
            flags.remove(PermFlags::NEW);
        }
        for &(num, flags) in pending {
            table.insert(num, flags);
        }

        self.item_mut(id)?.mark_dirty = true;
        if !open {
            debug!(
                "{} Merging queued marks into {}",
                self.log_prefix,
                path.display()
            );
            write_mark_file(&path, &sorted_entries(&table))?;

            let item = self.item_mut(id)?;
            item.queue.take_marks_for_flush();
            item.mark_dirty = false;
        }

        Ok(Some(table))
    }

    /// Count the new, unread, and total messages numbered `first` or higher
    /// according to the mark table.
    pub fn get_mark_summary(
        &mut self,
        id: FolderId,
        first: u32,
    ) -> Result<MarkSummary, Error> {
        Ok(self
            .read_mark_table(id)?
            .map(|table| summarize(&table, first))
            .unwrap_or_default())
    }

    /// Queue a mark update without touching the disk.
    pub fn enqueue_mark(
        &mut self,
        id: FolderId,
        num: MsgNum,
        flags: PermFlags,
    ) -> Result<(), Error> {
        self.item_mut(id)?.queue.enqueue_mark(num, flags);
        Ok(())
    }

    /// Record `flags` as the permanent flags of message `num`.
    ///
    /// For an open folder this is only queued; otherwise a single record is
    /// appended to the mark file.
    pub fn add_flags(
        &mut self,
        id: FolderId,
        num: MsgNum,
        flags: PermFlags,
    ) -> Result<(), Error> {
        if self.item(id)?.is_open() {
            return self.enqueue_mark(id, num, flags);
        }

        append_mark_file(&self.mark_path(id)?, &[(num, flags)])
    }

    /// Rewrite the mark file of the folder from the flags of `records`.
    pub fn write_flags_list(
        &mut self,
        id: FolderId,
        records: &[MessageRecord],
    ) -> Result<(), Error> {
        let entries = records
            .iter()
            .map(|r| (r.num, r.flags.perm))
            .collect::<Vec<_>>();
        write_mark_file(&self.mark_path(id)?, &entries)?;
        self.item_mut(id)?.mark_dirty = false;
        Ok(())
    }

    /// Append the queued mark updates of a closed folder to its mark file.
    pub fn flush_mark_queue(&mut self, id: FolderId) -> Result<(), Error> {
        let item = self.item(id)?;
        if item.is_open() || item.queue.pending_marks().is_empty() {
            return Ok(());
        }

        let path = self.mark_path(id)?;
        let mut writer = data_file::open_for_append(&path, MARK_VERSION)?;
        let n = self.flush_mark_queue_to(id, &mut writer)?;
        data_file::finish(writer)?;

        debug!(
            "{} Flushed {} queued marks to {}",
            self.log_prefix,
            n,
            path.display()
        );
        Ok(())
    }

    /// Write the queued mark updates of a closed folder to `w` in the order
    /// they were queued, and drop them from the queue.
    ///
    /// If writing fails, the updates stay queued. Returns the number written.
    pub fn flush_mark_queue_to(
        &mut self,
        id: FolderId,
        w: &mut impl Write,
    ) -> Result<usize, Error> {
        let pending = self.item_mut(id)?.queue.take_marks_for_flush();
        if let Err(e) = write_marks(w, &pending) {
            let item = self.item_mut(id)?;
            for (num, flags) in pending {
                item.queue.enqueue_mark(num, flags);
            }
            return Err(e);
        }

        Ok(pending.len())
    }
}

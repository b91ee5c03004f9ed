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

use std::collections::HashSet;
use std::path::PathBuf;

use log::{debug, info};

use super::model::*;
use super::scan::msg_files;
use super::tree::{FolderCounts, FolderId};
use super::MhFolder;
use crate::support::error::Error;
use crate::support::file_ops;

impl MhFolder {
    /// Build the list of messages in the folder.
    ///
    /// With `use_cache`, the summary cache supplies every message it knows
    /// about and only message files it does not know are parsed. Without,
    /// every message file is parsed. Permanent flags always come from the
    /// mark table, and the result is sorted by the folder's sort settings.
    ///
    /// If the folder is not open, the cache and mark files are rewritten
    /// afterwards if they turned out to be out of date.
    pub fn get_message_list(
        &mut self,
        id: FolderId,
        use_cache: bool,
    ) -> Result<Vec<MessageRecord>, Error> {
        self.get_msg_list_full(id, use_cache, false)
    }

    /// Like `get_message_list(id, true)`, but return only the messages which
    /// were not already in the cache, in message number order.
    pub fn get_uncached_messages(
        &mut self,
        id: FolderId,
    ) -> Result<Vec<MessageRecord>, Error> {
        self.get_msg_list_full(id, true, true)
    }

    fn get_msg_list_full(
        &mut self,
        id: FolderId,
        use_cache: bool,
        uncached_only: bool,
    ) -> Result<Vec<MessageRecord>, Error> {
        let dir = self.item_dir(id)?;
        let lock = self.ctx.list_lock(&dir);
        // Guards no data, so a poisoned lock is still good
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        // Records queued while the folder was open become ordinary cache
        // entries before anything else happens.
        self.flush_cache_queue(id)?;

        let cur_mtime = file_ops::dir_mtime(&dir)?;
        let (role, baseline) = {
            let item = self.item(id)?;
            (item.role, item.mtime)
        };

        let mut list;
        let cached_count;
        if use_cache && baseline == Some(cur_mtime) {
            list = self.read_cache(id, false)?;
            if list.is_empty() {
                debug!(
                    "{} {} unchanged but has no cache; parsing everything",
                    self.log_prefix,
                    dir.display()
                );
                list = self.parse_msgs(id, msg_files(&dir)?)?;
                cached_count = 0;
                if !list.is_empty() {
                    self.item_mut(id)?.cache_dirty = true;
                }
            } else {
                for record in &mut list {
                    record.flags.tmp |= TmpFlags::CACHED;
                }
                cached_count = list.len();
            }
        } else if use_cache {
            let strict =
                self.config().cache.strict_check || role.always_verify();
            let mut cached = self.read_cache(id, strict)?;
            let on_disk = msg_files(&dir)?;

            if !strict {
                let present =
                    on_disk.iter().map(|&(num, _)| num).collect::<HashSet<_>>();
                let before = cached.len();
                cached.retain(|r| present.contains(&r.num));
                if cached.len() != before {
                    let item = self.item_mut(id)?;
                    item.cache_dirty = true;
                    item.mark_dirty = true;
                }
            }

            for record in &mut cached {
                record.flags.tmp |= TmpFlags::CACHED;
            }

            let known = cached.iter().map(|r| r.num).collect::<HashSet<_>>();
            let uncached = on_disk
                .into_iter()
                .filter(|&(num, _)| !known.contains(&num))
                .collect::<Vec<_>>();
            let parsed = self.parse_msgs(id, uncached)?;
            if !parsed.is_empty() {
                debug!(
                    "{} {} messages in {} were not cached",
                    self.log_prefix,
                    parsed.len(),
                    dir.display()
                );
                self.item_mut(id)?.cache_dirty = true;
            }

            cached_count = cached.len();
            list = cached;
            list.extend(parsed);
        } else {
            list = self.parse_msgs(id, msg_files(&dir)?)?;
            cached_count = 0;
            self.item_mut(id)?.cache_dirty = true;
        }

        self.merge_marks(id, &mut list)?;

        if !uncached_only {
            let item = self.item(id)?;
            sort_message_list(&mut list, item.sort_key, item.sort_order);
        }

        if !self.item(id)?.is_open() {
            let (cache_dirty, mark_dirty) = {
                let item = self.item(id)?;
                (item.cache_dirty, item.mark_dirty)
            };

            if cache_dirty {
                info!(
                    "{} Rewriting cache of {} ({} messages)",
                    self.log_prefix,
                    dir.display(),
                    list.len()
                );
                self.write_cache_list(id, &list)?;
            }
            if mark_dirty {
                debug!(
                    "{} Rewriting marks of {}",
                    self.log_prefix,
                    dir.display()
                );
                self.write_flags_list(id, &list)?;
            }

            self.item_mut(id)?.mtime = Some(cur_mtime);
        }

        if uncached_only {
            Ok(list.split_off(cached_count.min(list.len())))
        } else {
            Ok(list)
        }
    }

    /// Apply the mark table to `list` and recompute the folder's counts.
    ///
    /// Messages the table does not mention become new and unread.
    fn merge_marks(
        &mut self,
        id: FolderId,
        list: &mut [MessageRecord],
    ) -> Result<(), Error> {
        let table = self.read_mark_table(id)?;
        let mut counts = FolderCounts::default();
        let mut mark_dirty = false;

        match table {
            None => {
                for record in list.iter_mut() {
                    record.flags.perm = PermFlags::NEW | PermFlags::UNREAD;
                }
                counts.unmarked = list.len() as u32;
                mark_dirty = !list.is_empty();
            }
            Some(ref table) => {
                let mut matched = 0;
                for record in list.iter_mut() {
                    match table.get(&record.num) {
                        Some(&flags) => {
                            record.flags.perm = flags;
                            matched += 1;
                        }
                        None => {
                            record.flags.perm = PermFlags::NEW | PermFlags::UNREAD;
                            counts.unmarked += 1;
                            mark_dirty = true;
                        }
                    }
                }

                // Marks of messages that no longer exist
                if matched != table.len() {
                    mark_dirty = true;
                }
            }
        }

        counts.total = list.len() as u32;
        for record in list.iter() {
            if record.flags.perm.contains(PermFlags::NEW) {
                counts.new += 1;
            }
            if record.flags.perm.contains(PermFlags::UNREAD) {
                counts.unread += 1;
            }
        }

        let item = self.item_mut(id)?;
        item.counts = counts;
        item.mark_dirty |= mark_dirty;
        Ok(())
    }

    /// Parse the given message files with the header parser.
    ///
    /// Files the parser rejects are left out.
    fn parse_msgs(
        &self,
        id: FolderId,
        files: Vec<(MsgNum, PathBuf)>,
    ) -> Result<Vec<MessageRecord>, Error> {
        let flags = MsgFlags {
            perm: PermFlags::NEW | PermFlags::UNREAD,
            tmp: self.item(id)?.role.implied_tmp_flags(),
        };

        Ok(files
            .into_iter()
            .filter_map(|(num, path)| {
                let mut record =
                    self.parser.parse_message_file(&path, flags, true)?;
                record.num = num;
                Some(record)
            })
            .collect())
    }
}

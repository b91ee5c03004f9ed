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

use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::model::*;
use super::tree::{FolderCounts, FolderId, FolderRole};
use super::MhFolder;
use crate::support::error::Error;
use crate::support::file_ops::{self, EntryKind, IgnoreKinds};

/// Return the message files directly inside `dir`, in message number order.
///
/// Only regular files (or symlinks to them) whose name is a message number
/// count.
pub(super) fn msg_files(dir: &Path) -> Result<Vec<(MsgNum, PathBuf)>, Error> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let num = match entry.file_name().to_str().and_then(MsgNum::from_file_name)
        {
            Some(num) => num,
            None => continue,
        };

        match file_ops::entry_kind(&entry) {
            Ok(EntryKind::File) => files.push((num, entry.path())),
            Ok(_) => (),
            // Removed while we were looking
            Err(e) if io::ErrorKind::NotFound == e.kind() => (),
            Err(e) => return Err(e.into()),
        }
    }

    files.sort_by_key(|&(num, _)| num);
    files.dedup_by_key(|&mut (num, _)| num);
    Ok(files)
}

/// What one pass over a folder directory found.
#[derive(Debug, Default)]
struct DirListing {
    msgs: Vec<MsgNum>,
    subdirs: Vec<String>,
}

fn list_dir(dir: &Path) -> Result<DirListing, Error> {
    let mut listing = DirListing::default();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.starts_with('.') {
            continue;
        }

        let kind = match file_ops::entry_kind(&entry) {
            Ok(kind) => kind,
            Err(e) if io::ErrorKind::NotFound == e.kind() => continue,
            Err(e) => return Err(e.into()),
        };

        match kind {
            EntryKind::Directory => listing.subdirs.push(name),
            EntryKind::File => {
                if let Some(num) = MsgNum::from_file_name(&name) {
                    listing.msgs.push(num);
                }
            }
            EntryKind::Other => (),
        }
    }

    listing.subdirs.sort();
    Ok(listing)
}

impl MhFolder {
    /// Count the messages in the folder and find its highest message number.
    ///
    /// With `count_sums`, the new and unread counts are refreshed from the
    /// mark table, counting messages it lacks as new and unread. Queued cache
    /// records of a closed folder are written out. The folder's change
    /// baseline is forgotten so that the next listing checks the cache.
    pub fn scan_folder(
        &mut self,
        id: FolderId,
        count_sums: bool,
    ) -> Result<(), Error> {
        let dir = self.item_dir(id)?;
        let listing = list_dir(&dir)?;
        self.apply_scan(id, &listing.msgs, count_sums)?;
        self.flush_cache_queue(id)?;
        Ok(())
    }

    fn apply_scan(
        &mut self,
        id: FolderId,
        msgs: &[MsgNum],
        count_sums: bool,
    ) -> Result<(), Error> {
        let max_num = msgs.iter().map(|n| n.get()).max().unwrap_or(0);
        let total = msgs.len() as u32;

        let counts = if msgs.is_empty() {
            FolderCounts::default()
        } else if count_sums {
            // Marks of messages no longer on disk don't count
            let table = self.read_mark_table(id)?.unwrap_or_default();
            let mut counts = FolderCounts {
                total,
                ..FolderCounts::default()
            };
            for num in msgs {
                let flags = match table.get(num) {
                    Some(&flags) => flags,
                    None => {
                        counts.unmarked += 1;
                        PermFlags::NEW | PermFlags::UNREAD
                    }
                };
                if flags.contains(PermFlags::NEW) {
                    counts.new += 1;
                }
                if flags.contains(PermFlags::UNREAD) {
                    counts.unread += 1;
                }
            }
            counts
        } else {
            FolderCounts {
                total,
                ..self.item(id)?.counts
            }
        };

        let item = self.item_mut(id)?;
        item.counts = counts;
        item.last_num = Some(max_num);
        item.updated = true;
        item.mtime = None;
        Ok(())
    }

    /// Bring the whole folder tree in line with the directory tree.
    ///
    /// The mailbox root and the special top-level folders are created if
    /// missing. Items whose directory is gone are dropped, then every
    /// directory is visited, gaining an item if it lacks one and having its
    /// messages counted.
    pub fn scan_tree(&mut self) -> Result<(), Error> {
        info!("{} Scanning folder tree", self.log_prefix);

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true).mode(0o700);
        builder.create(&self.root)?;

        let layout = self.config().layout.clone();
        for name in &[
            &layout.inbox,
            &layout.outbox,
            &layout.queue,
            &layout.draft,
            &layout.trash,
            &layout.junk,
        ] {
            fs::DirBuilder::new()
                .mode(0o700)
                .create(self.root.join(name))
                .ignore_already_exists()?;
        }

        self.remove_missing_items()?;

        let mut visited = 0;
        self.scan_tree_recursive(FolderId::ROOT, 0, &mut visited)
    }

    fn remove_missing_items(&mut self) -> Result<(), Error> {
        for id in self.tree.post_order(FolderId::ROOT) {
            if FolderId::ROOT == id || self.tree.get(id).is_none() {
                continue;
            }

            if !self.item_dir(id)?.is_dir() {
                let path = self.item(id)?.display_path().to_owned();
                info!("{} Folder {} has disappeared", self.log_prefix, path);
                self.tree.remove_subtree(id);
                self.events.folder_removed(&path);
            }
        }

        Ok(())
    }

    fn scan_tree_recursive(
        &mut self,
        id: FolderId,
        depth: u32,
        visited: &mut usize,
    ) -> Result<(), Error> {
        let dir = self.item_dir(id)?;
        let listing = list_dir(&dir)?;

        if FolderId::ROOT != id {
            self.apply_scan(id, &listing.msgs, true)?;
        }

        *visited += 1;
        self.progress.notify(self.item(id)?, *visited);

        if listing.subdirs.is_empty() {
            return Ok(());
        }

        if depth >= self.config().scan.max_depth {
            warn!(
                "{} Not descending into {}: folders nested too deeply",
                self.log_prefix,
                dir.display()
            );
            return Ok(());
        }

        for name in listing.subdirs {
            let child = match self.tree.find_child(id, &name) {
                Some(child) => child,
                None => self.attach_child(id, &name),
            };
            self.scan_tree_recursive(child, depth + 1, visited)?;
        }

        Ok(())
    }

    /// Add an item for the existing directory `name` under `parent`.
    ///
    /// A top-level folder named by the layout configuration takes on its
    /// special role, unless another folder already has it.
    pub(super) fn attach_child(
        &mut self,
        parent: FolderId,
        name: &str,
    ) -> FolderId {
        let config = self.ctx.config();
        let child = self.tree.add_child(parent, name, config);

        if FolderId::ROOT == parent {
            let role = FolderRole::for_top_level_name(config, name);
            if FolderRole::Normal != role && self.tree.find_role(role).is_none()
            {
                if let Some(item) = self.tree.get_mut(child) {
                    item.role = role;
                }
            }
        }

        if let Some(item) = self.tree.get(child) {
            self.events.folder_added(item);
        }
        child
    }
}

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

//! The MH folder storage engine.
//!
//! A mailbox is a directory tree. Every directory below the root is a folder,
//! and the logical path of a folder is its directory path relative to the
//! root with `/` separators. The contents of a folder directory are:
//!
//! - `N`, for decimal `N > 0`. The message with message number `N`. Names
//!   with leading zeroes are accepted when reading, but never created.
//!
//! - `.mh_cache` (configurable). The summary cache: a u32 LE `CACHE_VERSION`
//!   followed by one record per message. See `cache_store`.
//!
//! - `.mh_mark` (configurable). The mark file: a u32 LE `MARK_VERSION`
//!   followed by `(num, flags)` u32 LE pairs. The file is a log; a later
//!   record for the same message replaces an earlier one. See `mark_store`.
//!
//! - Subdirectories not starting with `.`, each being a child folder.
//!
//! Both data files are only ever a cache of what the directory holds. Either
//! may be deleted, truncated, or replaced with a file of another version at
//! any time; the engine then behaves as if the file did not exist and
//! rebuilds it from the messages themselves. Messages in no mark record are
//! new and unread.
//!
//! The top-level folders named by the `[layout]` configuration (`inbox`,
//! `sent`, `queue`, `draft`, `trash`, `junk` by default) are created by the
//! tree scan and take on a special role the first time they are seen.
//!
//! ## Change detection
//!
//! Each folder item remembers the mtime of its directory as of the last time
//! the cache and mark files were brought up to date. If the directory still
//! has that mtime, listing the folder trusts the cache outright. Otherwise,
//! cached records are checked against the message files and any new message
//! files are parsed. Data files are rewritten in place so that doing so does
//! not itself disturb the directory mtime.
//!
//! ## Deferred writes
//!
//! While a folder is open, flag changes and new cache records accumulate in
//! memory. They reach the disk when the folder is closed, or the next time
//! the folder is listed after that. See `tree::QueueState`.
//!
//! ## About the layout of this module
//!
//! `MhFolder` is collectively a single abstraction whose methods are split
//! across several files by concern.

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod cache_store;
pub mod codec;
pub mod collab;
pub mod context;
pub mod data_file;
pub mod header;
pub mod mark_store;
pub mod model;
pub mod tree;

mod folder_ops; // create, remove, rename and move folders
mod message_list; // the central read path
mod messages; // add, copy, move, remove and fetch messages
mod scan; // directory reconciliation

pub use self::collab::{HeaderParser, ProgressSink, StoreEvents};
pub use self::context::StoreContext;
pub use self::messages::MsgFileInfo;
pub use self::model::*;
pub use self::tree::{FolderId, FolderItem, FolderRole, FolderTree};

use self::collab::{NullEvents, NullProgress};
use self::header::SimpleHeaderParser;
use crate::support::error::Error;
use crate::support::system_config::StoreConfig;

/// A handle on one MH mailbox and its folder tree.
pub struct MhFolder {
    log_prefix: String,
    root: PathBuf,
    ctx: Arc<StoreContext>,
    tree: FolderTree,
    parser: Arc<dyn HeaderParser + Send + Sync>,
    progress: Arc<dyn ProgressSink + Send + Sync>,
    events: Arc<dyn StoreEvents + Send + Sync>,
}

impl MhFolder {
    /// Create a handle on the mailbox rooted at `root`.
    ///
    /// Nothing is read from disk until the tree or a folder is scanned.
    pub fn new(ctx: Arc<StoreContext>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let tree = FolderTree::new(ctx.config());
        MhFolder {
            log_prefix: format!("mh:{}", root.display()),
            root,
            ctx,
            tree,
            parser: Arc::new(SimpleHeaderParser),
            progress: Arc::new(NullProgress),
            events: Arc::new(NullEvents),
        }
    }

    pub fn with_parser(
        mut self,
        parser: Arc<dyn HeaderParser + Send + Sync>,
    ) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_progress(
        mut self,
        progress: Arc<dyn ProgressSink + Send + Sync>,
    ) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_events(
        mut self,
        events: Arc<dyn StoreEvents + Send + Sync>,
    ) -> Self {
        self.events = events;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    pub fn config(&self) -> &StoreConfig {
        self.ctx.config()
    }

    pub fn tree(&self) -> &FolderTree {
        &self.tree
    }

    #[cfg(test)]
    pub(crate) fn tree_mut(&mut self) -> &mut FolderTree {
        &mut self.tree
    }

    pub fn item(&self, id: FolderId) -> Result<&FolderItem, Error> {
        self.tree.get(id).ok_or(Error::NxFolder)
    }

    fn item_mut(&mut self, id: FolderId) -> Result<&mut FolderItem, Error> {
        self.tree.get_mut(id).ok_or(Error::NxFolder)
    }

    /// Return the directory backing the folder `id`.
    pub fn item_dir(&self, id: FolderId) -> Result<PathBuf, Error> {
        let item = self.item(id)?;
        Ok(match item.path {
            None => self.root.clone(),
            Some(ref path) => path
                .split('/')
                .filter(|p| !p.is_empty())
                .fold(self.root.clone(), |dir, part| dir.join(part)),
        })
    }

    pub fn find_item_by_path(&self, path: &str) -> Option<FolderId> {
        self.tree.find_by_path(path)
    }

    /// Like `find_item_by_path`, but fails with `NxFolder`.
    pub fn require_item_by_path(&self, path: &str) -> Result<FolderId, Error> {
        self.find_item_by_path(path).ok_or(Error::NxFolder)
    }

    fn cache_path(&self, id: FolderId) -> Result<PathBuf, Error> {
        Ok(self.item_dir(id)?.join(&self.config().cache.cache_file))
    }

    fn mark_path(&self, id: FolderId) -> Result<PathBuf, Error> {
        Ok(self.item_dir(id)?.join(&self.config().cache.mark_file))
    }

    fn msg_path(&self, id: FolderId, num: MsgNum) -> Result<PathBuf, Error> {
        Ok(self.item_dir(id)?.join(num.to_string()))
    }

    /// Change how message lists of the folder are sorted.
    pub fn set_sort(
        &mut self,
        id: FolderId,
        key: SortKey,
        order: SortOrder,
    ) -> Result<(), Error> {
        let item = self.item_mut(id)?;
        item.sort_key = key;
        item.sort_order = order;
        Ok(())
    }

    /// Enter the open state, in which mark and cache writes for the folder
    /// are deferred.
    pub fn open_folder(&mut self, id: FolderId) -> Result<(), Error> {
        self.item_mut(id)?.queue.open();
        Ok(())
    }

    /// Leave the open state, writing out everything that was deferred.
    ///
    /// The pending queues are appended to their files. If the folder still
    /// needs a full rewrite of either file after that, the message list is
    /// rebuilt once so that the rewrite happens now.
    pub fn close_folder(&mut self, id: FolderId) -> Result<(), Error> {
        self.item_mut(id)?.queue.close();
        self.flush_mark_queue(id)?;
        self.flush_cache_queue(id)?;

        let item = self.item(id)?;
        if item.cache_dirty || item.mark_dirty {
            self.get_message_list(id, true)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test_prelude {
    pub(super) use super::*;
    pub(super) use crate::support::error::Error;
    pub(super) use crate::support::system_config::StoreConfig;

    use std::fs;
    use std::sync::Arc;

    use tempfile::TempDir;

    pub(super) struct Setup {
        pub root: TempDir,
        pub mh: MhFolder,
    }

    pub(super) fn set_up() -> Setup {
        set_up_with_config(StoreConfig::default())
    }

    pub(super) fn set_up_with_config(config: StoreConfig) -> Setup {
        crate::init_test_log();

        let root = TempDir::new().unwrap();
        let ctx = Arc::new(StoreContext::new(config));
        let mut mh = MhFolder::new(ctx, root.path());
        mh.scan_tree().unwrap();
        Setup { root, mh }
    }

    pub(super) fn message(subject: &str) -> String {
        format!(
            "From: Tester <tester@example.com>\r\n\
             To: someone@example.com\r\n\
             Subject: {}\r\n\
             Date: Mon, 6 Jul 2020 12:00:00 +0000\r\n\
             Message-ID: <{}@example.com>\r\n\
             \r\n\
             Body of {}\r\n",
            subject,
            subject.replace(' ', "."),
            subject
        )
    }

    /// Put a message file directly into the folder, bypassing the engine.
    pub(super) fn drop_msg(mh: &MhFolder, id: FolderId, num: u32, subject: &str) {
        fs::write(
            mh.item_dir(id).unwrap().join(num.to_string()),
            message(subject),
        )
        .unwrap();
    }

    pub(super) fn inbox(mh: &MhFolder) -> FolderId {
        mh.find_item_by_path("inbox").unwrap()
    }

    pub(super) fn nums(list: &[MessageRecord]) -> Vec<u32> {
        list.iter().map(|r| r.num.get()).collect()
    }
}

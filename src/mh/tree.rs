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

//! The in-memory folder tree.
//!
//! Folder items live in an arena owned by `FolderTree` and refer to each other
//! by `FolderId`. Slot 0 is always the root item, which stands for the mailbox
//! root directory itself and has no logical path.

use std::mem;
use std::time::SystemTime;

use super::model::*;
use crate::support::system_config::StoreConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FolderId(usize);

impl FolderId {
    pub const ROOT: FolderId = FolderId(0);
}

/// The special purpose of a top-level folder, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FolderRole {
    Normal,
    Inbox,
    Outbox,
    Queue,
    Draft,
    Trash,
    Junk,
}

impl FolderRole {
    /// Return the role that a top-level directory named `name` takes on under
    /// `config`.
    pub fn for_top_level_name(config: &StoreConfig, name: &str) -> Self {
        let layout = &config.layout;
        if name == layout.inbox {
            FolderRole::Inbox
        } else if name == layout.outbox {
            FolderRole::Outbox
        } else if name == layout.queue {
            FolderRole::Queue
        } else if name == layout.draft {
            FolderRole::Draft
        } else if name == layout.trash {
            FolderRole::Trash
        } else if name == layout.junk {
            FolderRole::Junk
        } else {
            FolderRole::Normal
        }
    }

    /// Transient flags implied for every message in a folder of this role.
    pub fn implied_tmp_flags(self) -> TmpFlags {
        match self {
            FolderRole::Queue => TmpFlags::QUEUED,
            FolderRole::Draft => TmpFlags::DRAFT,
            _ => TmpFlags::empty(),
        }
    }

    /// Whether cached records of this folder are always checked against the
    /// message files, regardless of configuration.
    pub fn always_verify(self) -> bool {
        match self {
            FolderRole::Queue | FolderRole::Draft => true,
            _ => false,
        }
    }
}

/// Mark and cache writes which have not yet reached the disk.
#[derive(Clone, Debug, Default)]
pub struct PendingWrites {
    pub marks: Vec<(MsgNum, PermFlags)>,
    pub cache: Vec<MessageRecord>,
}

impl PendingWrites {
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty() && self.cache.is_empty()
    }
}

/// Where a folder stands with respect to its deferred writes.
///
/// While a folder is open, writes only accumulate. Only a closed folder ever
/// has its pending writes flushed, which returns it to `ClosedClean`.
#[derive(Clone, Debug)]
pub enum QueueState {
    ClosedClean,
    ClosedDirty(PendingWrites),
    OpenAccumulating(PendingWrites),
}

impl Default for QueueState {
    fn default() -> Self {
        QueueState::ClosedClean
    }
}

impl QueueState {
    pub fn is_open(&self) -> bool {
        match *self {
            QueueState::OpenAccumulating(_) => true,
            _ => false,
        }
    }

    pub fn pending(&self) -> Option<&PendingWrites> {
        match *self {
            QueueState::ClosedClean => None,
            QueueState::ClosedDirty(ref p)
            | QueueState::OpenAccumulating(ref p) => Some(p),
        }
    }

    pub fn pending_marks(&self) -> &[(MsgNum, PermFlags)] {
        self.pending().map(|p| &p.marks[..]).unwrap_or(&[])
    }

    pub fn pending_cache(&self) -> &[MessageRecord] {
        self.pending().map(|p| &p.cache[..]).unwrap_or(&[])
    }

    fn pending_mut(&mut self) -> &mut PendingWrites {
        if let QueueState::ClosedClean = *self {
            *self = QueueState::ClosedDirty(PendingWrites::default());
        }

        match *self {
            QueueState::ClosedDirty(ref mut p)
            | QueueState::OpenAccumulating(ref mut p) => p,
            QueueState::ClosedClean => unreachable!(),
        }
    }

    pub fn enqueue_mark(&mut self, num: MsgNum, flags: PermFlags) {
        self.pending_mut().marks.push((num, flags));
    }

    pub fn enqueue_cache(&mut self, record: MessageRecord) {
        self.pending_mut().cache.push(record);
    }

    pub fn open(&mut self) {
        *self = match mem::take(self) {
            QueueState::ClosedClean => {
                QueueState::OpenAccumulating(PendingWrites::default())
            }
            QueueState::ClosedDirty(p) | QueueState::OpenAccumulating(p) => {
                QueueState::OpenAccumulating(p)
            }
        };
    }

    pub fn close(&mut self) {
        *self = match mem::take(self) {
            QueueState::OpenAccumulating(p) | QueueState::ClosedDirty(p)
                if !p.is_empty() =>
            {
                QueueState::ClosedDirty(p)
            }
            _ => QueueState::ClosedClean,
        };
    }

    /// Remove and return the pending mark writes, if the folder is closed.
    pub fn take_marks_for_flush(&mut self) -> Vec<(MsgNum, PermFlags)> {
        let taken = match *self {
            QueueState::ClosedDirty(ref mut p) => mem::take(&mut p.marks),
            _ => return Vec::new(),
        };
        self.settle();
        taken
    }

    /// Remove and return the pending cache writes, if the folder is closed.
    pub fn take_cache_for_flush(&mut self) -> Vec<MessageRecord> {
        let taken = match *self {
            QueueState::ClosedDirty(ref mut p) => mem::take(&mut p.cache),
            _ => return Vec::new(),
        };
        self.settle();
        taken
    }

    fn settle(&mut self) {
        if let QueueState::ClosedDirty(ref p) = *self {
            if p.is_empty() {
                *self = QueueState::ClosedClean;
            }
        }
    }
}

/// Message counts of one folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FolderCounts {
    pub new: u32,
    pub unread: u32,
    pub total: u32,
    /// Messages for which no flags had been recorded yet.
    pub unmarked: u32,
}

/// One folder of the mailbox.
#[derive(Clone, Debug)]
pub struct FolderItem {
    /// The final component of the folder's path; empty for the root.
    pub name: String,
    /// The `/`-separated path of this folder relative to the mailbox root,
    /// `None` for the root itself.
    pub path: Option<String>,
    pub parent: Option<FolderId>,
    pub children: Vec<FolderId>,
    pub role: FolderRole,

    /// The highest message number known to be in use, or `None` if the
    /// folder has not been scanned.
    pub last_num: Option<u32>,
    pub counts: FolderCounts,
    /// Set whenever a scan has refreshed the counts and cleared by whoever
    /// displays them.
    pub updated: bool,

    pub cache_dirty: bool,
    pub mark_dirty: bool,
    /// The directory mtime as of the last time the cache and mark files were
    /// known to agree with the directory. `None` forces a full check.
    pub mtime: Option<SystemTime>,
    pub queue: QueueState,

    pub sort_key: SortKey,
    pub sort_order: SortOrder,
}

impl FolderItem {
    fn new(
        name: String,
        path: Option<String>,
        parent: Option<FolderId>,
        config: &StoreConfig,
    ) -> Self {
        FolderItem {
            name,
            path,
            parent,
            children: Vec::new(),
            role: FolderRole::Normal,
            last_num: None,
            counts: FolderCounts::default(),
            updated: false,
            cache_dirty: false,
            mark_dirty: false,
            mtime: None,
            queue: QueueState::default(),
            sort_key: config.sort.key,
            sort_order: config.sort.order,
        }
    }

    pub fn is_open(&self) -> bool {
        self.queue.is_open()
    }

    /// The logical path, with the root rendered as the empty string.
    pub fn display_path(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }
}

/// Join a parent's logical path and a child name.
pub fn child_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        None | Some("") => name.to_owned(),
        Some(p) => format!("{}/{}", p, name),
    }
}

#[derive(Clone, Debug)]
pub struct FolderTree {
    nodes: Vec<Option<FolderItem>>,
}

impl FolderTree {
    pub fn new(config: &StoreConfig) -> Self {
        FolderTree {
            nodes: vec![Some(FolderItem::new(
                String::new(),
                None,
                None,
                config,
            ))],
        }
    }

    pub fn get(&self, id: FolderId) -> Option<&FolderItem> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: FolderId) -> Option<&mut FolderItem> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Iterate over all live items, in no particular order.
    pub fn ids<'a>(&'a self) -> impl Iterator<Item = FolderId> + 'a {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(ix, _)| FolderId(ix))
    }

    pub fn len(&self) -> usize {
        self.ids().count()
    }

    pub fn find_child(&self, parent: FolderId, name: &str) -> Option<FolderId> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.get(c).map_or(false, |c| c.name == name))
    }

    /// Find the item whose logical path is `path`. The empty path is the
    /// root.
    pub fn find_by_path(&self, path: &str) -> Option<FolderId> {
        let mut id = FolderId::ROOT;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            id = self.find_child(id, part)?;
        }
        Some(id)
    }

    pub fn find_role(&self, role: FolderRole) -> Option<FolderId> {
        self.ids()
            .find(|&id| self.get(id).map_or(false, |i| i.role == role))
    }

    /// Create a new child of `parent` named `name`.
    ///
    /// The caller is responsible for `name` being unique among the children
    /// of `parent`.
    pub fn add_child(
        &mut self,
        parent: FolderId,
        name: &str,
        config: &StoreConfig,
    ) -> FolderId {
        let path = child_path(
            self.get(parent).and_then(|p| p.path.as_deref()),
            name,
        );
        let id = FolderId(self.nodes.len());
        self.nodes.push(Some(FolderItem::new(
            name.to_owned(),
            Some(path),
            Some(parent),
            config,
        )));
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        id
    }

    /// Return whether `candidate` is `ancestor` or lies anywhere beneath it.
    pub fn is_self_or_descendant(
        &self,
        candidate: FolderId,
        ancestor: FolderId,
    ) -> bool {
        let mut cur = Some(candidate);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.get(id).and_then(|i| i.parent);
        }
        false
    }

    /// `id` and everything beneath it, parents before children.
    pub fn pre_order(&self, id: FolderId) -> Vec<FolderId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(item) = self.get(id) {
                out.push(id);
                stack.extend(item.children.iter().rev().copied());
            }
        }
        out
    }

    /// `id` and everything beneath it, children before parents.
    pub fn post_order(&self, id: FolderId) -> Vec<FolderId> {
        let mut out = self.pre_order(id);
        out.reverse();
        out
    }

    /// Detach `id` from its parent and free it and all its descendants.
    pub fn remove_subtree(&mut self, id: FolderId) {
        if FolderId::ROOT == id {
            return;
        }

        if let Some(parent) = self.get(id).and_then(|i| i.parent) {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|&c| c != id);
            }
        }

        for victim in self.post_order(id) {
            self.nodes[victim.0] = None;
        }
    }

    /// Move `id` under `new_parent` with the given name. Paths of the subtree
    /// are left alone.
    pub fn reparent(&mut self, id: FolderId, new_parent: FolderId, name: &str) {
        if let Some(old_parent) = self.get(id).and_then(|i| i.parent) {
            if let Some(p) = self.get_mut(old_parent) {
                p.children.retain(|&c| c != id);
            }
        }
        if let Some(p) = self.get_mut(new_parent) {
            p.children.push(id);
        }
        if let Some(item) = self.get_mut(id) {
            item.parent = Some(new_parent);
            item.name = name.to_owned();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tree() -> (FolderTree, StoreConfig) {
        let config = StoreConfig::default();
        (FolderTree::new(&config), config)
    }

    #[test]
    fn paths_and_lookup() {
        let (mut tree, config) = tree();
        let work = tree.add_child(FolderId::ROOT, "work", &config);
        let project = tree.add_child(work, "project", &config);

        assert_eq!(Some("work/project"), tree.get(project).unwrap().path.as_deref());
        assert_eq!(Some(project), tree.find_by_path("work/project"));
        assert_eq!(Some(work), tree.find_by_path("work"));
        assert_eq!(Some(FolderId::ROOT), tree.find_by_path(""));
        assert_eq!(None, tree.find_by_path("work/nx"));
    }

    #[test]
    fn descendants_and_removal() {
        let (mut tree, config) = tree();
        let a = tree.add_child(FolderId::ROOT, "a", &config);
        let b = tree.add_child(a, "b", &config);
        let c = tree.add_child(b, "c", &config);
        let d = tree.add_child(FolderId::ROOT, "d", &config);

        assert!(tree.is_self_or_descendant(c, a));
        assert!(tree.is_self_or_descendant(a, a));
        assert!(!tree.is_self_or_descendant(a, c));
        assert!(!tree.is_self_or_descendant(d, a));

        assert_eq!(vec![a, b, c], tree.pre_order(a));
        assert_eq!(vec![c, b, a], tree.post_order(a));

        tree.remove_subtree(b);
        assert!(tree.get(b).is_none());
        assert!(tree.get(c).is_none());
        assert!(tree.get(a).unwrap().children.is_empty());
        assert_eq!(3, tree.len());
    }

    #[test]
    fn queue_state_transitions() {
        let mut q = QueueState::default();
        assert!(q.pending().is_none());

        q.enqueue_mark(MsgNum::u(1), PermFlags::NEW);
        assert_matches!(QueueState::ClosedDirty(_), &q);

        q.open();
        q.enqueue_mark(MsgNum::u(2), PermFlags::UNREAD);
        assert!(q.is_open());
        // Nothing is flushed while open
        assert!(q.take_marks_for_flush().is_empty());
        assert_eq!(2, q.pending_marks().len());

        q.close();
        assert_eq!(2, q.take_marks_for_flush().len());
        assert_matches!(QueueState::ClosedClean, &q);

        q.open();
        q.close();
        assert_matches!(QueueState::ClosedClean, &q);
    }

    #[test]
    fn partial_flush_keeps_other_queue() {
        let mut q = QueueState::default();
        q.enqueue_mark(MsgNum::u(1), PermFlags::NEW);
        q.enqueue_cache(MessageRecord::new(MsgNum::u(1)));

        assert_eq!(1, q.take_cache_for_flush().len());
        assert_matches!(QueueState::ClosedDirty(_), &q);
        assert_eq!(1, q.take_marks_for_flush().len());
        assert_matches!(QueueState::ClosedClean, &q);
    }
}

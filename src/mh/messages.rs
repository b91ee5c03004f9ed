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
use std::path::{Path, PathBuf};

use log::{error, info};

use super::cache_store::record_is_stale;
use super::model::*;
use super::scan::msg_files;
use super::tree::{FolderId, QueueState};
use super::MhFolder;
use crate::support::error::{Conflict, Error};
use crate::support::file_ops::{self, ErrorTransforms, IgnoreKinds};

/// A file to be added to a folder as a new message.
#[derive(Clone, Debug)]
pub struct MsgFileInfo {
    pub file: PathBuf,
    pub flags: MsgFlags,
    /// The summary of the message, if the caller already has one. Otherwise
    /// the file is parsed once it is in place.
    pub record: Option<MessageRecord>,
}

impl MsgFileInfo {
    pub fn new(file: impl Into<PathBuf>, flags: MsgFlags) -> Self {
        MsgFileInfo {
            file: file.into(),
            flags,
            record: None,
        }
    }
}

impl MhFolder {
    /// Find the next free message number in the folder.
    ///
    /// This is one more than the highest number known to be in use, moved
    /// further up past any file that has appeared since. A folder that has
    /// never been scanned is scanned first.
    pub fn new_msg_num(&mut self, id: FolderId) -> Result<MsgNum, Error> {
        if self.item(id)?.last_num.is_none() {
            self.scan_folder(id, false)?;
        }

        let last = self.item(id)?.last_num.unwrap_or(0);
        let mut next = last.checked_add(1).ok_or(Error::FolderFull)?;
        loop {
            let num = MsgNum::of(next).ok_or(Error::FolderFull)?;
            if fs::symlink_metadata(self.msg_path(id, num)?).is_err() {
                return Ok(num);
            }
            next = next.checked_add(1).ok_or(Error::FolderFull)?;
        }
    }

    /// Add `file` to the folder as a new message with the given flags.
    ///
    /// With `remove_source`, the file is moved into the folder; otherwise it
    /// is copied.
    pub fn add_msg(
        &mut self,
        id: FolderId,
        file: &Path,
        flags: MsgFlags,
        remove_source: bool,
    ) -> Result<MsgNum, Error> {
        let nums =
            self.add_msgs(id, &[MsgFileInfo::new(file, flags)], remove_source)?;
        nums.into_iter().next().ok_or(Error::NxMessage)
    }

    /// Add each of `files` to the folder as new messages, in order.
    ///
    /// Their marks and cache records are queued as each file is placed. If
    /// the folder is not open, the queues are written out once at the end,
    /// including when a file fails part way through; the files already
    /// placed stay in the folder.
    pub fn add_msgs(
        &mut self,
        id: FolderId,
        files: &[MsgFileInfo],
        remove_source: bool,
    ) -> Result<Vec<MsgNum>, Error> {
        let (nums, result) = self.place_msgs(id, files, remove_source);
        result.map(|()| nums)
    }

    /// Like `add_msgs`, but the numbers of the messages placed before a
    /// failure are returned alongside it.
    fn place_msgs(
        &mut self,
        id: FolderId,
        files: &[MsgFileInfo],
        remove_source: bool,
    ) -> (Vec<MsgNum>, Result<(), Error>) {
        let mut nums = Vec::with_capacity(files.len());
        let mut result = Ok(());
        for info in files {
            match self.place_msg(id, info, remove_source) {
                Ok(num) => nums.push(num),
                Err(e) => {
                    error!(
                        "{} Failed to add {}: {}",
                        self.log_prefix,
                        info.file.display(),
                        e
                    );
                    result = Err(e);
                    break;
                }
            }
        }

        let flushed = self.flush_if_closed(id);
        (nums, result.and(flushed))
    }

    fn flush_if_closed(&mut self, id: FolderId) -> Result<(), Error> {
        if !self.item(id)?.is_open() {
            self.flush_mark_queue(id)?;
            self.flush_cache_queue(id)?;
        }
        Ok(())
    }

    fn place_msg(
        &mut self,
        id: FolderId,
        info: &MsgFileInfo,
        remove_source: bool,
    ) -> Result<MsgNum, Error> {
        let num = self.new_msg_num(id)?;
        let dst = self.msg_path(id, num)?;
        if remove_source {
            file_ops::move_file(&info.file, &dst, 0o600)
        } else {
            file_ops::copy_new(&info.file, &dst, 0o600)
        }
        .on_not_found(Error::NxMessage)?;

        let record = match info.record {
            Some(ref record) => {
                let mut record = record.clone();
                let md = fs::metadata(&dst)?;
                record.size = md.len().min(u64::from(u32::MAX)) as u32;
                record.mtime = md
                    .modified()
                    .map(file_ops::epoch_secs_u32)
                    .unwrap_or(0);
                record.flags = info.flags;
                Some(record)
            }
            None => self.parser.parse_message_file(&dst, info.flags, true),
        };

        self.enqueue_mark(id, num, info.flags.perm)?;
        if let Some(ref record) = record {
            self.enqueue_cache(id, num, record)?;
        }

        let item = self.item_mut(id)?;
        item.last_num = Some(item.last_num.unwrap_or(0).max(num.get()));
        item.counts.total += 1;
        if info.flags.perm.contains(PermFlags::NEW) {
            item.counts.new += 1;
        }
        if info.flags.perm.contains(PermFlags::UNREAD) {
            item.counts.unread += 1;
        }
        item.mtime = None;

        self.events.message_added(self.item(id)?, num);
        Ok(num)
    }

    /// Copy the messages described by `records` from `src` into `dst`,
    /// carrying over their flags and summaries.
    pub fn copy_msgs(
        &mut self,
        dst: FolderId,
        src: FolderId,
        records: &[MessageRecord],
    ) -> Result<Vec<MsgNum>, Error> {
        self.transfer_msgs(dst, src, records, false)
    }

    /// Like `copy_msgs`, but the messages are removed from `src`.
    pub fn move_msgs(
        &mut self,
        dst: FolderId,
        src: FolderId,
        records: &[MessageRecord],
    ) -> Result<Vec<MsgNum>, Error> {
        self.transfer_msgs(dst, src, records, true)
    }

    pub fn copy_msg(
        &mut self,
        dst: FolderId,
        src: FolderId,
        record: &MessageRecord,
    ) -> Result<MsgNum, Error> {
        self.copy_msgs(dst, src, std::slice::from_ref(record))?
            .into_iter()
            .next()
            .ok_or(Error::NxMessage)
    }

    pub fn move_msg(
        &mut self,
        dst: FolderId,
        src: FolderId,
        record: &MessageRecord,
    ) -> Result<MsgNum, Error> {
        self.move_msgs(dst, src, std::slice::from_ref(record))?
            .into_iter()
            .next()
            .ok_or(Error::NxMessage)
    }

    fn transfer_msgs(
        &mut self,
        dst: FolderId,
        src: FolderId,
        records: &[MessageRecord],
        remove_source: bool,
    ) -> Result<Vec<MsgNum>, Error> {
        if dst == src {
            return Err(Error::StructuralConflict(Conflict::SameFolder));
        }

        let files = records
            .iter()
            .map(|r| {
                Ok(MsgFileInfo {
                    file: self.msg_path(src, r.num)?,
                    flags: r.flags,
                    record: Some(r.clone()),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let (nums, result) = self.place_msgs(dst, &files, remove_source);
        if remove_source {
            for record in &records[..nums.len()] {
                self.note_removed(src, record.num, record.flags.perm)?;
            }
        }

        result.map(|()| nums)
    }

    fn note_removed(
        &mut self,
        id: FolderId,
        num: MsgNum,
        flags: PermFlags,
    ) -> Result<(), Error> {
        let item = self.item_mut(id)?;
        item.counts.total = item.counts.total.saturating_sub(1);
        if flags.contains(PermFlags::NEW) {
            item.counts.new = item.counts.new.saturating_sub(1);
        }
        if flags.contains(PermFlags::UNREAD) {
            item.counts.unread = item.counts.unread.saturating_sub(1);
        }
        item.mtime = None;

        self.events.message_removed(self.item(id)?, num);
        Ok(())
    }

    /// Delete message `num` from the folder.
    ///
    /// Its cache and mark records are dropped the next time the folder is
    /// listed.
    pub fn remove_msg(&mut self, id: FolderId, num: MsgNum) -> Result<(), Error> {
        let path = self.msg_path(id, num)?;
        fs::remove_file(&path).on_not_found(Error::NxMessage)?;
        self.note_removed(id, num, PermFlags::empty())
    }

    /// Delete each of `nums`, stopping at the first failure.
    pub fn remove_msgs(
        &mut self,
        id: FolderId,
        nums: &[MsgNum],
    ) -> Result<(), Error> {
        for &num in nums {
            self.remove_msg(id, num)?;
        }
        Ok(())
    }

    /// Delete every message in the folder, along with its cache and mark
    /// files. Child folders are left alone.
    pub fn remove_all_msgs(&mut self, id: FolderId) -> Result<(), Error> {
        let dir = self.item_dir(id)?;
        let files = msg_files(&dir)?;
        for &(_, ref path) in &files {
            fs::remove_file(path).ignore_not_found()?;
        }
        fs::remove_file(self.cache_path(id)?).ignore_not_found()?;
        fs::remove_file(self.mark_path(id)?).ignore_not_found()?;

        info!(
            "{} Removed all {} messages from {}",
            self.log_prefix,
            files.len(),
            dir.display()
        );

        let item = self.item_mut(id)?;
        let open = item.is_open();
        item.queue = QueueState::default();
        if open {
            item.queue.open();
        }
        item.counts = Default::default();
        item.cache_dirty = false;
        item.mark_dirty = false;
        item.mtime = None;

        for (num, _) in files {
            self.events.message_removed(self.item(id)?, num);
        }
        Ok(())
    }

    /// Return the path of message `num`, failing with `NxMessage` if there
    /// is no such file.
    pub fn fetch_msg(&self, id: FolderId, num: MsgNum) -> Result<PathBuf, Error> {
        let path = self.msg_path(id, num)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NxMessage)
        }
    }

    /// Whether the message file of `record` differs in size or mtime from
    /// what the record says, or is gone.
    pub fn is_msg_changed(
        &self,
        id: FolderId,
        record: &MessageRecord,
    ) -> Result<bool, Error> {
        Ok(record_is_stale(&self.msg_path(id, record.num)?, record))
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    use super::super::cache_store::read_cache_file;
    use super::super::mark_store::read_mark_file;
    use super::super::test_prelude::*;
    use super::*;

    fn source_files(n: usize) -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let files = (0..n)
            .map(|i| {
                let path = dir.path().join(format!("src{}", i));
                fs::write(&path, message(&format!("message {}", i))).unwrap();
                path
            })
            .collect();
        (dir, files)
    }

    fn read_flags() -> MsgFlags {
        MsgFlags {
            perm: PermFlags::REPLIED,
            tmp: TmpFlags::empty(),
        }
    }

    #[test]
    fn numbering_is_monotonic() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        let (_src, files) = source_files(5);

        let mut assigned = Vec::new();
        for file in &files {
            assigned.push(
                setup
                    .mh
                    .add_msg(inbox, file, MsgFlags::received(), false)
                    .unwrap()
                    .get(),
            );
        }

        assert_eq!(vec![1, 2, 3, 4, 5], assigned);
        assert_eq!(Some(5), setup.mh.item(inbox).unwrap().last_num);
        assert_eq!(5, setup.mh.item(inbox).unwrap().counts.total);
        assert!(files.iter().all(|f| f.is_file()));

        let mode = fs::metadata(setup.mh.fetch_msg(inbox, MsgNum::u(3)).unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(0o600, mode & 0o777);
    }

    #[test]
    fn numbering_skips_unexpected_files() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        drop_msg(&setup.mh, inbox, 1, "one");
        drop_msg(&setup.mh, inbox, 2, "two");

        assert_eq!(MsgNum::u(3), setup.mh.new_msg_num(inbox).unwrap());
    }

    #[test]
    fn numbering_scans_unscanned_folder() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        drop_msg(&setup.mh, inbox, 7, "seven");
        setup.mh.tree_mut().get_mut(inbox).unwrap().last_num = None;

        assert_eq!(MsgNum::u(8), setup.mh.new_msg_num(inbox).unwrap());
        assert_eq!(Some(7), setup.mh.item(inbox).unwrap().last_num);
    }

    #[test]
    fn full_folder() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        setup.mh.tree_mut().get_mut(inbox).unwrap().last_num = Some(u32::MAX);

        assert_matches!(Err(Error::FolderFull), setup.mh.new_msg_num(inbox));
    }

    #[test]
    fn add_to_closed_folder_writes_through() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        let (_src, files) = source_files(3);
        let infos = files
            .iter()
            .map(|f| MsgFileInfo::new(f, read_flags()))
            .collect::<Vec<_>>();

        let nums = setup.mh.add_msgs(inbox, &infos, true).unwrap();
        assert_eq!(3, nums.len());
        assert!(files.iter().all(|f| !f.exists()));

        let cache =
            read_cache_file(&setup.mh.cache_path(inbox).unwrap()).unwrap();
        assert_eq!(3, cache.records.len());
        assert_eq!(Some("message 1"), cache.records[1].subject.as_deref());

        let marks = read_mark_file(&setup.mh.mark_path(inbox).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(PermFlags::REPLIED, marks[&MsgNum::u(2)]);

        assert!(setup.mh.get_uncached_messages(inbox).unwrap().is_empty());
        let list = setup.mh.get_message_list(inbox, true).unwrap();
        assert!(list.iter().all(|r| PermFlags::REPLIED == r.flags.perm));
    }

    #[test]
    fn add_to_open_folder_defers() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        let (_src, files) = source_files(2);

        setup.mh.open_folder(inbox).unwrap();
        for file in &files {
            setup
                .mh
                .add_msg(inbox, file, MsgFlags::received(), false)
                .unwrap();
        }

        let cache_path = setup.mh.cache_path(inbox).unwrap();
        assert!(!cache_path.exists());
        assert!(!setup.mh.mark_path(inbox).unwrap().exists());

        setup.mh.close_folder(inbox).unwrap();
        assert_eq!(2, read_cache_file(&cache_path).unwrap().records.len());
        assert_eq!(
            2,
            read_mark_file(&setup.mh.mark_path(inbox).unwrap())
                .unwrap()
                .unwrap()
                .len()
        );
    }

    #[test]
    fn failed_add_keeps_earlier_messages() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        let (src, mut files) = source_files(2);
        files.insert(1, src.path().join("nonexistent"));
        let infos = files
            .iter()
            .map(|f| MsgFileInfo::new(f, MsgFlags::received()))
            .collect::<Vec<_>>();

        assert_matches!(
            Err(Error::NxMessage),
            setup.mh.add_msgs(inbox, &infos, false)
        );

        let cache =
            read_cache_file(&setup.mh.cache_path(inbox).unwrap()).unwrap();
        assert_eq!(1, cache.records.len());
        assert!(setup.mh.fetch_msg(inbox, MsgNum::u(1)).is_ok());
        assert_matches!(
            Err(Error::NxMessage),
            setup.mh.fetch_msg(inbox, MsgNum::u(2))
        );
    }

    #[test]
    fn copy_and_move_carry_flags() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        let trash = setup.mh.require_item_by_path("trash").unwrap();
        let junk = setup.mh.require_item_by_path("junk").unwrap();
        let (_src, files) = source_files(2);
        for file in &files {
            setup.mh.add_msg(inbox, file, read_flags(), false).unwrap();
        }
        let list = setup.mh.get_message_list(inbox, true).unwrap();

        let copied = setup.mh.copy_msg(trash, inbox, &list[0]).unwrap();
        assert_eq!(MsgNum::u(1), copied);
        let trash_list = setup.mh.get_message_list(trash, true).unwrap();
        assert_eq!(vec![1], nums(&trash_list));
        assert_eq!(PermFlags::REPLIED, trash_list[0].flags.perm);
        assert_eq!(Some("message 0"), trash_list[0].subject.as_deref());
        assert!(!setup.mh.is_msg_changed(trash, &trash_list[0]).unwrap());

        let moved = setup.mh.move_msgs(junk, inbox, &list).unwrap();
        assert_eq!(vec![MsgNum::u(1), MsgNum::u(2)], moved);
        assert!(setup.mh.get_message_list(inbox, true).unwrap().is_empty());
        assert_eq!(0, setup.mh.item(inbox).unwrap().counts.total);
        let junk_list = setup.mh.get_message_list(junk, true).unwrap();
        assert_eq!(
            vec![Some("message 0"), Some("message 1")],
            junk_list
                .iter()
                .map(|r| r.subject.as_deref())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn transfer_within_folder_rejected() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        drop_msg(&setup.mh, inbox, 1, "one");
        let list = setup.mh.get_message_list(inbox, true).unwrap();

        assert_matches!(
            Err(Error::StructuralConflict(Conflict::SameFolder)),
            setup.mh.move_msgs(inbox, inbox, &list)
        );
        assert!(setup.mh.fetch_msg(inbox, MsgNum::u(1)).is_ok());
    }

    #[test]
    fn remove_messages() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        for n in 1..=4 {
            drop_msg(&setup.mh, inbox, n, "msg");
        }
        setup.mh.get_message_list(inbox, true).unwrap();

        setup.mh.remove_msg(inbox, MsgNum::u(2)).unwrap();
        assert_matches!(
            Err(Error::NxMessage),
            setup.mh.remove_msg(inbox, MsgNum::u(2))
        );
        assert_eq!(
            vec![1, 3, 4],
            nums(&setup.mh.get_message_list(inbox, true).unwrap())
        );

        setup
            .mh
            .remove_msgs(inbox, &[MsgNum::u(1), MsgNum::u(4)])
            .unwrap();
        assert_eq!(
            vec![3],
            nums(&setup.mh.get_message_list(inbox, true).unwrap())
        );

        setup.mh.remove_all_msgs(inbox).unwrap();
        assert!(setup.mh.get_message_list(inbox, true).unwrap().is_empty());
        assert!(!setup.mh.cache_path(inbox).unwrap().exists());
        assert_eq!(0, setup.mh.item(inbox).unwrap().counts.total);
    }

    #[test]
    fn change_detection() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        drop_msg(&setup.mh, inbox, 1, "one");
        let list = setup.mh.get_message_list(inbox, true).unwrap();
        assert!(!setup.mh.is_msg_changed(inbox, &list[0]).unwrap());

        drop_msg(&setup.mh, inbox, 1, "a much longer subject than before");
        assert!(setup.mh.is_msg_changed(inbox, &list[0]).unwrap());

        setup.mh.remove_msg(inbox, MsgNum::u(1)).unwrap();
        assert!(setup.mh.is_msg_changed(inbox, &list[0]).unwrap());
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, u32, bool)>>);

    impl StoreEvents for Recorder {
        fn message_added(&self, item: &FolderItem, num: MsgNum) {
            self.0.lock().unwrap().push((
                item.display_path().to_owned(),
                num.get(),
                true,
            ));
        }

        fn message_removed(&self, item: &FolderItem, num: MsgNum) {
            self.0.lock().unwrap().push((
                item.display_path().to_owned(),
                num.get(),
                false,
            ));
        }
    }

    #[test]
    fn message_events() {
        let mut setup = set_up();
        let recorder = Arc::new(Recorder::default());
        let ctx = Arc::new(StoreContext::default());
        setup.mh = std::mem::replace(&mut setup.mh, MhFolder::new(ctx, "/nx"))
            .with_events(Arc::clone(&recorder) as Arc<dyn StoreEvents + Send + Sync>);
        let inbox = inbox(&setup.mh);
        let trash = setup.mh.require_item_by_path("trash").unwrap();
        let (_src, files) = source_files(1);

        setup
            .mh
            .add_msg(inbox, &files[0], MsgFlags::received(), true)
            .unwrap();
        let list = setup.mh.get_message_list(inbox, true).unwrap();
        setup.mh.move_msgs(trash, inbox, &list).unwrap();

        assert_eq!(
            vec![
                ("inbox".to_owned(), 1, true),
                ("trash".to_owned(), 1, true),
                ("inbox".to_owned(), 1, false),
            ],
            *recorder.0.lock().unwrap()
        );
    }

    #[test]
    fn failed_move_only_removes_what_moved() {
        let mut setup = set_up();
        let recorder = Arc::new(Recorder::default());
        let ctx = Arc::new(StoreContext::default());
        setup.mh = std::mem::replace(&mut setup.mh, MhFolder::new(ctx, "/nx"))
            .with_events(Arc::clone(&recorder) as Arc<dyn StoreEvents + Send + Sync>);
        let inbox = inbox(&setup.mh);
        let trash = setup.mh.require_item_by_path("trash").unwrap();
        let (_src, files) = source_files(3);
        for file in &files {
            setup
                .mh
                .add_msg(inbox, file, MsgFlags::received(), false)
                .unwrap();
        }
        let list = setup.mh.get_message_list(inbox, true).unwrap();
        fs::remove_file(setup.mh.msg_path(inbox, MsgNum::u(2)).unwrap())
            .unwrap();
        recorder.0.lock().unwrap().clear();

        assert_matches!(
            Err(Error::NxMessage),
            setup.mh.move_msgs(trash, inbox, &list)
        );

        assert_eq!(
            vec![
                ("trash".to_owned(), 1, true),
                ("inbox".to_owned(), 1, false),
            ],
            *recorder.0.lock().unwrap()
        );
        assert_eq!(2, setup.mh.item(inbox).unwrap().counts.total);
        assert_eq!(1, setup.mh.item(trash).unwrap().counts.total);
        assert!(setup.mh.msg_path(inbox, MsgNum::u(3)).unwrap().is_file());
    }
}

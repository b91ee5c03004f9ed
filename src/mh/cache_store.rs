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

//! The per-folder summary cache.
//!
//! Each record is, in order:
//!
//! - u32 message number, size, mtime, parsed date, and the persistent subset
//!   of the transient flags (`TmpFlags::CACHED_MASK`)
//! - strings: from name, date, from, to, newsgroups, subject, message ID,
//!   in-reply-to
//! - u32 reference count, followed by that many strings, oldest first
//!
//! Permanent flags are not stored here; they belong to the mark file.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use log::{debug, info};

use super::codec;
use super::data_file;
use super::model::*;
use super::tree::FolderId;
use super::MhFolder;
use crate::support::error::Error;
use crate::support::file_ops;

pub const CACHE_VERSION: u32 = 0x22;

/// Records claiming more references than this are considered corrupt.
pub const MAX_REFERENCES: u32 = 64 * 1024;

pub fn write_record(w: &mut impl Write, record: &MessageRecord) -> io::Result<()> {
    codec::write_int(w, record.num.get())?;
    codec::write_int(w, record.size)?;
    codec::write_int(w, record.mtime)?;
    codec::write_int(w, record.date_t)?;
    codec::write_int(w, (record.flags.tmp & TmpFlags::CACHED_MASK).bits())?;

    for s in &[
        &record.from_name,
        &record.date,
        &record.from,
        &record.to,
        &record.newsgroups,
        &record.subject,
        &record.msgid,
        &record.in_reply_to,
    ] {
        codec::write_string(w, s.as_deref())?;
    }

    let references = &record.references[..record
        .references
        .len()
        .min(MAX_REFERENCES as usize)];
    codec::write_int(w, references.len() as u32)?;
    for r in references {
        codec::write_string(w, Some(r.as_str()))?;
    }

    Ok(())
}

/// The outcome of reading one record slot.
#[derive(Debug)]
pub enum ReadRecord {
    /// Clean end of file.
    Eof,
    Record(MessageRecord),
    /// A syntactically complete record with message number 0.
    ZeroNum,
}

pub fn read_record(r: &mut impl Read) -> Result<ReadRecord, Error> {
    let num = match codec::read_int_or_eof(r)? {
        None => return Ok(ReadRecord::Eof),
        Some(num) => num,
    };

    let size = codec::read_int(r)?;
    let mtime = codec::read_int(r)?;
    let date_t = codec::read_int(r)?;
    let tmp =
        TmpFlags::from_bits_truncate(codec::read_int(r)?) & TmpFlags::CACHED_MASK;

    let from_name = codec::read_string(r)?;
    let date = codec::read_string(r)?;
    let from = codec::read_string(r)?;
    let to = codec::read_string(r)?;
    let newsgroups = codec::read_string(r)?;
    let subject = codec::read_string(r)?;
    let msgid = codec::read_string(r)?;
    let in_reply_to = codec::read_string(r)?;

    let nrefs = codec::read_int(r)?;
    if nrefs > MAX_REFERENCES {
        return Err(Error::CorruptData);
    }
    let mut references = Vec::with_capacity(nrefs.min(64) as usize);
    for _ in 0..nrefs {
        // An empty reference cannot be told apart from a missing one, and
        // is meaningless either way.
        if let Some(reference) = codec::read_string(r)? {
            references.push(reference);
        }
    }

    // The whole record has been consumed either way
    let num = match MsgNum::of(num) {
        Some(num) => num,
        None => return Ok(ReadRecord::ZeroNum),
    };

    Ok(ReadRecord::Record(MessageRecord {
        num,
        size,
        mtime,
        date_t,
        flags: MsgFlags {
            perm: PermFlags::empty(),
            tmp,
        },
        from_name,
        date,
        from,
        to,
        newsgroups,
        subject,
        msgid,
        in_reply_to,
        references,
    }))
}

/// The raw contents of a cache file.
#[derive(Debug, Default)]
pub struct CacheContents {
    pub records: Vec<MessageRecord>,
    /// Whether the file held anything that a rewrite would drop, such as
    /// zero-numbered or duplicate records.
    pub needs_rewrite: bool,
}

/// Read every record of the cache file at `path`.
///
/// A missing, foreign-version, or corrupt file all yield empty contents; no
/// partially-read records are ever returned. When a message number appears
/// more than once, the later record replaces the earlier one in place.
pub fn read_cache_file(path: &Path) -> Result<CacheContents, Error> {
    let mut reader = match data_file::open_for_read(path, CACHE_VERSION)? {
        Some(r) => r,
        None => return Ok(CacheContents::default()),
    };

    let mut contents = CacheContents::default();
    let mut index = HashMap::<MsgNum, usize>::new();
    loop {
        match read_record(&mut reader) {
            Ok(ReadRecord::Eof) => break,
            Ok(ReadRecord::ZeroNum) => contents.needs_rewrite = true,
            Ok(ReadRecord::Record(record)) => {
                if let Some(&ix) = index.get(&record.num) {
                    contents.records[ix] = record;
                    contents.needs_rewrite = true;
                } else {
                    index.insert(record.num, contents.records.len());
                    contents.records.push(record);
                }
            }
            Err(Error::CorruptData) => {
                info!("{} is corrupt; ignoring it", path.display());
                return Ok(CacheContents::default());
            }
            Err(e) => return Err(e),
        }
    }

    Ok(contents)
}

/// Replace the cache file at `path` with exactly `records`.
pub fn write_cache_file(
    path: &Path,
    records: &[MessageRecord],
) -> Result<(), Error> {
    let mut writer = data_file::open_for_write(path, CACHE_VERSION)?;
    for record in records {
        write_record(&mut writer, record)?;
    }
    data_file::finish(writer)
}

/// Add `records` to the end of the cache file at `path`.
pub fn append_cache_file(
    path: &Path,
    records: &[MessageRecord],
) -> Result<(), Error> {
    let mut writer = data_file::open_for_append(path, CACHE_VERSION)?;
    for record in records {
        write_record(&mut writer, record)?;
    }
    data_file::finish(writer)
}

/// Whether `record` no longer describes the file at `path`.
///
/// A file that cannot be examined counts as changed.
pub fn record_is_stale(path: &Path, record: &MessageRecord) -> bool {
    match fs::metadata(path) {
        Ok(md) => {
            !md.is_file()
                || md.len() != u64::from(record.size)
                || md
                    .modified()
                    .map(|m| file_ops::epoch_secs_u32(m) != record.mtime)
                    .unwrap_or(true)
        }
        Err(_) => true,
    }
}

impl MhFolder {
    /// Load the summary cache of the folder.
    ///
    /// With `verify`, every record is checked against its message file and
    /// dropped if the file is gone or its size or mtime changed. Anything
    /// dropped leaves the folder cache-dirty.
    pub fn read_cache(
        &mut self,
        id: FolderId,
        verify: bool,
    ) -> Result<Vec<MessageRecord>, Error> {
        let path = self.cache_path(id)?;
        let dir = self.item_dir(id)?;
        let implied = self.item(id)?.role.implied_tmp_flags();

        let CacheContents {
            mut records,
            mut needs_rewrite,
        } = read_cache_file(&path)?;

        if verify {
            let before = records.len();
            records.retain(|r| !record_is_stale(&dir.join(r.num.to_string()), r));
            if records.len() != before {
                debug!(
                    "{} Dropped {} stale cache records from {}",
                    self.log_prefix,
                    before - records.len(),
                    path.display()
                );
                needs_rewrite = true;
            }
        }

        for record in &mut records {
            record.flags.tmp |= implied;
        }

        if needs_rewrite {
            self.item_mut(id)?.cache_dirty = true;
        }

        Ok(records)
    }

    /// Rewrite the cache file of the folder from `records`.
    pub fn write_cache_list(
        &mut self,
        id: FolderId,
        records: &[MessageRecord],
    ) -> Result<(), Error> {
        write_cache_file(&self.cache_path(id)?, records)?;
        self.item_mut(id)?.cache_dirty = false;
        Ok(())
    }

    /// Queue a cache record for message `num`, copied from `template`.
    pub fn enqueue_cache(
        &mut self,
        id: FolderId,
        num: MsgNum,
        template: &MessageRecord,
    ) -> Result<(), Error> {
        let mut record = template.clone();
        record.num = num;
        self.item_mut(id)?.queue.enqueue_cache(record);
        Ok(())
    }

    /// Append the queued cache records of a closed folder to its cache file.
    pub fn flush_cache_queue(&mut self, id: FolderId) -> Result<(), Error> {
        if self.item(id)?.queue.pending_cache().is_empty() {
            return Ok(());
        }

        let path = self.cache_path(id)?;
        let pending = self.item_mut(id)?.queue.take_cache_for_flush();
        if pending.is_empty() {
            return Ok(());
        }

        debug!(
            "{} Flushing {} queued cache records to {}",
            self.log_prefix,
            pending.len(),
            path.display()
        );
        if let Err(e) = append_cache_file(&path, &pending) {
            let item = self.item_mut(id)?;
            for record in pending {
                item.queue.enqueue_cache(record);
            }
            return Err(e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::super::test_prelude::*;
    use super::*;

    fn sample(num: u32) -> MessageRecord {
        let mut r = MessageRecord::new(MsgNum::u(num));
        r.size = 1234;
        r.mtime = 1_600_000_000;
        r.date_t = 1_500_000_000;
        r.flags.tmp = TmpFlags::MIME | TmpFlags::CACHED;
        r.flags.perm = PermFlags::MARKED;
        r.from_name = Some("Jane".to_owned());
        r.from = Some("Jane <jane@example.com>".to_owned());
        r.subject = Some("Hello wörld".to_owned());
        r.msgid = Some("id@example.com".to_owned());
        r.references = vec!["a@x".to_owned(), "b@x".to_owned()];
        r
    }

    /// What a record looks like after a trip through the cache.
    fn as_cached(mut r: MessageRecord) -> MessageRecord {
        r.flags.tmp &= TmpFlags::CACHED_MASK;
        r.flags.perm = PermFlags::empty();
        r
    }

    #[test]
    fn record_round_trip() {
        let mut buf = Vec::new();
        write_record(&mut buf, &sample(3)).unwrap();
        match read_record(&mut &buf[..]).unwrap() {
            ReadRecord::Record(r) => assert_eq!(as_cached(sample(3)), r),
            r => panic!("Unexpected {:?}", r),
        }
    }

    #[test]
    fn empty_strings_read_back_absent() {
        let mut r = sample(1);
        r.to = Some(String::new());
        r.references = vec![String::new(), "x".to_owned()];

        let mut buf = Vec::new();
        write_record(&mut buf, &r).unwrap();
        match read_record(&mut &buf[..]).unwrap() {
            ReadRecord::Record(back) => {
                assert_eq!(None, back.to);
                assert_eq!(vec!["x".to_owned()], back.references);
            }
            r => panic!("Unexpected {:?}", r),
        }
    }

    proptest! {
        #[test]
        fn arbitrary_records_round_trip(
            num in 1u32..=u32::MAX,
            size in any::<u32>(),
            mtime in any::<u32>(),
            subject in proptest::option::of(".{1,40}"),
            from in proptest::option::of(".{1,20}"),
            references in proptest::collection::vec("[a-z@.]{1,12}", 0..5),
        ) {
            let mut r = MessageRecord::new(MsgNum::u(num));
            r.size = size;
            r.mtime = mtime;
            r.subject = subject;
            r.from = from;
            r.references = references;

            let mut buf = Vec::new();
            write_record(&mut buf, &r).unwrap();
            let mut reader = &buf[..];
            match read_record(&mut reader).unwrap() {
                ReadRecord::Record(back) => prop_assert_eq!(r, back),
                other => prop_assert!(false, "Unexpected {:?}", other),
            }
            prop_assert!(reader.is_empty());
        }
    }

    #[test]
    fn file_round_trip_and_version_gate() {
        let setup = set_up();
        let path = setup.root.path().join("cache");
        write_cache_file(&path, &[sample(1), sample(2)]).unwrap();

        let contents = read_cache_file(&path).unwrap();
        assert!(!contents.needs_rewrite);
        assert_eq!(
            vec![as_cached(sample(1)), as_cached(sample(2))],
            contents.records
        );

        let mut w = data_file::open_for_write(&path, CACHE_VERSION + 1).unwrap();
        write_record(&mut w, &sample(1)).unwrap();
        data_file::finish(w).unwrap();
        assert!(read_cache_file(&path).unwrap().records.is_empty());
    }

    #[test]
    fn corruption_discards_everything() {
        let setup = set_up();
        let path = setup.root.path().join("cache");
        write_cache_file(&path, &[sample(1), sample(2)]).unwrap();

        let mut data = fs::read(&path).unwrap();
        data.truncate(data.len() - 3);
        fs::write(&path, data).unwrap();

        assert!(read_cache_file(&path).unwrap().records.is_empty());
    }

    #[test]
    fn zero_and_duplicate_records_need_rewrite() {
        let setup = set_up();
        let path = setup.root.path().join("cache");

        let mut w = data_file::open_for_write(&path, CACHE_VERSION).unwrap();
        write_record(&mut w, &sample(1)).unwrap();
        // Zero-numbered record, written by hand
        let mut zero = Vec::new();
        write_record(&mut zero, &sample(9)).unwrap();
        zero[..4].copy_from_slice(&[0, 0, 0, 0]);
        w.write_all(&zero).unwrap();
        let mut dup = sample(1);
        dup.subject = Some("second".to_owned());
        write_record(&mut w, &dup).unwrap();
        write_record(&mut w, &sample(2)).unwrap();
        data_file::finish(w).unwrap();

        let contents = read_cache_file(&path).unwrap();
        assert!(contents.needs_rewrite);
        assert_eq!(vec![1, 2], nums(&contents.records));
        assert_eq!(Some("second"), contents.records[0].subject.as_deref());
    }

    #[test]
    fn verification_drops_stale_records() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        drop_msg(&setup.mh, inbox, 1, "one");
        drop_msg(&setup.mh, inbox, 2, "two");
        drop_msg(&setup.mh, inbox, 3, "three");

        let list = setup.mh.get_message_list(inbox, true).unwrap();
        assert_eq!(3, list.len());
        assert!(!setup.mh.item(inbox).unwrap().cache_dirty);

        // Change the size of 2 and remove 3
        drop_msg(&setup.mh, inbox, 2, "two but longer");
        fs::remove_file(setup.mh.item_dir(inbox).unwrap().join("3")).unwrap();

        let unverified = setup.mh.read_cache(inbox, false).unwrap();
        assert_eq!(vec![1, 2, 3], nums(&unverified));
        assert!(!setup.mh.item(inbox).unwrap().cache_dirty);

        let verified = setup.mh.read_cache(inbox, true).unwrap();
        assert_eq!(vec![1], nums(&verified));
        assert!(setup.mh.item(inbox).unwrap().cache_dirty);
    }

    #[test]
    fn role_flags_are_applied() {
        let mut setup = set_up();
        let queue = setup.mh.find_item_by_path("queue").unwrap();
        let path = setup.mh.cache_path(queue).unwrap();
        write_cache_file(&path, &[sample(1)]).unwrap();

        let records = setup.mh.read_cache(queue, false).unwrap();
        assert!(records[0].flags.tmp.contains(TmpFlags::QUEUED));
    }

    #[test]
    fn queued_records_are_appended() {
        let mut setup = set_up();
        let inbox = inbox(&setup.mh);
        let path = setup.mh.cache_path(inbox).unwrap();
        write_cache_file(&path, &[sample(1)]).unwrap();

        setup.mh.open_folder(inbox).unwrap();
        setup
            .mh
            .enqueue_cache(inbox, MsgNum::u(5), &sample(1))
            .unwrap();
        setup.mh.flush_cache_queue(inbox).unwrap();
        assert_eq!(vec![1], nums(&read_cache_file(&path).unwrap().records));

        setup.mh.item_mut(inbox).unwrap().queue.close();
        setup.mh.flush_cache_queue(inbox).unwrap();
        assert_eq!(vec![1, 5], nums(&read_cache_file(&path).unwrap().records));
        assert!(setup.mh.item(inbox).unwrap().queue.pending().is_none());
    }
}

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


use std::sync::Arc;
use std::time::Duration;

use chrono::prelude::*;
use crossbeam::channel;

use super::main::{or_die, AddSubcommand, FlagSubcommand, ListSubcommand};
use crate::mh::*;
use crate::support::sysexits::*;
use crate::support::threading::run_in_background;

/// Forwards folders visited during a tree scan to the main thread.
struct ChannelProgress(channel::Sender<(String, usize)>);

impl ProgressSink for ChannelProgress {
    fn notify(&self, item: &FolderItem, token: usize) {
        let _ = self.0.send((item.display_path().to_owned(), token));
    }
}

fn report_progress(recv: &channel::Receiver<(String, usize)>) {
    let mut latest = None;
    while let Ok(progress) = recv.try_recv() {
        latest = Some(progress);
    }

    if let Some((path, token)) = latest {
        eprint!("\r\x1B[K{:>6} folders scanned: {}", token, path);
    }
}

pub(super) fn scan(mh: MhFolder) {
    let (send, recv) = channel::unbounded();
    let mh = mh.with_progress(Arc::new(ChannelProgress(send)));

    let mut pending = run_in_background(move || {
        let mut mh = mh;
        let result = mh.scan_tree();
        (mh, result)
    });

    while !pending.wait_timeout(Duration::from_millis(100)) {
        report_progress(&recv);
    }
    report_progress(&recv);
    eprintln!();

    let (mh, result) = match pending.wait() {
        Ok(r) => r,
        Err(_) => die!(EX_SOFTWARE, "The folder scan crashed"),
    };
    or_die(result, "Scan failed");

    println!("{:>6} {:>6} {:>6}  FOLDER", "NEW", "UNREAD", "TOTAL");
    for id in mh.tree().pre_order(FolderId::ROOT) {
        if FolderId::ROOT == id {
            continue;
        }

        let item = or_die(mh.item(id), "Scan failed");
        println!(
            "{:>6} {:>6} {:>6}  {}",
            item.counts.new,
            item.counts.unread,
            item.counts.total,
            item.display_path()
        );
    }
}

/// Scan the tree and look up `path`.
fn open(mh: &mut MhFolder, path: &str) -> FolderId {
    or_die(mh.scan_tree(), "Scan failed");
    match mh.find_item_by_path(path) {
        Some(id) => id,
        None => die!(EX_NOINPUT, "No such folder: {}", path),
    }
}

fn flag_letters(flags: PermFlags) -> String {
    [
        (PermFlags::NEW, 'N'),
        (PermFlags::UNREAD, 'U'),
        (PermFlags::MARKED, 'M'),
        (PermFlags::DELETED, 'D'),
        (PermFlags::REPLIED, 'R'),
        (PermFlags::FORWARDED, 'F'),
    ]
    .iter()
    .map(|&(flag, ch)| if flags.contains(flag) { ch } else { '-' })
    .collect()
}

fn format_date(date_t: u32) -> String {
    if 0 == date_t {
        return "????-??-?? ??:??".to_owned();
    }

    Local
        .timestamp(i64::from(date_t), 0)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

pub(super) fn list(mut mh: MhFolder, cmd: ListSubcommand) {
    let id = open(&mut mh, &cmd.folder);

    if cmd.sort.is_some() || cmd.reverse {
        let item = or_die(mh.item(id), "List failed");
        let key = cmd.sort.unwrap_or(item.sort_key);
        let order = if cmd.reverse {
            SortOrder::Descending
        } else {
            item.sort_order
        };
        or_die(mh.set_sort(id, key, order), "List failed");
    }

    let list = or_die(
        if cmd.new_only {
            mh.get_uncached_messages(id)
        } else {
            mh.get_message_list(id, !cmd.no_cache)
        },
        "List failed",
    );

    for record in &list {
        println!(
            "{:>6} {} {}  {:<24.24}  {}",
            record.num,
            flag_letters(record.flags.perm),
            format_date(record.date_t),
            record
                .from_name
                .as_deref()
                .or_else(|| record.from.as_deref())
                .unwrap_or(""),
            record.subject.as_deref().unwrap_or("")
        );
    }
}

pub(super) fn add(mut mh: MhFolder, cmd: AddSubcommand) {
    let id = open(&mut mh, &cmd.folder);
    let flags = if cmd.flag.is_empty() {
        MsgFlags::received()
    } else {
        MsgFlags {
            perm: cmd.flag.iter().fold(PermFlags::empty(), |a, &f| a | f),
            tmp: TmpFlags::empty(),
        }
    };

    let files = cmd
        .files
        .iter()
        .map(|f| MsgFileInfo::new(f, flags))
        .collect::<Vec<_>>();
    let nums = or_die(mh.add_msgs(id, &files, cmd.remove_source), "Add failed");
    for (num, file) in nums.iter().zip(&cmd.files) {
        println!("{} -> {}/{}", file.display(), cmd.folder, num);
    }
}

pub(super) fn mkdir(mut mh: MhFolder, parent: &str, name: &str) {
    let parent = open(&mut mh, parent);
    or_die(mh.create_folder(parent, name), "Failed to create folder");
}

pub(super) fn rename(mut mh: MhFolder, folder: &str, new_name: &str) {
    let id = open(&mut mh, folder);
    or_die(mh.rename_folder(id, new_name), "Failed to rename folder");
}

pub(super) fn mv(mut mh: MhFolder, folder: &str, new_parent: &str) {
    let id = open(&mut mh, folder);
    let new_parent = match mh.find_item_by_path(new_parent) {
        Some(p) => p,
        None => die!(EX_NOINPUT, "No such folder: {}", new_parent),
    };
    or_die(mh.move_folder(id, new_parent), "Failed to move folder");
}

pub(super) fn rmdir(mut mh: MhFolder, folder: &str) {
    let id = open(&mut mh, folder);
    or_die(mh.remove_folder(id), "Failed to remove folder");
}

pub(super) fn flag(mut mh: MhFolder, cmd: FlagSubcommand) {
    let id = open(&mut mh, &cmd.folder);
    let num = match MsgNum::of(cmd.num) {
        Some(num) => num,
        None => die!(EX_USAGE, "Message numbers start at 1"),
    };

    let list = or_die(mh.get_message_list(id, true), "Failed to read folder");
    let mut flags = match list.iter().find(|r| r.num == num) {
        Some(record) => record.flags.perm,
        None => die!(EX_NOINPUT, "No such message: {}/{}", cmd.folder, num),
    };

    if cmd.read {
        flags -= PermFlags::NEW | PermFlags::UNREAD;
    }
    if cmd.unread {
        flags |= PermFlags::UNREAD;
    }
    flags.set(
        PermFlags::MARKED,
        cmd.marked || (flags.contains(PermFlags::MARKED) && !cmd.unmarked),
    );
    flags.set(
        PermFlags::DELETED,
        cmd.deleted || (flags.contains(PermFlags::DELETED) && !cmd.undeleted),
    );
    if cmd.replied {
        flags |= PermFlags::REPLIED;
    }
    if cmd.forwarded {
        flags |= PermFlags::FORWARDED;
    }
    if let Some(label) = cmd.label {
        if label > 7 {
            die!(EX_USAGE, "Colour labels go from 0 to 7");
        }
        flags = flags.with_color_label(label);
    }

    or_die(mh.add_flags(id, num, flags), "Failed to set flags");
    println!("{}/{} {}", cmd.folder, num, flag_letters(flags));
}

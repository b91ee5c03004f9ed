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

//! The interfaces through which the engine talks to the rest of a mail
//! client.

use std::path::Path;

use super::model::*;
use super::tree::FolderItem;

/// Turns a message file into a `MessageRecord`.
pub trait HeaderParser {
    /// Parse the message at `path`.
    ///
    /// The record's number is taken from the file name and its flags are
    /// `default_flags`. When `full_scan` is false, the parser may skip the
    /// headers only needed for threading (`References`, `In-Reply-To`).
    ///
    /// `None` is returned if the file cannot be read or is not a message.
    fn parse_message_file(
        &self,
        path: &Path,
        default_flags: MsgFlags,
        full_scan: bool,
    ) -> Option<MessageRecord>;
}

/// Receives progress notifications during long walks of the folder tree.
pub trait ProgressSink {
    /// Called once after each folder has been visited. `token` counts the
    /// folders visited so far in the current walk.
    fn notify(&self, item: &FolderItem, token: usize);
}

/// Receives notice of changes the engine makes, e.g. to keep a search index
/// or display in sync. Nothing is expected back.
pub trait StoreEvents {
    fn message_added(&self, _item: &FolderItem, _num: MsgNum) {}
    fn message_removed(&self, _item: &FolderItem, _num: MsgNum) {}
    fn folder_added(&self, _item: &FolderItem) {}
    fn folder_removed(&self, _path: &str) {}
    fn folder_moved(&self, _old_path: &str, _item: &FolderItem) {}
}

/// A `ProgressSink` which ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn notify(&self, _item: &FolderItem, _token: usize) {}
}

/// A `StoreEvents` which ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEvents;

impl StoreEvents for NullEvents {}

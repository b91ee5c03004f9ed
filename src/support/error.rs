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

use std::fmt;
use std::io;

use thiserror::Error;

/// Reasons a structural change to the folder tree is refused.
///
/// These are always detected before anything on disk or in memory is touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conflict {
    /// Something already exists at the destination.
    TargetExists,
    /// The destination parent is the folder itself or one of its descendants.
    IntoOwnDescendant,
    /// The destination is exactly where the folder already is.
    OntoSelf,
    /// Messages were to be moved into the folder they came from.
    SameFolder,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Conflict::TargetExists => write!(f, "destination already exists"),
            Conflict::IntoOwnDescendant => {
                write!(f, "folder cannot be moved into its own descendant")
            }
            Conflict::OntoSelf => write!(f, "folder cannot be moved onto itself"),
            Conflict::SameFolder => {
                write!(f, "source and destination folder are the same")
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsafe folder name")]
    UnsafeName,
    #[error("No such folder")]
    NxFolder,
    #[error("No such message")]
    NxMessage,
    #[error("Operation not permitted on the folder tree root")]
    RootFolder,
    #[error("Folder has no free message numbers left")]
    FolderFull,
    #[error("Corrupt data file")]
    CorruptData,
    #[error("Data file version {found:#x} does not match {expected:#x}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Structural conflict: {0}")]
    StructuralConflict(Conflict),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

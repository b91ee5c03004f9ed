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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::support::error::Error;

/// What kind of thing a directory entry is, as far as folder scans care.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Other,
}

/// Classify `entry`, following symlinks.
///
/// The file type recorded in the directory entry is used when the platform
/// provides one; otherwise, and for symlinks, this falls back to `stat()`.
pub fn entry_kind(entry: &fs::DirEntry) -> io::Result<EntryKind> {
    let mut file_type = entry.file_type()?;
    if file_type.is_symlink() {
        file_type = fs::metadata(entry.path())?.file_type();
    }

    Ok(if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    })
}

/// Return the later of the modification and status-change times of `path`.
///
/// A directory's ctime moves on renames into or out of it even on file systems
/// where the mtime is sluggish, so folder change detection looks at both.
pub fn dir_mtime(path: impl AsRef<Path>) -> io::Result<SystemTime> {
    let md = fs::metadata(path)?;
    let ctime = UNIX_EPOCH
        + Duration::new(md.ctime().max(0) as u64, md.ctime_nsec().max(0) as u32);
    Ok(md.modified()?.max(ctime))
}

/// Convert `time` to whole seconds since the epoch, saturating into `u32`.
pub fn epoch_secs_u32(time: SystemTime) -> u32 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

pub fn chmod(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Copy `src` to `dst`, which must not already exist, then restrict it to
/// `mode`.
pub fn copy_new(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    mode: u32,
) -> io::Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst.as_ref())?;
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    chmod(dst, mode)
}

/// Move `src` to `dst`.
///
/// A plain rename is tried first. If the two paths are on different file
/// systems, the file is copied and the source removed afterwards.
pub fn move_file(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    mode: u32,
) -> io::Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    match fs::rename(src, dst) {
        Ok(()) => chmod(dst, mode),
        Err(e) if Some(nix::libc::EXDEV) == e.raw_os_error() => {
            copy_new(src, dst, mode)?;
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

pub trait ReadUninterruptibly: Read {
    fn read_uninteruptibly(&mut self, dst: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read> ReadUninterruptibly for R {
    /// Read bytes into `dst` until `dst` is full or EOF is reached.
    ///
    /// `Interrupted` errors are ignored and retried. Other errors are
    /// propagated.
    fn read_uninteruptibly(&mut self, mut dst: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while 0 != dst.len() {
            match self.read(dst) {
                Ok(0) => break,
                Ok(n) => {
                    total += n;
                    dst = &mut dst[n..];
                }
                Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(total)
    }
}

pub trait IgnoreKinds {
    fn ignore_already_exists(self) -> Self;
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_already_exists(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                Ok(R::default())
            }
            Err(e) => Err(e),
        }
    }

    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_exists(self, error: Error) -> Self::Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_exists(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::AlreadyExists == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn entry_kinds_follow_symlinks() {
        let tmpdir = TempDir::new().unwrap();
        fs::create_dir(tmpdir.path().join("dir")).unwrap();
        fs::write(tmpdir.path().join("1"), b"x").unwrap();
        std::os::unix::fs::symlink("dir", tmpdir.path().join("link")).unwrap();

        let mut kinds = fs::read_dir(tmpdir.path())
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.file_name().into_string().unwrap(), entry_kind(&e).unwrap())
            })
            .collect::<Vec<_>>();
        kinds.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            vec![
                ("1".to_owned(), EntryKind::File),
                ("dir".to_owned(), EntryKind::Directory),
                ("link".to_owned(), EntryKind::Directory),
            ],
            kinds
        );
    }

    #[test]
    fn copy_new_refuses_to_clobber() {
        let tmpdir = TempDir::new().unwrap();
        let src = tmpdir.path().join("src");
        let dst = tmpdir.path().join("dst");
        fs::write(&src, b"hello").unwrap();

        copy_new(&src, &dst, 0o600).unwrap();
        assert_eq!(b"hello".to_vec(), fs::read(&dst).unwrap());
        assert_eq!(
            0o600,
            fs::metadata(&dst).unwrap().permissions().mode() & 0o777
        );

        let err = copy_new(&src, &dst, 0o600).unwrap_err();
        assert_eq!(io::ErrorKind::AlreadyExists, err.kind());
    }

    #[test]
    fn move_file_removes_source() {
        let tmpdir = TempDir::new().unwrap();
        let src = tmpdir.path().join("src");
        let dst = tmpdir.path().join("dst");
        fs::write(&src, b"hello").unwrap();

        move_file(&src, &dst, 0o600).unwrap();
        assert!(!src.exists());
        assert_eq!(b"hello".to_vec(), fs::read(&dst).unwrap());
    }
}

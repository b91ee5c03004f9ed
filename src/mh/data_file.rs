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

//! Opening the versioned binary files kept in each folder.
//!
//! Both the summary cache and the mark file start with a u32 LE version tag
//! followed by a stream of records. A file whose tag does not match what the
//! reader expects is treated exactly like a missing one: the caller behaves as
//! if there were no data and the file gets regenerated on the next write. It
//! is never deleted here.
//!
//! Files are written in place rather than through a rename so that rewriting
//! a cache does not disturb the mtime of the folder directory, which is how
//! folder changes are detected.

use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use log::{debug, info};

use super::codec;
use crate::support::error::Error;
use crate::support::file_ops;

/// Open `path` for reading and check its version tag.
pub fn open_for_read(
    path: &Path,
    version: u32,
) -> Result<Option<BufReader<fs::File>>, Error> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if io::ErrorKind::NotFound == e.kind() => {
            debug!("{} does not exist yet", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    match check_version(&mut reader, version) {
        Ok(()) => Ok(Some(reader)),
        Err(Error::VersionMismatch { expected, found }) => {
            info!(
                "{} has version {:#x}, expected {:#x}; ignoring it",
                path.display(),
                found,
                expected
            );
            Ok(None)
        }
        Err(Error::CorruptData) => {
            info!("{} has no valid header; ignoring it", path.display());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Create or truncate `path` and write a fresh version tag to it.
pub fn open_for_write(
    path: &Path,
    version: u32,
) -> Result<BufWriter<fs::File>, Error> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // The file may predate us with looser permissions
    file_ops::chmod(path, 0o600)?;

    let mut writer = BufWriter::new(file);
    codec::write_int(&mut writer, version)?;
    Ok(writer)
}

/// Open `path` for appending records.
///
/// If the file is missing or has a different version, it is recreated
/// instead, so the version tag is only ever written once.
pub fn open_for_append(
    path: &Path,
    version: u32,
) -> Result<BufWriter<fs::File>, Error> {
    if open_for_read(path, version)?.is_none() {
        return open_for_write(path, version);
    }

    let file = fs::OpenOptions::new().append(true).open(path)?;
    Ok(BufWriter::new(file))
}

/// Flush everything written to `writer` to the underlying file.
pub fn finish(mut writer: BufWriter<fs::File>) -> Result<(), Error> {
    writer.flush()?;
    Ok(())
}

fn check_version(r: &mut impl io::Read, expected: u32) -> Result<(), Error> {
    let found = codec::read_int(r)?;
    if found == expected {
        Ok(())
    } else {
        Err(Error::VersionMismatch { expected, found })
    }
}

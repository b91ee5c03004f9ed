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

//! The subset of `sysexits.h` codes the command line front-end exits with.

use super::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_CANTCREAT: Sysexit = Sysexit(73);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}

impl From<&Error> for Sysexit {
    fn from(e: &Error) -> Self {
        match *e {
            Error::UnsafeName | Error::RootFolder => EX_USAGE,
            Error::NxFolder | Error::NxMessage => EX_NOINPUT,
            Error::StructuralConflict(_) | Error::FolderFull => EX_CANTCREAT,
            Error::CorruptData | Error::VersionMismatch { .. } => EX_DATAERR,
            Error::Io(_) => EX_IOERR,
            Error::Config(_) => EX_CONFIG,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::support::error::Conflict;

    #[test]
    fn errors_map_to_exit_codes() {
        assert_eq!(EX_NOINPUT, Sysexit::from(&Error::NxFolder));
        assert_eq!(
            EX_CANTCREAT,
            Sysexit::from(&Error::StructuralConflict(Conflict::TargetExists))
        );
        assert_eq!(
            EX_IOERR,
            Sysexit::from(&Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "boom"
            )))
        );
    }
}

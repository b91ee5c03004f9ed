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

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::support::error::Error;
use crate::support::system_config::StoreConfig;

/// State shared by every `MhFolder` in the process.
///
/// This is built once at startup and handed around as `Arc<StoreContext>`.
/// Two `MhFolder` handles over the same mailbox must share a context for the
/// list locks to mean anything.
#[derive(Debug, Default)]
pub struct StoreContext {
    config: StoreConfig,
    list_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl StoreContext {
    pub fn new(config: StoreConfig) -> Self {
        StoreContext {
            config,
            list_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build a context from the configuration file of the mailbox at `root`.
    pub fn load(root: &Path) -> Result<Self, Error> {
        Ok(Self::new(StoreConfig::load(root)?))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Return the lock serialising message list reads of the folder stored
    /// in `dir`.
    pub fn list_lock(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks =
            self.list_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(dir.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn locks_are_per_directory() {
        let ctx = StoreContext::default();
        let a1 = ctx.list_lock(Path::new("/mail/a"));
        let a2 = ctx.list_lock(Path::new("/mail/a"));
        let b = ctx.list_lock(Path::new("/mail/b"));

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));

        let _held = a1.lock().unwrap();
        assert!(b.try_lock().is_ok());
        assert!(a2.try_lock().is_err());
    }
}

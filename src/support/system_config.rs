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
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mh::model::{SortKey, SortOrder};
use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;

/// The name of the optional configuration file at the root of a mailbox.
pub const CONFIG_FILE_NAME: &str = "mhbox.toml";

/// The configuration of an MH mailbox store.
///
/// This is stored in a file named `mhbox.toml` at the root of the mailbox,
/// e.g. `~/Mail/mhbox.toml`. Every part of it is optional.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Options relating to the summary cache and mark files.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Options relating to directory scans.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Directory names of the special-purpose top-level folders.
    #[serde(default)]
    pub layout: LayoutConfig,

    /// How message lists are ordered unless a folder says otherwise.
    #[serde(default)]
    pub sort: SortConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// If true, every cached record is checked against the size and mtime of
    /// its message file whenever the folder directory has changed since the
    /// last listing.
    ///
    /// When false, cached records are only dropped once their message file is
    /// gone entirely, so a message edited in place keeps its stale summary.
    /// Queue and draft folders are always checked strictly.
    pub strict_check: bool,
    /// File name of the summary cache inside each folder directory.
    pub cache_file: String,
    /// File name of the mark file inside each folder directory.
    pub mark_file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            strict_check: true,
            cache_file: ".mh_cache".to_owned(),
            mark_file: ".mh_mark".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// The deepest folder nesting the tree scan will descend into.
    ///
    /// Anything deeper is skipped with a warning. This bounds the walk in the
    /// presence of symlink loops.
    pub max_depth: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig { max_depth: 64 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub inbox: String,
    pub outbox: String,
    pub queue: String,
    pub draft: String,
    pub trash: String,
    pub junk: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            inbox: "inbox".to_owned(),
            outbox: "sent".to_owned(),
            queue: "queue".to_owned(),
            draft: "draft".to_owned(),
            trash: "trash".to_owned(),
            junk: "junk".to_owned(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SortConfig {
    pub key: SortKey,
    pub order: SortOrder,
}

impl StoreConfig {
    /// Load the configuration for the mailbox rooted at `root`.
    ///
    /// A missing configuration file yields the defaults.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let data = fs::read(root.join(CONFIG_FILE_NAME)).ignore_not_found()?;
        Ok(toml::from_slice(&data)?)
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_config_is_default() {
        let tmpdir = TempDir::new().unwrap();
        let config = StoreConfig::load(tmpdir.path()).unwrap();
        assert!(config.cache.strict_check);
        assert_eq!(".mh_cache", config.cache.cache_file);
        assert_eq!(64, config.scan.max_depth);
        assert_eq!("sent", config.layout.outbox);
        assert_eq!(SortKey::Number, config.sort.key);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let tmpdir = TempDir::new().unwrap();
        fs::write(
            tmpdir.path().join(CONFIG_FILE_NAME),
            "[cache]\nstrict_check = false\n\n\
             [layout]\noutbox = \"outbox\"\n\n\
             [sort]\nkey = \"date\"\norder = \"descending\"\n",
        )
        .unwrap();

        let config = StoreConfig::load(tmpdir.path()).unwrap();
        assert!(!config.cache.strict_check);
        assert_eq!(".mh_mark", config.cache.mark_file);
        assert_eq!("outbox", config.layout.outbox);
        assert_eq!("inbox", config.layout.inbox);
        assert_eq!(SortKey::Date, config.sort.key);
        assert_eq!(SortOrder::Descending, config.sort.order);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let tmpdir = TempDir::new().unwrap();
        fs::write(tmpdir.path().join(CONFIG_FILE_NAME), "[scan]\nmax_depth = \"x\"")
            .unwrap();
        assert_matches!(
            Err(Error::Config(_)),
            StoreConfig::load(tmpdir.path())
        );
    }
}

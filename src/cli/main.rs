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


use std::path::PathBuf;
use std::sync::Arc;

use structopt::StructOpt;

use crate::mh::{MhFolder, PermFlags, SortKey, StoreContext};
use crate::support::error::Error;
use crate::support::sysexits::*;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Command {
    #[structopt(flatten)]
    common: CommonOptions,

    #[structopt(subcommand)]
    sub: Subcommand,
}

#[derive(StructOpt)]
pub(super) struct CommonOptions {
    /// The root directory of the mailbox [default: $HOME/Mail]
    #[structopt(long, parse(from_os_str))]
    pub(super) root: Option<PathBuf>,

    /// Log debugging information to standard error.
    ///
    /// This has no effect if the mailbox root contains `logging.toml`.
    #[structopt(short, long)]
    pub(super) verbose: bool,
}

#[derive(StructOpt)]
pub(super) enum Subcommand {
    /// Bring the folder tree up to date with the mailbox directory and show
    /// the message counts of every folder.
    ///
    /// Missing special folders (inbox, sent, queue, draft, trash, junk) are
    /// created.
    Scan,
    List(ListSubcommand),
    Add(AddSubcommand),
    /// Create a new folder.
    Mkdir {
        /// The folder to create it in; "/" for the top level.
        parent: String,
        /// The name of the new folder.
        name: String,
    },
    /// Rename a folder without moving it elsewhere in the tree.
    Rename {
        folder: String,
        new_name: String,
    },
    /// Move a folder and everything below it under a new parent.
    Mv {
        folder: String,
        /// The new parent folder; "/" for the top level.
        new_parent: String,
    },
    /// Delete a folder, all its messages, and all folders below it.
    Rmdir { folder: String },
    Flag(FlagSubcommand),
}

/// List the messages in a folder.
///
/// Each line shows the message number, its flags, date, sender, and subject.
/// The flag letters are N (new), U (unread), M (marked), D (deleted), R
/// (replied), and F (forwarded).
#[derive(StructOpt)]
pub(super) struct ListSubcommand {
    /// Parse every message file instead of consulting the summary cache.
    #[structopt(long)]
    pub(super) no_cache: bool,

    /// Only show messages which were not yet in the summary cache.
    #[structopt(long, conflicts_with = "no-cache")]
    pub(super) new_only: bool,

    /// Sort by this field instead of the configured default. One of number,
    /// size, date, from, to, subject, unread, mark, label.
    #[structopt(long)]
    pub(super) sort: Option<SortKey>,

    /// Reverse the sort order.
    #[structopt(long)]
    pub(super) reverse: bool,

    /// The folder to list, e.g. "inbox" or "work/project".
    pub(super) folder: String,
}

/// Add message files to a folder.
///
/// The messages are numbered in the order given, after the highest number
/// already in the folder.
#[derive(StructOpt)]
pub(super) struct AddSubcommand {
    /// Move the files into the folder instead of copying them.
    #[structopt(long)]
    pub(super) remove_source: bool,

    /// Give the messages this flag (new, unread, marked, deleted, replied,
    /// forwarded). Can be passed multiple times. Without any, messages are
    /// added as new and unread.
    #[structopt(short, long, number_of_values(1))]
    pub(super) flag: Vec<PermFlags>,

    /// The destination folder.
    pub(super) folder: String,

    /// The message files to add.
    #[structopt(parse(from_os_str), required = true)]
    pub(super) files: Vec<PathBuf>,
}

/// Change the flags of one message.
#[derive(StructOpt)]
pub(super) struct FlagSubcommand {
    /// Mark the message as read, also clearing "new".
    #[structopt(long, conflicts_with = "unread")]
    pub(super) read: bool,
    /// Mark the message as unread.
    #[structopt(long)]
    pub(super) unread: bool,
    /// Set the "marked" flag.
    #[structopt(long, conflicts_with = "unmarked")]
    pub(super) marked: bool,
    /// Clear the "marked" flag.
    #[structopt(long)]
    pub(super) unmarked: bool,
    /// Set the "deleted" flag.
    #[structopt(long, conflicts_with = "undeleted")]
    pub(super) deleted: bool,
    /// Clear the "deleted" flag.
    #[structopt(long)]
    pub(super) undeleted: bool,
    /// Set the "replied" flag.
    #[structopt(long)]
    pub(super) replied: bool,
    /// Set the "forwarded" flag.
    #[structopt(long)]
    pub(super) forwarded: bool,
    /// Set the colour label, from 0 (none) to 7.
    #[structopt(long)]
    pub(super) label: Option<u8>,

    pub(super) folder: String,
    pub(super) num: u32,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let root = cmd.common.root.clone().unwrap_or_else(|| {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join("Mail"),
            None => die!(
                EX_CONFIG,
                "HOME is not set; use --root=/path/to/mail to say where the \
                 mailbox is."
            ),
        }
    });

    init_logging(&root, cmd.common.verbose);

    let ctx = match StoreContext::load(&root) {
        Ok(ctx) => ctx,
        Err(e) => die!(
            Sysexit::from(&e),
            "Error loading configuration of '{}': {}",
            root.display(),
            e
        ),
    };
    let mh = MhFolder::new(Arc::new(ctx), root);

    match cmd.sub {
        Subcommand::Scan => super::commands::scan(mh),
        Subcommand::List(cmd) => super::commands::list(mh, cmd),
        Subcommand::Add(cmd) => super::commands::add(mh, cmd),
        Subcommand::Mkdir { parent, name } => {
            super::commands::mkdir(mh, &parent, &name)
        }
        Subcommand::Rename { folder, new_name } => {
            super::commands::rename(mh, &folder, &new_name)
        }
        Subcommand::Mv { folder, new_parent } => {
            super::commands::mv(mh, &folder, &new_parent)
        }
        Subcommand::Rmdir { folder } => super::commands::rmdir(mh, &folder),
        Subcommand::Flag(cmd) => super::commands::flag(mh, cmd),
    }
}

fn init_logging(root: &std::path::Path, verbose: bool) {
    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            die!(
                EX_CONFIG,
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
        }
    } else {
        let level = if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        };
        // Only fails if a logger is already installed
        let _ = crate::init_simple_log(level);
    }
}

/// Unwrap `result`, or exit with the status matching the error.
pub(super) fn or_die<T>(result: Result<T, Error>, what: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => die!(Sysexit::from(&e), "{}: {}", what, e),
    }
}

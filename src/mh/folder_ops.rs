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
use std::os::unix::fs::DirBuilderExt;

use log::{info, warn};

use super::tree::{child_path, FolderId};
use super::MhFolder;
use crate::support::error::{Conflict, Error};
use crate::support::file_ops::{ErrorTransforms, IgnoreKinds};
use crate::support::safe_name::is_safe_name;

impl MhFolder {
    /// Create a folder named `name` under `parent`, along with its directory.
    pub fn create_folder(
        &mut self,
        parent: FolderId,
        name: &str,
    ) -> Result<FolderId, Error> {
        if !is_safe_name(name) {
            return Err(Error::UnsafeName);
        }

        let dir = self.item_dir(parent)?.join(name);
        if self.tree.find_child(parent, name).is_some() {
            return Err(Error::StructuralConflict(Conflict::TargetExists));
        }

        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&dir)?;

        let id = self.attach_child(parent, name);
        info!(
            "{} Created folder {}",
            self.log_prefix,
            self.item(id)?.display_path()
        );
        Ok(id)
    }

    /// Delete the folder `id`, its directory, and everything beneath it.
    pub fn remove_folder(&mut self, id: FolderId) -> Result<(), Error> {
        if FolderId::ROOT == id {
            return Err(Error::RootFolder);
        }

        let dir = self.item_dir(id)?;
        let path = self.item(id)?.display_path().to_owned();
        fs::remove_dir_all(&dir).ignore_not_found()?;
        self.tree.remove_subtree(id);

        info!("{} Removed folder {}", self.log_prefix, path);
        self.events.folder_removed(&path);
        Ok(())
    }

    /// Give the folder `id` a new name within its current parent.
    pub fn rename_folder(
        &mut self,
        id: FolderId,
        new_name: &str,
    ) -> Result<(), Error> {
        self.move_folder_subtree(id, None, Some(new_name))
    }

    /// Move the folder `id` under `new_parent`, keeping its name.
    pub fn move_folder(
        &mut self,
        id: FolderId,
        new_parent: FolderId,
    ) -> Result<(), Error> {
        self.move_folder_subtree(id, Some(new_parent), None)
    }

    /// Move the folder `id` to `new_parent` under `new_name`, where `None`
    /// keeps the current parent or name respectively.
    ///
    /// The directory is moved with a single `rename()`, so this cannot cross
    /// file systems. Then the logical path of every folder in the subtree has
    /// its old prefix replaced with the new one. A folder whose path does not
    /// have the expected prefix is left as it is, and the rest of the subtree
    /// is still updated.
    ///
    /// Every conflict is detected before anything is changed.
    pub fn move_folder_subtree(
        &mut self,
        id: FolderId,
        new_parent: Option<FolderId>,
        new_name: Option<&str>,
    ) -> Result<(), Error> {
        if FolderId::ROOT == id {
            return Err(Error::RootFolder);
        }

        let item = self.item(id)?;
        let old_parent = item.parent.ok_or(Error::RootFolder)?;
        let old_name = item.name.clone();
        let old_path = item.display_path().to_owned();
        let dst_parent = new_parent.unwrap_or(old_parent);
        let dst_name = new_name.unwrap_or(&old_name).to_owned();
        let dst_parent_path = self.item(dst_parent)?.path.clone();

        if self.tree.is_self_or_descendant(dst_parent, id) {
            warn!(
                "{} Refusing to move {} into its own subtree",
                self.log_prefix, old_path
            );
            return Err(Error::StructuralConflict(Conflict::IntoOwnDescendant));
        }

        if !is_safe_name(&dst_name) {
            return Err(Error::UnsafeName);
        }

        if dst_parent == old_parent && dst_name == old_name {
            warn!(
                "{} Refusing to move {} onto itself",
                self.log_prefix, old_path
            );
            return Err(Error::StructuralConflict(Conflict::OntoSelf));
        }

        let src_dir = self.item_dir(id)?;
        let dst_dir = self.item_dir(dst_parent)?.join(&dst_name);
        if self.tree.find_child(dst_parent, &dst_name).is_some()
            || fs::symlink_metadata(&dst_dir).is_ok()
        {
            warn!(
                "{} Refusing to move {} to {}: destination exists",
                self.log_prefix,
                old_path,
                dst_dir.display()
            );
            return Err(Error::StructuralConflict(Conflict::TargetExists));
        }

        fs::rename(&src_dir, &dst_dir)
            .on_exists(Error::StructuralConflict(Conflict::TargetExists))?;

        let new_path = child_path(dst_parent_path.as_deref(), &dst_name);
        self.tree.reparent(id, dst_parent, &dst_name);
        self.rewrite_subtree_paths(id, &old_path, &new_path);

        info!("{} Moved folder {} to {}", self.log_prefix, old_path, new_path);
        let item = self.item(id)?;
        self.events.folder_moved(&old_path, item);
        Ok(())
    }

    fn rewrite_subtree_paths(
        &mut self,
        id: FolderId,
        old_prefix: &str,
        new_prefix: &str,
    ) {
        for node in self.tree.pre_order(id) {
            let item = match self.tree.get_mut(node) {
                Some(item) => item,
                None => continue,
            };

            let old = item.display_path();
            let rest = if old == old_prefix {
                Some("")
            } else if old.starts_with(old_prefix)
                && old[old_prefix.len()..].starts_with('/')
            {
                Some(&old[old_prefix.len()..])
            } else {
                None
            };

            match rest {
                Some(rest) => {
                    item.path = Some(format!("{}{}", new_prefix, rest));
                    // The directory is not where it was
                    item.mtime = None;
                }
                None => warn!(
                    "{} Folder path {} does not start with {}; left alone",
                    self.log_prefix, old, old_prefix
                ),
            }
        }
    }
}

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

/// Determine whether the given name is usable as a single folder path
/// component.
///
/// This excludes empty names and patterns that cause directory traversal, as
/// well as hidden names, which the tree scan ignores, and purely numeric
/// names, which would share the namespace of message files in the parent
/// folder.
///
/// It does not care whether the name is ultimately a valid file name; for
/// that, we simply rely on the OS rejecting it.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() &&
        // Block directory traversal through .. and hidden names, which scans
        // skip and so would make the folder vanish
        name.chars().next() != Some('.') &&
        name.find('/').is_none() &&
        name.find('\\').is_none() &&
        // Don't allow any ASCII control characters
        name.find(|c| c < ' ' || c == '\x7F').is_none() &&
        // Would be indistinguishable from a message number
        !name.bytes().all(|b| b.is_ascii_digit())
}

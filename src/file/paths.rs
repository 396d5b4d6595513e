// audiobook-engine - Chapter download and playback engine for audiobooks
// Copyright (C) 2025 audiobook-engine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! On-disk layout of downloaded chapters
//!
//! ```text
//! <download_directory>/
//!   <sha256(book id), 16 hex chars>/
//!     chapter-0000.audio          finished chapter
//!     chapter-0001.audio.3.part   attempt 3 still in flight
//! ```
//!
//! Book ids are URNs or URLs, so they are hashed rather than sanitized.
//! Chapter files are keyed by index, which never changes for a book.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Length of the hashed book directory name
const BOOK_DIR_HASH_LEN: usize = 16;

/// Path builder for one book's chapter files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPaths {
    book_dir: PathBuf,
}

impl ChapterPaths {
    pub fn for_book(download_directory: &Path, book_id: &str) -> Self {
        Self {
            book_dir: download_directory.join(Self::book_dir_name(book_id)),
        }
    }

    fn book_dir_name(book_id: &str) -> String {
        let digest = Sha256::digest(book_id.as_bytes());
        let mut name = hex::encode(digest);
        name.truncate(BOOK_DIR_HASH_LEN);
        name
    }

    pub fn book_dir(&self) -> &Path {
        &self.book_dir
    }

    /// Final location of a downloaded chapter
    pub fn chapter_file(&self, index: usize) -> PathBuf {
        self.book_dir.join(format!("chapter-{:04}.audio", index))
    }

    /// Location written by one download attempt before it is promoted
    pub fn partial_file(&self, index: usize, attempt: u64) -> PathBuf {
        self.book_dir
            .join(format!("chapter-{:04}.audio.{}.part", index, attempt))
    }
}

//! Directory traversal: fast lookup and the full listing walk
//!
//! `fast_find` resolves one name against the on-disk index without parsing
//! the whole directory: it descends from the root index chunk (when one
//! exists) through routing entries to the single leaf that could hold the
//! name. The full walk follows the leaf chain instead and decodes every
//! entry, which `open` uses to build the listing.

use std::io::{Read, Seek};

use super::chunk::{load_chunk, ChmEntry, ChunkHit, ChunkKind, DirChunk};
use super::error::{ChmError, ChmResult};
use super::header::NO_CHUNK;
use super::HelpFile;

impl<R: Read + Seek> HelpFile<R> {
    /// Fetch a directory chunk through the per-handle cache.
    ///
    /// The cache is append-only and lives exactly as long as the handle.
    pub(crate) fn chunk(&mut self, number: u32) -> ChmResult<&DirChunk> {
        if !self.chunk_cache.contains_key(&number) {
            let chunk = load_chunk(&mut self.source, &self.itsp, number)?;
            self.chunk_cache.insert(number, chunk);
        }
        Ok(&self.chunk_cache[&number])
    }

    /// Resolve `name` to its directory entry using the chunked index.
    ///
    /// Returns `Ok(None)` when the name is not present; errors are reserved
    /// for malformed directories. Name comparison is case-insensitive.
    pub fn fast_find(&mut self, name: &str) -> ChmResult<Option<ChmEntry>> {
        let start = if self.itsp.depth > 1 && self.itsp.root_chunk != NO_CHUNK {
            self.itsp.root_chunk
        } else {
            self.itsp.first_leaf
        };

        // Malformed routing entries could form a cycle; never visit a
        // chunk number twice.
        let mut visited = vec![false; self.itsp.chunk_count as usize];
        let mut current = start;
        loop {
            if current >= self.itsp.chunk_count {
                return Err(ChmError::DataFormat(format!(
                    "index routes to chunk {current} outside the directory"
                )));
            }
            if visited[current as usize] {
                return Err(ChmError::DataFormat(format!(
                    "index chunk {current} revisited; directory is cyclic"
                )));
            }
            visited[current as usize] = true;

            let density = self.itsp.density;
            let chunk = self.chunk(current)?;
            match chunk.search(name.as_bytes(), density)? {
                ChunkHit::Entry(entry) => return Ok(Some(entry)),
                ChunkHit::Routing(child) => current = child,
                ChunkHit::Miss => return Ok(None),
            }
        }
    }

    /// Decode the complete listing by following the leaf chain.
    ///
    /// In salvage mode a leaf that fails to decode is dropped with a
    /// warning and the walk continues with the next one.
    pub(crate) fn walk_directory(&mut self) -> ChmResult<Vec<ChmEntry>> {
        let mut entries = Vec::new();
        let mut visited = vec![false; self.itsp.chunk_count as usize];
        let mut current = Some(self.itsp.first_leaf);
        while let Some(number) = current {
            if number >= self.itsp.chunk_count {
                return Err(ChmError::DataFormat(format!(
                    "leaf chain reaches chunk {number} outside the directory"
                )));
            }
            if visited[number as usize] {
                return Err(ChmError::DataFormat(format!(
                    "leaf chunk {number} revisited; directory is cyclic"
                )));
            }
            visited[number as usize] = true;

            let salvage = self.options.salvage;
            let (next, decoded) = {
                let chunk = self.chunk(number)?;
                if chunk.kind != ChunkKind::Leaf {
                    return Err(ChmError::DataFormat(format!(
                        "listing chain reached a non-leaf chunk {number}"
                    )));
                }
                (chunk.next_leaf, chunk.leaf_entries())
            };
            current = next;
            match decoded {
                Ok(mut entries_here) => entries.append(&mut entries_here),
                Err(e) if salvage => {
                    self.warnings
                        .push(format!("leaf chunk {number} dropped: {e}"));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }
}

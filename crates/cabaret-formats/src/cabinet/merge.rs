//! Multi-part set merging
//!
//! Adjacent cabinets of one set are joined into a single logical view. When
//! the boundary folders carry continuation anchors, the two half-folders are
//! merged into one whose span parts cover both physical files; otherwise the
//! directories are simply concatenated. All links are arena indices, so
//! merging rebases indices instead of rewriting pointer graphs, and a set
//! can never be appended to itself: `append` consumes its argument.

use std::collections::BTreeSet;
use std::io::{Read, Seek};

use super::error::{CabinetError, CabinetResult};
use super::CabinetSet;

/// Hard limit on physical blocks per folder after merging.
const MAX_FOLDER_BLOCKS: u32 = 0xFFFF;

impl<R: Read + Seek> CabinetSet<R> {
    /// Append the next part (or chain of parts) of this set.
    ///
    /// The boundary folders are merged when either side carries a
    /// continuation anchor; their compression parameters must match and the
    /// continued file lists must overlap. Any in-flight extraction cursor
    /// is discarded.
    pub fn append(&mut self, mut next: CabinetSet<R>) -> CabinetResult<()> {
        self.state = None;

        let part_base = self.parts.len();
        let folder_base = self.folders.len();
        let left_last = folder_base - 1;

        let needs_merge = !self.folders[left_last].continued_to_next.is_empty()
            || !next.folders[0].continued_from_prev.is_empty();

        if !needs_merge {
            // Plain end-to-end link.
            for folder in &mut next.folders {
                for span in &mut folder.spans {
                    span.part += part_base;
                }
                rebase_indices(&mut folder.continued_to_next, self.files.len());
                rebase_indices(&mut folder.continued_from_prev, self.files.len());
            }
            for file in &mut next.files {
                file.folder += folder_base;
            }
            self.parts.append(&mut next.parts);
            self.folders.append(&mut next.folders);
            self.files.append(&mut next.files);
            self.warnings.append(next.warnings);
            return Ok(());
        }

        let left_folder = &self.folders[left_last];
        let right_folder = &next.folders[0];

        if left_folder.method.to_bitfield() != right_folder.method.to_bitfield() {
            return Err(CabinetError::DataFormat(
                "compression method changes across the set boundary".into(),
            ));
        }
        if left_folder.total_blocks + right_folder.total_blocks > MAX_FOLDER_BLOCKS {
            return Err(CabinetError::DataFormat(
                "merged folder exceeds the block-count limit".into(),
            ));
        }

        // Match the two continuation file lists by (offset, length).
        let left_keys: Vec<(u32, u32)> = left_folder
            .continued_to_next
            .iter()
            .map(|&i| (self.files[i].folder_offset, self.files[i].length))
            .collect();
        let right_keys: Vec<(u32, u32)> = right_folder
            .continued_from_prev
            .iter()
            .map(|&i| (next.files[i].folder_offset, next.files[i].length))
            .collect();

        let mut matched = vec![false; right_keys.len()];
        if left_keys == right_keys {
            matched.fill(true);
        } else {
            let mut any = false;
            for (position, key) in left_keys.iter().enumerate() {
                let hit = right_keys
                    .iter()
                    .enumerate()
                    .position(|(j, k)| k == key && !matched[j]);
                if let Some(j) = hit {
                    matched[j] = true;
                    any = true;
                } else {
                    let file = &self.files[left_folder.continued_to_next[position]];
                    self.warnings.push(format!(
                        "continued file \"{}\" has no counterpart in the next cabinet",
                        file.name
                    ));
                }
            }
            if !any {
                return Err(CabinetError::DataFormat(
                    "adjacent cabinets share no continued files".into(),
                ));
            }
        }

        // The matched right-hand entries duplicate files already present on
        // the left; drop them and remap everything else.
        let dropped: BTreeSet<usize> = right_folder
            .continued_from_prev
            .iter()
            .enumerate()
            .filter_map(|(j, &file)| matched[j].then_some(file))
            .collect();
        let mut remap = vec![usize::MAX; next.files.len()];
        let mut kept = Vec::with_capacity(next.files.len() - dropped.len());
        for (index, file) in next.files.drain(..).enumerate() {
            if !dropped.contains(&index) {
                remap[index] = self.files.len() + kept.len();
                kept.push(file);
            }
        }

        // Fold the right boundary folder into the left one.
        let mut absorbed = next.folders.remove(0);
        for span in &mut absorbed.spans {
            span.part += part_base;
        }
        let merged = &mut self.folders[left_last];
        merged.total_blocks += absorbed.total_blocks;
        merged.spans.append(&mut absorbed.spans);
        // The boundary anchors are resolved; what survives is the right
        // side's own continuation into a possible further cabinet.
        merged.continued_to_next = absorbed
            .continued_to_next
            .iter()
            .filter_map(|&i| (remap[i] != usize::MAX).then_some(remap[i]))
            .collect();

        // Remaining right folders shift down by one; their files follow.
        for folder in &mut next.folders {
            for span in &mut folder.spans {
                span.part += part_base;
            }
            remap_anchors(&mut folder.continued_to_next, &remap);
            remap_anchors(&mut folder.continued_from_prev, &remap);
        }
        for file in &mut kept {
            file.folder = if file.folder == 0 {
                left_last
            } else {
                folder_base + file.folder - 1
            };
        }

        self.parts.append(&mut next.parts);
        self.folders.append(&mut next.folders);
        self.files.append(&mut kept);
        self.warnings.append(next.warnings);
        Ok(())
    }

    /// Prepend the previous part (or chain of parts) of this set.
    ///
    /// Equivalent to appending this set onto `previous`; afterwards `self`
    /// is the combined set.
    pub fn prepend(&mut self, mut previous: CabinetSet<R>) -> CabinetResult<()> {
        std::mem::swap(self, &mut previous);
        // Keep the receiving set's options across the swap.
        std::mem::swap(&mut self.options, &mut previous.options);
        self.append(previous)
    }
}

fn rebase_indices(anchors: &mut [usize], base: usize) {
    for anchor in anchors {
        *anchor += base;
    }
}

fn remap_anchors(anchors: &mut Vec<usize>, remap: &[usize]) {
    anchors.retain_mut(|i| match remap[*i] {
        usize::MAX => false,
        new => {
            *i = new;
            true
        }
    });
}

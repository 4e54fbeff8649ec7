//! Side table tying root bones to anchor slots.

use std::ops::Range;

use springbone_core::error::SetupError;

use crate::state::BoneState;

/// Segment structure of a flat bone array.
///
/// Anchor slot `k` belongs to the bone at `root_bones[k]`; a segment runs
/// from its root up to (not including) the next root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLayout {
    root_bones: Vec<usize>,
    segment_of: Vec<usize>,
}

impl ChainLayout {
    /// Validate `bones` against `anchor_count` and build the table.
    pub fn from_bones(bones: &[BoneState], anchor_count: usize) -> Result<Self, SetupError> {
        Self::from_root_flags(bones.iter().map(|b| b.is_root), anchor_count)
    }

    /// Same as [`from_bones`](Self::from_bones) from bare root flags.
    pub fn from_root_flags(
        flags: impl IntoIterator<Item = bool>,
        anchor_count: usize,
    ) -> Result<Self, SetupError> {
        let mut root_bones = Vec::new();
        let mut segment_of = Vec::new();
        for (i, is_root) in flags.into_iter().enumerate() {
            if is_root {
                root_bones.push(i);
            } else if i == 0 {
                return Err(SetupError::FirstBoneNotRoot);
            }
            segment_of.push(root_bones.len() - 1);
        }
        if segment_of.is_empty() {
            return Err(SetupError::EmptyChain);
        }
        if root_bones.len() != anchor_count {
            return Err(SetupError::AnchorCountMismatch {
                roots: root_bones.len(),
                anchors: anchor_count,
            });
        }
        Ok(Self {
            root_bones,
            segment_of,
        })
    }

    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.segment_of.len()
    }

    #[must_use]
    pub fn root_count(&self) -> usize {
        self.root_bones.len()
    }

    /// Bone index of the root served by anchor slot `k`.
    #[must_use]
    pub fn root_bone(&self, k: usize) -> Option<usize> {
        self.root_bones.get(k).copied()
    }

    /// Anchor slot / segment index of `bone`.
    #[must_use]
    pub fn segment(&self, bone: usize) -> Option<usize> {
        self.segment_of.get(bone).copied()
    }

    /// Bone indices of segment `k`.
    #[must_use]
    pub fn segment_bones(&self, k: usize) -> Option<Range<usize>> {
        let start = *self.root_bones.get(k)?;
        let end = self
            .root_bones
            .get(k + 1)
            .copied()
            .unwrap_or(self.segment_of.len());
        Some(start..end)
    }
}

//! Fenwick-tree index over per-item heights.
//!
//! Backs the virtualized renderer: cumulative heights and offset-to-item
//! lookups in O(log n), so a height change never forces an O(n) rescan.
//!
//! # Complexity
//!
//! - `push`: O(log n)
//! - `set`: O(log n)
//! - `prefix_sum` / `total`: O(log n)
//! - `index_at_offset`: O(log² n)
//! - `len` / `clear`: O(1)

/// Cumulative-height index over the timeline's rows.
///
/// Heights are kept alongside the tree so `set` can compute its delta
/// directly instead of via two prefix-sum queries.
#[derive(Debug, Clone, Default)]
pub struct HeightIndex {
    tree: Vec<i64>,
    heights: Vec<u16>,
}

impl HeightIndex {
    /// Empty index with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tree: vec![0; capacity],
            heights: Vec::with_capacity(capacity),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.heights.len()
    }

    /// Whether the index holds no items.
    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Append an item of the given height.
    pub fn push(&mut self, height: u16) {
        let index = self.heights.len();
        self.heights.push(height);
        if self.heights.len() > self.tree.len() {
            // Zero-extending a fenwick array truncates the propagation
            // chains of earlier updates, so growth rebuilds from `heights`.
            self.rebuild();
        } else {
            fenwick::array::update(&mut self.tree, index, i64::from(height));
        }
    }

    fn rebuild(&mut self) {
        let capacity = (self.tree.len().max(1) * 2).max(self.heights.len());
        self.tree.clear();
        self.tree.resize(capacity, 0);
        for (index, &height) in self.heights.iter().enumerate() {
            fenwick::array::update(&mut self.tree, index, i64::from(height));
        }
    }

    /// Replace the height at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn set(&mut self, index: usize, height: u16) {
        assert!(
            index < self.heights.len(),
            "index {} out of bounds (len: {})",
            index,
            self.heights.len()
        );
        let delta = i64::from(height) - i64::from(self.heights[index]);
        if delta != 0 {
            self.heights[index] = height;
            fenwick::array::update(&mut self.tree, index, delta);
        }
    }

    /// Height of one item.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn height_at(&self, index: usize) -> u16 {
        self.heights[index]
    }

    /// Cumulative height up to and including `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn prefix_sum(&self, index: usize) -> usize {
        assert!(
            index < self.heights.len(),
            "index {} out of bounds (len: {})",
            index,
            self.heights.len()
        );
        fenwick::array::prefix_sum(&self.tree, index).max(0) as usize
    }

    /// Vertical offset of the top edge of `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn offset_of(&self, index: usize) -> usize {
        if index == 0 {
            0
        } else {
            self.prefix_sum(index - 1)
        }
    }

    /// Total height of all items.
    pub fn total(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.prefix_sum(self.heights.len() - 1)
        }
    }

    /// Item containing the vertical offset, i.e. the first index whose
    /// cumulative height exceeds `offset`. `None` when `offset >= total()`.
    pub fn index_at_offset(&self, offset: usize) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let mut left = 0;
        let mut right = self.heights.len();
        while left < right {
            let mid = left + (right - left) / 2;
            if self.prefix_sum(mid) > offset {
                right = mid;
            } else {
                left = mid + 1;
            }
        }
        (left < self.heights.len()).then_some(left)
    }

    /// Reset to empty, retaining capacity.
    pub fn clear(&mut self) {
        self.tree.iter_mut().for_each(|slot| *slot = 0);
        self.heights.clear();
    }
}

// ===== Tests =====

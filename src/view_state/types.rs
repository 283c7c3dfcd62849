//! Core view-state newtypes.

/// Height of a timeline row in terminal rows. Always >= 1 once measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowHeight(u16);

/// Error from the [`RowHeight`] smart constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("row height must be >= 1 (got {0})")]
pub struct InvalidRowHeight(pub u16);

impl RowHeight {
    /// Minimum renderable height.
    pub const ONE: Self = Self(1);

    /// Smart constructor; zero-height rows do not exist in the timeline.
    pub fn new(height: u16) -> Result<Self, InvalidRowHeight> {
        if height == 0 {
            Err(InvalidRowHeight(height))
        } else {
            Ok(Self(height))
        }
    }

    /// Raw value.
    pub fn get(&self) -> u16 {
        self.0
    }
}

impl Default for RowHeight {
    fn default() -> Self {
        Self::ONE
    }
}

/// Index of an item in the banded timeline. 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ItemIndex(usize);

impl ItemIndex {
    /// Wrap a raw 0-based index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw value.
    pub fn get(&self) -> usize {
        self.0
    }

    /// Next index.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Previous index, saturating at 0.
    pub fn prev(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl From<usize> for ItemIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Viewport dimensions in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportDimensions {
    /// Width in columns.
    pub width: u16,
    /// Height in rows.
    pub height: u16,
}

impl ViewportDimensions {
    /// Create new dimensions.
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

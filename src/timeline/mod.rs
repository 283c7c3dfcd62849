//! Timeline presentation: grouping and read-receipt tracking.

mod grouper;
mod read_tracker;

pub use grouper::{band, band_with_threshold, pinned, TimelineItem, HOUR_BAND_DAY_THRESHOLD};
pub use read_tracker::ReadRangeTracker;

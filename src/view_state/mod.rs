//! View state: virtualized layout, scroll semantics, view persistence.

pub mod height_index;
pub mod layout;
pub mod scroll;
pub mod types;
pub mod view_memory;

pub use height_index::HeightIndex;
pub use layout::{VirtualLayout, DEFAULT_ESTIMATE_ROWS};
pub use scroll::ScrollPosition;
pub use types::{InvalidRowHeight, ItemIndex, RowHeight, ViewportDimensions};
pub use view_memory::{
    ConversationView, RestoreOutcome, ViewMemory, ANCHOR_RESTORE_DEADLINE, ANCHOR_TOP_GAP_ROWS,
    BOTTOM_PROXIMITY_ROWS, CAPTURE_THROTTLE,
};

//! Internal test modules - whitebox tests with crate access
//!
//! End-to-end flows that cross module boundaries: wire frames through
//! dispatch into the store, the optimistic-send race, and the timeline
//! pipeline from store to resolved scroll offset.

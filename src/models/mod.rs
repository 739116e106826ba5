//! Data models for Perch TV

mod item;

pub use item::{ADULT_LABELS, Engagement, MediaRef, QueueItem};

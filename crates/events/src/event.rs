use chrono::{DateTime, Utc};

/// A fact emitted by the engine.
///
/// Events are immutable and versioned; `event_type` is the stable name
/// subscribers route on (e.g. "inspection.missing_info.detected").
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

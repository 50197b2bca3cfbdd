//! Telemetry, timeline and elevation readers

pub mod dem;
pub mod metadata;
pub mod telemetry;

pub use dem::DemReader;
pub use metadata::{MetadataTimeline, OutOfOrderPolicy, TimelineParams};
pub use telemetry::{MetadataFrame, TelemetryField};

/// Check if content is gzip format by examining magic bytes
pub(crate) fn is_gzip_content(content: &[u8]) -> bool {
    content.len() >= 2 && content[0] == 0x1F && content[1] == 0x8B
}

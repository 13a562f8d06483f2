pub mod config;
pub mod error;
pub mod segment;
pub mod sink;
pub mod stats;
pub mod types;

pub use error::{RelayError, Result};
pub use segment::{Asset, AssetMode, CanonicalMessage, LinkCard, MessageRef, Segment, SegmentChain};
pub use sink::EventSink;
pub use types::{Author, EventKind, InboundEvent, Subtype};

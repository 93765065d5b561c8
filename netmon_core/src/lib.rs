pub mod capture;
pub mod config;
pub mod decode;
pub mod error;
pub mod render;
pub mod sink;
pub mod stats;
pub mod util;

// Re-export commonly used types
pub use capture::{CaptureOrchestrator, CaptureSource, PcapSource, SessionOutcome, SessionState};
pub use config::{CaptureConfig, DashboardConfig, MonitorConfig, StatsConfig};
pub use decode::{decode_frame, DecodeError, PacketRecord, Protocol};
pub use error::{MonitorError, Result};
pub use render::{Dashboard, DashboardRunner};
pub use sink::{ConsoleSink, PacketSink};
pub use stats::{ConnectionKey, StatsAggregator, StatsSnapshot};

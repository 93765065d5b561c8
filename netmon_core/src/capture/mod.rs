mod orchestrator;
pub mod scripted;
mod session;
mod source;

pub use orchestrator::{resolve_devices, CaptureOrchestrator, StartReport};
pub use session::{CaptureSession, SessionControl, SessionFailure, SessionOutcome, SessionState};
pub use source::{
    CaptureHandle, CaptureSource, Frame, Interrupter, OpenError, PcapSource, ReceiveError,
    ReceiveResult,
};

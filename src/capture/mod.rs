//! Capture-target selection and packet acquisition.

mod mode;
mod source;

pub use mode::{CaptureConfig, CaptureMode};
pub use source::{Captured, PacketSource};

pub mod decoder;
pub mod pcap_engine;

pub use decoder::decode_frame;
pub use pcap_engine::{matching_devices, PcapCapture};

use crate::channel::LossySender;
use crate::Result;
use flatnet_common::FlowEvent;
use prometheus::IntCounter;
use tracing::warn;

/// A running capture source feeding the event channel.
pub trait Capture: Send {
    fn device(&self) -> &str;

    /// Release the capture handle and block until the capture loop has
    /// exited. No events are produced after this returns.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Start a pcap capture on every device. Devices that cannot be opened are
/// logged and skipped.
pub fn start_all(
    devices: &[String],
    sink: &LossySender<FlowEvent>,
    captured: &IntCounter,
) -> Vec<Box<dyn Capture>> {
    let mut captures: Vec<Box<dyn Capture>> = Vec::with_capacity(devices.len());

    for device in devices {
        match PcapCapture::start(device, sink.clone(), captured.clone()) {
            Ok(capture) => captures.push(Box::new(capture)),
            Err(e) => warn!(device = %device, error = %e, "Could not open capture, skipping interface"),
        }
    }

    captures
}

//! Live capture on one interface through libpcap

use crate::capture::decoder::decode_frame;
use crate::capture::Capture;
use crate::channel::{LossySender, Offer};
use crate::{FlatnetError, Result};
use flatnet_common::{now_millis, FlowEvent};
use pcap::{Active, Device};
use prometheus::IntCounter;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Enough for Ethernet + IPv4/IPv6 + TCP headers with options.
pub const SNAPSHOT_LEN: i32 = 128;

/// Upper bound on how long `close` waits for a blocked read to return.
pub const READ_TIMEOUT_MS: i32 = 500;

/// A capture handle decoded on a dedicated thread.
pub struct PcapCapture {
    device: String,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PcapCapture {
    /// Open `device` in promiscuous mode and start the decode loop.
    pub fn start(device: &str, sink: LossySender<FlowEvent>, captured: IntCounter) -> Result<Self> {
        let handle = pcap::Capture::from_device(device)?
            .promisc(true)
            .snaplen(SNAPSHOT_LEN)
            .timeout(READ_TIMEOUT_MS)
            .open()?;

        let stop = Arc::new(AtomicBool::new(false));

        let worker = thread::Builder::new()
            .name(format!("capture-{}", device))
            .spawn({
                let device = device.to_string();
                let stop = stop.clone();
                move || run(handle, &device, &sink, &captured, &stop)
            })?;

        info!(device, "Capture started");

        Ok(Self {
            device: device.to_string(),
            stop,
            worker: Some(worker),
        })
    }
}

impl Capture for PcapCapture {
    fn device(&self) -> &str {
        &self.device
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);

        debug!(device = %self.device, "Waiting for capture loop to terminate");
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| {
                FlatnetError::CaptureError(format!("capture loop on {} panicked", self.device))
            })?;
        }

        info!(device = %self.device, "Capture closed");
        Ok(())
    }
}

impl Drop for PcapCapture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

// Owns the handle; it is released when this function returns.
fn run(
    mut handle: pcap::Capture<Active>,
    device: &str,
    sink: &LossySender<FlowEvent>,
    captured: &IntCounter,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::SeqCst) {
        match handle.next_packet() {
            Ok(packet) => {
                let Some(event) = decode_frame(packet.data, now_millis()) else {
                    continue;
                };

                match sink.offer(event) {
                    Offer::Sent => captured.inc(),
                    Offer::Dropped => {}
                    Offer::Closed => {
                        debug!(device, "Event channel closed, stopping capture");
                        break;
                    }
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => {
                error!(device, error = %e, "Capture failed, stopping loop");
                break;
            }
        }
    }

    debug!(device, "Capture loop finished");
}

/// Names of all capture devices matching `pattern`.
pub fn matching_devices(pattern: &Regex) -> Result<Vec<String>> {
    let devices = Device::list()
        .map_err(|e| FlatnetError::CaptureError(format!("Failed to list devices: {}", e)))?;

    let names: Vec<String> = devices.into_iter().map(|d| d.name).collect();
    let matched = filter_devices(&names, pattern);

    if matched.is_empty() {
        return Err(FlatnetError::NoMatchingDevice {
            pattern: pattern.to_string(),
            available: names,
        });
    }

    Ok(matched)
}

fn filter_devices(names: &[String], pattern: &Regex) -> Vec<String> {
    names
        .iter()
        .filter(|name| pattern.is_match(name))
        .cloned()
        .collect()
}

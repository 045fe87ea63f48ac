use crate::{Error, Result};
use log::error;
use pcap::{Activated, Capture};
use std::path::PathBuf;

/// Where and how to capture packets.
pub struct CaptureConfig {
    /// Read from a capture file instead of a live interface
    pub file: Option<PathBuf>,

    /// Interface to read packets from ("en4", "eth0", ..)
    pub interface: String,

    /// Interface snap length
    pub snaplen: i32,

    /// Whether to put the interface into promiscuous mode
    pub promiscuous: bool,

    /// BPF filter expression (may be empty)
    pub filter: String,
}

/// Open the configured packet source and install the BPF filter.
///
/// Failures here are initialization failures: the caller exits non-zero.
pub fn open_capture(config: &CaptureConfig) -> Result<Capture<dyn Activated>> {
    let mut capture: Capture<dyn Activated> = match &config.file {
        Some(path) => Capture::from_file(path)
            .map_err(|e| {
                error!("unable to open \"{}\"", path.display());
                Error::from(e)
            })?
            .into(),
        None => Capture::from_device(config.interface.as_str())
            .and_then(|device| {
                device
                    .snaplen(config.snaplen)
                    .promisc(config.promiscuous)
                    .open()
            })
            .map_err(|e| {
                error!("unable to open interface \"{}\"", config.interface);
                Error::from(e)
            })?
            .into(),
    };

    capture.filter(&config.filter, true).map_err(|e| {
        error!("unable to set BPF: {}", e);
        Error::from(e)
    })?;

    Ok(capture)
}

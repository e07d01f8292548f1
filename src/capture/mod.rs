//! QR code capture from a camera.
//!
//! The camera is polled one frame per tick. Each frame is run through the
//! QR decoder; the first non-empty payload ends the scan. Frames without a
//! payload are scaled down and handed to the UI as a live preview.
//!
//! - `scanner`: the Idle/Scanning state machine
//! - `decode`: QR decoding via rqrr
//! - `preview`: preview scaling and encoding
//! - `webcam`: native camera backend via nokhwa (feature `webcam`)

use anyhow::Result;
use image::RgbImage;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

mod decode;
pub mod preview;
pub mod scanner;
#[cfg(feature = "webcam")]
mod webcam;

pub use decode::RqrrDecoder;
pub use scanner::{QrScanner, ScanState, ScanStep};
#[cfg(feature = "webcam")]
pub use webcam::{Webcam, WebcamOpener};

/// Delay between two frame reads.
pub const TICK_INTERVAL: Duration = Duration::from_millis(30);

/// A source of RGB frames. Dropping it releases the device.
pub trait Camera {
    /// Grab the next frame, or `None` if none is available right now.
    fn read_frame(&mut self) -> Option<RgbImage>;
}

/// Opens a [`Camera`]. Called once per scanning run.
pub trait CameraOpener {
    type Camera: Camera;

    fn open(&self) -> Result<Self::Camera>;
}

/// Extracts a QR payload from a frame.
pub trait QrDecoder {
    fn decode(&mut self, frame: &RgbImage) -> Option<String>;
}

/// Progress reported by a running scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// The camera is open and frames are being read.
    Started,
    /// The camera could not be opened. The scan never started.
    OpenFailed(String),
    /// Preview of the latest frame as a `data:` URL.
    Preview(String),
    /// The decoded QR payload, unmodified.
    Decoded(String),
    /// The camera has been released.
    Stopped,
}

impl ScanEvent {
    /// Whether a camera is open after this event, or `None` if the event
    /// does not change that. Every run reports exactly one `Some(true)`
    /// followed by one `Some(false)`, or a single `Some(false)` when the
    /// camera never opened, so the last value is always the live state.
    pub fn scanning(&self) -> Option<bool> {
        match self {
            ScanEvent::Started => Some(true),
            ScanEvent::OpenFailed(_) | ScanEvent::Stopped => Some(false),
            ScanEvent::Preview(_) | ScanEvent::Decoded(_) => None,
        }
    }
}

/// Start scanning with the rqrr decoder. See [`start_scan_with`].
pub fn start_scan<O, F>(opener: O, on_event: F) -> ScanHandle
where
    O: CameraOpener + Send + 'static,
    F: FnMut(ScanEvent) + Send + 'static,
{
    start_scan_with::<O, RqrrDecoder, F>(opener, on_event)
}

/// Start scanning on a blocking task.
///
/// Native camera handles are not `Send`, so the camera is opened, read and
/// released on that one task. It sleeps [`TICK_INTERVAL`] between ticks and
/// ends on its own after a decode or a failed open. The returned
/// `ScanHandle` must be kept alive; dropping it stops the scan.
pub fn start_scan_with<O, D, F>(opener: O, mut on_event: F) -> ScanHandle
where
    O: CameraOpener + Send + 'static,
    D: QrDecoder + Default + 'static,
    F: FnMut(ScanEvent) + Send + 'static,
{
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::task::spawn_blocking(move || {
        let mut scanner = QrScanner::<O, D>::new(opener);
        scan_loop(&mut scanner, &mut stop_rx, &mut on_event);
    });

    ScanHandle {
        _stop: stop_tx,
        task,
    }
}

fn scan_loop<O, D>(
    scanner: &mut QrScanner<O, D>,
    stop_rx: &mut oneshot::Receiver<()>,
    on_event: &mut impl FnMut(ScanEvent),
) where
    O: CameraOpener,
    D: QrDecoder + Default,
{
    if let Err(e) = scanner.start() {
        warn!("Failed to open camera: {e:#}");
        on_event(ScanEvent::OpenFailed(format!("{e:#}")));
        return;
    }
    on_event(ScanEvent::Started);

    loop {
        // A sent signal and a dropped handle both mean stop.
        if !matches!(
            stop_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ) {
            break;
        }

        match scanner.tick() {
            ScanStep::Idle => break,
            ScanStep::FrameUnavailable => {}
            ScanStep::Preview(frame) => match preview::render(&frame) {
                Ok(url) => on_event(ScanEvent::Preview(url)),
                Err(e) => debug!("Skipping preview frame: {e:#}"),
            },
            ScanStep::Decoded(payload) => {
                on_event(ScanEvent::Decoded(payload));
                break;
            }
        }

        std::thread::sleep(TICK_INTERVAL);
    }

    scanner.stop();
    on_event(ScanEvent::Stopped);
}

/// Handle to an active scan. Drop to stop scanning.
pub struct ScanHandle {
    _stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ScanHandle {
    /// True once the scan ended by itself (decode or failed open) or was
    /// stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop scanning and wait until the camera has been released.
    pub async fn stop(self) {
        let ScanHandle { _stop: stop, task } = self;
        drop(stop);
        if let Err(e) = task.await {
            warn!("Scan task ended abnormally: {e}");
        }
        info!("Scanner stopped");
    }
}

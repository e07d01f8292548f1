//! Idle/Scanning state machine for QR capture.
//!
//! The scanner never sleeps or spawns anything itself. Whoever drives it
//! calls [`QrScanner::tick`] once per interval and acts on the returned
//! [`ScanStep`].

use super::{Camera, CameraOpener, QrDecoder};
use anyhow::Result;
use image::RgbImage;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// Outcome of a single tick.
#[derive(Debug)]
pub enum ScanStep {
    /// Nothing to do, the scanner is not running.
    Idle,
    /// The camera had no frame ready. Try again next tick.
    FrameUnavailable,
    /// A frame without a QR payload, to be shown in the preview.
    Preview(RgbImage),
    /// A payload was decoded. The scanner is already back to Idle.
    Decoded(String),
}

/// Camera and decoder for one scanning run. Dropping it releases both.
struct CaptureSession<C, D> {
    camera: C,
    decoder: D,
}

impl<C, D> Drop for CaptureSession<C, D> {
    fn drop(&mut self) {
        debug!("Capture session released");
    }
}

pub struct QrScanner<O: CameraOpener, D> {
    opener: O,
    session: Option<CaptureSession<O::Camera, D>>,
}

impl<O, D> QrScanner<O, D>
where
    O: CameraOpener,
    D: QrDecoder + Default,
{
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            session: None,
        }
    }

    pub fn state(&self) -> ScanState {
        if self.session.is_some() {
            ScanState::Scanning
        } else {
            ScanState::Idle
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.session.is_some()
    }

    /// Open the camera and a fresh decoder. A no-op while already scanning.
    ///
    /// On error the scanner stays Idle.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let camera = self.opener.open()?;
        self.session = Some(CaptureSession {
            camera,
            decoder: D::default(),
        });
        info!("QR scanning started");
        Ok(())
    }

    /// Release the camera and decoder. A no-op while Idle.
    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            info!("QR scanning stopped");
        }
    }

    /// Flip between Idle and Scanning. Returns the resulting state.
    pub fn toggle(&mut self) -> Result<ScanState> {
        if self.is_scanning() {
            self.stop();
        } else {
            self.start()?;
        }
        Ok(self.state())
    }

    /// Read one frame and try to decode it.
    pub fn tick(&mut self) -> ScanStep {
        let Some(session) = self.session.as_mut() else {
            return ScanStep::Idle;
        };

        let Some(frame) = session.camera.read_frame() else {
            return ScanStep::FrameUnavailable;
        };

        match session.decoder.decode(&frame) {
            Some(payload) if !payload.is_empty() => {
                info!("QR code decoded ({} chars)", payload.len());
                self.stop();
                ScanStep::Decoded(payload)
            }
            _ => ScanStep::Preview(frame),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::bail;
    use image::Rgb;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Marks a frame as carrying a QR payload for [`FakeDecoder`].
    const QR_PIXEL: Rgb<u8> = Rgb([255, 0, 255]);
    const FRAME_WIDTH: u32 = 64;

    /// What a fake camera returns on each read.
    #[derive(Debug, Clone)]
    pub(crate) enum Shot {
        Missing,
        Plain,
        Qr(&'static str),
    }

    #[derive(Debug, Default)]
    pub(crate) struct Counters {
        pub opened: AtomicUsize,
        pub released: AtomicUsize,
        pub reads: AtomicUsize,
    }

    impl Counters {
        pub fn open_cameras(&self) -> usize {
            self.opened.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
        }

        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    /// Frame with the payload written into row 1, one byte per red channel.
    fn qr_frame(payload: &str) -> RgbImage {
        let mut frame = RgbImage::new(FRAME_WIDTH, 6);
        frame.put_pixel(0, 0, QR_PIXEL);
        for (x, byte) in payload.bytes().enumerate() {
            frame.put_pixel(x as u32, 1, Rgb([byte, 0, 0]));
        }
        frame
    }

    pub(crate) struct FakeCamera {
        shots: VecDeque<Shot>,
        counters: Arc<Counters>,
    }

    impl Camera for FakeCamera {
        fn read_frame(&mut self) -> Option<RgbImage> {
            self.counters.reads.fetch_add(1, Ordering::SeqCst);
            // Once the script runs out the camera keeps producing plain frames.
            match self.shots.pop_front().unwrap_or(Shot::Plain) {
                Shot::Missing => None,
                Shot::Plain => Some(RgbImage::new(FRAME_WIDTH, 6)),
                Shot::Qr(payload) => Some(qr_frame(payload)),
            }
        }
    }

    impl Drop for FakeCamera {
        fn drop(&mut self) {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug, Clone)]
    pub(crate) struct FakeOpener {
        shots: Vec<Shot>,
        fail: bool,
        pub counters: Arc<Counters>,
    }

    impl FakeOpener {
        pub fn new(shots: Vec<Shot>) -> Self {
            Self {
                shots,
                fail: false,
                counters: Arc::default(),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }
    }

    impl CameraOpener for FakeOpener {
        type Camera = FakeCamera;

        fn open(&self) -> Result<FakeCamera> {
            if self.fail {
                bail!("no camera attached");
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeCamera {
                shots: self.shots.iter().cloned().collect(),
                counters: self.counters.clone(),
            })
        }
    }

    /// Reads back the payload written by `qr_frame`.
    #[derive(Default)]
    pub(crate) struct FakeDecoder;

    impl QrDecoder for FakeDecoder {
        fn decode(&mut self, frame: &RgbImage) -> Option<String> {
            if *frame.get_pixel(0, 0) != QR_PIXEL {
                return None;
            }
            let bytes: Vec<u8> = (0..frame.width())
                .map(|x| frame.get_pixel(x, 1).0[0])
                .take_while(|&b| b != 0)
                .collect();
            String::from_utf8(bytes).ok()
        }
    }

    type TestScanner = QrScanner<FakeOpener, FakeDecoder>;

    fn scanning(opener: FakeOpener) -> TestScanner {
        let mut scanner = QrScanner::new(opener);
        scanner.start().unwrap();
        scanner
    }

    #[test]
    fn starts_idle() {
        let scanner: TestScanner = QrScanner::new(FakeOpener::new(vec![]));
        assert_eq!(scanner.state(), ScanState::Idle);
        assert!(!scanner.is_scanning());
    }

    #[test]
    fn open_failure_stays_idle() {
        let mut scanner: TestScanner = QrScanner::new(FakeOpener::failing());
        assert!(scanner.start().is_err());
        assert_eq!(scanner.state(), ScanState::Idle);
        assert!(matches!(scanner.tick(), ScanStep::Idle));
    }

    #[test]
    fn missing_frames_keep_scanning() {
        let opener = FakeOpener::new(vec![Shot::Missing; 50]);
        let counters = opener.counters.clone();
        let mut scanner = scanning(opener);

        for _ in 0..50 {
            assert!(matches!(scanner.tick(), ScanStep::FrameUnavailable));
            assert_eq!(scanner.state(), ScanState::Scanning);
        }
        assert_eq!(counters.reads(), 50);
    }

    #[test]
    fn frames_without_payload_never_stop_the_scan() {
        let mut scanner = scanning(FakeOpener::new(vec![]));
        for _ in 0..200 {
            match scanner.tick() {
                ScanStep::Preview(frame) => assert_eq!(frame.dimensions(), (FRAME_WIDTH, 6)),
                other => panic!("unexpected step {other:?}"),
            }
        }
        assert!(scanner.is_scanning());
    }

    #[test]
    fn empty_payload_is_not_a_decode() {
        let mut scanner = scanning(FakeOpener::new(vec![Shot::Qr("")]));
        assert!(matches!(scanner.tick(), ScanStep::Preview(_)));
        assert!(scanner.is_scanning());
    }

    #[test]
    fn first_decode_wins_and_releases_the_camera() {
        let opener = FakeOpener::new(vec![
            Shot::Missing,
            Shot::Plain,
            Shot::Qr("abc123"),
            Shot::Qr("second"),
        ]);
        let counters = opener.counters.clone();
        let mut scanner = scanning(opener);

        let mut decoded = Vec::new();
        for _ in 0..10 {
            if let ScanStep::Decoded(token) = scanner.tick() {
                decoded.push(token);
            }
        }

        assert_eq!(decoded, vec!["abc123".to_string()]);
        assert_eq!(scanner.state(), ScanState::Idle);
        // Nothing is read after the decode.
        assert_eq!(counters.reads(), 3);
        assert_eq!(counters.open_cameras(), 0);
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let opener = FakeOpener::new(vec![]);
        let counters = opener.counters.clone();
        let mut scanner: TestScanner = QrScanner::new(opener);

        scanner.stop();
        scanner.stop();
        assert_eq!(scanner.state(), ScanState::Idle);
        assert_eq!(counters.released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn start_while_scanning_keeps_one_camera() {
        let opener = FakeOpener::new(vec![]);
        let counters = opener.counters.clone();
        let mut scanner: TestScanner = QrScanner::new(opener);

        scanner.start().unwrap();
        scanner.start().unwrap();
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);

        scanner.stop();
        assert_eq!(counters.open_cameras(), 0);
    }

    #[test]
    fn toggle_flips_state_and_releases() {
        let opener = FakeOpener::new(vec![]);
        let counters = opener.counters.clone();
        let mut scanner: TestScanner = QrScanner::new(opener);

        for _ in 0..5 {
            assert_eq!(scanner.toggle().unwrap(), ScanState::Scanning);
            assert_eq!(counters.open_cameras(), 1);
            assert_eq!(scanner.toggle().unwrap(), ScanState::Idle);
            assert_eq!(counters.open_cameras(), 0);
        }
    }

    #[test]
    fn dropping_the_scanner_releases_the_camera() {
        let opener = FakeOpener::new(vec![]);
        let counters = opener.counters.clone();
        let scanner = scanning(opener);
        assert_eq!(counters.open_cameras(), 1);

        drop(scanner);
        assert_eq!(counters.open_cameras(), 0);
    }
}

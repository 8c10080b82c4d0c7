use super::{CaptureError, CaptureSource};
use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type FrameResult = std::result::Result<RgbaImage, String>;

/// Webcam source
///
/// The camera lives on its own thread, since nokhwa only offers a blocking
/// read; frames are handed over one at a time so `capture` can bound its wait.
pub struct WebcamCapture {
    frames: Option<Receiver<FrameResult>>,
    running: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{} @ {} fps",
            device_index,
            width,
            height,
            fps
        );

        let running = Arc::new(AtomicBool::new(true));
        let streaming = Arc::new(AtomicBool::new(false));
        let (init_tx, init_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::sync_channel(1);

        let worker = {
            let running = Arc::clone(&running);
            let streaming = Arc::clone(&streaming);
            thread::Builder::new()
                .name("webcam-capture".to_string())
                .spawn(move || {
                    let camera = match open_camera(device_index, width, height, fps) {
                        Ok(camera) => camera,
                        Err(e) => {
                            let _ = init_tx.send(Err(format!("{e:#}")));
                            return;
                        }
                    };
                    let resolution = camera.resolution();
                    streaming.store(true, Ordering::SeqCst);
                    let _ = init_tx.send(Ok((resolution.width(), resolution.height())));
                    capture_loop(camera, frame_tx, &running);
                    streaming.store(false, Ordering::SeqCst);
                })
                .context("Failed to spawn capture thread")?
        };

        let (actual_width, actual_height) = init_rx
            .recv()
            .context("Capture thread exited during startup")?
            .map_err(|e| anyhow!("Failed to open camera: {e}"))?;

        tracing::info!(
            "Webcam initialized successfully ({}x{})",
            actual_width,
            actual_height
        );

        Ok(Self {
            frames: Some(frame_rx),
            running,
            streaming,
            worker: Some(worker),
            width: actual_width,
            height: actual_height,
        })
    }
}

fn open_camera(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Camera> {
    let index = CameraIndex::Index(device_index);
    let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps);
    let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(format));

    let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

    camera
        .open_stream()
        .context("Failed to open camera stream")?;

    Ok(camera)
}

fn capture_loop(mut camera: Camera, frames: SyncSender<FrameResult>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        let result = camera
            .frame()
            .and_then(|frame| frame.decode_image::<RgbAFormat>())
            .map_err(|e| e.to_string());

        if frames.send(result).is_err() {
            break;
        }

        if !camera.is_stream_open() {
            tracing::warn!("Camera stream closed");
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::debug!("Failed to stop camera stream: {}", e);
    }
}

impl CaptureSource for WebcamCapture {
    fn capture(&mut self, timeout: Duration) -> Result<RgbaImage, CaptureError> {
        let frames = self.frames.as_ref().ok_or(CaptureError::Closed)?;
        match frames.recv_timeout(timeout) {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(e)) => Err(CaptureError::Device(e)),
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                // The worker is gone, whether it returned or panicked
                self.streaming.store(false, Ordering::SeqCst);
                Err(CaptureError::Closed)
            }
        }
    }

    fn is_streaming(&self) -> bool {
        let worker_alive = self
            .worker
            .as_ref()
            .map_or(false, |worker| !worker.is_finished());
        worker_alive && self.streaming.load(Ordering::SeqCst)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Unblocks a worker parked on a full channel
        self.frames.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Capture thread panicked");
            }
        }
        tracing::info!("Webcam released");
    }
}

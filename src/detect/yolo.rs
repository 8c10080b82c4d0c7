use super::labels::ClassLabels;
use super::overlay::{self, LabelFont, OverlayFlags};
use super::{Detection, Detector, Precision};
use anyhow::{bail, Context, Result};
use image::{imageops, RgbaImage};
use ndarray::Array4;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Smoothing factor for the rolling network FPS
const FPS_SMOOTHING: f32 = 0.1;

#[derive(Clone, Debug)]
pub struct YoloConfig {
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub fp16: bool,
    /// TrueType/OpenType font for tab text; plain tabs without one
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model.onnx"),
            labels_path: None,
            input_size: 640,
            conf_threshold: 0.5,
            iou_threshold: 0.45,
            fp16: false,
            font_path: None,
            font_size: 14.0,
        }
    }
}

/// Exponential moving average of inferences per second
#[derive(Clone, Copy, Debug, Default)]
struct RollingFps {
    value: f32,
}

impl RollingFps {
    fn update(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f32();
        if secs <= 0.0 {
            return;
        }
        let fps = 1.0 / secs;
        self.value = if self.value == 0.0 {
            fps
        } else {
            self.value + FPS_SMOOTHING * (fps - self.value)
        };
    }

    fn value(&self) -> f32 {
        self.value
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct ProfilerTimes {
    preprocess: Duration,
    inference: Duration,
    postprocess: Duration,
    overlay: Duration,
}

/// YOLOv8-style single stage detector on ONNX Runtime
///
/// Expects one image input of shape [1, 3, S, S] and one output of shape
/// [1, 4 + classes, proposals] with centre-format boxes in input pixels.
pub struct YoloDetector {
    session: Session,
    labels: ClassLabels,
    font: Option<LabelFont>,
    config: YoloConfig,
    precision: Precision,
    network_fps: RollingFps,
    times: ProfilerTimes,
}

impl YoloDetector {
    pub fn new(config: YoloConfig) -> Result<Self> {
        let path = &config.model_path;
        tracing::info!("Loading detection model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_fp16(config.fp16)
                    .build(),
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ])?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let labels = match &config.labels_path {
            Some(labels_path) => ClassLabels::load(labels_path)?,
            None => ClassLabels::default(),
        };

        let font = config
            .font_path
            .as_ref()
            .map(|font_path| LabelFont::load(font_path, config.font_size))
            .transpose()?;

        let precision = if config.fp16 {
            Precision::Fp16
        } else {
            Precision::Fp32
        };

        tracing::info!(
            "Detection model loaded ({}x{} input, {}, threshold {:.2})",
            config.input_size,
            config.input_size,
            precision,
            config.conf_threshold
        );

        Ok(Self {
            session,
            labels,
            font,
            config,
            precision,
            network_fps: RollingFps::default(),
            times: ProfilerTimes::default(),
        })
    }

    /// Resize to the square network input and lay out as normalized NCHW
    fn preprocess(&self, frame: &RgbaImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let size = self.config.input_size;
        let resized = imageops::resize(frame, size, size, imageops::FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }
        tensor
    }

    fn infer(&mut self, tensor: Array4<f32>) -> Result<(Vec<i64>, Vec<f32>)> {
        let _span = tracing::debug_span!("inference").entered();

        let input = Tensor::from_array(tensor)?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("Failed to run inference")?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract detector output")?;

        Ok((shape.iter().copied().collect(), data.to_vec()))
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &mut RgbaImage, flags: OverlayFlags) -> Result<Vec<Detection>> {
        let _span = tracing::debug_span!("yolo_detect").entered();

        let start = Instant::now();
        let tensor = self.preprocess(frame);
        self.times.preprocess = start.elapsed();

        let start = Instant::now();
        let (dims, data) = self.infer(tensor)?;
        self.times.inference = start.elapsed();
        self.network_fps.update(self.times.inference);

        let start = Instant::now();
        let candidates = {
            let _span = tracing::debug_span!("postprocess").entered();
            let (width, height) = frame.dimensions();
            decode_output(
                &dims,
                &data,
                self.config.conf_threshold,
                self.config.input_size,
                (width, height),
            )?
        };
        let detections = non_max_suppression(candidates, self.config.iou_threshold);
        self.times.postprocess = start.elapsed();

        let start = Instant::now();
        overlay::draw_overlay(frame, &detections, flags, &self.labels, self.font.as_ref());
        self.times.overlay = start.elapsed();

        Ok(detections)
    }

    fn class_desc(&self, class_id: u32) -> &str {
        self.labels.describe(class_id)
    }

    fn precision(&self) -> Precision {
        self.precision
    }

    fn network_fps(&self) -> f32 {
        self.network_fps.value()
    }

    fn runtime(&self) -> &str {
        "ONNX Runtime"
    }

    fn log_profiler_times(&self) {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        let t = &self.times;
        tracing::debug!(
            "Detector timing: pre={:.2}ms, network={:.2}ms, post={:.2}ms, overlay={:.2}ms, total={:.2}ms",
            ms(t.preprocess),
            ms(t.inference),
            ms(t.postprocess),
            ms(t.overlay),
            ms(t.preprocess + t.inference + t.postprocess + t.overlay)
        );
    }
}

/// Decode a [1, 4 + classes, proposals] output into frame-space boxes above
/// `threshold`
fn decode_output(
    dims: &[i64],
    data: &[f32],
    threshold: f32,
    input_size: u32,
    (frame_width, frame_height): (u32, u32),
) -> Result<Vec<Detection>> {
    if dims.len() != 3 || dims[1] < 5 {
        bail!("Unexpected detector output shape {:?}", dims);
    }
    let rows = dims[1] as usize;
    let proposals = dims[2] as usize;
    if data.len() < rows * proposals {
        bail!(
            "Detector output holds {} values, shape {:?} needs {}",
            data.len(),
            dims,
            rows * proposals
        );
    }

    let scale_x = frame_width as f32 / input_size as f32;
    let scale_y = frame_height as f32 / input_size as f32;
    let max_x = frame_width as f32;
    let max_y = frame_height as f32;
    let at = |row: usize, i: usize| data[row * proposals + i];

    let mut detections = Vec::new();
    for i in 0..proposals {
        let (class_id, confidence) = (4..rows)
            .map(|row| (row - 4, at(row, i)))
            .fold((0, f32::MIN), |best, cand| if cand.1 > best.1 { cand } else { best });
        if confidence < threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        detections.push(Detection {
            class_id: class_id as u32,
            confidence,
            left: ((cx - w / 2.0) * scale_x).clamp(0.0, max_x),
            top: ((cy - h / 2.0) * scale_y).clamp(0.0, max_y),
            right: ((cx + w / 2.0) * scale_x).clamp(0.0, max_x),
            bottom: ((cy + h / 2.0) * scale_y).clamp(0.0, max_y),
        });
    }
    Ok(detections)
}

/// Greedy per-class NMS, highest confidence first
fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a [1, 4 + classes, n] buffer from (cx, cy, w, h, scores) rows
    fn output(proposals: &[([f32; 4], Vec<f32>)]) -> (Vec<i64>, Vec<f32>) {
        let classes = proposals[0].1.len();
        let rows = 4 + classes;
        let n = proposals.len();
        let mut data = vec![0.0; rows * n];
        for (i, (bbox, scores)) in proposals.iter().enumerate() {
            for (row, v) in bbox.iter().chain(scores.iter()).enumerate() {
                data[row * n + i] = *v;
            }
        }
        (vec![1, rows as i64, n as i64], data)
    }

    #[test]
    fn decodes_and_scales_boxes() {
        let (dims, data) = output(&[
            ([320.0, 320.0, 64.0, 32.0], vec![0.1, 0.9]),
            ([100.0, 100.0, 10.0, 10.0], vec![0.2, 0.3]),
        ]);

        let dets = decode_output(&dims, &data, 0.5, 640, (1280, 640)).unwrap();
        assert_eq!(dets.len(), 1);
        let det = dets[0];
        assert_eq!(det.class_id, 1);
        assert!((det.confidence - 0.9).abs() < 1e-6);
        assert_eq!(det.left, 576.0);
        assert_eq!(det.right, 704.0);
        assert_eq!(det.top, 304.0);
        assert_eq!(det.bottom, 336.0);
    }

    #[test]
    fn clamps_to_frame() {
        let (dims, data) = output(&[([0.0, 0.0, 40.0, 40.0], vec![0.8])]);
        let dets = decode_output(&dims, &data, 0.5, 640, (640, 640)).unwrap();
        assert_eq!(dets[0].left, 0.0);
        assert_eq!(dets[0].top, 0.0);
        assert_eq!(dets[0].right, 20.0);
    }

    #[test]
    fn rejects_bad_shape() {
        assert!(decode_output(&[1, 4, 10], &[0.0; 40], 0.5, 640, (640, 640)).is_err());
        assert!(decode_output(&[1, 6, 10], &[0.0; 10], 0.5, 640, (640, 640)).is_err());
    }

    #[test]
    fn nms_keeps_best_of_overlapping_same_class() {
        let det = |class_id, confidence, left: f32| Detection {
            class_id,
            confidence,
            left,
            top: 0.0,
            right: left + 10.0,
            bottom: 10.0,
        };
        let kept = non_max_suppression(
            vec![det(0, 0.6, 1.0), det(0, 0.9, 0.0), det(1, 0.7, 0.0), det(0, 0.5, 50.0)],
            0.45,
        );
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
        assert_eq!(kept[2].left, 50.0);
    }

    #[test]
    fn rolling_fps_seeds_then_blends() {
        let mut fps = RollingFps::default();
        assert_eq!(fps.value(), 0.0);

        fps.update(Duration::from_millis(50));
        assert!((fps.value() - 20.0).abs() < 1e-3);

        fps.update(Duration::from_millis(100));
        let expected = 20.0 + FPS_SMOOTHING * (10.0 - 20.0);
        assert!((fps.value() - expected).abs() < 1e-3);
    }

    #[test]
    fn rolling_fps_ignores_zero_duration() {
        let mut fps = RollingFps::default();
        fps.update(Duration::from_millis(40));
        fps.update(Duration::ZERO);
        assert!((fps.value() - 25.0).abs() < 1e-3);
    }
}

use std::time::{Duration, Instant};

/// Pipeline stages that get timed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Detect,
    Render,
    Composite,
    Display,
}

/// Cumulative timing and counters for one pipeline run
#[derive(Clone, Debug)]
pub struct PipelineStats {
    started: Instant,
    pub frames: u64,
    pub frames_with_detections: u64,
    pub timeouts: u64,
    pub capture_errors: u64,
    capture: Duration,
    detect: Duration,
    render: Duration,
    composite: Duration,
    display: Duration,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            frames: 0,
            frames_with_detections: 0,
            timeouts: 0,
            capture_errors: 0,
            capture: Duration::ZERO,
            detect: Duration::ZERO,
            render: Duration::ZERO,
            composite: Duration::ZERO,
            display: Duration::ZERO,
        }
    }
}

impl PipelineStats {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let total = match stage {
            Stage::Capture => &mut self.capture,
            Stage::Detect => &mut self.detect,
            Stage::Render => &mut self.render,
            Stage::Composite => &mut self.composite,
            Stage::Display => &mut self.display,
        };
        *total += elapsed;
    }

    /// Mean milliseconds per processed frame spent in `stage`
    pub fn average_ms(&self, stage: Stage) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        let total = match stage {
            Stage::Capture => self.capture,
            Stage::Detect => self.detect,
            Stage::Render => self.render,
            Stage::Composite => self.composite,
            Stage::Display => self.display,
        };
        total.as_secs_f64() * 1000.0 / self.frames as f64
    }

    /// Processed frames per second of wall time since the run started
    pub fn throughput_fps(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        let capture = self.average_ms(Stage::Capture);
        let detect = self.average_ms(Stage::Detect);
        let render = self.average_ms(Stage::Render);
        let composite = self.average_ms(Stage::Composite);
        let display = self.average_ms(Stage::Display);

        tracing::info!(
            "Frame {}: capture={:.1}ms, detect={:.1}ms, render={:.1}ms, composite={:.1}ms, display={:.1}ms, total={:.1}ms, fps={:.1}",
            self.frames,
            capture,
            detect,
            render,
            composite,
            display,
            capture + detect + render + composite + display,
            self.throughput_fps()
        );

        if self.timeouts > 0 || self.capture_errors > 0 {
            tracing::info!(
                "Capture: {} timeouts, {} errors; detections in {}/{} frames",
                self.timeouts,
                self.capture_errors,
                self.frames_with_detections,
                self.frames
            );
        }
    }
}

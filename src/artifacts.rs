use crate::utils::{grid_shape, render_grid};
use log::warn;
use ndarray::{ArrayView1, ArrayView4};
use std::io::Write;
use std::path::PathBuf;

/// Writes the diagnostic side effects of a completion run: visualization
/// grids, per-row optimization logs, and the final stitched image.
///
/// Every write is best effort. A failure is logged and skipped so disk
/// trouble never interrupts the optimization loop. With no output directory
/// configured, every call is a no-op.
pub(crate) struct ArtifactSink {
    root: Option<PathBuf>,
}

impl ArtifactSink {
    pub(crate) fn new(root: Option<PathBuf>) -> Self {
        if let Some(root) = &root {
            for sub in &["hats_imgs", "completed", "logs"] {
                let dir = root.join(sub);
                if let Err(err) = std::fs::create_dir_all(&dir) {
                    warn!("failed to create {}: {}", dir.display(), err);
                }
            }
        }

        Self { root }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.root.is_some()
    }

    /// The input patches of the current tile, before masking
    pub(crate) fn save_before(&self, batch: ArrayView4<'_, f32>, count: usize) {
        self.write_grid("before.png", batch, count);
    }

    /// The input patches with the occluded region blanked out
    pub(crate) fn save_masked(&self, batch: ArrayView4<'_, f32>, count: usize) {
        self.write_grid("masked.png", batch, count);
    }

    /// The masked block-mean patches, upsampled back for inspection
    pub(crate) fn save_lowres(&self, batch: ArrayView4<'_, f32>, count: usize) {
        self.write_grid("lowres.png", batch, count);
    }

    /// Composited output at one reporting interval
    pub(crate) fn save_snapshot(&self, iteration: usize, batch: ArrayView4<'_, f32>, count: usize) {
        self.write_grid(&format!("completed/{:04}.png", iteration), batch, count);
    }

    /// The stitched working images of a finished chunk
    pub(crate) fn save_finale(&self, batch: ArrayView4<'_, f32>, count: usize) {
        self.write_grid("completed/finale.png", batch, count);
    }

    /// Starts a new log section for every real row of the current tile
    pub(crate) fn write_log_headers(&self, count: usize, latent_dim: usize) {
        for row in 0..count {
            let mut line = String::from("iter loss");
            for zi in 0..latent_dim {
                line.push_str(&format!(" z{}", zi));
            }
            line.push('\n');
            self.append_log(row, &line);
        }
    }

    /// One optimization step of one row: iteration, loss, then the latent
    pub(crate) fn log_step(
        &self,
        row: usize,
        iteration: usize,
        loss: f32,
        latent: ArrayView1<'_, f32>,
    ) {
        if !self.enabled() {
            return;
        }

        let mut line = format!("{} {}", iteration, loss);
        for &z in latent.iter() {
            line.push_str(&format!(" {:.18e}", z));
        }
        line.push('\n');
        self.append_log(row, &line);
    }

    fn append_log(&self, row: usize, line: &str) {
        let root = match &self.root {
            Some(root) => root,
            None => return,
        };

        let path = root.join(format!("logs/hats_{:02}.log", row));
        let appended = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(err) = appended {
            warn!("failed to append to {}: {}", path.display(), err);
        }
    }

    fn write_grid(&self, relative: &str, batch: ArrayView4<'_, f32>, count: usize) {
        let root = match &self.root {
            Some(root) => root,
            None => return,
        };

        let (rows, cols) = grid_shape(count);
        let path = root.join(relative);
        if let Err(err) = render_grid(batch, count, rows, cols).save(&path) {
            warn!("failed to write {}: {}", path.display(), err);
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

use tracing::{debug, info, warn};
use voxdraw_grid::{SliceAxis, VoxelGrid};

use crate::bitmap::LabelBitmap;
use crate::bwlabel::{label_components, Components, LabelingOptions};
use crate::error::DrawError;
use crate::flood_fill::{
    click_to_segment_mode, dilate, flood_fill, seed_index, FillOutcome, FloodFillRequest,
};
use crate::grow_cut::{grow_cut, GrowCutOptions, GrowCutReport};
use crate::interpolate::interpolate_slices;
use crate::otsu::{apply_thresholds, find_thresholds};
use crate::pen::{self, Pen};
use crate::progress::{set_progress_context, Operation, ProgressGuard, ProgressSink};
use crate::settings::DrawingSettings;
use crate::shapes;
use crate::undo::UndoLedger;

struct Preview {
    /// Drawing as it was when the preview began.
    base: LabelBitmap,
    scratch: LabelBitmap,
}

/// Editing state for one background volume: the live drawing, its undo
/// history and an optional click-to-segment preview.
///
/// Every fallible operation validates its inputs before touching the drawing,
/// so an `Err` leaves the drawing, preview and history as they were.
pub struct DrawingSession<'g> {
    grid: &'g VoxelGrid,
    settings: DrawingSettings,
    bitmap: Option<LabelBitmap>,
    undo: UndoLedger,
    preview: Option<Preview>,
    progress: Option<ProgressSink>,
}

impl<'g> DrawingSession<'g> {
    pub fn new(grid: &'g VoxelGrid, settings: DrawingSettings) -> Self {
        let mut settings = settings;
        settings.normalize();
        Self {
            grid,
            undo: UndoLedger::new(settings.undo_capacity),
            settings,
            bitmap: None,
            preview: None,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn grid(&self) -> &VoxelGrid {
        self.grid
    }

    pub fn settings(&self) -> &DrawingSettings {
        &self.settings
    }

    /// Replaces the settings. A new undo capacity discards the history and
    /// restarts it from the current drawing.
    pub fn set_settings(&mut self, settings: DrawingSettings) {
        let mut settings = settings;
        settings.normalize();
        if settings.undo_capacity != self.undo.capacity() {
            self.undo = UndoLedger::new(settings.undo_capacity);
            if let Some(bitmap) = self.bitmap.as_ref() {
                self.undo.push(bitmap.as_slice());
            }
        }
        self.settings = settings;
    }

    pub fn is_open(&self) -> bool {
        self.bitmap.is_some()
    }

    pub fn bitmap(&self) -> Option<&LabelBitmap> {
        self.bitmap.as_ref()
    }

    pub fn history(&self) -> &UndoLedger {
        &self.undo
    }

    /// Starts an empty drawing; the blank state becomes the oldest snapshot.
    pub fn open_drawing(&mut self) {
        let bitmap = LabelBitmap::for_grid(self.grid);
        self.undo.clear();
        self.undo.push(bitmap.as_slice());
        self.bitmap = Some(bitmap);
        self.preview = None;
        info!("opened drawing {:?}", self.grid.dims);
    }

    pub fn load_drawing(&mut self, data: Vec<u8>) -> Result<(), DrawError> {
        let bitmap = LabelBitmap::from_vec(self.grid.dims, data)?;
        self.undo.clear();
        self.undo.push(bitmap.as_slice());
        info!("loaded drawing with {} labeled voxels", bitmap.count_nonzero());
        self.bitmap = Some(bitmap);
        self.preview = None;
        Ok(())
    }

    /// Ends the session and returns the final drawing.
    pub fn close_drawing(&mut self) -> Option<LabelBitmap> {
        self.undo.clear();
        self.preview = None;
        self.bitmap.take()
    }

    fn ensure_open(&mut self) {
        if self.bitmap.is_none() {
            self.open_drawing();
        }
    }

    fn require_open(&self) -> Result<&LabelBitmap, DrawError> {
        self.bitmap.as_ref().ok_or(DrawError::NoDrawingOpen)
    }

    fn progress_scope(&self, operation: Operation) -> ProgressGuard {
        debug!("{} started", operation.name());
        set_progress_context(operation, self.progress.clone())
    }

    /// Records the live drawing in the history. `fill` edits honour
    /// `fill_overwrites`: when it is off, labels from the previous snapshot
    /// win over the edit. A preview still open was built on the old drawing,
    /// so it is dropped.
    fn commit(&mut self, fill: bool) -> Result<(), DrawError> {
        let Some(bitmap) = self.bitmap.as_mut() else {
            return Err(DrawError::NoDrawingOpen);
        };
        if self.preview.take().is_some() {
            debug!("edit committed while previewing, preview discarded");
        }
        if fill && !self.settings.fill_overwrites {
            self.undo.push_preserving(bitmap.as_mut_slice())?;
        } else {
            self.undo.push(bitmap.as_slice());
        }
        Ok(())
    }

    fn pen(&self, value: u8, axis: Option<SliceAxis>) -> Pen {
        match axis {
            Some(axis) => Pen::new(value).with_size(self.settings.pen_size, axis),
            None => Pen::new(value),
        }
    }

    pub fn draw_point(
        &mut self,
        point: [i32; 3],
        value: u8,
        axis: Option<SliceAxis>,
    ) -> Result<(), DrawError> {
        self.draw_stroke(&[point], value, axis)
    }

    pub fn draw_line(
        &mut self,
        a: [i32; 3],
        b: [i32; 3],
        value: u8,
        axis: Option<SliceAxis>,
    ) -> Result<(), DrawError> {
        self.draw_stroke(&[a, b], value, axis)
    }

    /// Paints a freehand stroke as one undoable edit. Value 0 erases.
    pub fn draw_stroke(
        &mut self,
        points: &[[i32; 3]],
        value: u8,
        axis: Option<SliceAxis>,
    ) -> Result<(), DrawError> {
        if points.is_empty() {
            return Ok(());
        }
        let pen = self.pen(value, axis);
        self.ensure_open();
        if let Some(bitmap) = self.bitmap.as_mut() {
            pen::draw_stroke(bitmap, points, &pen);
        }
        self.commit(false)
    }

    /// Closes the outline through `points` on one slice and fills it.
    pub fn draw_filled(
        &mut self,
        points: &[[i32; 3]],
        value: u8,
        axis: SliceAxis,
    ) -> Result<bool, DrawError> {
        self.ensure_open();
        let drawn = match self.bitmap.as_mut() {
            Some(bitmap) => pen::fill_polygon(bitmap, points, value, axis),
            None => false,
        };
        if !drawn {
            debug!("filled pen needs at least two points");
            return Ok(false);
        }
        self.commit(value != 0)?;
        Ok(true)
    }

    pub fn draw_rectangle(&mut self, a: [i32; 3], b: [i32; 3], value: u8) -> Result<usize, DrawError> {
        self.ensure_open();
        let written = match self.bitmap.as_mut() {
            Some(bitmap) => shapes::fill_rectangle(bitmap, a, b, value),
            None => 0,
        };
        self.commit(value != 0)?;
        Ok(written)
    }

    pub fn draw_ellipsoid(&mut self, a: [i32; 3], b: [i32; 3], value: u8) -> Result<usize, DrawError> {
        self.ensure_open();
        let written = match self.bitmap.as_mut() {
            Some(bitmap) => shapes::fill_ellipsoid(bitmap, a, b, value),
            None => 0,
        };
        self.commit(value != 0)?;
        Ok(written)
    }

    /// Fill request preconfigured from the session settings. `axis` is the
    /// slice the user clicked in, used when planar fills are enabled.
    pub fn fill_request(&self, seed: [i32; 3], label: u8, axis: Option<SliceAxis>) -> FloodFillRequest {
        FloodFillRequest::new(seed, label)
            .with_connectivity(self.settings.connectivity)
            .with_max_distance(self.settings.max_distance_mm)
            .with_planar(if self.settings.planar_fill { axis } else { None })
    }

    pub fn flood_fill(&mut self, request: &FloodFillRequest) -> Result<FillOutcome, DrawError> {
        let original = self.require_open()?.clone();
        let _progress = self.progress_scope(Operation::FloodFill);
        let start = Instant::now();
        let mut target = original.clone();
        let outcome = flood_fill(
            self.grid,
            original.as_slice(),
            target.as_mut_slice(),
            request,
            false,
        )?;
        if let FillOutcome::Filled(count) = outcome {
            if count > 0 {
                if let Some(bitmap) = self.bitmap.as_mut() {
                    *bitmap = target;
                }
                self.commit(request.label != 0)?;
            }
        }
        info!(
            "flood fill {:?}: {:?} in {:.1}ms",
            request.seed,
            outcome,
            start.elapsed().as_secs_f32() * 1000.0
        );
        Ok(outcome)
    }

    /// Grows the labeled cluster under `seed` by one voxel.
    pub fn dilate(&mut self, seed: [i32; 3]) -> Result<FillOutcome, DrawError> {
        let bitmap = self.require_open()?;
        let (grown, outcome) = dilate(
            bitmap.as_slice(),
            bitmap.dims(),
            seed,
            self.settings.connectivity,
        )?;
        if outcome.filled() > 0 {
            if let Some(bitmap) = self.bitmap.as_mut() {
                bitmap.replace_data(grown)?;
            }
            self.commit(false)?;
        }
        Ok(outcome)
    }

    pub fn grow_cut(&mut self) -> Result<GrowCutReport, DrawError> {
        let options = GrowCutOptions::from(&self.settings.grow_cut);
        self.grow_cut_with(&options)
    }

    /// Segments the volume from the current drawing used as seeds.
    pub fn grow_cut_with(&mut self, options: &GrowCutOptions) -> Result<GrowCutReport, DrawError> {
        let seeds = self.require_open()?;
        if seeds.count_nonzero() == 0 {
            warn!("grow-cut needs at least one labeled seed voxel");
            return Ok(GrowCutReport {
                iterations_run: 0,
                converged: true,
                cancelled: false,
            });
        }
        let _progress = self.progress_scope(Operation::GrowCut);
        let (labels, report) = grow_cut(self.grid, seeds.as_slice(), options)?;
        if let Some(bitmap) = self.bitmap.as_mut() {
            bitmap.replace_data(labels)?;
        }
        self.commit(false)?;
        Ok(report)
    }

    /// Labels still-unlabeled voxels by Otsu class. Returns the raw thresholds.
    pub fn otsu_segment(&mut self) -> Result<Vec<f32>, DrawError> {
        let _progress = self.progress_scope(Operation::Otsu);
        let thresholds = find_thresholds(self.grid, self.settings.otsu_levels);
        if thresholds.is_empty() {
            return Ok(thresholds);
        }
        self.ensure_open();
        let written = match self.bitmap.as_mut() {
            Some(bitmap) => apply_thresholds(self.grid, bitmap.as_mut_slice(), &thresholds),
            None => 0,
        };
        info!("otsu thresholds {:?} labeled {} voxels", thresholds, written);
        self.commit(false)?;
        Ok(thresholds)
    }

    /// Fills the slices between each label's outermost painted slices along the
    /// normal of `axis`, as one undoable edit.
    pub fn interpolate_slices(
        &mut self,
        axis: SliceAxis,
        bounds: Option<(u32, u32)>,
    ) -> Result<usize, DrawError> {
        self.require_open()?;
        let _progress = self.progress_scope(Operation::Interpolation);
        let Some(bitmap) = self.bitmap.as_mut() else {
            return Err(DrawError::NoDrawingOpen);
        };
        let written = interpolate_slices(
            self.grid,
            bitmap.as_mut_slice(),
            axis,
            bounds,
            &self.settings.interpolation,
        )?;
        info!("slice interpolation along {:?} wrote {} voxels", axis, written);
        if written > 0 {
            self.commit(false)?;
        }
        Ok(written)
    }

    /// Connected components of the drawing. The drawing is not modified.
    pub fn label_components(&self, options: LabelingOptions) -> Result<Components, DrawError> {
        let bitmap = self.require_open()?;
        let _progress = self.progress_scope(Operation::Labeling);
        label_components(bitmap.as_slice(), bitmap.dims(), options)
    }

    /// Keeps only the largest component of every label. Returns the number of
    /// voxels cleared.
    pub fn keep_largest_components(&mut self) -> Result<usize, DrawError> {
        let options = LabelingOptions {
            connectivity: self.settings.connectivity,
            binarize: false,
            largest_per_value: true,
        };
        let components = self.label_components(options)?;
        let kept: Vec<u8> = components
            .labels
            .iter()
            .map(|&value| value.min(u8::MAX as u32) as u8)
            .collect();
        let before = self.require_open()?.count_nonzero();
        let removed = before - kept.iter().filter(|&&v| v != 0).count();
        if removed == 0 {
            return Ok(0);
        }
        if let Some(bitmap) = self.bitmap.as_mut() {
            bitmap.replace_data(kept)?;
        }
        self.commit(false)?;
        Ok(removed)
    }

    /// Steps back one snapshot. Any preview in progress is discarded.
    pub fn undo(&mut self) -> Result<(), DrawError> {
        let Some(bitmap) = self.bitmap.as_mut() else {
            return Err(DrawError::NoDrawingOpen);
        };
        let restored = self.undo.undo(bitmap.as_slice())?;
        bitmap.replace_data(restored)?;
        self.preview = None;
        Ok(())
    }

    /// Re-applies an undone edit. Returns `false` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool, DrawError> {
        let Some(bitmap) = self.bitmap.as_mut() else {
            return Err(DrawError::NoDrawingOpen);
        };
        match self.undo.redo(bitmap.as_slice())? {
            Some(restored) => {
                bitmap.replace_data(restored)?;
                self.preview = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshots the drawing as the base for preview fills.
    pub fn begin_preview(&mut self) {
        self.ensure_open();
        if let Some(bitmap) = self.bitmap.as_ref() {
            self.preview = Some(Preview {
                base: bitmap.clone(),
                scratch: bitmap.clone(),
            });
        }
    }

    pub fn preview(&self) -> Option<&LabelBitmap> {
        self.preview.as_ref().map(|preview| &preview.scratch)
    }

    pub fn is_previewing(&self) -> bool {
        self.preview.is_some()
    }

    /// Replaces the preview with the base drawing plus this fill.
    pub fn preview_fill(&mut self, request: &FloodFillRequest) -> Result<FillOutcome, DrawError> {
        let Some(preview) = self.preview.as_mut() else {
            return Err(DrawError::NoPreview);
        };
        let _progress = set_progress_context(Operation::FloodFill, self.progress.clone());
        flood_fill(
            self.grid,
            preview.base.as_slice(),
            preview.scratch.as_mut_slice(),
            request,
            true,
        )
    }

    /// Previews an intensity-driven fill from a clicked voxel, using the
    /// click-to-segment settings. Starts a preview if none is active.
    pub fn click_to_segment(
        &mut self,
        seed: [i32; 3],
        axis: Option<SliceAxis>,
    ) -> Result<FillOutcome, DrawError> {
        let idx = seed_index(self.grid.dims, seed)?;
        let click = &self.settings.click_to_segment;
        let mode = click_to_segment_mode(
            self.grid.calibrated(idx),
            click,
            self.grid.cal_min,
            self.grid.cal_max,
        );
        let request = FloodFillRequest::new(seed, click.label)
            .with_mode(mode)
            .with_connectivity(self.settings.connectivity)
            .with_max_distance(click.max_distance_mm)
            .with_planar(if click.planar { axis } else { None });
        debug!("click to segment at {:?} with {:?}", seed, mode);
        if self.preview.is_none() {
            self.begin_preview();
        }
        self.preview_fill(&request)
    }

    /// Copies the preview into the drawing as one undoable fill.
    pub fn commit_preview(&mut self) -> Result<(), DrawError> {
        let preview = self.preview.take().ok_or(DrawError::NoPreview)?;
        let Some(bitmap) = self.bitmap.as_mut() else {
            return Err(DrawError::NoDrawingOpen);
        };
        bitmap.copy_from(&preview.scratch)?;
        self.commit(true)
    }

    /// Drops the preview. Returns `false` if none was active.
    pub fn cancel_preview(&mut self) -> bool {
        self.preview.take().is_some()
    }

    pub fn label_volume_mm3(&self, label: u8) -> Result<f32, DrawError> {
        let bitmap = self.require_open()?;
        Ok(bitmap.count_label(label) as f32 * self.grid.voxel_volume_mm3())
    }
}

#[cfg(test)]
mod tests;

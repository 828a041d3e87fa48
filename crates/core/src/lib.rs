mod bitmap;
mod bwlabel;
mod connectivity;
mod error;
mod flood_fill;
mod grow_cut;
mod interpolate;
mod otsu;
mod parallel;
mod pen;
mod progress;
mod rle;
mod session;
mod settings;
mod shapes;
mod undo;

pub use bitmap::LabelBitmap;
pub use bwlabel::{bwlabel, label_components, Components, LabelingOptions};
pub use connectivity::Connectivity;
pub use error::DrawError;
pub use flood_fill::{
    click_to_segment_mode, dilate, flood_fill, FillOutcome, FloodFillRequest, GrowMode,
    SkipReason,
};
pub use grow_cut::{grow_cut, GrowCutOptions, GrowCutReport};
pub use interpolate::interpolate_slices;
pub use otsu::{apply_thresholds, find_thresholds, otsu_thresholds};
pub use pen::{bresenham_3d, draw_line, draw_point, draw_stroke, fill_polygon, Pen};
pub use progress::{report_progress, set_progress_context, Operation, ProgressEvent, ProgressGuard, ProgressSink};
pub use rle::{decode_rle, encode_rle, RleError};
pub use session::DrawingSession;
pub use settings::{
    ClickToSegmentSettings, DrawingSettings, GrowCutSettings, InterpolationSettings,
};
pub use shapes::{fill_ellipsoid, fill_rectangle};
pub use undo::UndoLedger;
pub use voxdraw_grid::{GridError, SliceAxis, VoxelGrid};

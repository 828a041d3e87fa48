use std::sync::{Arc, Mutex};

use voxdraw_grid::{SliceAxis, VoxelGrid};

use super::DrawingSession;
use crate::bwlabel::LabelingOptions;
use crate::connectivity::Connectivity;
use crate::error::DrawError;
use crate::flood_fill::{FillOutcome, FloodFillRequest, GrowMode, SkipReason};
use crate::progress::{Operation, ProgressEvent, ProgressSink};
use crate::settings::DrawingSettings;

fn zero_grid(n: u32) -> VoxelGrid {
    VoxelGrid::filled([n, n, n], 0.0).unwrap()
}

/// Dark background with a bright 4x4x4 block starting at (2, 2, 2).
fn block_grid() -> VoxelGrid {
    let dims = [8, 8, 8];
    let mut values = vec![10.0; 512];
    for z in 2..6 {
        for y in 2..6 {
            for x in 2..6 {
                values[x + y * 8 + z * 64] = 200.0;
            }
        }
    }
    VoxelGrid::new(dims, values).unwrap()
}

#[test]
fn cube_fill_then_undo_restores_original_labels() {
    let grid = zero_grid(4);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_rectangle([0, 0, 0], [1, 1, 1], 1).unwrap();

    let request = FloodFillRequest::new([0, 0, 0], 2).with_connectivity(Connectivity::Six);
    let outcome = session.flood_fill(&request).unwrap();
    assert_eq!(outcome, FillOutcome::Filled(8));
    let bitmap = session.bitmap().unwrap();
    assert_eq!(bitmap.count_label(2), 8);
    assert_eq!(bitmap.count_label(0), 56);

    session.undo().unwrap();
    let bitmap = session.bitmap().unwrap();
    assert_eq!(bitmap.count_label(1), 8);
    assert_eq!(bitmap.count_label(2), 0);
    for z in 0..2 {
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(bitmap.get(x, y, z), 1);
            }
        }
    }
}

#[test]
fn undo_walks_back_to_blank_drawing() {
    let grid = zero_grid(4);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_point([1, 1, 1], 3, None).unwrap();
    session.draw_point([2, 2, 2], 3, None).unwrap();
    session.undo().unwrap();
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 1);
    session.undo().unwrap();
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 0);
    session.undo().unwrap();
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 0);

    assert!(session.redo().unwrap());
    assert!(session.redo().unwrap());
    assert!(!session.redo().unwrap());
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 2);
}

#[test]
fn fill_without_overwrite_keeps_existing_labels() {
    let grid = zero_grid(4);
    let settings = DrawingSettings {
        fill_overwrites: false,
        ..Default::default()
    };
    let mut session = DrawingSession::new(&grid, settings);
    session.draw_point([1, 1, 1], 5, None).unwrap();
    session.draw_rectangle([0, 0, 0], [3, 3, 3], 2).unwrap();
    let bitmap = session.bitmap().unwrap();
    assert_eq!(bitmap.get(1, 1, 1), 5);
    assert_eq!(bitmap.count_label(2), 63);
}

#[test]
fn strokes_still_overwrite_when_fills_do_not() {
    let grid = zero_grid(4);
    let settings = DrawingSettings {
        fill_overwrites: false,
        ..Default::default()
    };
    let mut session = DrawingSession::new(&grid, settings);
    session.draw_point([1, 1, 1], 5, None).unwrap();
    session.draw_point([1, 1, 1], 0, None).unwrap();
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 0);
}

#[test]
fn operations_needing_a_drawing_fail_cleanly() {
    let grid = zero_grid(4);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    let request = FloodFillRequest::new([0, 0, 0], 1);
    assert_eq!(session.flood_fill(&request), Err(DrawError::NoDrawingOpen));
    assert_eq!(session.undo(), Err(DrawError::NoDrawingOpen));
    assert!(session.dilate([0, 0, 0]).is_err());
    assert!(session.label_volume_mm3(1).is_err());
    assert!(!session.is_open());
}

#[test]
fn bad_seed_leaves_drawing_and_history_untouched() {
    let grid = zero_grid(4);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_point([0, 0, 0], 1, None).unwrap();
    let before = session.bitmap().unwrap().clone();
    let len_before = session.history().len();
    let err = session
        .flood_fill(&FloodFillRequest::new([0, 9, 0], 2))
        .unwrap_err();
    assert!(matches!(err, DrawError::SeedOutOfBounds { .. }));
    assert_eq!(session.bitmap().unwrap(), &before);
    assert_eq!(session.history().len(), len_before);
}

#[test]
fn skipped_fill_does_not_record_history() {
    let grid = zero_grid(4);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_point([0, 0, 0], 1, None).unwrap();
    let len_before = session.history().len();
    let outcome = session
        .flood_fill(&FloodFillRequest::new([0, 0, 0], 1))
        .unwrap();
    assert_eq!(outcome, FillOutcome::Skipped(SkipReason::AlreadyLabeled));
    assert_eq!(session.history().len(), len_before);
}

#[test]
fn load_rejects_wrong_length() {
    let grid = zero_grid(4);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    let err = session.load_drawing(vec![0; 10]).unwrap_err();
    assert_eq!(
        err,
        DrawError::DimensionMismatch {
            expected: 64,
            actual: 10
        }
    );
    assert!(!session.is_open());
}

#[test]
fn click_to_segment_previews_until_commit() {
    let grid = block_grid();
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.open_drawing();
    let outcome = session.click_to_segment([3, 3, 3], None).unwrap();
    assert_eq!(outcome, FillOutcome::Filled(64));
    assert_eq!(session.preview().unwrap().count_label(1), 64);
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 0);

    session.commit_preview().unwrap();
    assert!(!session.is_previewing());
    assert_eq!(session.bitmap().unwrap().count_label(1), 64);
    session.undo().unwrap();
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 0);
}

#[test]
fn cancelled_preview_leaves_no_residue() {
    let grid = block_grid();
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_point([0, 0, 0], 4, None).unwrap();
    session.click_to_segment([0, 7, 7], None).unwrap();
    assert!(session.cancel_preview());
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 1);
    assert_eq!(session.commit_preview(), Err(DrawError::NoPreview));
}

#[test]
fn repeated_preview_fills_replace_each_other() {
    let grid = block_grid();
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.begin_preview();
    let bright = FloodFillRequest::new([3, 3, 3], 2).with_mode(GrowMode::Brighter);
    session.preview_fill(&bright).unwrap();
    let dark = FloodFillRequest::new([0, 0, 0], 3).with_mode(GrowMode::Darker);
    session.preview_fill(&dark).unwrap();
    let preview = session.preview().unwrap();
    assert_eq!(preview.count_label(2), 0);
    assert_eq!(preview.count_label(3), 512 - 64);
}

#[test]
fn dilate_grows_cluster_by_one_voxel() {
    let grid = zero_grid(5);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_point([2, 2, 2], 1, None).unwrap();
    let outcome = session.dilate([2, 2, 2]).unwrap();
    assert_eq!(outcome, FillOutcome::Filled(6));
    assert_eq!(session.bitmap().unwrap().count_label(1), 7);
}

#[test]
fn grow_cut_separates_block_from_background() {
    let grid = block_grid();
    let mut settings = DrawingSettings::default();
    settings.grow_cut.smooth_final = false;
    let mut session = DrawingSession::new(&grid, settings);
    session.draw_point([0, 0, 0], 1, None).unwrap();
    session.draw_point([3, 3, 3], 2, None).unwrap();
    let report = session.grow_cut().unwrap();
    assert!(report.converged);
    let bitmap = session.bitmap().unwrap();
    assert_eq!(bitmap.count_label(2), 64);
    assert_eq!(bitmap.count_label(1), 512 - 64);
}

#[test]
fn otsu_segment_labels_bright_block() {
    let grid = block_grid();
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    let thresholds = session.otsu_segment().unwrap();
    assert_eq!(thresholds.len(), 1);
    assert!(thresholds[0] > 10.0 && thresholds[0] < 200.0);
    assert_eq!(session.bitmap().unwrap().count_label(1), 64);
}

#[test]
fn keep_largest_components_drops_smaller_islands() {
    let grid = zero_grid(6);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_rectangle([0, 0, 0], [1, 1, 1], 1).unwrap();
    session.draw_point([4, 4, 4], 1, None).unwrap();
    session.draw_point([5, 0, 0], 2, None).unwrap();

    let components = session
        .label_components(LabelingOptions {
            connectivity: Connectivity::Six,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(components.count, 3);

    let removed = session.keep_largest_components().unwrap();
    assert_eq!(removed, 1);
    let bitmap = session.bitmap().unwrap();
    assert_eq!(bitmap.count_label(1), 8);
    assert_eq!(bitmap.count_label(2), 1);
}

#[test]
fn label_volume_uses_voxel_size() {
    let grid = VoxelGrid::filled([4, 4, 4], 0.0)
        .unwrap()
        .with_voxel_size([2.0, 2.0, 0.5]);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_rectangle([0, 0, 0], [1, 1, 0], 1).unwrap();
    let volume = session.label_volume_mm3(1).unwrap();
    assert!((volume - 8.0).abs() < 1.0e-4);
}

#[test]
fn planar_fill_stays_on_clicked_slice() {
    let grid = zero_grid(4);
    let settings = DrawingSettings {
        planar_fill: true,
        ..Default::default()
    };
    let mut session = DrawingSession::new(&grid, settings);
    session.open_drawing();
    let request = session.fill_request([1, 1, 2], 6, Some(SliceAxis::Axial));
    let outcome = session.flood_fill(&request).unwrap();
    assert_eq!(outcome, FillOutcome::Filled(16));
    let bitmap = session.bitmap().unwrap();
    for idx in 0..bitmap.len() {
        if bitmap.as_slice()[idx] == 6 {
            assert_eq!(bitmap.coords(idx)[2], 2);
        }
    }
}

#[test]
fn filled_pen_commits_one_edit() {
    let grid = VoxelGrid::filled([8, 8, 3], 0.0).unwrap();
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    let outline = [[1, 1, 1], [6, 1, 1], [6, 6, 1], [1, 6, 1]];
    assert!(session.draw_filled(&outline, 2, SliceAxis::Axial).unwrap());
    assert_eq!(session.bitmap().unwrap().count_label(2), 36);
    session.undo().unwrap();
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 0);
}

#[test]
fn grow_cut_reports_progress() {
    let grid = block_grid();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let sink: ProgressSink = Arc::new(move |event| {
        sink_events.lock().unwrap().push(event);
    });
    let mut session = DrawingSession::new(&grid, DrawingSettings::default()).with_progress(sink);
    session.draw_point([0, 0, 0], 1, None).unwrap();
    session.grow_cut().unwrap();
    let events = events.lock().unwrap();
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::Start {
            operation: Operation::GrowCut
        })
    );
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Finish {
            operation: Operation::GrowCut
        })
    );
    assert!(events
        .iter()
        .any(|event| matches!(event, ProgressEvent::Advance { .. })));
}

#[test]
fn undo_capacity_change_restarts_history() {
    let grid = zero_grid(4);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.draw_point([0, 0, 0], 1, None).unwrap();
    session.draw_point([1, 0, 0], 1, None).unwrap();
    session.set_settings(DrawingSettings {
        undo_capacity: 3,
        ..Default::default()
    });
    assert_eq!(session.history().capacity(), 3);
    session.undo().unwrap();
    assert_eq!(session.bitmap().unwrap().count_nonzero(), 2);
}

#[test]
fn edits_during_preview_survive_and_drop_the_preview() {
    let grid = block_grid();
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    session.open_drawing();
    session.click_to_segment([3, 3, 3], None).unwrap();
    session.draw_point([0, 0, 0], 7, None).unwrap();
    assert_eq!(session.bitmap().unwrap().get(0, 0, 0), 7);
    assert!(!session.is_previewing());
    assert_eq!(session.commit_preview(), Err(DrawError::NoPreview));
    let bitmap = session.bitmap().unwrap();
    assert_eq!(bitmap.get(0, 0, 0), 7);
    assert_eq!(bitmap.count_label(1), 0);
}

#[test]
fn interpolate_slices_commits_one_undoable_edit() {
    let grid = zero_grid(6);
    let mut session = DrawingSession::new(&grid, DrawingSettings::default());
    assert_eq!(
        session.interpolate_slices(SliceAxis::Axial, None),
        Err(DrawError::NoDrawingOpen)
    );
    session.draw_rectangle([1, 1, 0], [4, 4, 0], 2).unwrap();
    session.draw_rectangle([1, 1, 4], [4, 4, 4], 2).unwrap();

    assert!(session
        .interpolate_slices(SliceAxis::Axial, Some((4, 2)))
        .is_err());
    assert_eq!(session.bitmap().unwrap().count_label(2), 32);

    let written = session.interpolate_slices(SliceAxis::Axial, None).unwrap();
    assert_eq!(written, 48);
    let bitmap = session.bitmap().unwrap();
    assert_eq!(bitmap.get(2, 3, 2), 2);
    assert_eq!(bitmap.get(0, 0, 2), 0);

    session.undo().unwrap();
    assert_eq!(session.bitmap().unwrap().count_label(2), 32);
    assert_eq!(session.interpolate_slices(SliceAxis::Coronal, None).unwrap(), 0);
}

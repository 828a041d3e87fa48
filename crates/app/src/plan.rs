use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use voxdraw_core::{
    DrawError, DrawingSession, DrawingSettings, FloodFillRequest, GrowMode, LabelingOptions,
    SliceAxis, VoxelGrid,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct DrawPlan {
    pub settings: DrawingSettings,
    pub volume: PhantomSpec,
    pub steps: Vec<PlanStep>,
}

impl Default for DrawPlan {
    fn default() -> Self {
        Self {
            settings: DrawingSettings::default(),
            volume: PhantomSpec::default(),
            steps: Vec::new(),
        }
    }
}

/// Synthetic background: a flat intensity with bright or dark spheres.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct PhantomSpec {
    pub dims: [u32; 3],
    pub voxel_size: [f32; 3],
    pub background: f32,
    pub spheres: Vec<SphereSpec>,
}

impl Default for PhantomSpec {
    fn default() -> Self {
        Self {
            dims: [48, 48, 32],
            voxel_size: [1.0, 1.0, 1.5],
            background: 20.0,
            spheres: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SphereSpec {
    pub center: [f32; 3],
    pub radius: f32,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PlanAxis {
    Axial,
    Coronal,
    Sagittal,
}

impl From<PlanAxis> for SliceAxis {
    fn from(value: PlanAxis) -> Self {
        match value {
            PlanAxis::Axial => SliceAxis::Axial,
            PlanAxis::Coronal => SliceAxis::Coronal,
            PlanAxis::Sagittal => SliceAxis::Sagittal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PlanGrowMode {
    #[default]
    Uniform,
    Brighter,
    Darker,
    Range {
        min: f32,
        max: f32,
    },
}

impl From<PlanGrowMode> for GrowMode {
    fn from(value: PlanGrowMode) -> Self {
        match value {
            PlanGrowMode::Uniform => GrowMode::Uniform,
            PlanGrowMode::Brighter => GrowMode::Brighter,
            PlanGrowMode::Darker => GrowMode::Darker,
            PlanGrowMode::Range { min, max } => GrowMode::Range { min, max },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum PlanStep {
    Open,
    Close,
    Point {
        at: [i32; 3],
        value: u8,
        #[serde(default)]
        axis: Option<PlanAxis>,
    },
    Line {
        from: [i32; 3],
        to: [i32; 3],
        value: u8,
        #[serde(default)]
        axis: Option<PlanAxis>,
    },
    Stroke {
        points: Vec<[i32; 3]>,
        value: u8,
        #[serde(default)]
        axis: Option<PlanAxis>,
    },
    Filled {
        points: Vec<[i32; 3]>,
        value: u8,
        axis: PlanAxis,
    },
    Rectangle {
        from: [i32; 3],
        to: [i32; 3],
        value: u8,
    },
    Ellipsoid {
        from: [i32; 3],
        to: [i32; 3],
        value: u8,
    },
    Fill {
        seed: [i32; 3],
        value: u8,
        #[serde(default)]
        mode: PlanGrowMode,
        #[serde(default)]
        cluster: bool,
        #[serde(default)]
        axis: Option<PlanAxis>,
    },
    Dilate {
        seed: [i32; 3],
    },
    ClickToSegment {
        seed: [i32; 3],
        #[serde(default)]
        axis: Option<PlanAxis>,
    },
    CommitPreview,
    CancelPreview,
    Interpolate {
        axis: PlanAxis,
        #[serde(default)]
        slices: Option<(u32, u32)>,
    },
    GrowCut,
    Otsu,
    KeepLargest,
    Undo,
    Redo,
}

impl PlanStep {
    fn name(&self) -> &'static str {
        match self {
            PlanStep::Open => "open",
            PlanStep::Close => "close",
            PlanStep::Point { .. } => "point",
            PlanStep::Line { .. } => "line",
            PlanStep::Stroke { .. } => "stroke",
            PlanStep::Filled { .. } => "filled",
            PlanStep::Rectangle { .. } => "rectangle",
            PlanStep::Ellipsoid { .. } => "ellipsoid",
            PlanStep::Fill { .. } => "fill",
            PlanStep::Dilate { .. } => "dilate",
            PlanStep::ClickToSegment { .. } => "click_to_segment",
            PlanStep::CommitPreview => "commit_preview",
            PlanStep::CancelPreview => "cancel_preview",
            PlanStep::Interpolate { .. } => "interpolate",
            PlanStep::GrowCut => "grow_cut",
            PlanStep::Otsu => "otsu",
            PlanStep::KeepLargest => "keep_largest",
            PlanStep::Undo => "undo",
            PlanStep::Redo => "redo",
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StepSummary {
    pub op: &'static str,
    pub result: String,
    pub duration_ms: f32,
}

#[derive(Debug, Serialize)]
pub(crate) struct LabelSummary {
    pub voxels: usize,
    pub volume_mm3: f32,
}

#[derive(Debug, Serialize)]
pub(crate) struct RunSummary {
    pub dims: [u32; 3],
    pub steps: Vec<StepSummary>,
    pub labels: BTreeMap<u8, LabelSummary>,
    pub components: u32,
    pub undo_depth: usize,
}

pub(crate) fn build_phantom(phantom: &PhantomSpec) -> Result<VoxelGrid, String> {
    let [nx, ny, nz] = phantom.dims;
    let mut values = Vec::with_capacity(nx as usize * ny as usize * nz as usize);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let p = [x as f32, y as f32, z as f32];
                let value = phantom
                    .spheres
                    .iter()
                    .rev()
                    .find(|sphere| {
                        let d2: f32 = (0..3).map(|i| (p[i] - sphere.center[i]).powi(2)).sum();
                        d2 <= sphere.radius * sphere.radius
                    })
                    .map(|sphere| sphere.intensity)
                    .unwrap_or(phantom.background);
                values.push(value);
            }
        }
    }
    let grid = VoxelGrid::new(phantom.dims, values).map_err(|err| err.to_string())?;
    Ok(grid.with_voxel_size(phantom.voxel_size))
}

fn apply_step(session: &mut DrawingSession<'_>, step: &PlanStep) -> Result<String, DrawError> {
    let axis = |axis: &Option<PlanAxis>| axis.map(SliceAxis::from);
    let result = match step {
        PlanStep::Open => {
            session.open_drawing();
            "opened".to_string()
        }
        PlanStep::Close => match session.close_drawing() {
            Some(bitmap) => format!("closed with {} labeled voxels", bitmap.count_nonzero()),
            None => "nothing open".to_string(),
        },
        PlanStep::Point {
            at,
            value,
            axis: plane,
        } => {
            session.draw_point(*at, *value, axis(plane))?;
            "drawn".to_string()
        }
        PlanStep::Line {
            from,
            to,
            value,
            axis: plane,
        } => {
            session.draw_line(*from, *to, *value, axis(plane))?;
            "drawn".to_string()
        }
        PlanStep::Stroke {
            points,
            value,
            axis: plane,
        } => {
            session.draw_stroke(points, *value, axis(plane))?;
            "drawn".to_string()
        }
        PlanStep::Filled {
            points,
            value,
            axis: plane,
        } => {
            let drawn = session.draw_filled(points, *value, SliceAxis::from(*plane))?;
            let result = if drawn { "filled" } else { "skipped" };
            result.to_string()
        }
        PlanStep::Rectangle { from, to, value } => {
            format!("{} voxels", session.draw_rectangle(*from, *to, *value)?)
        }
        PlanStep::Ellipsoid { from, to, value } => {
            format!("{} voxels", session.draw_ellipsoid(*from, *to, *value)?)
        }
        PlanStep::Fill {
            seed,
            value,
            mode,
            cluster,
            axis: plane,
        } => {
            let mut request: FloodFillRequest = session
                .fill_request(*seed, *value, axis(plane))
                .with_mode(GrowMode::from(*mode));
            if *cluster {
                request = request.as_cluster_tool();
            }
            format!("{:?}", session.flood_fill(&request)?)
        }
        PlanStep::Dilate { seed } => format!("{:?}", session.dilate(*seed)?),
        PlanStep::ClickToSegment { seed, axis: plane } => {
            format!("{:?}", session.click_to_segment(*seed, axis(plane))?)
        }
        PlanStep::CommitPreview => {
            session.commit_preview()?;
            "committed".to_string()
        }
        PlanStep::CancelPreview => {
            let result = if session.cancel_preview() {
                "cancelled"
            } else {
                "no preview"
            };
            result.to_string()
        }
        PlanStep::Interpolate { axis: plane, slices } => {
            let written = session.interpolate_slices(SliceAxis::from(*plane), *slices)?;
            format!("{written} voxels interpolated")
        }
        PlanStep::GrowCut => format!("{:?}", session.grow_cut()?),
        PlanStep::Otsu => format!("thresholds {:?}", session.otsu_segment()?),
        PlanStep::KeepLargest => {
            format!("{} voxels removed", session.keep_largest_components()?)
        }
        PlanStep::Undo => {
            session.undo()?;
            "undone".to_string()
        }
        PlanStep::Redo => {
            let result = if session.redo()? {
                "redone"
            } else {
                "nothing to redo"
            };
            result.to_string()
        }
    };
    Ok(result)
}

/// Replays every step of `plan` and summarizes the final drawing.
pub(crate) fn run_plan(plan: &DrawPlan) -> Result<RunSummary, String> {
    let grid = build_phantom(&plan.volume)?;
    let mut session = DrawingSession::new(&grid, plan.settings.clone());
    let mut steps = Vec::with_capacity(plan.steps.len());

    for (index, step) in plan.steps.iter().enumerate() {
        let start = Instant::now();
        let result = apply_step(&mut session, step)
            .map_err(|err| format!("step {} ({}): {err}", index + 1, step.name()))?;
        let duration_ms = start.elapsed().as_secs_f32() * 1000.0;
        tracing::info!("step {} {}: {}", index + 1, step.name(), result);
        steps.push(StepSummary {
            op: step.name(),
            result,
            duration_ms,
        });
    }

    let mut labels = BTreeMap::new();
    let mut components = 0;
    if let Some(bitmap) = session.bitmap() {
        let histogram = bitmap.histogram();
        for (label, &voxels) in histogram.iter().enumerate().skip(1) {
            if voxels == 0 {
                continue;
            }
            labels.insert(
                label as u8,
                LabelSummary {
                    voxels,
                    volume_mm3: voxels as f32 * grid.voxel_volume_mm3(),
                },
            );
        }
        let options = LabelingOptions {
            connectivity: session.settings().connectivity,
            ..Default::default()
        };
        components = session
            .label_components(options)
            .map_err(|err| err.to_string())?
            .count;
    }

    Ok(RunSummary {
        dims: grid.dims,
        steps,
        labels,
        components,
        undo_depth: session.history().len(),
    })
}

pub(crate) fn default_plan() -> DrawPlan {
    DrawPlan {
        settings: DrawingSettings::default(),
        volume: PhantomSpec {
            spheres: vec![
                SphereSpec {
                    center: [16.0, 16.0, 16.0],
                    radius: 8.0,
                    intensity: 180.0,
                },
                SphereSpec {
                    center: [34.0, 30.0, 14.0],
                    radius: 6.0,
                    intensity: 120.0,
                },
            ],
            ..Default::default()
        },
        steps: vec![
            PlanStep::Open,
            PlanStep::ClickToSegment {
                seed: [16, 16, 16],
                axis: None,
            },
            PlanStep::CommitPreview,
            PlanStep::Fill {
                seed: [34, 30, 14],
                value: 2,
                mode: PlanGrowMode::Range {
                    min: 100.0,
                    max: 140.0,
                },
                cluster: false,
                axis: None,
            },
            PlanStep::Dilate { seed: [34, 30, 14] },
            PlanStep::Undo,
            PlanStep::Redo,
            PlanStep::Rectangle {
                from: [0, 0, 0],
                to: [3, 3, 3],
                value: 3,
            },
            PlanStep::Point {
                at: [44, 44, 30],
                value: 3,
                axis: None,
            },
            PlanStep::KeepLargest,
        ],
    }
}

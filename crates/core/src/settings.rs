use serde::{Deserialize, Serialize};

use crate::connectivity::Connectivity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingSettings {
    pub undo_capacity: usize,
    /// When false, fills keep labels that were already painted.
    pub fill_overwrites: bool,
    pub connectivity: Connectivity,
    pub pen_size: u32,
    pub max_distance_mm: Option<f32>,
    pub planar_fill: bool,
    pub otsu_levels: u32,
    pub grow_cut: GrowCutSettings,
    pub click_to_segment: ClickToSegmentSettings,
    pub interpolation: InterpolationSettings,
}

impl Default for DrawingSettings {
    fn default() -> Self {
        Self {
            undo_capacity: 8,
            fill_overwrites: true,
            connectivity: Connectivity::Six,
            pen_size: 1,
            max_distance_mm: None,
            planar_fill: false,
            otsu_levels: 2,
            grow_cut: GrowCutSettings::default(),
            click_to_segment: ClickToSegmentSettings::default(),
            interpolation: InterpolationSettings::default(),
        }
    }
}

impl DrawingSettings {
    pub fn from_json(text: &str) -> Result<Self, String> {
        let mut settings: DrawingSettings =
            serde_json::from_str(text).map_err(|err| format!("invalid drawing settings: {err}"))?;
        settings.normalize();
        Ok(settings)
    }

    pub fn to_json_pretty(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|err| err.to_string())
    }

    /// Pulls out-of-range values back to the nearest usable setting.
    pub fn normalize(&mut self) {
        self.undo_capacity = self.undo_capacity.max(1);
        self.pen_size = self.pen_size.max(1);
        self.otsu_levels = self.otsu_levels.clamp(2, 4);
        self.grow_cut.iterations = self.grow_cut.iterations.max(1);
        if let Some(distance) = self.max_distance_mm {
            if !distance.is_finite() || distance <= 0.0 {
                self.max_distance_mm = None;
            }
        }
        if let Some(distance) = self.click_to_segment.max_distance_mm {
            if !distance.is_finite() || distance <= 0.0 {
                self.click_to_segment.max_distance_mm = None;
            }
        }
        let interpolation = &mut self.interpolation;
        interpolation.intensity_weight = interpolation.intensity_weight.clamp(0.0, 1.0);
        interpolation.binary_threshold = interpolation.binary_threshold.clamp(0.0, 1.0);
        if !interpolation.intensity_sigma.is_finite() || interpolation.intensity_sigma <= 0.0 {
            interpolation.intensity_sigma = InterpolationSettings::default().intensity_sigma;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowCutSettings {
    pub iterations: u32,
    pub connectivity: Connectivity,
    /// Majority-vote the final labels over each 3x3x3 neighborhood.
    pub smooth_final: bool,
}

impl Default for GrowCutSettings {
    fn default() -> Self {
        Self {
            iterations: 256,
            connectivity: Connectivity::TwentySix,
            smooth_final: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickToSegmentSettings {
    pub label: u8,
    /// Derive the intensity window from the clicked voxel.
    pub auto_intensity: bool,
    pub bright: bool,
    pub intensity_min: f32,
    pub intensity_max: f32,
    /// Fractional window around the seed intensity; 0 grows brighter/darker instead.
    pub percent: f32,
    pub max_distance_mm: Option<f32>,
    pub planar: bool,
}

impl Default for ClickToSegmentSettings {
    fn default() -> Self {
        Self {
            label: 1,
            auto_intensity: true,
            bright: true,
            intensity_min: 0.0,
            intensity_max: 0.0,
            percent: 0.0,
            max_distance_mm: None,
            planar: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationSettings {
    /// How much intensity similarity overrides slice distance (0..1).
    pub intensity_weight: f32,
    /// Blended mask value at which a voxel takes the label.
    pub binary_threshold: f32,
    /// Width of the intensity match, in units of the global range.
    pub intensity_sigma: f32,
    pub smooth_slices: bool,
    pub intensity_guided: bool,
}

impl Default for InterpolationSettings {
    fn default() -> Self {
        Self {
            intensity_weight: 0.7,
            binary_threshold: 0.375,
            intensity_sigma: 0.1,
            smooth_slices: true,
            intensity_guided: true,
        }
    }
}

//! Photomultiplier camera layout and tube lookup.
//!
//! The camera holds 256 hexagonal tubes in 16 columns of 16 rows. Tube `i`
//! sits in column `i / 16`, row `i % 16`; odd rows are shifted half a pitch.
//! Tubes are pointy-top hexagons with vertical flat sides, separated by a
//! small gap.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use crate::propagation::in_hexagon;
use once_cell::sync::Lazy;

/// Number of tubes in one camera.
pub const TUBE_COUNT: usize = 256;

/// Tube columns (and rows).
pub const TUBE_COLUMNS: usize = 16;

/// Tube flat-to-flat size (meters).
pub const PMT_FTF: f64 = 0.060;

/// Tube point-to-point size (meters).
pub const PMT_PTP: f64 = 0.0693;

/// Gap between neighbouring tubes (meters).
pub const PMT_GAP: f64 = 0.002;

/// Half width of the camera window (meters).
pub const CAMERA_HALF_WIDTH: f64 = 0.580;

/// Half height of the camera window (meters).
pub const CAMERA_HALF_HEIGHT: f64 = 0.505;

const COS30: f64 = 0.866_025_403_784_438_7;
const COLUMN_PITCH: f64 = PMT_FTF + PMT_GAP;
const ROW_PITCH: f64 = 0.75 * (PMT_PTP + PMT_GAP / COS30);

/// Where a point on the camera face lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TubeHit {
    /// Inside the active area of a tube.
    Tube(u8),
    /// Between tubes, or outside the tube array.
    Gap,
}

/// Fixed tube positions of the standard camera.
#[derive(Debug, Clone)]
pub struct CameraLayout {
    centers: [(f64, f64); TUBE_COUNT],
}

static STANDARD_LAYOUT: Lazy<CameraLayout> = Lazy::new(CameraLayout::build);

impl CameraLayout {
    /// The standard 256-tube layout, built once per process.
    pub fn standard() -> &'static CameraLayout {
        &STANDARD_LAYOUT
    }

    fn build() -> Self {
        let mut centers = [(0.0, 0.0); TUBE_COUNT];
        for (i, center) in centers.iter_mut().enumerate() {
            let col = (i / TUBE_COLUMNS) as f64;
            let row = i % TUBE_COLUMNS;
            let shift = 0.5 * (row % 2) as f64;
            *center = (
                -COLUMN_PITCH * (col - 7.75 + shift),
                ROW_PITCH * (7.5 - row as f64),
            );
        }
        Self { centers }
    }

    /// Centre of `tube` on the camera face (meters).
    #[inline]
    pub fn tube_center(&self, tube: u8) -> (f64, f64) {
        self.centers[usize::from(tube)]
    }

    /// True when `(x, y)` lies within the camera window.
    #[inline]
    pub fn contains(x: f64, y: f64) -> bool {
        x.abs() <= CAMERA_HALF_WIDTH && y.abs() <= CAMERA_HALF_HEIGHT
    }

    /// Tube whose centre is closest to `(x, y)`.
    pub fn nearest_tube(&self, x: f64, y: f64) -> u8 {
        let last = (TUBE_COLUMNS - 1) as f64;
        let row_guess = (7.5 - y / ROW_PITCH).round().clamp(0.0, last) as usize;

        let mut best = (f64::INFINITY, 0usize);
        for row in row_guess.saturating_sub(1)..=(row_guess + 1).min(TUBE_COLUMNS - 1) {
            let shift = 0.5 * (row % 2) as f64;
            let col_guess = (-x / COLUMN_PITCH + 7.75 - shift).round().clamp(0.0, last) as usize;
            for col in col_guess.saturating_sub(1)..=(col_guess + 1).min(TUBE_COLUMNS - 1) {
                let index = col * TUBE_COLUMNS + row;
                let (cx, cy) = self.centers[index];
                let d2 = (x - cx).powi(2) + (y - cy).powi(2);
                if d2 < best.0 {
                    best = (d2, index);
                }
            }
        }
        best.1 as u8
    }

    /// Tube containing `(x, y)`, or [`TubeHit::Gap`].
    pub fn lookup(&self, x: f64, y: f64) -> TubeHit {
        if !(x.is_finite() && y.is_finite()) {
            return TubeHit::Gap;
        }
        let tube = self.nearest_tube(x, y);
        let (cx, cy) = self.tube_center(tube);
        if in_hexagon(x - cx, y - cy, PMT_FTF) {
            TubeHit::Tube(tube)
        } else {
            TubeHit::Gap
        }
    }
}

/// Tube containing camera-face point `(x, y)` in the standard layout.
#[inline]
pub fn tube_at(x: f64, y: f64) -> TubeHit {
    CameraLayout::standard().lookup(x, y)
}

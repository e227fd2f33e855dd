//! Rays, trace outcomes and output records.

use nalgebra::Vector3;
use std::fmt;

/// Output code for a ray that reached the camera face between tubes.
pub const MISSED_TUBE: i32 = -2;

/// A ray in the mirror frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Current point on the ray (meters).
    pub origin: Vector3<f64>,
    /// Unit propagation direction.
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Creates a ray, normalizing `direction`.
    #[inline]
    pub fn new(origin: Vector3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point at distance `t` along the ray.
    #[inline]
    pub fn at(&self, t: f64) -> Vector3<f64> {
        self.origin + self.direction * t
    }

    /// Moves the origin a distance `t` along the ray.
    #[inline]
    pub fn advance(&mut self, t: f64) {
        self.origin += self.direction * t;
    }
}

/// Why a ray never reached the camera face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossReason {
    /// Arrived outside the camera window.
    MissedCamera,
    /// Shadowed by the camera box on its way to the mirror.
    HitCameraBox,
    /// Passed between or around all mirror facets.
    MissedMirror,
    /// Absorbed at the mirror surface.
    MirrorAbsorbed,
    /// Absorbed in the camera cover.
    CoverAbsorbed,
    /// Absorbed in the filter.
    FilterAbsorbed,
}

impl LossReason {
    /// All loss reasons, in code order.
    pub const ALL: [LossReason; 6] = [
        LossReason::MissedCamera,
        LossReason::HitCameraBox,
        LossReason::MissedMirror,
        LossReason::MirrorAbsorbed,
        LossReason::CoverAbsorbed,
        LossReason::FilterAbsorbed,
    ];

    /// Numeric code, always below [`MISSED_TUBE`].
    #[inline]
    pub fn code(self) -> i32 {
        match self {
            LossReason::MissedCamera => -3,
            LossReason::HitCameraBox => -4,
            LossReason::MissedMirror => -5,
            LossReason::MirrorAbsorbed => -6,
            LossReason::CoverAbsorbed => -7,
            LossReason::FilterAbsorbed => -8,
        }
    }

    /// Short label for summaries.
    pub fn label(self) -> &'static str {
        match self {
            LossReason::MissedCamera => "missed camera",
            LossReason::HitCameraBox => "hit camera box",
            LossReason::MissedMirror => "missed mirror",
            LossReason::MirrorAbsorbed => "absorbed at mirror",
            LossReason::CoverAbsorbed => "absorbed in cover",
            LossReason::FilterAbsorbed => "absorbed in filter",
        }
    }
}

/// Classification of one traced ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceOutcome {
    /// Landed inside tube `0..=255`.
    Tube(u8),
    /// Landed on the camera face between tubes.
    Gap,
    /// Never reached the camera face.
    Lost(LossReason),
}

impl TraceOutcome {
    /// Numeric code: tube index, [`MISSED_TUBE`], or a loss code below it.
    #[inline]
    pub fn code(self) -> i32 {
        match self {
            TraceOutcome::Tube(tube) => i32::from(tube),
            TraceOutcome::Gap => MISSED_TUBE,
            TraceOutcome::Lost(reason) => reason.code(),
        }
    }

    /// Whether the ray reached the camera face and is written out.
    #[inline]
    pub fn is_recorded(self) -> bool {
        self.code() >= MISSED_TUBE
    }
}

/// Result of tracing one ray: its outcome and, when it reached the camera
/// face, where it crossed it (meters, camera frame).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceResult {
    pub outcome: TraceOutcome,
    pub x: f64,
    pub y: f64,
}

impl TraceResult {
    /// A ray lost before the camera face.
    #[inline]
    pub fn lost(reason: LossReason) -> Self {
        Self {
            outcome: TraceOutcome::Lost(reason),
            x: f64::NAN,
            y: f64::NAN,
        }
    }

    /// A ray that reached the face at `(x, y)`.
    #[inline]
    pub fn landed(outcome: TraceOutcome, x: f64, y: f64) -> Self {
        Self { outcome, x, y }
    }
}

/// One output line: `<camera> <tube|-2> <x> <y>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayRecord {
    /// Camera (mirror) index.
    pub camera: usize,
    /// Tube index, or [`MISSED_TUBE`].
    pub tube: i32,
    /// Camera-plane x (meters).
    pub x: f64,
    /// Camera-plane y (meters), after any legacy axis flip.
    pub y: f64,
}

impl RayRecord {
    /// Builds the output record for `result`, or `None` for lost rays.
    ///
    /// `flip_y` applies the legacy geometry-vintage axis convention.
    pub fn from_trace(camera: usize, result: &TraceResult, flip_y: bool) -> Option<Self> {
        if !result.outcome.is_recorded() {
            return None;
        }
        Some(Self {
            camera,
            tube: result.outcome.code(),
            x: result.x,
            y: if flip_y { -result.y } else { result.y },
        })
    }
}

impl fmt::Display for RayRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:.6} {:.6}", self.camera, self.tube, self.x, self.y)
    }
}

//! fdtrace-optics: point-source ray tracing through a segmented FD mirror.
//!
//! This crate provides:
//! - **Segment modifier** - facet deflections, spot-size overrides, refocusing
//! - **Propagation** - sphere/plane intersection, reflection, refraction, blur
//! - **Camera** - the 256-tube hexagonal photomultiplier layout
//! - **Ray trace engine** - serial and rayon-parallel trial loops
//!
#![warn(missing_docs)]

pub mod camera;
mod engine;
mod modifier;
pub mod propagation;
mod trace;

pub use camera::{tube_at, CameraLayout, TubeHit};
pub use engine::{resolve_thread_count, split_trials, RayTraceEngine, RecordSink, TraceStatistics};
pub use modifier::{
    apply_segment_overrides, default_banana_error, deflect_segment, deflection_rotation,
    refocus_segments, restore_segment, UPPER_RING_BANANA_ERROR,
};
pub use trace::RayTracer;

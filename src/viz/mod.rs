//! Live waveform visualization engine
//!
//! The continuously running core of the application:
//!
//! ```text
//! AudioSampler ──▶ AmplitudeHistory ──▶ RenderLoop ──▶ Surface (RGBA)
//!                  (targets/displayed)    (per frame)
//! ```
//!
//! `RenderLoop` owns the sampler and every amplitude buffer; all of them are
//! mutated only from its `frame()` tick. `FrameScheduler` owns the single
//! recurring task that drives frames and nothing else.

mod history;
mod render_loop;
mod scheduler;
mod surface;

pub use history::{
    mirrored_targets, reduce_to_scalar, ScrollingHistory, StaticBars, AMPLITUDE_FLOOR,
};
pub use render_loop::{RenderLoop, RenderPhase};
pub use scheduler::FrameScheduler;
pub use surface::Surface;

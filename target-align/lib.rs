//! Locate a printed target in a photo and rectify it.
//!
//! The scene's brightness is first matched to the reference, features are
//! extracted and matched, margin-zone and outlier correspondences are dropped,
//! and two RANSAC homographies give the target's corners in the scene and the
//! scene resampled into the reference frame. A structural similarity score
//! tells how well the result lines up with the reference.
//!
//! ```no_run
//! use target_align::{TargetFinder, TargetFinderStrategy};
//! use target_core::AlignConfig;
//!
//! let object = image::open("reference.png")?.to_rgb8();
//! let scene = image::open("photo.jpg")?.to_rgb8();
//! let finder = TargetFinder::new(TargetFinderStrategy::FeatureMatch(AlignConfig::orb_hamming_preset()));
//! let result = finder.process(&object, &scene)?;
//! println!("corners {:?}, similarity {:.1}", result.corners, result.similarity);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod brightness;
pub mod cli;
pub mod color;
pub mod pipeline;
pub mod similarity;
pub mod strategy;
pub mod visualize;

pub use brightness::adjust_brightness;
pub use cli::{CliArgs, CliError, Preset};
pub use color::{ChannelStats, ColorStats, HsvImage};
pub use pipeline::{rescale_scene, AlignmentPipeline, NoopObserver, PipelineObserver, PipelineStage};
pub use similarity::similarity_score;
pub use strategy::{TargetFinder, TargetFinderStrategy};
pub use visualize::{blend_overlay, draw_matches, MatchesWriter, ObserverSet, OverlayWriter};

pub use target_core::{self, AlignConfig, AlignError, AlignResult, CornerPoint, TargetObjectImage};

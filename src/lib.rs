//! Single-image haze removal with an edge-adaptive dark channel prior.
//!
//! The pipeline runs once per image, in order:
//!
//! 1. [`DarkChannel`] of the input.
//! 2. [`AtmosphericLight`] from the brightest dark channel pixels.
//! 3. [`EdgeMap`] of flat, orthogonal and diagonal neighborhoods.
//! 4. Raw [`TransmissionMap`] from edge-adaptive smoothing.
//! 5. Guided filter refinement and the transmission floor.
//! 6. Scene recovery and saturation correction.
//!
//! Images are RGB with samples normalized to [0, 1]. Conversion from and to
//! 8-bit codes happens in [`RgbImage::from_rgb8`] and [`RgbImage::to_rgb8`].
//! Every neighborhood operation mirrors coordinates at the image border
//! without repeating the edge sample.

pub mod atmosphere;
pub mod config;
pub mod dark_channel;
pub mod edge;
pub mod error;
pub mod grid;
pub mod image;
pub mod kernel;
pub mod pipeline;
pub mod quantize;
pub mod recovery;
pub mod saturation;
pub mod transmission;

pub use atmosphere::{AtmosphericLight, AtmosphericLightPolicy};
pub use config::DehazeConfig;
pub use dark_channel::DarkChannel;
pub use edge::{EdgeClass, EdgeMap};
pub use error::DehazeError;
pub use grid::Grid;
pub use image::RgbImage;
pub use pipeline::{Diagnostics, StageTimings, dehaze, dehaze_image};
pub use transmission::{Raw, Refined, TransmissionMap};

pub mod prelude {
    pub use crate::{
        atmosphere::{AtmosphericLight, AtmosphericLightPolicy},
        config::DehazeConfig,
        dark_channel::DarkChannel,
        edge::{EdgeClass, EdgeMap},
        error::DehazeError,
        grid::Grid,
        image::RgbImage,
        kernel::Kernel3,
        pipeline::{Diagnostics, dehaze, dehaze_image},
        recovery::recover_scene,
        saturation::SaturationMode,
        transmission::{RefinementPolicy, TransmissionMap, TransmissionPolicy},
    };
}

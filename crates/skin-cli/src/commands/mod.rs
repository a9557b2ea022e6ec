//! Subcommand implementations.

pub mod config;
pub mod info;
pub mod reconstruct;

use skin_recon::ReconstructionParams;

use crate::Preset;

impl Preset {
    /// Parameters for this preset.
    pub fn params(self) -> ReconstructionParams {
        match self {
            Preset::Default => ReconstructionParams::default(),
            Preset::BodyScan => ReconstructionParams::for_body_scan(),
            Preset::SelfOccluding => ReconstructionParams::for_self_occluding(),
        }
    }
}

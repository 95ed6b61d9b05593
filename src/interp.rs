//! Seam for filling interpolated values into a merged profile.
//!
//! The merge algorithm calls out at four fixed points to fill heights,
//! pressures, and remaining data between observed levels. The computations
//! themselves (moist hydrostatic heights, log-pressure interpolation) belong
//! to thermodynamics code outside this crate, so they sit behind a trait and
//! the default implementation leaves the profile untouched.

use crate::sounding::Profile;

/// Interpolation hooks invoked between merge passes.
///
/// Implementations may fill missing entries in place but must not add or
/// remove levels; the merge relies on the profile staying aligned.
pub trait ProfileInterp {
    /// Fill missing heights below 100 hPa using a moist hydrostatic
    /// computation, after the significant-temperature merge.
    fn moist_height(&self, profile: &mut Profile);

    /// Fill missing heights using log-pressure interpolation, after the
    /// pressure-coordinate wind merges.
    fn logp_height(&self, profile: &mut Profile);

    /// Fill missing pressures from heights using log-pressure interpolation,
    /// after the height-coordinate wind merge.
    fn logp_pressure(&self, profile: &mut Profile);

    /// Fill remaining missing data fields using log-pressure interpolation.
    fn logp_data(&self, profile: &mut Profile);
}

/// Interpolator that fills nothing; merged profiles keep their sentinels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInterp;

impl ProfileInterp for NullInterp {
    fn moist_height(&self, _profile: &mut Profile) {}

    fn logp_height(&self, _profile: &mut Profile) {}

    fn logp_pressure(&self, _profile: &mut Profile) {}

    fn logp_data(&self, _profile: &mut Profile) {}
}

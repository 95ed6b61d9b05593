//! Sub-word bit unpacking shared by the sounding and grid decoders.
//!
//! GEMPAK packs scaled integers into 32-bit words using Fortran ISHFT
//! conventions: shifts operate on the 32-bit pattern, left shifts wrap at 32
//! bits and right shifts are logical. Every codec in this crate goes through
//! [`ishift`] so the wire arithmetic lives in exactly one place.

use crate::error::GempakError;

/// Fortran ISHFT on a 32-bit word.
///
/// A positive `shift` moves bits left, a negative one right. Right shifts are
/// logical (zero fill) regardless of sign, and any shift of 32 bits or more
/// clears the word.
pub fn ishift(value: i32, shift: i32) -> i32 {
    if shift >= 32 || shift <= -32 {
        0
    } else if shift > 0 {
        ((value as u32) << shift) as i32
    } else if shift < 0 {
        ((value as u32) >> -shift) as i32
    } else {
        value
    }
}

/// One entry of a part's parameter attribute table.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    /// Decimal scale applied as `10^scale`.
    pub scale: i32,
    /// Integer offset added before scaling.
    pub offset: i32,
    /// Field width in bits.
    pub bits: i32,
}

/// Unpack floating point data packed in integers, like the GEMPAK DP_UNPK
/// subroutine.
///
/// `packed` holds `declared` words of repeated parameter groups. Each group
/// occupies `ceil(sum(bits) / 32)` words with fields laid out low-bit first;
/// a field may straddle into the low bits of the following word. A field
/// equal to its all-ones mask decodes to `missing`, anything else decodes as
/// `(field + offset) * 10^scale`.
pub fn unpack_real(
    packed: &[i32],
    parameters: &[Parameter],
    declared: usize,
    missing: f32,
) -> Result<Vec<f32>, GempakError> {
    let nparms = parameters.len();
    // The field arithmetic below assumes every width fits one word; a width
    // outside 1..=32 can only come from a corrupt parameter table.
    for parm in parameters {
        if parm.bits < 1 || parm.bits > 32 {
            return Err(GempakError::InvalidField {
                field: "parameter bit width",
                value: parm.bits,
            });
        }
    }
    let total_bits: i32 = parameters.iter().map(|p| p.bits).sum();
    let pwords = ((total_bits - 1) / 32 + 1) as usize;
    let npack = ((declared as i64 - 1).div_euclid(pwords as i64) + 1) as usize;

    if npack * pwords != declared || packed.len() < declared {
        return Err(GempakError::LengthMismatch {
            declared,
            stride: pwords,
        });
    }

    let mut unpacked = vec![missing; npack * nparms];

    let mut ir = 0;
    let mut ii = 0;
    for _ in 0..npack {
        let pdat = &packed[ii..ii + pwords];
        let mut itotal: i32 = 0;
        for (idata, parm) in parameters.iter().enumerate() {
            let scale = 10f64.powi(parm.scale);
            let bits = parm.bits;
            let jsbit = (itotal % 32) + 1;
            let jsword = (itotal / 32) as usize;

            let mask = ishift(-1, bits - 32);
            let jshift = 1 - jsbit;
            let mut ifield = ishift(pdat[jsword], jshift) & mask;

            if jsbit + bits - 1 > 32 {
                let iword = ishift(pdat[jsword + 1], jshift + 32) & mask;
                ifield |= iword;
            }

            unpacked[ir + idata] = if ifield == mask {
                missing
            } else {
                ((ifield + parm.offset) as f64 * scale) as f32
            };
            itotal += bits;
        }
        ir += nparms;
        ii += pwords;
    }

    Ok(unpacked)
}

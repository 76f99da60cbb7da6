//! Multi-scalar multiplication over short Weierstrass curves
//!
//! Signed-digit bucket method. Each window fills its buckets with batched affine additions, one
//! field inversion per round shared by all the buckets of the window.

use crate::repr::{decode_all, DeviceRepr};
use crate::stream::Stream;
use crate::vec::{DeviceSlice, DeviceVec};
use crate::{DeviceError, Result};
use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ec::{AffineRepr, CurveConfig};
use ark_ff::{AdditiveGroup, BigInteger, Field, PrimeField};
use rayon::prelude::*;

/// Bucket window width used for an MSM of `size` terms
pub fn msm_window_size(size: usize) -> usize {
    if size < 32 {
        3
    } else {
        // natural log approx
        (size.ilog2() as usize * 69 / 100) + 2
    }
}

fn make_digits(a: &impl BigInteger, w: usize, num_bits: usize) -> impl Iterator<Item = i64> + '_ {
    let scalar = a.as_ref();
    let radix: u64 = 1 << w;
    let window_mask: u64 = radix - 1;

    let mut carry = 0u64;
    let digits_count = num_bits.div_ceil(w);

    (0..digits_count).map(move |i| {
        // Construct a buffer of bits of the scalar, starting at `bit_offset`.
        let bit_offset = i * w;
        let u64_idx = bit_offset / 64;
        let bit_idx = bit_offset % 64;
        let bit_buf = if bit_idx < 64 - w || u64_idx == scalar.len() - 1 {
            scalar[u64_idx] >> bit_idx
        } else {
            (scalar[u64_idx] >> bit_idx) | (scalar[1 + u64_idx] << (64 - bit_idx))
        };

        let coef = carry + (bit_buf & window_mask); // coef = [0, 2^w]

        // Recenter coefficients from [0,2^w) to [-2^w/2, 2^w/2)
        carry = (coef + radix / 2) >> w;
        let mut digit = (coef as i64) - (carry << w) as i64;

        if i == digits_count - 1 {
            digit += (carry << w) as i64;
        }
        digit
    })
}

fn compute_window<P: SWCurveConfig>(
    i: usize,
    c: usize,
    bases: &[Affine<P>],
    scalar_digits: &[i64],
    digits_count: usize,
) -> Result<Projective<P>> {
    let n = 1 << c;
    let mut indices = vec![vec![]; n];
    let mut d = vec![P::BaseField::ZERO; n + 1];
    let mut e = vec![P::BaseField::ZERO; n + 1];

    for (idx, digits) in scalar_digits.chunks(digits_count).enumerate() {
        use core::cmp::Ordering;
        let scalar = digits[i];
        match 0.cmp(&scalar) {
            Ordering::Less => indices[(scalar - 1) as usize].push(idx),
            Ordering::Greater => indices[(-scalar - 1) as usize].push(!idx),
            Ordering::Equal => (),
        }
    }

    // Negated bases are tagged with the complement of their index
    let get_base = |idx: usize| -> Affine<P> {
        if idx >> (usize::BITS - 1) == 1 {
            let base = bases[!idx];
            Affine::<P> {
                x: base.x,
                y: -base.y,
                infinity: base.infinity,
            }
        } else {
            bases[idx]
        }
    };

    let mut buckets = vec![Affine::<P>::zero(); n];

    loop {
        d[0] = P::BaseField::ONE;
        for (k, (bucket, idx)) in core::iter::zip(&buckets, &indices).enumerate() {
            if let Some(&idx) = idx.last() {
                let value = get_base(idx);

                if !bucket.infinity {
                    let a = value.x - bucket.x;
                    if a != P::BaseField::ZERO {
                        d[k + 1] = d[k] * a;
                    } else if value.y == bucket.y {
                        d[k + 1] = d[k] * value.y.double();
                    } else {
                        d[k + 1] = d[k];
                    }
                    continue;
                }
            }
            d[k + 1] = d[k];
        }
        e[n] = d[n].inverse().ok_or_else(|| DeviceError::Kernel {
            kernel: "msm",
            reason: "bucket accumulation hit a point of order two".to_string(),
        })?;

        for (k, (bucket, idx)) in core::iter::zip(&buckets, &indices).enumerate().rev() {
            if let Some(&idx) = idx.last() {
                let value = get_base(idx);

                if !bucket.infinity {
                    let a = value.x - bucket.x;
                    if a != P::BaseField::ZERO {
                        e[k] = e[k + 1] * a;
                    } else if value.y == bucket.y {
                        e[k] = e[k + 1] * value.y.double();
                    } else {
                        e[k] = e[k + 1];
                    }
                    continue;
                }
            }
            e[k] = e[k + 1];
        }

        let d = &d[..n];
        let e = &e[1..];

        let mut empty = true;
        for ((&d, &e), (bucket, idx)) in core::iter::zip(
            core::iter::zip(d, e),
            core::iter::zip(&mut buckets, &mut indices),
        ) {
            empty &= idx.len() <= 1;
            if let Some(idx) = idx.pop() {
                let value = get_base(idx);

                if !bucket.infinity {
                    let x1 = bucket.x;
                    let x2 = value.x;
                    let y1 = bucket.y;
                    let y2 = value.y;

                    let eq_x = x1 == x2;

                    if eq_x && y1 != y2 {
                        bucket.infinity = true;
                    } else {
                        let r = d * e;
                        let m = if eq_x {
                            let x1 = x1.square();
                            x1 + x1.double()
                        } else {
                            y2 - y1
                        };
                        let m = m * r;

                        let x3 = m.square() - x1 - x2;
                        let y3 = m * (x1 - x3) - y1;
                        bucket.x = x3;
                        bucket.y = y3;
                    }
                } else {
                    *bucket = value;
                }
            }
        }

        if empty {
            break;
        }
    }

    let mut running_sum = Projective::<P>::ZERO;
    let mut res = Projective::<P>::ZERO;
    buckets.into_iter().rev().for_each(|b| {
        running_sum += b;
        res += running_sum;
    });
    Ok(res)
}

pub(crate) fn msm_host<P: SWCurveConfig>(
    bases: &[Affine<P>],
    scalars: &[P::ScalarField],
) -> Result<Projective<P>> {
    if bases.len() != scalars.len() {
        return Err(DeviceError::LengthMismatch {
            op: "msm",
            left: scalars.len(),
            right: bases.len(),
        });
    }

    // Identity bases contribute nothing and break the affine bucket formulas
    let (bases, scalars): (Vec<_>, Vec<_>) = bases
        .par_iter()
        .zip(scalars.par_iter())
        .filter(|(base, _)| !base.infinity)
        .map(|(base, scalar)| (*base, scalar.into_bigint()))
        .unzip();
    if bases.is_empty() {
        return Ok(Projective::<P>::ZERO);
    }

    let num_bits = <P::ScalarField as PrimeField>::MODULUS_BIT_SIZE as usize;
    let c = msm_window_size(bases.len());
    let digits_count = num_bits.div_ceil(c);
    let scalar_digits = scalars
        .par_iter()
        .flat_map_iter(|s| make_digits(s, c, num_bits))
        .collect::<Vec<_>>();

    let window_sums = (0..digits_count)
        .into_par_iter()
        .map(|i| compute_window(i, c, &bases, &scalar_digits, digits_count))
        .collect::<Result<Vec<_>>>()?;

    let lowest = window_sums[0];
    Ok(lowest
        + window_sums[1..]
            .iter()
            .rev()
            .fold(Projective::<P>::ZERO, |mut total, &sum_i| {
                total += sum_i;
                for _ in 0..c {
                    total.double_in_place();
                }
                total
            }))
}

/// Enqueue `out[0] = sum(scalars[i] * points[i])`
///
/// Inputs are read in the standard encoding and the result is written in the standard encoding,
/// the caller converts it back with [`super::to_montgomery_async`] before reading it.
///
/// An element that is not a canonical encoding fails the stream with
/// [`DeviceError::InvalidElement`]. An empty input writes the identity.
#[tracing::instrument(level = "trace", skip_all, fields(len = scalars.len()))]
pub fn msm_async<P>(
    scalars: DeviceSlice<'_, P::ScalarField>,
    points: DeviceSlice<'_, Affine<P>>,
    out: &mut DeviceVec<Projective<P>>,
    stream: &Stream,
) -> Result<()>
where
    P: SWCurveConfig,
    P::BaseField: DeviceRepr,
    <P as CurveConfig>::ScalarField: DeviceRepr,
{
    scalars.check_stream(stream)?;
    points.check_stream(stream)?;
    out.check_stream(stream)?;
    if scalars.len() != points.len() {
        return Err(DeviceError::LengthMismatch {
            op: "msm",
            left: scalars.len(),
            right: points.len(),
        });
    }
    if out.is_empty() {
        return Err(DeviceError::LengthMismatch {
            op: "msm_output",
            left: out.len(),
            right: 1,
        });
    }

    let (scalar_alloc, scalar_words) = (scalars.allocation(), scalars.word_range());
    let (point_alloc, point_words) = (points.allocation(), points.word_range());
    let out_alloc = out.alloc.clone();
    stream.submit(move || {
        let scalars = decode_all::<P::ScalarField>(&scalar_alloc.read()[scalar_words], "msm")?;
        let points = decode_all::<Affine<P>>(&point_alloc.read()[point_words], "msm")?;
        let res = msm_host(&points, &scalars)?;
        res.encode_standard(&mut out_alloc.write()[..Projective::<P>::WORDS]);
        Ok(())
    })
}

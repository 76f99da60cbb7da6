use crate::device::Device;
use crate::repr::{decode_all, encode_all, DeviceRepr};
use crate::stream::Stream;
use crate::vec::DeviceVec;
use crate::{DeviceError, Result};
use ark_ff::FftField;
use rayon::prelude::*;

/// Layout of the input and output of a transform, N for natural and R for bit-reversed order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ordering {
    NN,
    NR,
    RN,
    RR,
}

impl Ordering {
    fn input_reversed(self) -> bool {
        matches!(self, Self::RN | Self::RR)
    }

    fn output_reversed(self) -> bool {
        matches!(self, Self::NR | Self::RR)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NttDirection {
    /// Coefficients to evaluations
    Forward,
    /// Evaluations to coefficients
    Inverse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NttConfig {
    pub direction: NttDirection,
    pub ordering: Ordering,
    /// Evaluate on the coset `g·H` of the domain instead of `H`
    pub coset: bool,
}

/// Precomputed tables of a transform of size `n`, resident on one device
///
/// All the tables are stored in standard form:
/// - `twiddles[i] = ω^i` and `inv_twiddles[i] = ω^-i` for `i < n/2`
/// - `coset[i] = g^i` and `inv_coset[i] = g^-i` for `i < n`
#[derive(Debug)]
pub struct DeviceNttDomain<F: FftField + DeviceRepr> {
    size: usize,
    coset_generator: F,
    twiddles: DeviceVec<F>,
    inv_twiddles: DeviceVec<F>,
    coset: DeviceVec<F>,
    inv_coset: DeviceVec<F>,
    size_inv: F,
}

impl<F: FftField + DeviceRepr> DeviceNttDomain<F> {
    /// Compute the tables on the host and upload them on the device of `stream`
    ///
    /// Blocks until the tables are resident, so any stream of the device can use them.
    pub fn new(size: usize, coset_generator: F, stream: &Stream) -> Result<Self> {
        let invalid = |reason: String| DeviceError::Kernel {
            kernel: "ntt_domain",
            reason,
        };
        if !size.is_power_of_two() {
            return Err(invalid(format!("size {size} is not a power of two")));
        }
        let omega = F::get_root_of_unity(size as u64)
            .ok_or_else(|| invalid(format!("no root of unity of order {size}")))?;
        let size_inv = F::from(size as u64)
            .inverse()
            .ok_or_else(|| invalid("size is not invertible".into()))?;
        let coset_inv = coset_generator
            .inverse()
            .ok_or_else(|| invalid("coset generator is zero".into()))?;

        let twiddles = powers(omega, size / 2);
        let omega_inv = omega
            .inverse()
            .ok_or_else(|| invalid("root of unity is zero".into()))?;
        let inv_twiddles = powers(omega_inv, size / 2);
        let coset = powers(coset_generator, size);
        let inv_coset = powers(coset_inv, size);

        let upload = |table: &[F]| -> Result<DeviceVec<F>> {
            let mut buf = DeviceVec::from_host_async(table, stream)?;
            super::from_montgomery_async(&mut buf, stream)?;
            Ok(buf)
        };

        let domain = Self {
            size,
            coset_generator,
            twiddles: upload(&twiddles)?,
            inv_twiddles: upload(&inv_twiddles)?,
            coset: upload(&coset)?,
            inv_coset: upload(&inv_coset)?,
            size_inv,
        };
        stream.synchronize()?;
        tracing::debug!(size, device = stream.device_id(), "ntt domain uploaded");
        Ok(domain)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn coset_generator(&self) -> F {
        self.coset_generator
    }

    pub fn device(&self) -> &Device {
        self.twiddles.device()
    }
}

fn powers<F: FftField>(base: F, count: usize) -> Vec<F> {
    let mut acc = F::ONE;
    (0..count)
        .map(|_| {
            let cur = acc;
            acc *= base;
            cur
        })
        .collect()
}

fn bit_reverse(i: usize, log_n: u32) -> usize {
    if log_n == 0 {
        0
    } else {
        i.reverse_bits() >> (usize::BITS - log_n)
    }
}

fn bit_reverse_permutation<F: Copy>(values: &mut [F]) {
    let log_n = values.len().trailing_zeros();
    for i in 0..values.len() {
        let j = bit_reverse(i, log_n);
        if i < j {
            values.swap(i, j);
        }
    }
}

/// Gentleman-Sande butterflies: natural order in, bit-reversed order out
fn dif<F: FftField>(values: &mut [F], twiddles: &[F]) {
    let n = values.len();
    let mut half = n / 2;
    while half >= 1 {
        let stride = n / (2 * half);
        values.par_chunks_mut(2 * half).for_each(|block| {
            let (lo, hi) = block.split_at_mut(half);
            for (j, (u, v)) in lo.iter_mut().zip(hi.iter_mut()).enumerate() {
                let sum = *u + *v;
                *v = (*u - *v) * twiddles[j * stride];
                *u = sum;
            }
        });
        half /= 2;
    }
}

/// Cooley-Tukey butterflies: bit-reversed order in, natural order out
fn dit<F: FftField>(values: &mut [F], twiddles: &[F]) {
    let n = values.len();
    let mut half = 1;
    while half < n {
        let stride = n / (2 * half);
        values.par_chunks_mut(2 * half).for_each(|block| {
            let (lo, hi) = block.split_at_mut(half);
            for (j, (u, v)) in lo.iter_mut().zip(hi.iter_mut()).enumerate() {
                let t = *v * twiddles[j * stride];
                *v = *u - t;
                *u += t;
            }
        });
        half *= 2;
    }
}

/// Scale each element by the power of the coset table matching its coefficient index
fn apply_coset<F: FftField>(values: &mut [F], table: &[F], reversed: bool) {
    let log_n = values.len().trailing_zeros();
    values.par_iter_mut().enumerate().for_each(|(pos, v)| {
        let idx = if reversed { bit_reverse(pos, log_n) } else { pos };
        *v *= table[idx];
    });
}

/// In place forward or inverse transform of a standard form buffer
#[tracing::instrument(level = "trace", skip_all, fields(len = buf.len(), cfg = ?cfg))]
pub fn ntt_async<F: FftField + DeviceRepr>(
    buf: &mut DeviceVec<F>,
    domain: &DeviceNttDomain<F>,
    cfg: NttConfig,
    stream: &Stream,
) -> Result<()> {
    buf.check_stream(stream)?;
    domain.twiddles.check_stream(stream)?;
    if buf.len() != domain.size {
        return Err(DeviceError::LengthMismatch {
            op: "ntt",
            left: buf.len(),
            right: domain.size,
        });
    }

    let data = buf.alloc.clone();
    let (twiddles, coset) = match cfg.direction {
        NttDirection::Forward => (domain.twiddles.alloc.clone(), domain.coset.alloc.clone()),
        NttDirection::Inverse => (
            domain.inv_twiddles.alloc.clone(),
            domain.inv_coset.alloc.clone(),
        ),
    };
    let size_inv = domain.size_inv;

    stream.submit(move || {
        let mut words = data.write();
        let mut values = decode_all::<F>(&words, "ntt")?;
        let twiddles = decode_all::<F>(&twiddles.read(), "ntt twiddles")?;

        let input_reversed = cfg.ordering.input_reversed();
        if cfg.coset && cfg.direction == NttDirection::Forward {
            let coset = decode_all::<F>(&coset.read(), "ntt coset")?;
            apply_coset(&mut values, &coset, input_reversed);
        }

        if input_reversed {
            dit(&mut values, &twiddles);
        } else {
            dif(&mut values, &twiddles);
        }
        let reversed = !input_reversed;

        if cfg.direction == NttDirection::Inverse {
            values.par_iter_mut().for_each(|v| *v *= size_inv);
            if cfg.coset {
                let coset = decode_all::<F>(&coset.read(), "ntt coset")?;
                apply_coset(&mut values, &coset, reversed);
            }
        }

        if reversed != cfg.ordering.output_reversed() {
            bit_reverse_permutation(&mut values);
        }
        encode_all(&values, &mut words);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{from_montgomery_async, to_montgomery_async};
    use crate::repr::stage_raw;
    use crate::test_utils::seeded_rng;
    use crate::{DeviceConfig, DeviceContext};
    use ark_bn254::Fr;
    use ark_ff::UniformRand;
    use ark_poly::{EvaluationDomain, Radix2EvaluationDomain};

    const ORDERINGS: [Ordering; 4] = [Ordering::NN, Ordering::NR, Ordering::RN, Ordering::RR];

    fn permuted(values: &[Fr], reversed: bool) -> Vec<Fr> {
        let mut values = values.to_vec();
        if reversed {
            bit_reverse_permutation(&mut values);
        }
        values
    }

    fn run(
        values: &[Fr],
        domain: &DeviceNttDomain<Fr>,
        cfg: NttConfig,
        stream: &Stream,
    ) -> Vec<Fr> {
        let mut buf = DeviceVec::from_host_async(values, stream).unwrap();
        from_montgomery_async(&mut buf, stream).unwrap();
        ntt_async(&mut buf, domain, cfg, stream).unwrap();
        to_montgomery_async(&mut buf, stream).unwrap();
        buf.to_host(stream).unwrap()
    }

    #[test]
    fn matches_arkworks_for_every_ordering() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let stream = ctx.device(0).unwrap().create_stream();
        let mut rng = seeded_rng();

        for log_n in [0u32, 1, 3, 6] {
            let n = 1usize << log_n;
            let reference = Radix2EvaluationDomain::<Fr>::new(n).unwrap();
            let g = Fr::get_root_of_unity(2 * n as u64).unwrap();
            let domain = DeviceNttDomain::new(n, g, &stream).unwrap();
            let coeffs = (0..n).map(|_| Fr::rand(&mut rng)).collect::<Vec<_>>();

            let evals = reference.fft(&coeffs);
            let coset_evals = reference.get_coset(g).unwrap().fft(&coeffs);

            for ordering in ORDERINGS {
                for (coset, expected) in [(false, &evals), (true, &coset_evals)] {
                    let input = permuted(&coeffs, ordering.input_reversed());
                    let cfg = NttConfig {
                        direction: NttDirection::Forward,
                        ordering,
                        coset,
                    };
                    let out = run(&input, &domain, cfg, &stream);
                    assert_eq!(
                        out,
                        permuted(expected, ordering.output_reversed()),
                        "forward n={n} {ordering:?} coset={coset}"
                    );

                    let input = permuted(expected, ordering.input_reversed());
                    let cfg = NttConfig {
                        direction: NttDirection::Inverse,
                        ordering,
                        coset,
                    };
                    let out = run(&input, &domain, cfg, &stream);
                    assert_eq!(
                        out,
                        permuted(&coeffs, ordering.output_reversed()),
                        "inverse n={n} {ordering:?} coset={coset}"
                    );
                }
            }
        }
    }

    #[test]
    fn mismatched_ordering_is_silently_wrong() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let stream = ctx.device(0).unwrap().create_stream();
        let mut rng = seeded_rng();
        let n = 16;
        let g = Fr::get_root_of_unity(2 * n as u64).unwrap();
        let domain = DeviceNttDomain::new(n, g, &stream).unwrap();
        let coeffs = (0..n).map(|_| Fr::rand(&mut rng)).collect::<Vec<_>>();

        let forward = NttConfig {
            direction: NttDirection::Forward,
            ordering: Ordering::NR,
            coset: false,
        };
        let evals = run(&coeffs, &domain, forward, &stream);

        let wrong = NttConfig {
            direction: NttDirection::Inverse,
            ordering: Ordering::NN,
            coset: false,
        };
        assert_ne!(run(&evals, &domain, wrong, &stream), coeffs);

        let right = NttConfig {
            ordering: Ordering::RN,
            ..wrong
        };
        assert_eq!(run(&evals, &domain, right, &stream), coeffs);
    }

    #[test]
    fn tables_are_uploaded_in_standard_form() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let stream = ctx.device(0).unwrap().create_stream();
        let g = Fr::from(7u64);
        let domain = DeviceNttDomain::new(8, g, &stream).unwrap();
        stream.synchronize().unwrap();

        let coset = domain.coset.alloc.read().clone();
        assert_ne!(coset, stage_raw(&powers(g, 8)));
        assert_eq!(decode_all::<Fr>(&coset, "test").unwrap(), powers(g, 8));
    }

    #[test]
    fn rejects_invalid_sizes() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let stream = ctx.device(0).unwrap().create_stream();
        assert!(matches!(
            DeviceNttDomain::new(12, Fr::from(5u64), &stream),
            Err(DeviceError::Kernel { kernel: "ntt_domain", .. })
        ));

        let domain = DeviceNttDomain::new(8, Fr::from(5u64), &stream).unwrap();
        let mut buf = DeviceVec::<Fr>::new_zeroed(4, ctx.device(0).unwrap()).unwrap();
        let cfg = NttConfig {
            direction: NttDirection::Forward,
            ordering: Ordering::NN,
            coset: false,
        };
        assert!(matches!(
            ntt_async(&mut buf, &domain, cfg, &stream),
            Err(DeviceError::LengthMismatch { op: "ntt", .. })
        ));
    }
}

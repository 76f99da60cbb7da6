//! Word layout of the elements stored in device memory
//!
//! Device buffers are arrays of `u64` words. An element occupies [`DeviceRepr::WORDS`] consecutive
//! words, and the same words can hold two encodings:
//! - the raw host encoding, i.e. the limbs arkworks keeps in memory (Montgomery form)
//! - the standard encoding expected by the kernels (canonical integers)
//!
//! Points are stored coordinate by coordinate. An affine point carries one extra word for its
//! infinity flag, a projective point is stored as Jacobian `(x, y, z)`.

use crate::{DeviceError, Result};
use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ec::AffineRepr;
use ark_ff::{BigInt, Fp, FpConfig, PrimeField, QuadExtConfig, QuadExtField};
use rayon::prelude::*;
use std::marker::PhantomData;

pub trait DeviceRepr: Copy + Send + Sync + 'static {
    const WORDS: usize;

    /// Write the in-memory host encoding, limb for limb
    fn write_raw(&self, out: &mut [u64]);

    /// Rebuild an element from its in-memory host encoding
    fn read_raw(words: &[u64]) -> Self;

    /// Write the standard encoding used by the kernels
    fn encode_standard(&self, out: &mut [u64]);

    /// Decode a standard encoding, `None` if the words are not canonical
    fn decode_standard(words: &[u64]) -> Option<Self>;

    /// In place conversion of raw host words to the standard encoding
    fn raw_to_standard(words: &mut [u64]) {
        Self::read_raw(words).encode_standard(words);
    }

    /// In place conversion of standard words to the raw host encoding
    fn standard_to_raw(words: &mut [u64]) -> bool {
        match Self::decode_standard(words) {
            Some(value) => {
                value.write_raw(words);
                true
            }
            None => false,
        }
    }
}

impl<P: FpConfig<N>, const N: usize> DeviceRepr for Fp<P, N> {
    const WORDS: usize = N;

    fn write_raw(&self, out: &mut [u64]) {
        out.copy_from_slice(&self.0 .0);
    }

    fn read_raw(words: &[u64]) -> Self {
        Fp(BigInt(limbs(words)), PhantomData)
    }

    fn encode_standard(&self, out: &mut [u64]) {
        out.copy_from_slice(&self.into_bigint().0);
    }

    fn decode_standard(words: &[u64]) -> Option<Self> {
        Self::from_bigint(BigInt(limbs(words)))
    }
}

fn limbs<const N: usize>(words: &[u64]) -> [u64; N] {
    let mut limbs = [0u64; N];
    limbs.copy_from_slice(words);
    limbs
}

// Quadratic extensions hold c0 then c1, each in the layout of the base field
impl<P: QuadExtConfig> DeviceRepr for QuadExtField<P>
where
    P::BaseField: DeviceRepr,
{
    const WORDS: usize = 2 * <P::BaseField as DeviceRepr>::WORDS;

    fn write_raw(&self, out: &mut [u64]) {
        let (c0, c1) = out.split_at_mut(Self::WORDS / 2);
        self.c0.write_raw(c0);
        self.c1.write_raw(c1);
    }

    fn read_raw(words: &[u64]) -> Self {
        let (c0, c1) = words.split_at(Self::WORDS / 2);
        QuadExtField::new(P::BaseField::read_raw(c0), P::BaseField::read_raw(c1))
    }

    fn encode_standard(&self, out: &mut [u64]) {
        let (c0, c1) = out.split_at_mut(Self::WORDS / 2);
        self.c0.encode_standard(c0);
        self.c1.encode_standard(c1);
    }

    fn decode_standard(words: &[u64]) -> Option<Self> {
        let (c0, c1) = words.split_at(Self::WORDS / 2);
        Some(QuadExtField::new(
            P::BaseField::decode_standard(c0)?,
            P::BaseField::decode_standard(c1)?,
        ))
    }
}

impl<P: SWCurveConfig> DeviceRepr for Affine<P>
where
    P::BaseField: DeviceRepr,
{
    const WORDS: usize = 2 * <P::BaseField as DeviceRepr>::WORDS + 1;

    fn write_raw(&self, out: &mut [u64]) {
        let w = <P::BaseField as DeviceRepr>::WORDS;
        self.x.write_raw(&mut out[..w]);
        self.y.write_raw(&mut out[w..2 * w]);
        out[2 * w] = u64::from(self.infinity);
    }

    fn read_raw(words: &[u64]) -> Self {
        let w = <P::BaseField as DeviceRepr>::WORDS;
        Affine {
            x: P::BaseField::read_raw(&words[..w]),
            y: P::BaseField::read_raw(&words[w..2 * w]),
            infinity: words[2 * w] != 0,
        }
    }

    fn encode_standard(&self, out: &mut [u64]) {
        let w = <P::BaseField as DeviceRepr>::WORDS;
        if self.infinity {
            out[..2 * w].fill(0);
            out[2 * w] = 1;
        } else {
            self.x.encode_standard(&mut out[..w]);
            self.y.encode_standard(&mut out[w..2 * w]);
            out[2 * w] = 0;
        }
    }

    fn decode_standard(words: &[u64]) -> Option<Self> {
        let w = <P::BaseField as DeviceRepr>::WORDS;
        match words[2 * w] {
            0 => Some(Affine {
                x: P::BaseField::decode_standard(&words[..w])?,
                y: P::BaseField::decode_standard(&words[w..2 * w])?,
                infinity: false,
            }),
            1 => Some(Affine::<P>::zero()),
            _ => None,
        }
    }
}

impl<P: SWCurveConfig> DeviceRepr for Projective<P>
where
    P::BaseField: DeviceRepr,
{
    const WORDS: usize = 3 * <P::BaseField as DeviceRepr>::WORDS;

    fn write_raw(&self, out: &mut [u64]) {
        let w = <P::BaseField as DeviceRepr>::WORDS;
        self.x.write_raw(&mut out[..w]);
        self.y.write_raw(&mut out[w..2 * w]);
        self.z.write_raw(&mut out[2 * w..]);
    }

    fn read_raw(words: &[u64]) -> Self {
        let w = <P::BaseField as DeviceRepr>::WORDS;
        Projective::new_unchecked(
            P::BaseField::read_raw(&words[..w]),
            P::BaseField::read_raw(&words[w..2 * w]),
            P::BaseField::read_raw(&words[2 * w..]),
        )
    }

    fn encode_standard(&self, out: &mut [u64]) {
        let w = <P::BaseField as DeviceRepr>::WORDS;
        self.x.encode_standard(&mut out[..w]);
        self.y.encode_standard(&mut out[w..2 * w]);
        self.z.encode_standard(&mut out[2 * w..]);
    }

    fn decode_standard(words: &[u64]) -> Option<Self> {
        let w = <P::BaseField as DeviceRepr>::WORDS;
        Some(Projective::new_unchecked(
            P::BaseField::decode_standard(&words[..w])?,
            P::BaseField::decode_standard(&words[w..2 * w])?,
            P::BaseField::decode_standard(&words[2 * w..])?,
        ))
    }
}

/// Raw host words of a slice of elements
pub(crate) fn stage_raw<T: DeviceRepr>(src: &[T]) -> Vec<u64> {
    let mut words = vec![0u64; src.len() * T::WORDS];
    words
        .par_chunks_mut(T::WORDS)
        .zip(src.par_iter())
        .for_each(|(out, value)| value.write_raw(out));
    words
}

pub(crate) fn unstage_raw<T: DeviceRepr>(words: &[u64]) -> Vec<T> {
    words.par_chunks(T::WORDS).map(T::read_raw).collect()
}

/// Decode every element of a standard encoded region
pub(crate) fn decode_all<T: DeviceRepr>(words: &[u64], op: &'static str) -> Result<Vec<T>> {
    words
        .par_chunks(T::WORDS)
        .enumerate()
        .map(|(index, chunk)| {
            T::decode_standard(chunk).ok_or(DeviceError::InvalidElement { op, index })
        })
        .collect()
}

pub(crate) fn encode_all<T: DeviceRepr>(values: &[T], words: &mut [u64]) {
    words
        .par_chunks_mut(T::WORDS)
        .zip(values.par_iter())
        .for_each(|(out, value)| value.encode_standard(out));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::seeded_rng;
    use ark_bn254::{Fq, Fq2, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
    use ark_ec::CurveGroup;
    use ark_ff::{BigInteger, UniformRand};

    #[test]
    fn word_counts() {
        assert_eq!(<Fr as DeviceRepr>::WORDS, 4);
        assert_eq!(<Fq2 as DeviceRepr>::WORDS, 8);
        assert_eq!(<G1Affine as DeviceRepr>::WORDS, 9);
        assert_eq!(<G2Affine as DeviceRepr>::WORDS, 17);
        assert_eq!(<G1Projective as DeviceRepr>::WORDS, 12);
    }

    fn raw_round_trip<F: PrimeField + UniformRand + DeviceRepr>() {
        let mut rng = seeded_rng();
        for x in [F::zero(), F::one(), F::rand(&mut rng)] {
            let mut words = vec![0u64; F::WORDS];
            x.write_raw(&mut words);
            assert_eq!(F::read_raw(&words), x);
        }
    }

    #[test]
    fn raw_words_round_trip() {
        raw_round_trip::<Fr>();
        raw_round_trip::<Fq>();
        raw_round_trip::<ark_bls12_377::Fq>();
    }

    #[test]
    fn standard_encoding_is_canonical_integer() {
        let mut rng = seeded_rng();
        let x = Fq::rand(&mut rng);
        let mut words = [0u64; 4];
        x.encode_standard(&mut words);

        assert_eq!(words, x.into_bigint().0);
        // Raw words are the Montgomery limbs, they only agree with the standard form by chance
        let mut raw = [0u64; 4];
        x.write_raw(&mut raw);
        assert_eq!(raw, x.0 .0);
        assert_ne!(raw, words);
    }

    #[test]
    fn non_canonical_words_are_rejected() {
        let mut words = [0u64; 4];
        words.copy_from_slice(Fr::MODULUS.as_ref());
        assert!(Fr::decode_standard(&words).is_none());
        assert!(!Fr::standard_to_raw(&mut words));

        let mut point = [0u64; 9];
        point[8] = 2;
        assert!(G1Affine::decode_standard(&point).is_none());
    }

    #[test]
    fn point_conversions_are_inverse() {
        let mut rng = seeded_rng();
        let g1 = G1Projective::rand(&mut rng).into_affine();
        let g2 = G2Projective::rand(&mut rng).into_affine();

        for p in [g1, G1Affine::zero()] {
            let mut words = vec![0u64; G1Affine::WORDS];
            p.write_raw(&mut words);
            G1Affine::raw_to_standard(&mut words);
            assert_eq!(G1Affine::decode_standard(&words), Some(p));
            assert!(G1Affine::standard_to_raw(&mut words));
            assert_eq!(G1Affine::read_raw(&words), p);
        }

        let mut words = vec![0u64; G2Affine::WORDS];
        g2.write_raw(&mut words);
        G2Affine::raw_to_standard(&mut words);
        assert!(G2Affine::standard_to_raw(&mut words));
        assert_eq!(G2Affine::read_raw(&words), g2);

        let mut bits = Fr::MODULUS;
        bits.sub_with_borrow(&BigInt::from(1u64));
        let max = Fr::from_bigint(bits).unwrap();
        let mut words = [0u64; 4];
        max.encode_standard(&mut words);
        assert_eq!(Fr::decode_standard(&words), Some(max));
    }
}

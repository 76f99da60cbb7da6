use crate::repr::DeviceRepr;
use crate::stream::Stream;
use crate::vec::DeviceVec;
use crate::{DeviceError, Result};
use rayon::prelude::*;

/// Convert a buffer freshly copied from the host to the standard form used by the kernels
#[tracing::instrument(level = "trace", skip_all, fields(len = buf.len()))]
pub fn from_montgomery_async<T: DeviceRepr>(buf: &mut DeviceVec<T>, stream: &Stream) -> Result<()> {
    buf.check_stream(stream)?;
    let alloc = buf.alloc.clone();
    stream.submit(move || {
        alloc
            .write()
            .par_chunks_mut(T::WORDS)
            .for_each(T::raw_to_standard);
        Ok(())
    })
}

/// Convert a buffer of kernel results back to the host encoding before reading it
///
/// Fails with [`DeviceError::InvalidElement`] if an element is not a canonical encoding.
#[tracing::instrument(level = "trace", skip_all, fields(len = buf.len()))]
pub fn to_montgomery_async<T: DeviceRepr>(buf: &mut DeviceVec<T>, stream: &Stream) -> Result<()> {
    buf.check_stream(stream)?;
    let alloc = buf.alloc.clone();
    stream.submit(move || {
        alloc
            .write()
            .par_chunks_mut(T::WORDS)
            .enumerate()
            .try_for_each(|(index, words)| {
                if T::standard_to_raw(words) {
                    Ok(())
                } else {
                    Err(DeviceError::InvalidElement {
                        op: "to_montgomery",
                        index,
                    })
                }
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::decode_all;
    use crate::test_utils::seeded_rng;
    use crate::{DeviceConfig, DeviceContext};
    use ark_bls12_377::{Fr as Fr377, G2Projective as G2Projective377};
    use ark_bn254::{Fr, G1Affine, G1Projective};
    use ark_ec::{AffineRepr, CurveGroup};
    use ark_ff::{PrimeField, UniformRand};

    fn ctx() -> DeviceContext {
        DeviceContext::new(&DeviceConfig::default()).unwrap()
    }

    #[test]
    fn scalar_round_trip() {
        let ctx = ctx();
        let stream = ctx.device(0).unwrap().create_stream();
        let mut rng = seeded_rng();
        let mut scalars = (0..100).map(|_| Fr::rand(&mut rng)).collect::<Vec<_>>();
        scalars.push(Fr::from(0u64));
        scalars.push(-Fr::from(1u64));

        let mut buf = DeviceVec::from_host(&scalars, &stream).unwrap();
        from_montgomery_async(&mut buf, &stream).unwrap();
        stream.synchronize().unwrap();

        // The device now holds canonical integers
        let words = buf.alloc.read().clone();
        assert!(words
            .chunks(4)
            .zip(&scalars)
            .all(|(limbs, s)| limbs == s.into_bigint().0.as_slice()));
        assert_eq!(decode_all::<Fr>(&words, "test").unwrap(), scalars);

        to_montgomery_async(&mut buf, &stream).unwrap();
        assert_eq!(buf.to_host(&stream).unwrap(), scalars);
    }

    #[test]
    fn point_round_trip_both_groups() {
        let ctx = ctx();
        let stream = ctx.device(0).unwrap().create_stream();
        let mut rng = seeded_rng();

        let mut g1 = (0..16)
            .map(|_| G1Projective::rand(&mut rng).into_affine())
            .collect::<Vec<_>>();
        g1.push(G1Affine::zero());
        let g2 = (0..8)
            .map(|_| G2Projective377::rand(&mut rng).into_affine())
            .collect::<Vec<_>>();

        let mut d_g1 = DeviceVec::from_host(&g1, &stream).unwrap();
        let mut d_g2 = DeviceVec::from_host(&g2, &stream).unwrap();
        for _ in 0..2 {
            from_montgomery_async(&mut d_g1, &stream).unwrap();
            from_montgomery_async(&mut d_g2, &stream).unwrap();
            to_montgomery_async(&mut d_g1, &stream).unwrap();
            to_montgomery_async(&mut d_g2, &stream).unwrap();
        }

        assert_eq!(d_g1.to_host(&stream).unwrap(), g1);
        assert_eq!(d_g2.to_host(&stream).unwrap(), g2);
    }

    #[test]
    fn reading_standard_words_as_host_values_is_wrong() {
        let ctx = ctx();
        let stream = ctx.device(0).unwrap().create_stream();
        let scalars = vec![Fr377::from(3u64), Fr377::from(5u64)];

        let mut buf = DeviceVec::from_host(&scalars, &stream).unwrap();
        from_montgomery_async(&mut buf, &stream).unwrap();
        let garbled = buf.to_host(&stream).unwrap();

        assert_ne!(garbled, scalars);
    }

    #[test]
    fn invalid_standard_words_poison_the_stream() {
        let ctx = ctx();
        let stream = ctx.device(0).unwrap().create_stream();
        let mut buf = DeviceVec::<Fr>::new_zeroed(3, ctx.device(0).unwrap()).unwrap();
        {
            let mut words = buf.alloc.write();
            words[4..8].copy_from_slice(&[u64::MAX; 4]);
        }

        to_montgomery_async(&mut buf, &stream).unwrap();
        assert_eq!(
            stream.synchronize(),
            Err(DeviceError::InvalidElement {
                op: "to_montgomery",
                index: 1
            })
        );
    }
}

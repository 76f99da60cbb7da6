//! Pedersen commitments to private witness values, with a batched proof of knowledge
//!
//! All the keys of a circuit share one trapdoor `σ`. A proof of knowledge of the opening of `C` is
//! `σ·C`, obtained with the `σ`-scaled basis, and checked with `e(C, -σ·g)·e(pok, g) = 1`.

use crate::curve::{CurveProfile, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::pairing::Pairing;
use ark_ec::{CurveGroup, VariableBaseMSM};
use ark_ff::{AdditiveGroup, One, PrimeField, UniformRand};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

const COMMITMENT_DST: &[u8] = b"groth16-accel/commitment-wire";
const CHALLENGE_DST: &[u8] = b"groth16-accel/commitment-challenge";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PedersenError {
    #[error("expected {expected} values, got {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("proof of knowledge does not verify")]
    InvalidProof,

    #[error("serialization: {0}")]
    Serialization(String),
}

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct CommitmentKey<C: CurveProfile> {
    pub basis: Vec<G1Affine<C>>,
    pub basis_exp_sigma: Vec<G1Affine<C>>,
}

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct CommitmentVerifyingKey<C: CurveProfile> {
    pub g: G2Affine<C>,
    pub g_sigma_neg: G2Affine<C>,
}

/// Build one key per basis, all bound to the same trapdoor
pub fn setup<C: CurveProfile, R: Rng + ?Sized>(
    bases: Vec<Vec<G1Affine<C>>>,
    rng: &mut R,
) -> (Vec<CommitmentKey<C>>, CommitmentVerifyingKey<C>) {
    let sigma = loop {
        let sigma = Fr::<C>::rand(rng);
        if sigma != Fr::<C>::ZERO {
            break sigma;
        }
    };
    let g = G2Projective::<C>::rand(rng);

    let keys = bases
        .into_iter()
        .map(|basis| {
            let scaled = basis.par_iter().map(|p| *p * sigma).collect::<Vec<_>>();
            CommitmentKey {
                basis_exp_sigma: G1Projective::<C>::normalize_batch(&scaled),
                basis,
            }
        })
        .collect();

    let vk = CommitmentVerifyingKey {
        g: g.into_affine(),
        g_sigma_neg: (-(g * sigma)).into_affine(),
    };
    (keys, vk)
}

impl<C: CurveProfile> CommitmentKey<C> {
    fn check_len(&self, values: &[Fr<C>]) -> Result<(), PedersenError> {
        if values.len() == self.basis.len() {
            Ok(())
        } else {
            Err(PedersenError::LengthMismatch {
                expected: self.basis.len(),
                found: values.len(),
            })
        }
    }

    pub fn commit(&self, values: &[Fr<C>]) -> Result<G1Affine<C>, PedersenError> {
        self.check_len(values)?;
        Ok(G1Projective::<C>::msm_unchecked(&self.basis, values).into_affine())
    }

    fn prove_knowledge(&self, values: &[Fr<C>]) -> Result<G1Projective<C>, PedersenError> {
        self.check_len(values)?;
        Ok(G1Projective::<C>::msm_unchecked(&self.basis_exp_sigma, values))
    }
}

/// Fold the proofs of knowledge of several commitments with the powers of `challenge`
pub fn batch_prove<C: CurveProfile>(
    keys: &[CommitmentKey<C>],
    values: &[Vec<Fr<C>>],
    challenge: Fr<C>,
) -> Result<G1Affine<C>, PedersenError> {
    if keys.len() != values.len() {
        return Err(PedersenError::LengthMismatch {
            expected: keys.len(),
            found: values.len(),
        });
    }

    let mut acc = G1Projective::<C>::default();
    let mut pow = Fr::<C>::one();
    for (key, values) in keys.iter().zip(values) {
        acc += key.prove_knowledge(values)? * pow;
        pow *= challenge;
    }
    Ok(acc.into_affine())
}

pub fn batch_verify<C: CurveProfile>(
    vk: &CommitmentVerifyingKey<C>,
    commitments: &[G1Affine<C>],
    pok: G1Affine<C>,
    challenge: Fr<C>,
) -> Result<(), PedersenError> {
    let mut folded = G1Projective::<C>::default();
    let mut pow = Fr::<C>::one();
    for commitment in commitments {
        folded += *commitment * pow;
        pow *= challenge;
    }

    let res = C::Engine::multi_pairing([folded.into_affine(), pok], [vk.g_sigma_neg, vk.g]);
    if res.0.is_one() {
        Ok(())
    } else {
        Err(PedersenError::InvalidProof)
    }
}

/// Hash arbitrary data to a scalar, with 64 bytes of SHAKE256 output reduced modulo the order
pub fn hash_to_field<F: PrimeField>(data: &[&[u8]]) -> F {
    use sha3::digest::{ExtendableOutput, Update, XofReader};

    let mut hasher = sha3::Shake256::default();
    for data in data {
        hasher.update(data);
    }
    let mut reader = hasher.finalize_xof();
    let mut bytes = [0u8; 64];
    reader.read(&mut bytes);
    F::from_le_bytes_mod_order(&bytes)
}

fn to_bytes(value: &impl CanonicalSerialize) -> Result<Vec<u8>, PedersenError> {
    let mut bytes = Vec::with_capacity(value.uncompressed_size());
    value
        .serialize_uncompressed(&mut bytes)
        .map_err(|err| PedersenError::Serialization(err.to_string()))?;
    Ok(bytes)
}

/// Value of the commitment wire: hash of the commitment and of the public committed values
pub fn commitment_wire_value<C: CurveProfile>(
    commitment: &G1Affine<C>,
    public_values: &[Fr<C>],
) -> Result<Fr<C>, PedersenError> {
    let commitment = to_bytes(commitment)?;
    let public_values = to_bytes(&public_values.to_vec())?;
    Ok(hash_to_field(&[COMMITMENT_DST, &commitment, &public_values]))
}

/// Challenge folding the proofs of knowledge of all the commitments of a proof
pub fn fold_challenge<C: CurveProfile>(
    commitments: &[G1Affine<C>],
) -> Result<Fr<C>, PedersenError> {
    let commitments = to_bytes(&commitments.to_vec())?;
    Ok(hash_to_field(&[CHALLENGE_DST, &commitments]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Bn254;
    use crate::test_utils::seeded_rng;
    use ark_ec::AffineRepr;

    type F = Fr<Bn254>;

    fn random_bases(sizes: &[usize], rng: &mut impl Rng) -> Vec<Vec<G1Affine<Bn254>>> {
        sizes
            .iter()
            .map(|&n| {
                (0..n)
                    .map(|_| G1Projective::<Bn254>::rand(rng).into_affine())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn batch_proof_of_knowledge() {
        let mut rng = seeded_rng();
        let (keys, vk) = setup::<Bn254, _>(random_bases(&[3, 1, 2], &mut rng), &mut rng);
        let values = [3, 1, 2]
            .map(|n| (0..n).map(|_| F::rand(&mut rng)).collect::<Vec<_>>())
            .to_vec();

        let commitments = keys
            .iter()
            .zip(&values)
            .map(|(key, values)| key.commit(values).unwrap())
            .collect::<Vec<_>>();
        let challenge = fold_challenge::<Bn254>(&commitments).unwrap();
        let pok = batch_prove(&keys, &values, challenge).unwrap();

        batch_verify(&vk, &commitments, pok, challenge).unwrap();

        let mut tampered = commitments.clone();
        tampered[1] = (tampered[1] + G1Affine::<Bn254>::generator()).into_affine();
        assert_eq!(
            batch_verify(&vk, &tampered, pok, challenge),
            Err(PedersenError::InvalidProof)
        );
        assert_eq!(
            batch_verify(&vk, &commitments, pok, challenge + F::one()),
            Err(PedersenError::InvalidProof)
        );
    }

    #[test]
    fn wrong_number_of_values() {
        let mut rng = seeded_rng();
        let (keys, _) = setup::<Bn254, _>(random_bases(&[2], &mut rng), &mut rng);
        assert_eq!(
            keys[0].commit(&[F::one()]),
            Err(PedersenError::LengthMismatch {
                expected: 2,
                found: 1
            })
        );
        assert!(batch_prove(&keys, &[], F::one()).is_err());
    }

    #[test]
    fn wire_value_binds_public_values() {
        let mut rng = seeded_rng();
        let commitment = G1Projective::<Bn254>::rand(&mut rng).into_affine();

        let a = commitment_wire_value::<Bn254>(&commitment, &[F::from(1u64)]).unwrap();
        let b = commitment_wire_value::<Bn254>(&commitment, &[F::from(2u64)]).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            a,
            commitment_wire_value::<Bn254>(&commitment, &[F::from(1u64)]).unwrap()
        );
        assert_ne!(hash_to_field::<F>(&[b"a", b"b"]), hash_to_field::<F>(&[b"b", b"a"]));
    }
}

use crate::curve::{CurveProfile, G1Affine, G2Affine};
use crate::device_key::DeviceProvingKey;
use crate::domain::FftDomain;
use crate::pedersen::{CommitmentKey, CommitmentVerifyingKey};
use crate::r1cs::CommitmentInfo;
use crate::ProverError;
use ark_ff::FftField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, Compress, Validate};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct G1Constants<C: CurveProfile> {
    pub alpha: G1Affine<C>,
    pub beta: G1Affine<C>,
    pub delta: G1Affine<C>,
}

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct G2Constants<C: CurveProfile> {
    pub beta: G2Affine<C>,
    pub delta: G2Affine<C>,
}

/// The point vectors of a proving key, the bulk of its size
///
/// - `a` and `b` hold the non-identity points only, see [`ProvingKey::infinity_a`]
/// - `k` holds one point per private wire that is neither committed nor a commitment wire,
///   identity points included
/// - `z[i] = τ^i·t(τ)/δ` for `i < n - 1`
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct KeyPoints<C: CurveProfile> {
    pub a: Vec<G1Affine<C>>,
    pub b: Vec<G1Affine<C>>,
    pub k: Vec<G1Affine<C>>,
    pub z: Vec<G1Affine<C>>,
    pub g2_b: Vec<G2Affine<C>>,
}

/// Groth16 proving key
///
/// The host points can be released once the key is resident on the devices, see
/// [`ProvingKey::release_host_points`]. The device copy is built at most once, on first use by an
/// accelerated prover.
#[derive(Debug)]
pub struct ProvingKey<C: CurveProfile> {
    pub domain: FftDomain<C::ScalarField>,
    pub g1: G1Constants<C>,
    pub g2: G2Constants<C>,
    /// `infinity_a[j]` is set when the A point of wire `j` is the identity
    pub infinity_a: Vec<bool>,
    pub infinity_b: Vec<bool>,
    pub nb_infinity_a: usize,
    pub nb_infinity_b: usize,
    /// Positions of the identity points inside `K`
    pub infinity_point_indices_k: Vec<usize>,
    /// The constant wire and the public inputs
    pub nb_public_wires: usize,
    pub commitment_info: Vec<CommitmentInfo>,
    pub commitment_keys: Vec<CommitmentKey<C>>,
    points: RwLock<Option<Arc<KeyPoints<C>>>>,
    pub(crate) device: OnceLock<Arc<DeviceProvingKey<C>>>,
    pub(crate) device_init: Mutex<()>,
}

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct VerifyingKey<C: CurveProfile> {
    pub alpha_g1: G1Affine<C>,
    pub beta_g2: G2Affine<C>,
    pub gamma_g2: G2Affine<C>,
    pub delta_g2: G2Affine<C>,
    /// `[one | public inputs | commitment wires]`
    pub k: Vec<G1Affine<C>>,
    pub commitment_key: CommitmentVerifyingKey<C>,
    pub commitment_info: Vec<CommitmentInfo>,
}

impl<C: CurveProfile> VerifyingKey<C> {
    pub fn nb_public_inputs(&self) -> usize {
        self.k.len().saturating_sub(1 + self.commitment_info.len())
    }
}

/// Wires whose values feed the K MSM, in the order of `K`
///
/// Public wires are handled by the verifying key, committed private wires by the commitment
/// bases, and commitment wires are public to the verifier.
pub(crate) fn k_wires(
    nb_public_wires: usize,
    nb_wires: usize,
    commitment_info: &[CommitmentInfo],
) -> Vec<usize> {
    let mut excluded = vec![false; nb_wires];
    for info in commitment_info {
        let wires = info.private_committed.iter().chain([&info.commitment_wire]);
        for &wire in wires {
            if let Some(slot) = excluded.get_mut(wire) {
                *slot = true;
            }
        }
    }
    (nb_public_wires..nb_wires)
        .filter(|&wire| !excluded[wire])
        .collect()
}

/// Values of the wires whose point is not the identity
pub(crate) fn filter_wires<F: Copy + Send + Sync>(wires: &[F], infinity: &[bool]) -> Vec<F> {
    wires
        .iter()
        .zip(infinity)
        .filter(|(_, &inf)| !inf)
        .map(|(w, _)| *w)
        .collect()
}

impl<C: CurveProfile> ProvingKey<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        domain: FftDomain<C::ScalarField>,
        g1: G1Constants<C>,
        g2: G2Constants<C>,
        infinity_a: Vec<bool>,
        infinity_b: Vec<bool>,
        infinity_point_indices_k: Vec<usize>,
        nb_public_wires: usize,
        commitment_info: Vec<CommitmentInfo>,
        commitment_keys: Vec<CommitmentKey<C>>,
        points: KeyPoints<C>,
    ) -> Self {
        let nb_infinity_a = infinity_a.iter().filter(|&&inf| inf).count();
        let nb_infinity_b = infinity_b.iter().filter(|&&inf| inf).count();
        Self {
            domain,
            g1,
            g2,
            infinity_a,
            infinity_b,
            nb_infinity_a,
            nb_infinity_b,
            infinity_point_indices_k,
            nb_public_wires,
            commitment_info,
            commitment_keys,
            points: RwLock::new(Some(Arc::new(points))),
            device: OnceLock::new(),
            device_init: Mutex::new(()),
        }
    }

    pub fn nb_wires(&self) -> usize {
        self.infinity_a.len()
    }

    /// Host point vectors, fails once they have been released
    pub fn points(&self) -> Result<Arc<KeyPoints<C>>, ProverError> {
        self.points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ProverError::HostPointsReleased)
    }

    pub fn has_host_points(&self) -> bool {
        self.points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the host point vectors
    ///
    /// Proofs already running on the CPU keep their own reference and complete.
    pub fn release_host_points(&self) {
        let released = self
            .points
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            tracing::info!(curve = C::NAME, "host proving key points released");
        }
    }

    /// Write the host fields of the key, the device copy is never serialized
    pub fn serialize_with_mode<W: Write>(
        &self,
        mut writer: W,
        compress: Compress,
    ) -> Result<(), ProverError> {
        let points = self.points()?;
        self.domain.serialize_with_mode(&mut writer, compress)?;
        self.g1.serialize_with_mode(&mut writer, compress)?;
        self.g2.serialize_with_mode(&mut writer, compress)?;
        self.infinity_a.serialize_with_mode(&mut writer, compress)?;
        self.infinity_b.serialize_with_mode(&mut writer, compress)?;
        self.infinity_point_indices_k
            .serialize_with_mode(&mut writer, compress)?;
        self.nb_public_wires
            .serialize_with_mode(&mut writer, compress)?;
        self.commitment_info
            .serialize_with_mode(&mut writer, compress)?;
        self.commitment_keys
            .serialize_with_mode(&mut writer, compress)?;
        points.serialize_with_mode(&mut writer, compress)?;
        Ok(())
    }

    pub fn deserialize_with_mode<R: Read>(
        mut reader: R,
        compress: Compress,
        validate: Validate,
    ) -> Result<Self, ProverError> {
        let domain = FftDomain::deserialize_with_mode(&mut reader, compress, validate)?;
        let g1 = G1Constants::deserialize_with_mode(&mut reader, compress, validate)?;
        let g2 = G2Constants::deserialize_with_mode(&mut reader, compress, validate)?;
        let infinity_a = Vec::<bool>::deserialize_with_mode(&mut reader, compress, validate)?;
        let infinity_b = Vec::<bool>::deserialize_with_mode(&mut reader, compress, validate)?;
        let infinity_point_indices_k =
            Vec::<usize>::deserialize_with_mode(&mut reader, compress, validate)?;
        let nb_public_wires = usize::deserialize_with_mode(&mut reader, compress, validate)?;
        let commitment_info =
            Vec::<CommitmentInfo>::deserialize_with_mode(&mut reader, compress, validate)?;
        let commitment_keys =
            Vec::<CommitmentKey<C>>::deserialize_with_mode(&mut reader, compress, validate)?;
        let points = KeyPoints::deserialize_with_mode(&mut reader, compress, validate)?;

        check_domain(&domain)?;
        check_wire_indices(infinity_a.len(), nb_public_wires, &commitment_info)?;
        let pk = Self::new(
            domain,
            g1,
            g2,
            infinity_a,
            infinity_b,
            infinity_point_indices_k,
            nb_public_wires,
            commitment_info,
            commitment_keys,
            points,
        );
        pk.check_shapes()?;
        Ok(pk)
    }

    /// Consistency of the masks with the point vectors
    pub(crate) fn check_shapes(&self) -> Result<(), ProverError> {
        let points = self.points()?;
        let nb_wires = self.nb_wires();
        let expected_k = k_wires(self.nb_public_wires, nb_wires, &self.commitment_info).len();
        let checks = [
            ("infinity_b", self.infinity_b.len(), nb_wires),
            ("A", points.a.len(), nb_wires - self.nb_infinity_a),
            ("B", points.b.len(), nb_wires - self.nb_infinity_b),
            ("G2.B", points.g2_b.len(), nb_wires - self.nb_infinity_b),
            ("K", points.k.len(), expected_k),
            ("Z", points.z.len(), self.domain.size().saturating_sub(1)),
            (
                "commitment keys",
                self.commitment_keys.len(),
                self.commitment_info.len(),
            ),
        ];
        for (what, found, expected) in checks {
            if found != expected {
                return Err(ProverError::Config(format!(
                    "proving key: {what} has {found} entries, expected {expected}"
                )));
            }
        }
        if self
            .infinity_point_indices_k
            .iter()
            .any(|&i| i >= points.k.len() || !points.k[i].infinity)
        {
            return Err(ProverError::Config(
                "proving key: inconsistent K identity indices".into(),
            ));
        }
        Ok(())
    }
}

fn check_domain<F: FftField>(domain: &FftDomain<F>) -> Result<(), ProverError> {
    let cardinality = domain.size();
    if !cardinality.is_power_of_two() || FftDomain::new(cardinality)? != *domain {
        return Err(ProverError::Config(format!(
            "proving key: invalid evaluation domain of size {cardinality}"
        )));
    }
    Ok(())
}

fn check_wire_indices(
    nb_wires: usize,
    nb_public_wires: usize,
    commitment_info: &[CommitmentInfo],
) -> Result<(), ProverError> {
    if nb_public_wires == 0 || nb_public_wires > nb_wires {
        return Err(ProverError::Config(format!(
            "proving key: {nb_public_wires} public wires out of {nb_wires}"
        )));
    }
    for info in commitment_info {
        let wires = info
            .public_committed
            .iter()
            .chain(&info.private_committed)
            .chain([&info.commitment_wire]);
        if let Some(wire) = wires.copied().find(|&wire| wire >= nb_wires) {
            return Err(ProverError::Config(format!(
                "proving key: committed wire {wire} out of {nb_wires}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::seeded_rng;
    use crate::{setup, Bn254, ConstraintSystem, Fr};

    fn committed_key() -> ProvingKey<Bn254> {
        let mut cs = ConstraintSystem::<Fr<Bn254>>::new();
        let y = cs.public_input();
        let x = cs.secret_input();
        let cmt = cs.commit(&[x, y]);
        let xc = cs.mul(x, cmt);
        cs.assert_equal(xc, y);
        let (pk, _) = setup::<Bn254, _>(&cs, &mut seeded_rng()).unwrap();
        pk
    }

    fn reload(pk: &ProvingKey<Bn254>) -> Result<ProvingKey<Bn254>, ProverError> {
        let mut bytes = Vec::new();
        pk.serialize_with_mode(&mut bytes, Compress::No).unwrap();
        ProvingKey::deserialize_with_mode(&bytes[..], Compress::No, Validate::Yes)
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let pk = committed_key();
        assert!(reload(&pk).is_ok());

        let mut bad = committed_key();
        bad.commitment_info[0].commitment_wire = 1000;
        assert!(matches!(reload(&bad), Err(ProverError::Config(_))));

        let mut bad = committed_key();
        bad.commitment_info[0].private_committed.push(usize::MAX);
        assert!(matches!(reload(&bad), Err(ProverError::Config(_))));

        let mut bad = committed_key();
        bad.domain.cardinality = 0;
        assert!(matches!(reload(&bad), Err(ProverError::Config(_))));

        let mut bad = committed_key();
        bad.domain.cardinality = 3;
        assert!(matches!(reload(&bad), Err(ProverError::Config(_))));

        let mut bad = committed_key();
        bad.nb_public_wires = bad.nb_wires() + 1;
        assert!(matches!(reload(&bad), Err(ProverError::Config(_))));
    }

    #[test]
    fn out_of_range_commitment_wires_are_ignored() {
        let info = vec![CommitmentInfo {
            public_committed: vec![],
            private_committed: vec![3, 1000],
            commitment_wire: 1000,
        }];
        assert_eq!(k_wires(1, 5, &info), vec![1, 2, 4]);
    }

    #[test]
    fn k_wire_selection() {
        let info = vec![CommitmentInfo {
            public_committed: vec![1],
            private_committed: vec![3, 5],
            commitment_wire: 6,
        }];
        assert_eq!(k_wires(2, 8, &info), vec![2, 4, 7]);
        assert_eq!(k_wires(2, 5, &[]), vec![2, 3, 4]);
    }

    #[test]
    fn mask_filtering() {
        let wires = [10, 11, 12, 13];
        assert_eq!(
            filter_wires(&wires, &[false, true, false, true]),
            vec![10, 12]
        );
        assert!(filter_wires(&wires, &[true; 4]).is_empty());
    }
}

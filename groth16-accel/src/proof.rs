use crate::curve::{CurveProfile, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

/// Groth16 proof, extended with the Pedersen commitments of the circuit
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Proof<C: CurveProfile> {
    pub ar: G1Affine<C>,
    pub bs: G2Affine<C>,
    pub krs: G1Affine<C>,
    pub commitments: Vec<G1Affine<C>>,
    /// Folded proof of knowledge of the commitment openings
    pub commitment_pok: G1Affine<C>,
}

impl<C: CurveProfile> Proof<C> {
    /// Every point lies on its curve and in the prime order subgroup
    pub fn is_well_formed(&self) -> bool {
        let g1_ok = |p: &G1Affine<C>| {
            p.infinity || (p.is_on_curve() && p.is_in_correct_subgroup_assuming_on_curve())
        };
        let g2_ok = self.bs.infinity
            || (self.bs.is_on_curve() && self.bs.is_in_correct_subgroup_assuming_on_curve());

        g2_ok
            && g1_ok(&self.ar)
            && g1_ok(&self.krs)
            && g1_ok(&self.commitment_pok)
            && self.commitments.iter().all(g1_ok)
    }

    /// Points of the proof that are the identity, which an honest prover never outputs for `ar`
    /// and `bs`
    pub fn has_trivial_points(&self) -> bool {
        self.ar.is_zero() || self.bs.is_zero()
    }
}

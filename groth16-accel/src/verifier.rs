use crate::curve::{CurveProfile, Fr, G1Projective};
use crate::error::VerifyError;
use crate::keys::VerifyingKey;
use crate::pedersen;
use crate::proof::Proof;
use ark_ec::pairing::Pairing;
use ark_ec::{CurveGroup, VariableBaseMSM};
use ark_ff::One;

/// Check a proof against the verifying key and the public inputs
///
/// The proof points are checked first, then the proof of knowledge of the commitments, then
/// `e(Ar, Bs) = e(α, β)·e(Σ, γ)·e(Krs, δ)` where `Σ` folds the public inputs, the commitment
/// wires and the commitments.
pub fn verify<C: CurveProfile>(
    proof: &Proof<C>,
    vk: &VerifyingKey<C>,
    public_inputs: &[Fr<C>],
) -> Result<(), VerifyError> {
    if !proof.is_well_formed() {
        return Err(VerifyError::MalformedProof);
    }
    let expected = vk.nb_public_inputs();
    if public_inputs.len() != expected {
        return Err(VerifyError::PublicInputCount {
            expected,
            found: public_inputs.len(),
        });
    }
    let nb_commitments = vk.commitment_info.len();
    if proof.commitments.len() != nb_commitments {
        return Err(VerifyError::CommitmentCount {
            expected: nb_commitments,
            found: proof.commitments.len(),
        });
    }

    if nb_commitments > 0 {
        let challenge = pedersen::fold_challenge::<C>(&proof.commitments)?;
        pedersen::batch_verify(
            &vk.commitment_key,
            &proof.commitments,
            proof.commitment_pok,
            challenge,
        )?;
    }

    let mut wires = Vec::with_capacity(vk.k.len());
    wires.push(Fr::<C>::one());
    wires.extend_from_slice(public_inputs);
    for (info, commitment) in vk.commitment_info.iter().zip(&proof.commitments) {
        let public = info
            .public_committed
            .iter()
            .map(|&j| wires.get(j).copied().ok_or(VerifyError::MalformedProof))
            .collect::<Result<Vec<_>, _>>()?;
        wires.push(pedersen::commitment_wire_value::<C>(commitment, &public)?);
    }

    let mut sigma = G1Projective::<C>::msm_unchecked(&vk.k, &wires);
    for commitment in &proof.commitments {
        sigma += commitment;
    }

    let res = C::Engine::multi_pairing(
        [
            proof.ar,
            -vk.alpha_g1,
            (-sigma).into_affine(),
            -proof.krs,
        ],
        [proof.bs, vk.beta_g2, vk.gamma_g2, vk.delta_g2],
    );
    if res.0.is_one() {
        Ok(())
    } else {
        Err(VerifyError::PairingCheck)
    }
}

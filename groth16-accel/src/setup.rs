//! Circuit specific Groth16 setup, with a locally sampled toxic waste

use crate::curve::{CurveProfile, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use crate::domain::FftDomain;
use crate::keys::{k_wires, G1Constants, G2Constants, KeyPoints, ProvingKey, VerifyingKey};
use crate::pedersen;
use crate::r1cs::ConstraintSystem;
use crate::ProverError;
use ark_ec::{CurveGroup, PrimeGroup};
use ark_ff::{Field, UniformRand, Zero};
use ark_poly::EvaluationDomain;
use rand::Rng;
use rayon::prelude::*;

fn nonzero<F: Field + UniformRand, R: Rng + ?Sized>(rng: &mut R) -> F {
    loop {
        let x = F::rand(rng);
        if !x.is_zero() {
            return x;
        }
    }
}

fn mul_g1<C: CurveProfile>(scalars: &[Fr<C>]) -> Vec<G1Affine<C>> {
    let g = G1Projective::<C>::generator();
    let points = scalars.par_iter().map(|s| g * s).collect::<Vec<_>>();
    G1Projective::<C>::normalize_batch(&points)
}

fn mul_g2<C: CurveProfile>(scalars: &[Fr<C>]) -> Vec<G2Affine<C>> {
    let g = G2Projective::<C>::generator();
    let points = scalars.par_iter().map(|s| g * s).collect::<Vec<_>>();
    G2Projective::<C>::normalize_batch(&points)
}

/// Generate the proving and verifying keys of `cs`
pub fn setup<C: CurveProfile, R: Rng + ?Sized>(
    cs: &ConstraintSystem<Fr<C>>,
    rng: &mut R,
) -> Result<(ProvingKey<C>, VerifyingKey<C>), ProverError> {
    let domain = FftDomain::<Fr<C>>::new(cs.num_constraints())?;
    let eval_domain = domain.evaluation_domain()?;
    let n = domain.size();

    let tau = loop {
        let tau = Fr::<C>::rand(rng);
        if !eval_domain.evaluate_vanishing_polynomial(tau).is_zero() {
            break tau;
        }
    };
    let alpha: Fr<C> = nonzero(rng);
    let beta: Fr<C> = nonzero(rng);
    let gamma: Fr<C> = nonzero(rng);
    let delta: Fr<C> = nonzero(rng);
    let (Some(gamma_inv), Some(delta_inv)) = (gamma.inverse(), delta.inverse()) else {
        return Err(ProverError::Config("degenerate toxic waste".into()));
    };

    // u, v and w of every wire at tau
    let nb_wires = cs.num_wires();
    let lagrange = eval_domain.evaluate_all_lagrange_coefficients(tau);
    let (mut u, mut v, mut w) = (
        vec![Fr::<C>::zero(); nb_wires],
        vec![Fr::<C>::zero(); nb_wires],
        vec![Fr::<C>::zero(); nb_wires],
    );
    for (i, row) in cs.rows() {
        for (acc, lc) in [(&mut u, &row.a), (&mut v, &row.b), (&mut w, &row.c)] {
            for (coeff, var) in &lc.0 {
                acc[cs.wire_index(*var)] += *coeff * lagrange[i];
            }
        }
    }
    let constraint_term = |j: usize| beta * u[j] + alpha * v[j] + w[j];

    let infinity_a = u.iter().map(Zero::is_zero).collect::<Vec<_>>();
    let infinity_b = v.iter().map(Zero::is_zero).collect::<Vec<_>>();
    let u_kept = u.iter().copied().filter(|x| !x.is_zero()).collect::<Vec<_>>();
    let v_kept = v.iter().copied().filter(|x| !x.is_zero()).collect::<Vec<_>>();

    let commitment_info = cs.commitment_info();
    let nb_public_wires = cs.num_public_wires();
    let k_scalars = k_wires(nb_public_wires, nb_wires, &commitment_info)
        .into_iter()
        .map(|j| constraint_term(j) * delta_inv)
        .collect::<Vec<_>>();
    let infinity_point_indices_k = k_scalars
        .iter()
        .enumerate()
        .filter(|(_, x)| x.is_zero())
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    let vk_scalars = (0..nb_public_wires)
        .chain(commitment_info.iter().map(|info| info.commitment_wire))
        .map(|j| constraint_term(j) * gamma_inv)
        .collect::<Vec<_>>();

    let commitment_bases = commitment_info
        .iter()
        .map(|info| {
            let scalars = info
                .private_committed
                .iter()
                .map(|&j| constraint_term(j) * gamma_inv)
                .collect::<Vec<_>>();
            mul_g1::<C>(&scalars)
        })
        .collect::<Vec<_>>();
    let (commitment_keys, commitment_vk) = pedersen::setup::<C, _>(commitment_bases, rng);

    let t_tau = eval_domain.evaluate_vanishing_polynomial(tau);
    let mut z_scalars = Vec::with_capacity(n - 1);
    let mut acc = t_tau * delta_inv;
    for _ in 0..n - 1 {
        z_scalars.push(acc);
        acc *= tau;
    }

    let points = KeyPoints {
        a: mul_g1::<C>(&u_kept),
        b: mul_g1::<C>(&v_kept),
        k: mul_g1::<C>(&k_scalars),
        z: mul_g1::<C>(&z_scalars),
        g2_b: mul_g2::<C>(&v_kept),
    };

    let g1 = mul_g1::<C>(&[alpha, beta, delta]);
    let g2 = mul_g2::<C>(&[beta, gamma, delta]);

    let vk = VerifyingKey {
        alpha_g1: g1[0],
        beta_g2: g2[0],
        gamma_g2: g2[1],
        delta_g2: g2[2],
        k: mul_g1::<C>(&vk_scalars),
        commitment_key: commitment_vk,
        commitment_info: commitment_info.clone(),
    };

    let pk = ProvingKey::new(
        domain,
        G1Constants {
            alpha: g1[0],
            beta: g1[1],
            delta: g1[2],
        },
        G2Constants {
            beta: g2[0],
            delta: g2[2],
        },
        infinity_a,
        infinity_b,
        infinity_point_indices_k,
        nb_public_wires,
        commitment_info,
        commitment_keys,
        points,
    );
    tracing::debug!(
        curve = C::NAME,
        constraints = cs.num_constraints(),
        wires = nb_wires,
        domain = n,
        "groth16 setup done"
    );
    Ok((pk, vk))
}

//! Proof scheduler
//!
//! A proof request solves the circuit, then runs its stages concurrently:
//! - Ar1, Bs1 and Bs2 over the infinity filtered wire values
//! - Krs over the private, non committed wire values
//! - H then Krs2 over the solver evaluations
//! - the proof of knowledge of the commitments
//!
//! Results are joined in arrival order. The first failing stage raises the abort signal, the
//! siblings that have not started yet return [`ProverError::Cancelled`] and the request reports the
//! first real error.

use crate::config::{Backend, ProverConfig};
use crate::curve::{CurveProfile, Fr, G1Affine, G1Projective, G2Projective};
use crate::device_key::StageDevices;
use crate::error::Stage;
use crate::executor::{CpuExecutor, DeviceExecutor, StageExecutor};
use crate::keys::{filter_wires, k_wires, ProvingKey};
use crate::pedersen;
use crate::proof::Proof;
use crate::r1cs::{ConstraintSystem, Solution};
use crate::ProverError;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::UniformRand;
use crossbeam::channel::{unbounded, Sender};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use zk_device_backend::DeviceContext;

/// Raised once by the first failing stage of a request
#[derive(Clone, Debug, Default)]
pub(crate) struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), ProverError> {
        if self.is_raised() {
            Err(ProverError::Cancelled)
        } else {
            Ok(())
        }
    }
}

enum StageOutput<C: CurveProfile> {
    Ar1(G1Projective<C>),
    Bs1(G1Projective<C>),
    Bs2(G2Projective<C>),
    Krs(G1Projective<C>),
    Krs2(G1Projective<C>),
    Pok(G1Affine<C>),
}

type StageMessage<C> = (Stage, Result<StageOutput<C>, ProverError>);

fn spawn_stage<'scope, C, F>(
    scope: &'scope std::thread::Scope<'scope, '_>,
    stage: Stage,
    abort: &AbortSignal,
    tx: &Sender<StageMessage<C>>,
    job: F,
) where
    C: CurveProfile,
    F: FnOnce() -> Result<StageOutput<C>, ProverError> + Send + 'scope,
{
    let abort = abort.clone();
    let tx = tx.clone();
    scope.spawn(move || {
        let res = abort.check().and_then(|()| {
            let start = Instant::now();
            let res = job();
            tracing::debug!(took = ?start.elapsed(), "{stage}");
            res
        });
        if res.is_err() {
            abort.raise();
        }
        // The receiver lives until every stage has reported
        let _ = tx.send((stage, res));
    });
}

/// Groth16 prover bound to a backend
///
/// A prover holds the device context, proving keys keep their own device copy. One prover can run
/// any number of requests concurrently, on any number of keys.
#[derive(Debug)]
pub struct Prover {
    config: ProverConfig,
    context: Option<DeviceContext>,
    devices: Option<StageDevices>,
}

impl Prover {
    /// Resolve the backend and initialize the devices
    ///
    /// Unknown backends are reported right away. A device initialization failure falls back to the
    /// CPU only when `fallback_to_cpu` is set.
    pub fn new(config: ProverConfig) -> Result<Self, ProverError> {
        let backend = config.backend()?;
        let (context, devices) = match backend {
            Backend::Cpu => (None, None),
            Backend::Emulated => match Self::init_devices(&config) {
                Ok((ctx, devices)) => (Some(ctx), Some(devices)),
                Err(err) if config.fallback_to_cpu => {
                    tracing::warn!(%err, "device initialization failed, proving on the CPU");
                    (None, None)
                }
                Err(err) => return Err(err),
            },
        };
        Ok(Self {
            config,
            context,
            devices,
        })
    }

    fn init_devices(config: &ProverConfig) -> Result<(DeviceContext, StageDevices), ProverError> {
        config.validate_devices()?;
        let ctx = DeviceContext::new(&config.device)
            .map_err(|err| ProverError::Config(format!("device context: {err}")))?;
        let devices = StageDevices::round_robin(&config.device_ids)?;
        Ok((ctx, devices))
    }

    pub fn config(&self) -> &ProverConfig {
        &self.config
    }

    pub fn context(&self) -> Option<&DeviceContext> {
        self.context.as_ref()
    }

    pub fn stage_devices(&self) -> Option<StageDevices> {
        self.devices
    }

    pub fn is_accelerated(&self) -> bool {
        self.context.is_some()
    }

    /// Prove with fresh randomness
    pub fn prove<C: CurveProfile>(
        &self,
        cs: &ConstraintSystem<Fr<C>>,
        pk: &ProvingKey<C>,
        public: &[Fr<C>],
        secret: &[Fr<C>],
    ) -> Result<Proof<C>, ProverError> {
        self.prove_with_rng(cs, pk, public, secret, &mut rand::thread_rng())
    }

    pub fn prove_with_rng<C: CurveProfile, R: Rng + ?Sized>(
        &self,
        cs: &ConstraintSystem<Fr<C>>,
        pk: &ProvingKey<C>,
        public: &[Fr<C>],
        secret: &[Fr<C>],
        rng: &mut R,
    ) -> Result<Proof<C>, ProverError> {
        let start = Instant::now();
        if cs.num_wires() != pk.nb_wires() || cs.num_constraints() > pk.domain.size() {
            return Err(ProverError::Config(format!(
                "proving key of {} wires does not match a circuit of {} wires and {} constraints",
                pk.nb_wires(),
                cs.num_wires(),
                cs.num_constraints()
            )));
        }

        // Backend first, a released key must fail before any work
        let device_key = match (&self.context, self.devices) {
            (Some(ctx), Some(devices)) => {
                match pk.device_key(ctx, devices, self.config.free_host_points) {
                    Ok(key) => Some(key),
                    Err(err) if self.config.fallback_to_cpu => {
                        tracing::warn!(%err, "device key setup failed, proving on the CPU");
                        None
                    }
                    Err(err) => return Err(err),
                }
            }
            _ => None,
        };
        let executor: Box<dyn StageExecutor<C> + '_> = match device_key {
            Some(key) => Box::new(DeviceExecutor::new(
                key,
                &pk.infinity_point_indices_k,
                self.config.krs2_split,
            )),
            None => Box::new(CpuExecutor::new(
                pk.points()?,
                &pk.domain,
                self.config.nb_tasks(),
            )),
        };

        let nb_commitments = pk.commitment_info.len();
        let mut commitments = vec![G1Affine::<C>::zero(); nb_commitments];
        let mut committed_values = vec![Vec::new(); nb_commitments];
        let Solution { a, b, c, w } = cs.solve(public, secret, |index, private, public| {
            let key = pk
                .commitment_keys
                .get(index)
                .ok_or("no commitment key")?;
            let commitment = key.commit(private).map_err(|err| err.to_string())?;
            commitments[index] = commitment;
            committed_values[index] = private.to_vec();
            pedersen::commitment_wire_value::<C>(&commitment, public).map_err(|err| err.to_string())
        })?;
        tracing::debug!(took = ?start.elapsed(), "solver");

        let r = Fr::<C>::rand(rng);
        let s = Fr::<C>::rand(rng);
        let kr = -(r * s);
        let delta = pk.g1.delta;
        let (delta_r, delta_s, delta_kr) = (delta * r, delta * s, delta * kr);

        let wire_values_a = filter_wires(&w, &pk.infinity_a);
        let wire_values_b = filter_wires(&w, &pk.infinity_b);
        let wire_values_k = k_wires(pk.nb_public_wires, w.len(), &pk.commitment_info)
            .into_iter()
            .map(|j| w[j])
            .collect::<Vec<_>>();
        drop(w);

        let abort = AbortSignal::default();
        let (tx, rx) = unbounded::<StageMessage<C>>();
        let executor = executor.as_ref();
        let (g1, g2) = (&pk.g1, &pk.g2);

        let mut krs = delta_kr;
        let mut ar = None;
        let mut bs = None;
        let mut pok = (nb_commitments == 0).then(G1Affine::<C>::zero);
        let mut pending_krs = 4;
        let mut first_error = None;

        std::thread::scope(|scope| {
            spawn_stage(scope, Stage::MsmAr1, &abort, &tx, || {
                let ar1 = executor.msm_a(&wire_values_a)? + g1.alpha + delta_r;
                Ok(StageOutput::Ar1(ar1))
            });
            spawn_stage(scope, Stage::MsmBs1, &abort, &tx, || {
                let bs1 = executor.msm_b_g1(&wire_values_b)? + g1.beta + delta_s;
                Ok(StageOutput::Bs1(bs1))
            });
            spawn_stage(scope, Stage::MsmBs2, &abort, &tx, || {
                let bs2 = executor.msm_b_g2(&wire_values_b)? + g2.delta * s + g2.beta;
                Ok(StageOutput::Bs2(bs2))
            });
            spawn_stage(scope, Stage::MsmKrs, &abort, &tx, || {
                Ok(StageOutput::Krs(executor.msm_k(&wire_values_k)?))
            });
            let h_abort = abort.clone();
            spawn_stage(scope, Stage::MsmKrs2, &abort, &tx, move || {
                Ok(StageOutput::Krs2(executor.krs2(a, b, c, &h_abort)?))
            });
            if nb_commitments > 0 {
                let (keys, values, commitments) =
                    (&pk.commitment_keys, &committed_values, &commitments);
                spawn_stage(scope, Stage::CommitmentPok, &abort, &tx, move || {
                    let challenge = pedersen::fold_challenge::<C>(commitments)?;
                    Ok(StageOutput::Pok(pedersen::batch_prove(
                        keys, values, challenge,
                    )?))
                });
            }
            drop(tx);

            for (stage, res) in rx.iter() {
                match res {
                    Ok(StageOutput::Ar1(ar1)) => {
                        krs += ar1 * s;
                        ar = Some(ar1);
                        pending_krs -= 1;
                    }
                    Ok(StageOutput::Bs1(bs1)) => {
                        krs += bs1 * r;
                        pending_krs -= 1;
                    }
                    Ok(StageOutput::Krs(part) | StageOutput::Krs2(part)) => {
                        krs += part;
                        pending_krs -= 1;
                    }
                    Ok(StageOutput::Bs2(bs2)) => bs = Some(bs2),
                    Ok(StageOutput::Pok(p)) => pok = Some(p),
                    Err(ProverError::Cancelled) => {
                        tracing::trace!("{stage} cancelled");
                    }
                    Err(err) => {
                        tracing::debug!(%err, "{stage} failed");
                        first_error.get_or_insert(err);
                    }
                }
            }
        });

        if let Some(err) = first_error {
            return Err(err);
        }
        let (Some(ar), Some(bs), Some(pok), 0) = (ar, bs, pok, pending_krs) else {
            return Err(ProverError::Cancelled);
        };

        let proof = Proof {
            ar: ar.into_affine(),
            bs: bs.into_affine(),
            krs: krs.into_affine(),
            commitments,
            commitment_pok: pok,
        };
        if !proof.is_well_formed() {
            return Err(ProverError::invariant(
                Stage::ProofAssembly,
                "assembled proof is not in the prime order subgroup",
            ));
        }
        tracing::debug!(
            curve = C::NAME,
            backend = executor.name(),
            constraints = cs.num_constraints(),
            took = ?start.elapsed(),
            "proof done"
        );
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_signal_is_shared() {
        let abort = AbortSignal::default();
        let sibling = abort.clone();
        assert!(sibling.check().is_ok());
        abort.raise();
        assert!(sibling.is_raised());
        assert!(matches!(sibling.check(), Err(ProverError::Cancelled)));
    }

    #[test]
    fn unknown_backend_fails_before_any_work() {
        crate::test_utils::init_tracing();
        let config = ProverConfig {
            backend: "icicle".into(),
            fallback_to_cpu: true,
            ..ProverConfig::default()
        };
        assert!(matches!(
            Prover::new(config),
            Err(ProverError::UnavailableBackend(name)) if name == "icicle"
        ));
    }
}

//! Stage executors
//!
//! The scheduler runs the same dependency graph on the CPU or on the devices, only the way each
//! stage is computed changes.

use crate::curve::{CurveProfile, Fr, G1Affine, G1Projective, G2Projective};
use crate::device_key::DeviceProvingKey;
use crate::domain::FftDomain;
use crate::error::{check_len, Stage, StageContext};
use crate::h_poly::{compute_h_cpu, compute_h_device};
use crate::keys::KeyPoints;
use crate::prover::AbortSignal;
use crate::ProverError;
use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ec::VariableBaseMSM;
use ark_ff::Zero;
use rayon::prelude::*;
use std::sync::Arc;
use zk_device_backend::kernels::{from_montgomery_async, msm_async, to_montgomery_async};
use zk_device_backend::{DeviceError, DeviceRepr, DeviceSlice, DeviceVec, Stream};

pub(crate) trait StageExecutor<C: CurveProfile>: Sync {
    fn name(&self) -> &'static str;

    /// `sum(wireValuesA[i] * A[i])`
    fn msm_a(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError>;

    fn msm_b_g1(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError>;

    fn msm_b_g2(&self, scalars: &[Fr<C>]) -> Result<G2Projective<C>, ProverError>;

    /// `scalars` are paired with every point of the host K, identity points included
    fn msm_k(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError>;

    /// H from the solver evaluations, then `sum(H[i] * Z[i])` for `i < n - 1`
    fn krs2(
        &self,
        a: Vec<Fr<C>>,
        b: Vec<Fr<C>>,
        c: Vec<Fr<C>>,
        abort: &AbortSignal,
    ) -> Result<G1Projective<C>, ProverError>;
}

/// Split a multi-exponentiation in `nb_tasks` chunks
fn msm_chunked<P: SWCurveConfig>(
    bases: &[Affine<P>],
    scalars: &[P::ScalarField],
    nb_tasks: usize,
) -> Projective<P> {
    let chunk = scalars.len().div_ceil(nb_tasks).max(1);
    bases
        .par_chunks(chunk)
        .zip(scalars.par_chunks(chunk))
        .map(|(bases, scalars)| Projective::<P>::msm_unchecked(bases, scalars))
        .reduce(Projective::<P>::zero, |acc, part| acc + part)
}

pub(crate) struct CpuExecutor<'a, C: CurveProfile> {
    points: Arc<KeyPoints<C>>,
    domain: &'a FftDomain<Fr<C>>,
    nb_tasks: usize,
}

impl<'a, C: CurveProfile> CpuExecutor<'a, C> {
    pub(crate) fn new(
        points: Arc<KeyPoints<C>>,
        domain: &'a FftDomain<Fr<C>>,
        nb_tasks: usize,
    ) -> Self {
        Self {
            points,
            domain,
            nb_tasks: nb_tasks.max(1),
        }
    }
}

impl<C: CurveProfile> StageExecutor<C> for CpuExecutor<'_, C> {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn msm_a(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError> {
        check_len(Stage::MsmAr1, "wireValuesA", scalars.len(), self.points.a.len())?;
        Ok(msm_chunked(&self.points.a, scalars, self.nb_tasks))
    }

    fn msm_b_g1(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError> {
        check_len(Stage::MsmBs1, "wireValuesB", scalars.len(), self.points.b.len())?;
        Ok(msm_chunked(&self.points.b, scalars, self.nb_tasks))
    }

    fn msm_b_g2(&self, scalars: &[Fr<C>]) -> Result<G2Projective<C>, ProverError> {
        check_len(
            Stage::MsmBs2,
            "wireValuesB",
            scalars.len(),
            self.points.g2_b.len(),
        )?;
        Ok(msm_chunked(&self.points.g2_b, scalars, self.nb_tasks))
    }

    fn msm_k(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError> {
        check_len(Stage::MsmKrs, "wireValuesK", scalars.len(), self.points.k.len())?;
        Ok(msm_chunked(&self.points.k, scalars, self.nb_tasks))
    }

    fn krs2(
        &self,
        a: Vec<Fr<C>>,
        b: Vec<Fr<C>>,
        c: Vec<Fr<C>>,
        abort: &AbortSignal,
    ) -> Result<G1Projective<C>, ProverError> {
        let h = compute_h_cpu(self.domain, a, b, c)?;
        abort.check()?;
        let n = self.domain.size();
        if h.len() != n {
            return Err(ProverError::invariant(
                Stage::HComputation,
                format!("H has {} coefficients, expected {n}", h.len()),
            ));
        }
        check_len(Stage::MsmKrs2, "H", n - 1, self.points.z.len())?;
        Ok(msm_chunked(&self.points.z, &h[..n - 1], self.nb_tasks))
    }
}

/// MSM enqueued on a stream, its single output point is read back by [`PendingMsm::wait`]
struct PendingMsm<P: SWCurveConfig>
where
    P::BaseField: DeviceRepr,
{
    out: DeviceVec<Projective<P>>,
}

impl<P: SWCurveConfig> PendingMsm<P>
where
    P::BaseField: DeviceRepr,
    P::ScalarField: DeviceRepr,
{
    fn enqueue(
        scalars: DeviceSlice<'_, P::ScalarField>,
        points: DeviceSlice<'_, Affine<P>>,
        stream: &Stream,
    ) -> zk_device_backend::Result<Self> {
        let mut out = DeviceVec::new_zeroed(1, stream.device())?;
        msm_async(scalars, points, &mut out, stream)?;
        to_montgomery_async(&mut out, stream)?;
        Ok(Self { out })
    }

    /// Upload host scalars in front of the MSM
    fn enqueue_host(
        scalars: &[P::ScalarField],
        points: DeviceSlice<'_, Affine<P>>,
        stream: &Stream,
    ) -> zk_device_backend::Result<Self> {
        let mut d_scalars = DeviceVec::from_host_async(scalars, stream)?;
        from_montgomery_async(&mut d_scalars, stream)?;
        let pending = Self::enqueue(d_scalars.as_slice(..), points, stream)?;
        d_scalars.free_async(stream)?;
        Ok(pending)
    }

    fn wait(self, stream: &Stream) -> zk_device_backend::Result<Projective<P>> {
        self.out
            .to_host(stream)?
            .into_iter()
            .next()
            .ok_or(DeviceError::LengthMismatch {
                op: "msm_output",
                left: 0,
                right: 1,
            })
    }
}

pub(crate) struct DeviceExecutor<'a, C: CurveProfile> {
    key: Arc<DeviceProvingKey<C>>,
    infinity_k: &'a [usize],
    krs2_split: bool,
}

impl<'a, C: CurveProfile> DeviceExecutor<'a, C> {
    pub(crate) fn new(
        key: Arc<DeviceProvingKey<C>>,
        infinity_k: &'a [usize],
        krs2_split: bool,
    ) -> Self {
        Self {
            key,
            infinity_k,
            krs2_split,
        }
    }

    fn msm_g1(
        stage: Stage,
        what: &str,
        scalars: &[Fr<C>],
        points: &DeviceVec<G1Affine<C>>,
    ) -> Result<G1Projective<C>, ProverError> {
        check_len(stage, what, scalars.len(), points.len())?;
        let stream = points.device().create_stream();
        PendingMsm::<C::G1Config>::enqueue_host(scalars, points.as_slice(..), &stream)
            .and_then(|pending| pending.wait(&stream))
            .stage(stage)
    }
}

impl<C: CurveProfile> StageExecutor<C> for DeviceExecutor<'_, C> {
    fn name(&self) -> &'static str {
        "emulated"
    }

    fn msm_a(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError> {
        Self::msm_g1(Stage::MsmAr1, "wireValuesA", scalars, &self.key.a)
    }

    fn msm_b_g1(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError> {
        Self::msm_g1(Stage::MsmBs1, "wireValuesB", scalars, &self.key.b)
    }

    fn msm_b_g2(&self, scalars: &[Fr<C>]) -> Result<G2Projective<C>, ProverError> {
        let stage = Stage::MsmBs2;
        let points = &self.key.g2_b;
        check_len(stage, "wireValuesB", scalars.len(), points.len())?;
        let stream = points.device().create_stream();
        PendingMsm::<C::G2Config>::enqueue_host(scalars, points.as_slice(..), &stream)
            .and_then(|pending| pending.wait(&stream))
            .stage(stage)
    }

    fn msm_k(&self, scalars: &[Fr<C>]) -> Result<G1Projective<C>, ProverError> {
        let stage = Stage::MsmKrs;
        check_len(
            stage,
            "wireValuesK",
            scalars.len(),
            self.key.k.len() + self.infinity_k.len(),
        )?;
        // The device copy of K has no identity point
        let mut skip = vec![false; scalars.len()];
        for &i in self.infinity_k {
            if let Some(skip) = skip.get_mut(i) {
                *skip = true;
            }
        }
        let filtered = scalars
            .iter()
            .zip(&skip)
            .filter(|(_, &skip)| !skip)
            .map(|(s, _)| *s)
            .collect::<Vec<_>>();
        Self::msm_g1(stage, "filtered wireValuesK", &filtered, &self.key.k)
    }

    fn krs2(
        &self,
        a: Vec<Fr<C>>,
        b: Vec<Fr<C>>,
        c: Vec<Fr<C>>,
        abort: &AbortSignal,
    ) -> Result<G1Projective<C>, ProverError> {
        let stage = Stage::MsmKrs2;
        let device = self.key.z.device();
        let start = std::time::Instant::now();
        let h = compute_h_device(&self.key.ntt, &self.key.den, a, b, c, device)?;
        tracing::debug!(took = ?start.elapsed(), "{}", Stage::HComputation);
        abort.check()?;

        let n = self.key.domain_size();
        if h.len() != n {
            return Err(ProverError::invariant(
                Stage::HComputation,
                format!("H has {} coefficients, expected {n}", h.len()),
            ));
        }
        check_len(stage, "H", n, self.key.z.len())?;

        let len = n - 1;
        let stream = device.create_stream();
        if self.krs2_split {
            let half = len / 2;
            let other = device.create_stream();
            let lo = PendingMsm::<C::G1Config>::enqueue(
                h.as_slice(..half),
                self.key.z.as_slice(..half),
                &stream,
            )
            .stage(stage)?;
            let hi = PendingMsm::<C::G1Config>::enqueue(
                h.as_slice(half..len),
                self.key.z.as_slice(half..len),
                &other,
            )
            .stage(stage)?;
            Ok(lo.wait(&stream).stage(stage)? + hi.wait(&other).stage(stage)?)
        } else {
            PendingMsm::<C::G1Config>::enqueue(
                h.as_slice(..len),
                self.key.z.as_slice(..len),
                &stream,
            )
            .and_then(|pending| pending.wait(&stream))
            .stage(stage)
        }
    }
}

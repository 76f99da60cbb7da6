//! Device resident copy of a proving key
//!
//! Every point vector is materialized on the device of the stage that consumes it, the NTT tables
//! and the coset denominator go with Z to the device computing H and Krs2.

use crate::curve::{CurveProfile, Fr, G1Affine, G2Affine};
use crate::error::{Stage, StageContext};
use crate::keys::ProvingKey;
use crate::ProverError;
use ark_ec::AffineRepr;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use zk_device_backend::kernels::{from_montgomery_async, DeviceNttDomain};
use zk_device_backend::{DeviceContext, DeviceRepr, DeviceVec, Stream};

/// Device of every accelerated stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StageDevices {
    /// H computation and Krs2
    pub h: usize,
    pub ar: usize,
    pub bs2: usize,
    pub bs1: usize,
    pub krs: usize,
}

impl StageDevices {
    /// Assign `ids` to the stages in turn
    pub fn round_robin(ids: &[usize]) -> Result<Self, ProverError> {
        if ids.is_empty() {
            return Err(ProverError::Config("no device to assign stages to".into()));
        }
        let id = |i: usize| ids[i % ids.len()];
        Ok(Self {
            h: id(0),
            ar: id(1),
            bs2: id(2),
            bs1: id(3),
            krs: id(4),
        })
    }

    pub fn single(id: usize) -> Self {
        Self {
            h: id,
            ar: id,
            bs2: id,
            bs1: id,
            krs: id,
        }
    }

    /// Distinct devices in use
    pub fn distinct(&self) -> usize {
        [self.h, self.ar, self.bs2, self.bs1, self.krs]
            .into_iter()
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Proving key points in device memory, standard form
///
/// `k` is stripped of its identity points and `z` is padded with one identity point to the domain
/// size.
#[derive(Debug)]
pub struct DeviceProvingKey<C: CurveProfile> {
    pub devices: StageDevices,
    pub(crate) a: DeviceVec<G1Affine<C>>,
    pub(crate) b: DeviceVec<G1Affine<C>>,
    pub(crate) g2_b: DeviceVec<G2Affine<C>>,
    pub(crate) k: DeviceVec<G1Affine<C>>,
    pub(crate) z: DeviceVec<G1Affine<C>>,
    pub(crate) ntt: DeviceNttDomain<Fr<C>>,
    pub(crate) den: DeviceVec<Fr<C>>,
}

fn upload<T: DeviceRepr>(src: &[T], stream: &Stream) -> zk_device_backend::Result<DeviceVec<T>> {
    let mut buf = DeviceVec::from_host_async(src, stream)?;
    from_montgomery_async(&mut buf, stream)?;
    Ok(buf)
}

impl<C: CurveProfile> DeviceProvingKey<C> {
    fn new(
        pk: &ProvingKey<C>,
        ctx: &DeviceContext,
        devices: StageDevices,
    ) -> Result<Self, ProverError> {
        let stage = Stage::DeviceKeySetup;
        let points = pk.points()?;
        let n = pk.domain.size();
        let stream = |id: usize| -> Result<Stream, ProverError> {
            Ok(ctx.device(id).stage(stage)?.create_stream())
        };
        let (h, ar, bs2, bs1, krs) = (
            stream(devices.h)?,
            stream(devices.ar)?,
            stream(devices.bs2)?,
            stream(devices.bs1)?,
            stream(devices.krs)?,
        );

        let mut skip = vec![false; points.k.len()];
        for &i in &pk.infinity_point_indices_k {
            if let Some(skip) = skip.get_mut(i) {
                *skip = true;
            }
        }
        let k = points
            .k
            .iter()
            .zip(&skip)
            .filter(|(_, &skip)| !skip)
            .map(|(p, _)| *p)
            .collect::<Vec<_>>();

        let mut z = Vec::with_capacity(n);
        z.extend_from_slice(&points.z);
        z.push(G1Affine::<C>::zero());

        let den = vec![pk.domain.coset_denominator(pk.domain.coset_generator)?; n];

        let key = Self {
            devices,
            a: upload(&points.a, &ar).stage(stage)?,
            b: upload(&points.b, &bs1).stage(stage)?,
            g2_b: upload(&points.g2_b, &bs2).stage(stage)?,
            k: upload(&k, &krs).stage(stage)?,
            z: upload(&z, &h).stage(stage)?,
            den: upload(&den, &h).stage(stage)?,
            ntt: DeviceNttDomain::new(n, pk.domain.coset_generator, &h).stage(stage)?,
        };
        for stream in [&h, &ar, &bs2, &bs1, &krs] {
            stream.synchronize().stage(stage)?;
        }
        Ok(key)
    }

    /// Length of the domain the key was built for
    pub fn domain_size(&self) -> usize {
        self.ntt.size()
    }

    /// Whether every stage's points live on the matching device of `ctx`
    pub fn is_resident_in(&self, ctx: &DeviceContext) -> bool {
        let devices = self.devices;
        [
            (devices.h, self.z.device()),
            (devices.ar, self.a.device()),
            (devices.bs1, self.b.device()),
            (devices.bs2, self.g2_b.device()),
            (devices.krs, self.k.device()),
        ]
        .into_iter()
        .all(|(id, resident)| ctx.device(id).is_ok_and(|device| device.same_device(resident)))
    }
}

impl<C: CurveProfile> ProvingKey<C> {
    /// Device copy of the key, built on first call
    ///
    /// Later calls return the cached copy without any allocation or transfer. The copy stays on
    /// the devices it was first built on, asking for another placement or another context is an
    /// error. With
    /// `free_host_points` the host point vectors are released once the copy is resident.
    pub fn device_key(
        &self,
        ctx: &DeviceContext,
        devices: StageDevices,
        free_host_points: bool,
    ) -> Result<Arc<DeviceProvingKey<C>>, ProverError> {
        let cached = |key: &Arc<DeviceProvingKey<C>>| {
            if key.devices != devices {
                Err(ProverError::Config(format!(
                    "proving key is resident on {:?}, requested {devices:?}",
                    key.devices
                )))
            } else if !key.is_resident_in(ctx) {
                Err(ProverError::Config(
                    "proving key is resident in another device context".into(),
                ))
            } else {
                Ok(key.clone())
            }
        };

        if let Some(key) = self.device.get() {
            return cached(key);
        }
        let _guard = self
            .device_init
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = self.device.get() {
            return cached(key);
        }

        let start = std::time::Instant::now();
        let key = Arc::new(DeviceProvingKey::new(self, ctx, devices)?);
        let key = self.device.get_or_init(|| key).clone();
        tracing::info!(
            curve = C::NAME,
            domain = key.domain_size(),
            devices = devices.distinct(),
            took = ?start.elapsed(),
            "proving key resident on device"
        );

        if free_host_points {
            self.release_host_points();
        }
        Ok(key)
    }

    pub fn is_on_device(&self) -> bool {
        self.device.get().is_some()
    }
}

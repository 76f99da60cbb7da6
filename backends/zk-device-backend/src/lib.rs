//! Emulated accelerator backend for zk-SNARK primitives
//!
//! This crate exposes the device-side building blocks of a proving pipeline: device memory,
//! ordered execution streams, Montgomery conversion kernels, number-theoretic transforms,
//! element-wise vector operations and multi-scalar multiplication over short Weierstrass curves.
//!
//! ## Overview
//!
//! The accelerator is a software device. Every [`Device`] owns a bounded memory pool, and work is
//! submitted to a [`Stream`], which executes it in submission order on a dedicated worker.
//! Kernels use rayon for data parallelism. The ownership contract is the same as a CUDA backend:
//! - buffers are owned, move-only [`DeviceVec`] handles bound to a single device
//! - `*_async` functions only enqueue work, results are observable after [`Stream::synchronize`]
//! - every allocation is released exactly once, either on drop or through
//!   [`DeviceVec::free_async`] once the stream reaches that point
//!
//! ## Montgomery Form Convention
//!
//! Host copies move the raw limbs of arkworks elements, which are stored in Montgomery form.
//! Kernels operate on the standard (canonical) representation only:
//! - **Input**: call [`kernels::from_montgomery_async`] after every host-to-device copy
//! - **Output**: call [`kernels::to_montgomery_async`] before reading a buffer back to the host
//!
//! Skipping either conversion does not crash, it silently produces wrong values.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ark_bn254::{Fr, G1Affine, G1Projective};
//! use zk_device_backend::kernels::{from_montgomery_async, msm_async, to_montgomery_async};
//! use zk_device_backend::{DeviceConfig, DeviceContext, DeviceVec};
//!
//! # fn run(points: &[G1Affine], scalars: &[Fr]) -> zk_device_backend::Result<()> {
//! let ctx = DeviceContext::new(&DeviceConfig::default())?;
//! let device = ctx.device(0)?;
//! let stream = device.create_stream();
//!
//! let mut d_points = DeviceVec::from_host_async(points, &stream)?;
//! let mut d_scalars = DeviceVec::from_host_async(scalars, &stream)?;
//! from_montgomery_async(&mut d_points, &stream)?;
//! from_montgomery_async(&mut d_scalars, &stream)?;
//!
//! let mut out = DeviceVec::<G1Projective>::new_zeroed(1, device)?;
//! msm_async(d_scalars.as_slice(..), d_points.as_slice(..), &mut out, &stream)?;
//! to_montgomery_async(&mut out, &stream)?;
//! let result = out.to_host(&stream)?[0];
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod kernels;
pub mod repr;
pub mod stream;
pub mod vec;

use std::time::Duration;
use thiserror::Error;

pub use config::DeviceConfig;
pub use device::{Device, DeviceContext, MemoryStats};
pub use kernels::{NttConfig, NttDirection, Ordering};
pub use repr::DeviceRepr;
pub use stream::Stream;
pub use vec::{DeviceSlice, DeviceVec};

/// Error reported by the device layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error(
        "device {device}: out of memory (requested {requested} bytes, {available} bytes available)"
    )]
    OutOfMemory {
        device: usize,
        requested: usize,
        available: usize,
    },

    #[error("unknown device id {0}")]
    InvalidDevice(usize),

    #[error("buffer lives on device {found} but the stream runs on device {expected}")]
    DeviceMismatch { expected: usize, found: usize },

    #[error("{op}: length mismatch ({left} vs {right})")]
    LengthMismatch {
        op: &'static str,
        left: usize,
        right: usize,
    },

    #[error("{op}: element {index} is not a canonical encoding")]
    InvalidElement { op: &'static str, index: usize },

    #[error("kernel {kernel} failed: {reason}")]
    Kernel {
        kernel: &'static str,
        reason: String,
    },

    #[error("stream synchronization timed out after {0:?}")]
    Timeout(Duration),

    #[error("stream worker is no longer running")]
    StreamClosed,

    #[error("invalid device configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
pub(crate) mod test_utils {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .with_file(false)
            .with_line_number(false)
            .without_time()
            .try_init();
    }

    pub fn seeded_rng() -> StdRng {
        let seed = std::env::var("ZK_DEVICE_TEST_SEED")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0x5eed_0f_de71ce);
        StdRng::seed_from_u64(seed)
    }
}

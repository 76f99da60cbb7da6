//! Device kernels
//!
//! Every function in this module only enqueues work on the given stream.
//!
//! # Synchronization
//!
//! [`crate::Stream::synchronize`] __must__ be called before the results are read, and
//! a buffer must not be read back before the stream that produced it has been synchronized.

mod convert;
mod msm;
mod ntt;
mod vec_ops;

pub use convert::{from_montgomery_async, to_montgomery_async};
pub use msm::{msm_async, msm_window_size};
pub use ntt::{ntt_async, DeviceNttDomain, NttConfig, NttDirection, Ordering};
pub use vec_ops::{add_assign_async, mul_assign_async, sub_assign_async};

use crate::device::Device;
use crate::repr::{stage_raw, unstage_raw, DeviceRepr};
use crate::stream::Stream;
use crate::{DeviceError, Result};
use std::collections::Bound::{Excluded, Included, Unbounded};
use std::marker::PhantomData;
use std::ops::{Range, RangeBounds};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// One region of device memory
///
/// Kernels in flight keep a reference on the region they use, the bytes go back to the pool when
/// the last reference is dropped.
#[derive(Debug)]
pub(crate) struct Allocation {
    pub(crate) words: RwLock<Vec<u64>>,
    bytes: usize,
    device: Device,
}

impl Allocation {
    fn new(words: usize, device: &Device) -> Result<Self> {
        let bytes = words * std::mem::size_of::<u64>();
        device.reserve(bytes)?;
        Ok(Self {
            words: RwLock::new(vec![0u64; words]),
            bytes,
            device: device.clone(),
        })
    }

    pub(crate) fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<u64>> {
        self.words.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<u64>> {
        self.words.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.device.release(self.bytes);
    }
}

/// A contiguous array of `T` stored in device memory.
///
/// Note:
/// -----
///
/// Such a structure:
/// + is bound to the device it was allocated on
/// + can not be copied or cloned but can be (mutably) borrowed
/// + gives its memory back on drop, or through [`DeviceVec::free_async`] once a stream reaches
///   that point
///
/// Put differently, it owns a region of the device memory at a given time. For this reason,
/// regarding memory, it is pretty close to a `Vec`. The content is raw words, it is up to the
/// caller to track whether they hold the host or the standard encoding.
#[derive(Debug)]
pub struct DeviceVec<T: DeviceRepr> {
    pub(crate) alloc: Arc<Allocation>,
    len: usize,
    _phantom: PhantomData<T>,
}

impl<T: DeviceRepr> DeviceVec<T> {
    /// Allocate `len` zeroed elements on `device`
    pub fn new_zeroed(len: usize, device: &Device) -> Result<Self> {
        Ok(Self {
            alloc: Arc::new(Allocation::new(len * T::WORDS, device)?),
            len,
            _phantom: PhantomData,
        })
    }

    /// Allocate and fill a buffer from host memory, blocking until the copy is done
    pub fn from_host(src: &[T], stream: &Stream) -> Result<Self> {
        let vec = Self::from_host_async(src, stream)?;
        stream.synchronize()?;
        Ok(vec)
    }

    /// Allocate a buffer on the device of `stream` and enqueue the copy of `src`
    ///
    /// The host data is staged at submission, `src` may be dropped right away.
    pub fn from_host_async(src: &[T], stream: &Stream) -> Result<Self> {
        let mut res = Self::new_zeroed(src.len(), stream.device())?;
        if !src.is_empty() {
            res.copy_from_host_async(src, stream)?;
        }
        Ok(res)
    }

    /// Copies data from slice into the first `src.len()` elements
    pub fn copy_from_host_async(&mut self, src: &[T], stream: &Stream) -> Result<()> {
        self.check_stream(stream)?;
        if src.len() > self.len {
            return Err(DeviceError::LengthMismatch {
                op: "copy_from_host",
                left: self.len,
                right: src.len(),
            });
        }
        let staged = stage_raw(src);
        let alloc = self.alloc.clone();
        tracing::trace!(
            device = stream.device_id(),
            len = src.len(),
            "copy host to device"
        );
        stream.submit(move || {
            alloc.write()[..staged.len()].copy_from_slice(&staged);
            alloc.device.record_host_to_device();
            Ok(())
        })
    }

    /// Read the whole buffer back, after every job already on `stream`
    ///
    /// Blocks until the stream is synchronized.
    pub fn to_host(&self, stream: &Stream) -> Result<Vec<T>> {
        self.check_stream(stream)?;
        let alloc = self.alloc.clone();
        let slot = Arc::new(Mutex::new(None));
        let filled = slot.clone();
        stream.submit(move || {
            let words = alloc.read().clone();
            alloc.device.record_device_to_host();
            *filled.lock().unwrap_or_else(PoisonError::into_inner) = Some(words);
            Ok(())
        })?;
        stream.synchronize()?;

        let words = slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DeviceError::StreamClosed)?;
        Ok(unstage_raw(&words))
    }

    /// Release the buffer once `stream` has executed everything submitted before this call
    pub fn free_async(self, stream: &Stream) -> Result<()> {
        self.check_stream(stream)?;
        stream.submit(move || {
            drop(self);
            Ok(())
        })
    }

    /// View on a range of the elements
    ///
    /// Panics if `range` is not within `0..self.len()`.
    pub fn as_slice<R>(&self, range: R) -> DeviceSlice<'_, T>
    where
        R: RangeBounds<usize>,
    {
        let range = range_bounds_to_start_end(self.len, range);
        DeviceSlice {
            vec: self,
            range,
        }
    }

    pub fn device(&self) -> &Device {
        &self.alloc.device
    }

    /// Returns the number of elements in the vector, also referred to as its ‘length’.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the DeviceVec contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn check_stream(&self, stream: &Stream) -> Result<()> {
        stream.device().check_same(self.device())
    }
}

/// Borrowed view on a range of a [`DeviceVec`]
#[derive(Debug)]
pub struct DeviceSlice<'a, T: DeviceRepr> {
    vec: &'a DeviceVec<T>,
    range: Range<usize>,
}

impl<T: DeviceRepr> Clone for DeviceSlice<'_, T> {
    fn clone(&self) -> Self {
        Self {
            vec: self.vec,
            range: self.range.clone(),
        }
    }
}

impl<'a, T: DeviceRepr> DeviceSlice<'a, T> {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn device(&self) -> &'a Device {
        self.vec.device()
    }

    /// Word range of the view inside the underlying allocation
    pub(crate) fn word_range(&self) -> Range<usize> {
        self.range.start * T::WORDS..self.range.end * T::WORDS
    }

    pub(crate) fn allocation(&self) -> Arc<Allocation> {
        self.vec.alloc.clone()
    }

    pub(crate) fn check_stream(&self, stream: &Stream) -> Result<()> {
        self.vec.check_stream(stream)
    }
}

pub(crate) fn range_bounds_to_start_end<R>(len: usize, range: R) -> Range<usize>
where
    R: RangeBounds<usize>,
{
    let start = match range.start_bound() {
        Unbounded => 0usize,
        Included(start) => *start,
        Excluded(start) => *start + 1,
    };

    let end = match range.end_bound() {
        Unbounded => len,
        Included(end) => *end + 1,
        Excluded(end) => *end,
    };

    assert!(
        start <= end && end <= len,
        "range {start}..{end} out of bounds for length {len}"
    );
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::seeded_rng;
    use crate::{DeviceConfig, DeviceContext};
    use ark_bn254::{Fr, G2Affine, G2Projective};
    use ark_ec::CurveGroup;
    use ark_ff::UniformRand;
    use std::time::Duration;

    fn context(memory_bytes: usize) -> DeviceContext {
        DeviceContext::new(&DeviceConfig {
            devices: 2,
            memory_bytes,
            sync_timeout_ms: Some(5_000),
        })
        .unwrap()
    }

    #[test]
    fn host_round_trip_keeps_raw_words() {
        let ctx = context(1 << 20);
        let device = ctx.device(0).unwrap();
        let stream = device.create_stream();
        let mut rng = seeded_rng();

        let scalars = (0..33).map(|_| Fr::rand(&mut rng)).collect::<Vec<_>>();
        let points = (0..5)
            .map(|_| G2Projective::rand(&mut rng).into_affine())
            .collect::<Vec<G2Affine>>();

        let d_scalars = DeviceVec::from_host(&scalars, &stream).unwrap();
        let d_points = DeviceVec::from_host(&points, &stream).unwrap();
        assert_eq!(d_scalars.to_host(&stream).unwrap(), scalars);
        assert_eq!(d_points.to_host(&stream).unwrap(), points);

        let stats = device.memory_stats();
        assert_eq!(stats.host_to_device, 2);
        assert_eq!(stats.device_to_host, 2);
        assert_eq!(stats.used, (33 * 4 + 5 * 17) * 8);
    }

    #[test]
    fn drop_returns_memory() {
        let ctx = context(1 << 12);
        let device = ctx.device(1).unwrap();

        let vec = DeviceVec::<Fr>::new_zeroed(100, device).unwrap();
        assert_eq!(device.memory_stats().used, 3200);
        assert!(matches!(
            DeviceVec::<Fr>::new_zeroed(100, device),
            Err(DeviceError::OutOfMemory { device: 1, .. })
        ));
        drop(vec);

        let stats = device.memory_stats();
        assert_eq!(stats.used, 0);
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.frees, 1);
    }

    #[test]
    fn free_async_waits_for_the_stream() {
        let ctx = context(1 << 12);
        let device = ctx.device(0).unwrap();
        let stream = device.create_stream();

        let vec = DeviceVec::<Fr>::new_zeroed(10, device).unwrap();
        stream
            .submit(|| {
                std::thread::sleep(Duration::from_millis(50));
                Ok(())
            })
            .unwrap();
        vec.free_async(&stream).unwrap();
        assert_eq!(device.memory_stats().used, 320);

        stream.synchronize().unwrap();
        assert_eq!(device.memory_stats().used, 0);
        assert_eq!(device.memory_stats().frees, 1);
    }

    #[test]
    fn buffers_stay_on_their_device() {
        let ctx = context(1 << 12);
        let vec = DeviceVec::<Fr>::new_zeroed(4, ctx.device(0).unwrap()).unwrap();
        let other = ctx.device(1).unwrap().create_stream();

        assert_eq!(
            vec.to_host(&other),
            Err(DeviceError::DeviceMismatch {
                expected: 1,
                found: 0
            })
        );
    }

    #[test]
    fn oversized_copy_is_rejected() {
        let ctx = context(1 << 12);
        let device = ctx.device(0).unwrap();
        let stream = device.create_stream();
        let mut vec = DeviceVec::<Fr>::new_zeroed(2, device).unwrap();

        let err = vec
            .copy_from_host_async(&[Fr::from(1u64); 3], &stream)
            .unwrap_err();
        assert!(matches!(err, DeviceError::LengthMismatch { .. }));
    }

    #[test]
    fn slices() {
        let ctx = context(1 << 12);
        let vec = DeviceVec::<Fr>::new_zeroed(10, ctx.device(0).unwrap()).unwrap();

        assert_eq!(vec.as_slice(..).len(), 10);
        assert_eq!(vec.as_slice(2..=4).word_range(), 8..20);
        assert!(vec.as_slice(10..).is_empty());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn slice_past_the_end_panics() {
        let ctx = context(1 << 12);
        let vec = DeviceVec::<Fr>::new_zeroed(10, ctx.device(0).unwrap()).unwrap();
        let _ = vec.as_slice(8..20);
    }
}

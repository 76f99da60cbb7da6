//! Device handles and their memory pool
//!
//! A [`DeviceContext`] owns the list of emulated devices. Each [`Device`] is a cheap clonable
//! handle that hands out streams and accounts every byte allocated on it.

use crate::config::DeviceConfig;
use crate::stream::Stream;
use crate::{DeviceError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Snapshot of the memory pool counters of a device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub capacity: usize,
    pub used: usize,
    pub allocations: u64,
    pub frees: u64,
    pub host_to_device: u64,
    pub device_to_host: u64,
}

#[derive(Debug)]
pub(crate) struct MemoryPool {
    capacity: usize,
    used: Mutex<usize>,
    allocations: AtomicU64,
    frees: AtomicU64,
    host_to_device: AtomicU64,
    device_to_host: AtomicU64,
}

impl MemoryPool {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: Mutex::new(0),
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            host_to_device: AtomicU64::new(0),
            device_to_host: AtomicU64::new(0),
        }
    }
}

#[derive(Debug)]
pub(crate) struct DeviceInner {
    id: usize,
    pool: MemoryPool,
    sync_timeout: Option<Duration>,
}

/// Handle on one emulated device
#[derive(Clone, Debug)]
pub struct Device {
    pub(crate) inner: Arc<DeviceInner>,
}

impl Device {
    fn new(id: usize, config: &DeviceConfig) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                id,
                pool: MemoryPool::new(config.memory_bytes),
                sync_timeout: config.sync_timeout(),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Create a new ordered execution stream on this device
    pub fn create_stream(&self) -> Stream {
        Stream::new(self.clone(), self.inner.sync_timeout)
    }

    pub fn memory_stats(&self) -> MemoryStats {
        let pool = &self.inner.pool;
        MemoryStats {
            capacity: pool.capacity,
            used: *pool.used.lock().unwrap_or_else(PoisonError::into_inner),
            allocations: pool.allocations.load(Ordering::Relaxed),
            frees: pool.frees.load(Ordering::Relaxed),
            host_to_device: pool.host_to_device.load(Ordering::Relaxed),
            device_to_host: pool.device_to_host.load(Ordering::Relaxed),
        }
    }

    /// Two handles designate the same device only if they come from the same context
    pub fn same_device(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn check_same(&self, other: &Self) -> Result<()> {
        if self.same_device(other) {
            Ok(())
        } else {
            Err(DeviceError::DeviceMismatch {
                expected: self.id(),
                found: other.id(),
            })
        }
    }

    pub(crate) fn reserve(&self, bytes: usize) -> Result<()> {
        let pool = &self.inner.pool;
        let mut used = pool.used.lock().unwrap_or_else(PoisonError::into_inner);
        let available = pool.capacity - *used;
        if bytes > available {
            return Err(DeviceError::OutOfMemory {
                device: self.id(),
                requested: bytes,
                available,
            });
        }
        *used += bytes;
        pool.allocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(device = self.id(), bytes, used = *used, "alloc");
        Ok(())
    }

    pub(crate) fn release(&self, bytes: usize) {
        let pool = &self.inner.pool;
        let mut used = pool.used.lock().unwrap_or_else(PoisonError::into_inner);
        *used -= bytes;
        pool.frees.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(device = self.id(), bytes, used = *used, "free");
    }

    pub(crate) fn record_host_to_device(&self) {
        self.inner
            .pool
            .host_to_device
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_device_to_host(&self) {
        self.inner
            .pool
            .device_to_host
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Set of emulated devices built from a [`DeviceConfig`]
#[derive(Debug)]
pub struct DeviceContext {
    devices: Vec<Device>,
}

impl DeviceContext {
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        let devices = (0..config.devices)
            .map(|id| Device::new(id, config))
            .collect::<Vec<_>>();
        tracing::info!(
            devices = devices.len(),
            memory_bytes = config.memory_bytes,
            "emulated device context ready"
        );
        Ok(Self { devices })
    }

    pub fn from_toml(file: &str) -> Result<Self> {
        Self::new(&DeviceConfig::from_toml(file)?)
    }

    pub fn device(&self, id: usize) -> Result<&Device> {
        self.devices.get(id).ok_or(DeviceError::InvalidDevice(id))
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Return the number of devices in the context
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if the context holds no device.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the bytes currently allocated over all the devices
    pub fn used_bytes(&self) -> usize {
        self.devices.iter().map(|d| d.memory_stats().used).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_accounting() {
        let ctx = DeviceContext::new(&DeviceConfig {
            devices: 2,
            memory_bytes: 1024,
            sync_timeout_ms: None,
        })
        .unwrap();
        let dev = ctx.device(1).unwrap();

        dev.reserve(1000).unwrap();
        let err = dev.reserve(100).unwrap_err();
        assert_eq!(
            err,
            DeviceError::OutOfMemory {
                device: 1,
                requested: 100,
                available: 24
            }
        );
        dev.release(1000);

        let stats = dev.memory_stats();
        assert_eq!(stats.used, 0);
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.frees, 1);
        assert_eq!(ctx.device(0).unwrap().memory_stats().allocations, 0);
    }

    #[test]
    fn unknown_device() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        assert_eq!(ctx.device(4).unwrap_err(), DeviceError::InvalidDevice(4));
    }

    #[test]
    fn devices_of_distinct_contexts_differ() {
        let a = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let b = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let (da, db) = (a.device(0).unwrap(), b.device(0).unwrap());

        assert!(da.same_device(&da.clone()));
        assert!(!da.same_device(db));
        assert!(da.check_same(db).is_err());
    }
}

//! Common helpers for the rllm plugin crates: device selection, accelerator
//! inventory and the inference-mode scope every model call runs inside.

#![warn(missing_docs)]

use std::sync::OnceLock;

use candle_core::{utils::*, Device};

mod inference;
pub use inference::*;

/// Create a candle device that uses any available accelerator.
pub fn accelerated_device_if_available() -> candle_core::Result<Device> {
    static DEVICE: OnceLock<Device> = OnceLock::new();
    if let Some(device) = DEVICE.get() {
        return Ok(device.clone());
    }
    let device = if cuda_is_available() {
        Device::new_cuda(0)?
    } else if metal_is_available() {
        Device::new_metal(0)?
    } else {
        #[cfg(all(debug_assertions, target_os = "macos", target_arch = "aarch64"))]
        {
            tracing::info!("Running on CPU, to run on GPU(metal), build with `--features metal`");
        }
        #[cfg(not(all(debug_assertions, target_os = "macos", target_arch = "aarch64")))]
        {
            tracing::info!("Running on CPU, to run on GPU, build with `--features cuda`");
        }
        Device::Cpu
    };
    let _ = DEVICE.set(device.clone());
    Ok(device)
}

/// Something that knows how many compute accelerators the host can place a model on.
pub trait DeviceInventory: Send + Sync {
    /// The number of accelerators (GPUs) available. The CPU is not counted.
    fn accelerator_count(&self) -> usize;
}

/// The highest CUDA ordinal probed by [`CandleDeviceInventory`].
const MAX_CUDA_ORDINALS: usize = 64;

/// A [`DeviceInventory`] that asks candle which accelerators it was built with and can open.
///
/// Devices are probed once per process; later calls return the cached count.
#[derive(Debug, Default, Clone, Copy)]
pub struct CandleDeviceInventory;

impl DeviceInventory for CandleDeviceInventory {
    fn accelerator_count(&self) -> usize {
        static COUNT: OnceLock<usize> = OnceLock::new();
        *COUNT.get_or_init(probe_accelerators)
    }
}

fn probe_accelerators() -> usize {
    let count = if cuda_is_available() {
        (0..MAX_CUDA_ORDINALS)
            .take_while(|ordinal| Device::new_cuda(*ordinal).is_ok())
            .count()
    } else if metal_is_available() {
        usize::from(Device::new_metal(0).is_ok())
    } else {
        0
    };
    tracing::debug!(count, "probed accelerators");
    count
}

/// A [`DeviceInventory`] with a fixed accelerator count, for hosts that already know their topology.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixedDeviceInventory(pub usize);

impl DeviceInventory for FixedDeviceInventory {
    fn accelerator_count(&self) -> usize {
        self.0
    }
}

/// Wrap a closure in a release pool if the metal feature is enabled
pub fn maybe_autoreleasepool<T>(f: impl FnOnce() -> T) -> T {
    #[cfg(feature = "metal")]
    // Adding a manual autoreleasepool here is necessary to avoid a memory leak https://github.com/huggingface/candle/issues/2271
    {
        metal::objc::rc::autoreleasepool(f)
    }
    #[cfg(not(feature = "metal"))]
    {
        f()
    }
}

#[test]
fn fixed_inventory_reports_its_count() {
    assert_eq!(FixedDeviceInventory(3).accelerator_count(), 3);
    assert_eq!(FixedDeviceInventory::default().accelerator_count(), 0);
}

#[cfg(not(any(feature = "cuda", feature = "metal")))]
#[test]
fn cpu_only_builds_have_no_accelerators() {
    assert_eq!(CandleDeviceInventory.accelerator_count(), 0);
    assert!(matches!(
        accelerated_device_if_available(),
        Ok(Device::Cpu)
    ));
}

#[test]
fn candle_inventory_count_is_cached() {
    let first = CandleDeviceInventory.accelerator_count();
    assert_eq!(CandleDeviceInventory.accelerator_count(), first);
    assert_eq!(
        CandleDeviceInventory::default().accelerator_count(),
        first
    );
}

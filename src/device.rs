// SPDX-License-Identifier: MPL-2.0

pub type DeviceResult<T> = core::result::Result<T, DeviceError>;

/// Failure status reported by a [`BlockAccess`] implementation.
///
/// The engine never inspects the inner status code; it is carried back to
/// the caller of whatever operation was in progress.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DeviceError(pub i32);

/// Byte-addressed access to the storage medium holding the filesystem.
///
/// The caller injects an implementation when mounting; the engine issues
/// absolute byte offsets into the medium and performs no retries, caching
/// or scheduling of its own. Offsets are 32-bit, which bounds the
/// addressable image at 4 GiB.
pub trait BlockAccess: Send + Sync {
    /// Reads `buf.len()` bytes starting at the absolute byte `offset`.
    fn read_at(&self, offset: u32, buf: &mut [u8]) -> DeviceResult<()>;

    /// Writes `buf` starting at the absolute byte `offset`.
    fn write_at(&self, offset: u32, buf: &[u8]) -> DeviceResult<()>;
}

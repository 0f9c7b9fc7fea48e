//! Host-memory staging buffers.
//!
//! A [`CpuBuffer`] is a flat, zero-initialised byte allocation. Nothing on
//! the device side is involved: it is allocated, copied into and freed.

use bytemuck::Pod;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CpuBufferError {
    #[error(
        "Data size ({data_bytes} bytes) exceeds buffer size \
         ({buffer_bytes} bytes)"
    )]
    TooLarge {
        data_bytes: usize,
        buffer_bytes: usize,
    },

    #[error("Out of memory allocating {len} bytes for {label:?}")]
    ResourceExhaustion { label: String, len: usize },
}

pub struct CpuBuffer {
    label: String,
    data: Vec<u8>,
}

impl std::fmt::Debug for CpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBuffer")
            .field("label", &self.label)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Drop for CpuBuffer {
    fn drop(&mut self) {
        tracing::debug!("Dropping CPU buffer {:?}", self.label);
    }
}

impl CpuBuffer {
    /// Allocate `len` zeroed bytes, then copy `initial` into the front.
    pub fn new(
        label: impl Into<String>,
        len: usize,
        initial: Option<&[u8]>,
    ) -> Result<Self, CpuBufferError> {
        let label = label.into();
        if let Some(initial) = initial
            && initial.len() > len
        {
            return Err(CpuBufferError::TooLarge {
                data_bytes: initial.len(),
                buffer_bytes: len,
            });
        }

        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            return Err(CpuBufferError::ResourceExhaustion { label, len });
        }
        data.resize(len, 0);
        if let Some(initial) = initial {
            data[..initial.len()].copy_from_slice(initial);
        }

        Ok(Self { label, data })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn lock(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Host memory needs no flush, so this does nothing.
    pub fn unlock(&mut self) {}

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy `data` into the buffer starting at byte `offset`.
    pub fn write_pod<T: Pod>(
        &mut self,
        offset: usize,
        data: &[T],
    ) -> Result<(), CpuBufferError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let end = offset.checked_add(bytes.len());
        match end {
            Some(end) if end <= self.data.len() => {
                self.data[offset..end].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(CpuBufferError::TooLarge {
                data_bytes: bytes.len(),
                buffer_bytes: self.data.len().saturating_sub(offset),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed_after_the_initial_prefix() {
        let buffer = CpuBuffer::new("staging", 6, Some(&[1, 2, 3])).unwrap();
        assert_eq!(buffer.as_bytes(), &[1, 2, 3, 0, 0, 0]);
        assert_eq!(buffer.label(), "staging");

        let empty = CpuBuffer::new("empty", 0, None).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn initial_data_longer_than_buffer_is_rejected() {
        assert_eq!(
            CpuBuffer::new("small", 2, Some(&[1, 2, 3])).unwrap_err(),
            CpuBufferError::TooLarge {
                data_bytes: 3,
                buffer_bytes: 2
            }
        );
    }

    #[test]
    fn impossible_allocation_is_resource_exhaustion() {
        assert!(matches!(
            CpuBuffer::new("huge", usize::MAX, None),
            Err(CpuBufferError::ResourceExhaustion { len: usize::MAX, .. })
        ));
    }

    #[test]
    fn lock_gives_writable_bytes() {
        let mut buffer = CpuBuffer::new("locked", 4, None).unwrap();
        buffer.lock()[1] = 7;
        buffer.unlock();
        assert_eq!(buffer.as_bytes(), &[0, 7, 0, 0]);
    }

    #[test]
    fn write_pod_is_bounds_checked() {
        let mut buffer = CpuBuffer::new("verts", 8, None).unwrap();
        buffer.write_pod(4, &[0x0403_0201u32]).unwrap();
        assert_eq!(buffer.as_bytes()[4..], 0x0403_0201u32.to_ne_bytes());

        assert_eq!(
            buffer.write_pod(6, &[1u32]),
            Err(CpuBufferError::TooLarge {
                data_bytes: 4,
                buffer_bytes: 2
            })
        );
        assert!(buffer.write_pod(usize::MAX, &[1u8]).is_err());
    }
}

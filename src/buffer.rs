//! Client pixel buffers
//!
//! A [`Buffer`] describes one externally allocated pixel payload, either a
//! slice of a shared-memory pool or a set of imported dma-buf planes. The
//! scene core never copies pixels; it only tracks when the compositor holds
//! a reference so the client can be told, exactly once per use, that the
//! storage may be recycled.

use crate::error::{ProtocolError, ProtocolResult};
use crate::geometry::Size;
use log::{debug, trace};
use memmap2::{Mmap, MmapOptions};
use parking_lot::RwLock;
use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;

/// Maximum number of planes a dma-buf import may carry
pub const MAX_PLANES: usize = 4;

/// dma-buf flags that this server cannot honour
pub const DMABUF_FLAG_Y_INVERT: u32 = 1;
pub const DMABUF_FLAG_INTERLACED: u32 = 2;
pub const DMABUF_FLAG_BOTTOM_FIRST: u32 = 4;

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Argb8888,
    Xrgb8888,
    Abgr8888,
    Xbgr8888,
    Rgba8888,
    Rgbx8888,
    Rgb565,
    Nv12,
    Yvu420,
}

/// Formats advertised through wl_shm
pub const SHM_FORMATS: &[PixelFormat] = &[
    PixelFormat::Argb8888,
    PixelFormat::Xrgb8888,
    PixelFormat::Abgr8888,
    PixelFormat::Xbgr8888,
    PixelFormat::Rgba8888,
    PixelFormat::Rgbx8888,
];

/// Formats advertised through zwp_linux_dmabuf_v1
pub const DMABUF_FORMATS: &[PixelFormat] = &[
    PixelFormat::Rgb565,
    PixelFormat::Xrgb8888,
    PixelFormat::Argb8888,
    PixelFormat::Xbgr8888,
    PixelFormat::Abgr8888,
    PixelFormat::Nv12,
    PixelFormat::Yvu420,
];

impl PixelFormat {
    pub const fn fourcc(self) -> u32 {
        match self {
            PixelFormat::Argb8888 => fourcc(b"AR24"),
            PixelFormat::Xrgb8888 => fourcc(b"XR24"),
            PixelFormat::Abgr8888 => fourcc(b"AB24"),
            PixelFormat::Xbgr8888 => fourcc(b"XB24"),
            PixelFormat::Rgba8888 => fourcc(b"RA24"),
            PixelFormat::Rgbx8888 => fourcc(b"RX24"),
            PixelFormat::Rgb565 => fourcc(b"RG16"),
            PixelFormat::Nv12 => fourcc(b"NV12"),
            PixelFormat::Yvu420 => fourcc(b"YV12"),
        }
    }

    pub fn from_fourcc(code: u32) -> Option<Self> {
        [
            PixelFormat::Argb8888,
            PixelFormat::Xrgb8888,
            PixelFormat::Abgr8888,
            PixelFormat::Xbgr8888,
            PixelFormat::Rgba8888,
            PixelFormat::Rgbx8888,
            PixelFormat::Rgb565,
            PixelFormat::Nv12,
            PixelFormat::Yvu420,
        ]
        .into_iter()
        .find(|f| f.fourcc() == code)
    }

    /// wl_shm encodes the two original formats as 0 and 1, everything else as
    /// its fourcc.
    pub fn shm_code(self) -> u32 {
        match self {
            PixelFormat::Argb8888 => 0,
            PixelFormat::Xrgb8888 => 1,
            other => other.fourcc(),
        }
    }

    pub fn from_shm_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(PixelFormat::Argb8888),
            1 => Some(PixelFormat::Xrgb8888),
            other => Self::from_fourcc(other),
        }
    }

    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Nv12 => 2,
            PixelFormat::Yvu420 => 3,
            _ => 1,
        }
    }

    /// Bytes per pixel of the first plane
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Nv12 | PixelFormat::Yvu420 => 1,
            _ => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Argb8888 | PixelFormat::Abgr8888 | PixelFormat::Rgba8888
        )
    }
}

struct PoolMapping {
    map: Mmap,
    size: usize,
}

/// A client-provided shared-memory pool, mapped read-only
pub struct ShmPool {
    file: File,
    mapping: RwLock<PoolMapping>,
}

impl ShmPool {
    pub fn new(fd: OwnedFd, size: usize) -> io::Result<Self> {
        let file = File::from(fd);
        let map = map_pool(&file, size)?;
        Ok(Self {
            file,
            mapping: RwLock::new(PoolMapping { map, size }),
        })
    }

    pub fn size(&self) -> usize {
        self.mapping.read().size
    }

    /// Pools can only grow
    pub fn resize(&self, size: usize) -> io::Result<()> {
        let mut mapping = self.mapping.write();
        if size < mapping.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pool cannot shrink from {} to {}", mapping.size, size),
            ));
        }
        if size > mapping.size {
            mapping.map = map_pool(&self.file, size)?;
            mapping.size = size;
            debug!("shm pool grown to {} bytes", size);
        }
        Ok(())
    }

    /// Runs `f` over `len` bytes starting at `offset`, if they lie inside the pool
    pub fn with_bytes<R>(&self, offset: usize, len: usize, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mapping = self.mapping.read();
        let end = offset.checked_add(len)?;
        mapping.map.get(offset..end).map(f)
    }
}

impl fmt::Debug for ShmPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmPool").field("size", &self.size()).finish()
    }
}

fn map_pool(file: &File, size: usize) -> io::Result<Mmap> {
    if size == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty shm pool"));
    }
    // SAFETY: the mapping is read-only; a client truncating the file under us
    // is the same hazard every Wayland compositor accepts for wl_shm.
    unsafe { MmapOptions::new().len(size).map(file) }
}

/// One imported dma-buf plane
#[derive(Debug)]
pub struct DmabufPlane {
    pub fd: OwnedFd,
    pub offset: u32,
    pub stride: u32,
    pub modifier: u64,
}

#[derive(Debug)]
pub enum BufferBacking {
    Shm {
        pool: Arc<ShmPool>,
        offset: usize,
        stride: usize,
    },
    Dmabuf {
        planes: Vec<DmabufPlane>,
        flags: u32,
    },
}

pub struct Buffer {
    size: Size,
    format: PixelFormat,
    backing: BufferBacking,
    use_count: u32,
    release: Option<Box<dyn FnMut()>>,
}

impl Buffer {
    /// Describes a buffer inside a shared-memory pool after validating the
    /// layout against the pool size.
    pub fn from_shared_memory(
        pool: Arc<ShmPool>,
        format_code: u32,
        offset: i32,
        stride: i32,
        size: Size,
    ) -> ProtocolResult<Self> {
        let format = PixelFormat::from_shm_code(format_code)
            .filter(|f| SHM_FORMATS.contains(f))
            .ok_or(ProtocolError::InvalidFormat(format_code))?;
        let pool_size = pool.size();
        let invalid = || ProtocolError::InvalidStride {
            stride,
            offset,
            pool_size,
        };
        // wl_shm has no dimension error, an empty buffer is a bad layout
        if size.is_empty() || offset < 0 || stride <= 0 {
            return Err(invalid());
        }
        let (offset_bytes, stride_bytes) = (offset as usize, stride as usize);
        let row = size.width as usize * format.bytes_per_pixel();
        let end = stride_bytes
            .checked_mul(size.height as usize)
            .and_then(|len| len.checked_add(offset_bytes));
        match end {
            Some(end) if stride_bytes >= row && end <= pool_size => {}
            _ => return Err(invalid()),
        }
        trace!("shm buffer {} {:?} offset={} stride={}", size, format, offset, stride);
        Ok(Self {
            size,
            format,
            backing: BufferBacking::Shm {
                pool,
                offset: offset_bytes,
                stride: stride_bytes,
            },
            use_count: 0,
            release: None,
        })
    }

    /// Describes a buffer made of imported dma-buf planes
    pub fn from_imported_planes(
        format_code: u32,
        size: Size,
        planes: Vec<DmabufPlane>,
        flags: u32,
    ) -> ProtocolResult<Self> {
        if size.is_empty() {
            return Err(ProtocolError::InvalidDimensions {
                width: size.width,
                height: size.height,
            });
        }
        let format = PixelFormat::from_fourcc(format_code)
            .filter(|f| DMABUF_FORMATS.contains(f))
            .ok_or(ProtocolError::InvalidFormat(format_code))?;
        if flags & (DMABUF_FLAG_Y_INVERT | DMABUF_FLAG_INTERLACED) != 0 {
            return Err(ProtocolError::Incomplete("unsupported buffer flags"));
        }
        if planes.len() != format.plane_count() {
            return Err(ProtocolError::PlaneCount {
                format: format_code,
                expected: format.plane_count(),
                actual: planes.len(),
            });
        }
        trace!("dmabuf buffer {} {:?} planes={}", size, format, planes.len());
        Ok(Self {
            size,
            format,
            backing: BufferBacking::Dmabuf { planes, flags },
            use_count: 0,
            release: None,
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn backing(&self) -> &BufferBacking {
        &self.backing
    }

    /// Reads the pixel rows of a shared-memory buffer. Returns `None` for
    /// dma-buf buffers or when the pool no longer covers the buffer.
    pub fn with_shm_contents<R>(&self, f: impl FnOnce(&[u8], usize) -> R) -> Option<R> {
        match &self.backing {
            BufferBacking::Shm {
                pool,
                offset,
                stride,
            } => {
                let len = stride * self.size.height as usize;
                pool.with_bytes(*offset, len, |bytes| f(bytes, *stride))
            }
            BufferBacking::Dmabuf { .. } => None,
        }
    }

    pub fn set_release_callback<F: FnMut() + 'static>(&mut self, release: F) {
        self.release = Some(Box::new(release));
    }

    pub fn is_in_use(&self) -> bool {
        self.use_count > 0
    }

    /// Marks the buffer as referenced by one more committed surface state
    pub(crate) fn acquire(&mut self) {
        self.use_count += 1;
    }

    /// Drops one reference. When the last one goes the release callback
    /// fires; returns whether it did.
    pub(crate) fn release(&mut self) -> bool {
        if self.use_count == 0 {
            return false;
        }
        self.use_count -= 1;
        if self.use_count > 0 {
            return false;
        }
        if let Some(release) = self.release.as_mut() {
            release();
        }
        true
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("use_count", &self.use_count)
            .finish()
    }
}

/// Accumulates zwp_linux_buffer_params_v1 requests until `create`
#[derive(Debug, Default)]
pub struct DmabufParams {
    planes: [Option<DmabufPlane>; MAX_PLANES],
    used: bool,
}

impl DmabufParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        fd: OwnedFd,
        plane_idx: u32,
        offset: u32,
        stride: u32,
        modifier: u64,
    ) -> ProtocolResult<()> {
        if self.used {
            return Err(ProtocolError::AlreadyUsed);
        }
        let slot = self
            .planes
            .get_mut(plane_idx as usize)
            .ok_or(ProtocolError::PlaneIndex(plane_idx))?;
        if slot.is_some() {
            return Err(ProtocolError::PlaneSet(plane_idx));
        }
        *slot = Some(DmabufPlane {
            fd,
            offset,
            stride,
            modifier,
        });
        Ok(())
    }

    /// Consumes the accumulated planes. Params can only be used once, even
    /// when creation fails.
    pub fn create(&mut self, format_code: u32, size: Size, flags: u32) -> ProtocolResult<Buffer> {
        if self.used {
            return Err(ProtocolError::AlreadyUsed);
        }
        self.used = true;
        let taken: Vec<Option<DmabufPlane>> = self.planes.iter_mut().map(Option::take).collect();
        let count = taken.iter().take_while(|p| p.is_some()).count();
        if taken[count..].iter().any(Option::is_some) {
            return Err(ProtocolError::Incomplete("missing plane"));
        }
        let planes = taken.into_iter().flatten().collect();
        Buffer::from_imported_planes(format_code, size, planes, flags)
    }
}

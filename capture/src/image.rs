use std::sync::Arc;

use parking_lot::Mutex;
use yuv_frame::{packed_len, ChromaOrder, FrameError, PixelPlane, YuvFormat, YuvFrame};

/// One image handed to the capture callback.
pub trait CaptureImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn timestamp_ns(&self) -> u64;
    /// Plane views over the image memory. Only valid before [`release`].
    ///
    /// [`release`]: CaptureImage::release
    fn frame(&self) -> Result<YuvFrame<'_>, FrameError>;
    /// Returns the buffer to its producer. Calling it twice is a no-op.
    fn release(&mut self);
}

/// Releases the wrapped image when dropped, whatever path the handler took.
pub struct ImageGuard<I: CaptureImage> {
    image: I,
    released: bool,
}

impl<I: CaptureImage> ImageGuard<I> {
    pub fn new(image: I) -> Self {
        Self {
            image,
            released: false,
        }
    }

    pub fn image(&self) -> &I {
        &self.image
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn release(&mut self) {
        if !self.released {
            self.image.release();
            self.released = true;
        }
    }
}

impl<I: CaptureImage> Drop for ImageGuard<I> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Memory layout the pool hands out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageLayout {
    /// Tightly packed single buffer, as the legacy preview callback delivers.
    Packed(YuvFormat),
    /// Three-plane `YUV_420_888` with `row_padding` extra bytes per luma row.
    /// Pixel stride 2 lays chroma out as one interleaved VU block that both
    /// the U and V views overlap, each one byte short of the full block.
    Yuv420 {
        row_padding: usize,
        chroma_pixel_stride: usize,
    },
}

struct ImageBuffers {
    y: Vec<u8>,
    c0: Vec<u8>,
    c1: Vec<u8>,
}

impl ImageBuffers {
    fn allocate(width: u32, height: u32, layout: ImageLayout) -> Result<Self, FrameError> {
        let (w, h) = (width as usize, height as usize);
        let buffers = match layout {
            ImageLayout::Packed(_) => Self {
                y: vec![0u8; packed_len(width, height)?],
                c0: Vec::new(),
                c1: Vec::new(),
            },
            ImageLayout::Yuv420 {
                row_padding,
                chroma_pixel_stride: 1,
            } => {
                let c_stride = (w + row_padding) / 2;
                Self {
                    y: vec![0u8; (w + row_padding) * h],
                    c0: vec![0u8; c_stride * (h / 2)],
                    c1: vec![0u8; c_stride * (h / 2)],
                }
            }
            ImageLayout::Yuv420 {
                row_padding,
                chroma_pixel_stride: 2,
            } => {
                let stride = w + row_padding;
                Self {
                    y: vec![0u8; stride * h],
                    c0: vec![0u8; stride * (h / 2 - 1) + w],
                    c1: Vec::new(),
                }
            }
            ImageLayout::Yuv420 {
                chroma_pixel_stride,
                ..
            } => {
                return Err(FrameError::UnsupportedPixelStride {
                    plane: "u",
                    pixel_stride: chroma_pixel_stride,
                })
            }
        };
        Ok(buffers)
    }
}

/// Mutable plane access for whoever fills an image.
pub enum PlanesMut<'a> {
    Packed {
        format: YuvFormat,
        data: &'a mut [u8],
    },
    Planar {
        y: &'a mut [u8],
        y_stride: usize,
        u: &'a mut [u8],
        v: &'a mut [u8],
        c_stride: usize,
    },
    /// Interleaved chroma, V first.
    SemiPlanarVu {
        y: &'a mut [u8],
        y_stride: usize,
        vu: &'a mut [u8],
        vu_stride: usize,
    },
}

struct PoolInner {
    width: u32,
    height: u32,
    layout: ImageLayout,
    capacity: usize,
    free: Mutex<Vec<ImageBuffers>>,
}

/// Fixed set of image buffers shared between the producer and the handler.
#[derive(Clone)]
pub struct ImagePool {
    inner: Arc<PoolInner>,
}

impl ImagePool {
    pub fn new(
        width: u32,
        height: u32,
        layout: ImageLayout,
        capacity: usize,
    ) -> Result<Self, FrameError> {
        yuv_frame::check_dimensions(width, height)?;
        let free = (0..capacity)
            .map(|_| ImageBuffers::allocate(width, height, layout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                width,
                height,
                layout,
                capacity,
                free: Mutex::new(free),
            }),
        })
    }

    /// Takes a free buffer; `None` while every buffer is still held.
    pub fn acquire(&self, timestamp_ns: u64) -> Option<PooledImage> {
        let buffers = self.inner.free.lock().pop()?;
        Some(PooledImage {
            pool: Arc::clone(&self.inner),
            buffers: Some(buffers),
            timestamp_ns,
        })
    }

    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn layout(&self) -> ImageLayout {
        self.inner.layout
    }
}

pub struct PooledImage {
    pool: Arc<PoolInner>,
    buffers: Option<ImageBuffers>,
    timestamp_ns: u64,
}

impl PooledImage {
    pub fn planes_mut(&mut self) -> Option<PlanesMut<'_>> {
        let w = self.pool.width as usize;
        let buffers = self.buffers.as_mut()?;
        let planes = match self.pool.layout {
            ImageLayout::Packed(format) => PlanesMut::Packed {
                format,
                data: &mut buffers.y,
            },
            ImageLayout::Yuv420 {
                row_padding,
                chroma_pixel_stride: 1,
            } => PlanesMut::Planar {
                y: &mut buffers.y,
                y_stride: w + row_padding,
                u: &mut buffers.c0,
                v: &mut buffers.c1,
                c_stride: (w + row_padding) / 2,
            },
            ImageLayout::Yuv420 { row_padding, .. } => PlanesMut::SemiPlanarVu {
                y: &mut buffers.y,
                y_stride: w + row_padding,
                vu: &mut buffers.c0,
                vu_stride: w + row_padding,
            },
        };
        Some(planes)
    }
}

impl CaptureImage for PooledImage {
    fn width(&self) -> u32 {
        self.pool.width
    }

    fn height(&self) -> u32 {
        self.pool.height
    }

    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    fn frame(&self) -> Result<YuvFrame<'_>, FrameError> {
        let (width, height) = (self.pool.width, self.pool.height);
        let Some(buffers) = &self.buffers else {
            return Err(FrameError::PlaneTooShort {
                plane: "y",
                expected: yuv_frame::plane_len(width, height)?,
                actual: 0,
            });
        };
        let w = width as usize;
        match self.pool.layout {
            ImageLayout::Packed(format) => YuvFrame::from_packed(&buffers.y, width, height, format),
            ImageLayout::Yuv420 {
                row_padding,
                chroma_pixel_stride: 1,
            } => {
                let c_stride = (w + row_padding) / 2;
                YuvFrame::from_yuv420_888(
                    width,
                    height,
                    PixelPlane::new(&buffers.y, w + row_padding, 1),
                    PixelPlane::new(&buffers.c0, c_stride, 1),
                    PixelPlane::new(&buffers.c1, c_stride, 1),
                    ChromaOrder::VFirst,
                )
            }
            ImageLayout::Yuv420 { row_padding, .. } => {
                let stride = w + row_padding;
                let vu = &buffers.c0;
                let end = vu.len() - 1;
                YuvFrame::from_yuv420_888(
                    width,
                    height,
                    PixelPlane::new(&buffers.y, stride, 1),
                    PixelPlane::new(&vu[1..], stride, 2),
                    PixelPlane::new(&vu[..end], stride, 2),
                    ChromaOrder::VFirst,
                )
            }
        }
    }

    fn release(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            self.pool.free.lock().push(buffers);
        }
    }
}

impl Drop for PooledImage {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreleased_images_starve_the_pool() {
        let pool = ImagePool::new(4, 4, ImageLayout::Packed(YuvFormat::Nv21), 2).unwrap();
        let first = pool.acquire(0).unwrap();
        let mut second = pool.acquire(1).unwrap();
        assert!(pool.acquire(2).is_none());

        second.release();
        second.release();
        assert_eq!(pool.available(), 1);
        drop(first);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn bail(image: PooledImage) -> Result<(), FrameError> {
            let guard = ImageGuard::new(image);
            guard.image().frame()?;
            Err(FrameError::NothingStaged)
        }

        let pool = ImagePool::new(4, 4, ImageLayout::Packed(YuvFormat::Nv21), 1).unwrap();
        assert!(bail(pool.acquire(0).unwrap()).is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn semi_planar_views_overlap_and_run_short() {
        let layout = ImageLayout::Yuv420 {
            row_padding: 4,
            chroma_pixel_stride: 2,
        };
        let pool = ImagePool::new(4, 4, layout, 1).unwrap();
        let image = pool.acquire(0).unwrap();
        let frame = image.frame().unwrap();
        assert_eq!(frame.format(), YuvFormat::Nv21);
        match frame.chroma() {
            yuv_frame::ChromaPlanes::Interleaved(vu) => {
                // One full 8-byte row plus a 4-byte final row, minus the overlap byte.
                assert_eq!(vu.len(), 11);
                assert_eq!(vu.row_stride(), 8);
            }
            yuv_frame::ChromaPlanes::Planar { .. } => panic!("expected interleaved chroma"),
        }
    }

    #[test]
    fn released_image_has_no_planes() {
        let pool = ImagePool::new(4, 4, ImageLayout::Packed(YuvFormat::Nv21), 1).unwrap();
        let mut image = pool.acquire(0).unwrap();
        image.release();
        assert!(image.frame().is_err());
        assert!(image.planes_mut().is_none());
    }

    #[test]
    fn unsupported_pixel_stride_is_rejected() {
        let layout = ImageLayout::Yuv420 {
            row_padding: 0,
            chroma_pixel_stride: 3,
        };
        assert!(matches!(
            ImagePool::new(4, 4, layout, 1),
            Err(FrameError::UnsupportedPixelStride { pixel_stride: 3, .. })
        ));
    }
}

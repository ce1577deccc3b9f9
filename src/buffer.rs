//! # Sample buffer
//!
//! A fixed-capacity array of sample words written only by the DMA hardware. The engine reads
//! single words while the capture is running; the controller reads whole segments once a capture
//! has been published (see [`CaptureView`](crate::capture::CaptureView)).

use core::cell::UnsafeCell;
use core::ops::Range;
use core::ptr;

use embedded_dma::WriteBuffer;

/// Circular buffer of `N` sample words
#[repr(C, align(4))]
pub struct SampleBuffer<const N: usize> {
    words: UnsafeCell<[u16; N]>,
}

// NOTE(unsafe) The only writer is the DMA engine; software reads with volatile loads and hands
// out shared slices only for capture windows after the writer has been stopped.
unsafe impl<const N: usize> Sync for SampleBuffer<N> {}

impl<const N: usize> SampleBuffer<N> {
    pub const CAPACITY: usize = N;

    pub const fn new() -> Self {
        SampleBuffer {
            words: UnsafeCell::new([0; N]),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Pointer to the first word, for programming the DMA write address
    pub fn as_mut_ptr(&self) -> *mut u16 {
        self.words.get().cast()
    }

    pub fn address(&self) -> usize {
        self.as_mut_ptr() as usize
    }

    /// Volatile read of one word
    ///
    /// # Panics
    ///
    /// Panics if `index >= N`.
    pub fn read(&self, index: usize) -> u16 {
        assert!(index < N);
        // NOTE(unsafe) in bounds, and a volatile load races benignly with the DMA writer
        unsafe { ptr::read_volatile(self.as_mut_ptr().add(index)) }
    }

    /// Shared view of `range`
    ///
    /// # Safety
    ///
    /// No DMA transfer may write into `range` while the returned slice is alive.
    pub(crate) unsafe fn slice(&self, range: Range<usize>) -> &[u16] {
        assert!(range.start <= range.end && range.end <= N);
        core::slice::from_raw_parts(self.as_mut_ptr().add(range.start), range.len())
    }
}

impl<const N: usize> Default for SampleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<const N: usize> WriteBuffer for &'static SampleBuffer<N> {
    type Word = u16;

    unsafe fn write_buffer(&mut self) -> (*mut u16, usize) {
        (self.as_mut_ptr(), N)
    }
}

#[test]
fn words_written_through_the_dma_pointer_are_visible() {
    let buffer = leaked();
    let mut target = buffer;
    let (ptr, len) = unsafe { target.write_buffer() };
    assert_eq!(len, 8);
    assert_eq!(ptr as usize, buffer.address());

    for i in 0..len {
        unsafe { ptr.add(i).write_volatile(i as u16 * 3) };
    }
    assert_eq!(buffer.read(5), 15);
    assert_eq!(unsafe { buffer.slice(2..4) }, &[6, 9]);
}

#[cfg(test)]
fn leaked() -> &'static SampleBuffer<8> {
    std::boxed::Box::leak(std::boxed::Box::new(SampleBuffer::new()))
}

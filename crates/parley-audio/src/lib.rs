pub mod capture;
mod decode;
pub mod device;
pub mod reencode;
mod resample;
pub mod wav;

pub use capture::{Recorder, RecorderStatus};
pub use device::{DeviceManager, DEFAULT_DEVICE};
pub use reencode::{reencode, reencode_blocking};

use ringbuf::traits::Split;
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Create a ring buffer split into producer and consumer halves.
pub fn create_ring_buffer(capacity: usize) -> (HeapProd<f32>, HeapCons<f32>) {
    HeapRb::<f32>::new(capacity).split()
}

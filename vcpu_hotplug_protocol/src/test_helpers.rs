//
// Copyright 2024 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Helpers that let tests play the device side of the protocol.

use std::{
    sync::{
        atomic::{AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    vec::Vec,
};

use crate::{
    window::RegisterWindow, Control, CONTROL_OFFSET, MASK_SIZE_OFFSET, REQUEST_MASK_OFFSET,
    WINDOW_LEN,
};

/// An in-memory register window with the device side exposed.
///
/// Clones share the same backing bytes, so a test can keep one handle for
/// itself while the code under test owns another. Accesses made through
/// [`RegisterWindow`] are counted; accesses made through the `device_`
/// methods are not, so the counters reflect guest-side traffic only.
#[derive(Clone)]
pub struct TestWindow {
    inner: Arc<Inner>,
}

struct Inner {
    bytes: [AtomicU8; WINDOW_LEN],
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl TestWindow {
    /// Creates a window whose size register declares `mask_size` byte masks.
    pub fn new(mask_size: u8) -> Self {
        let inner = Inner {
            bytes: std::array::from_fn(|_| AtomicU8::new(0)),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        };
        inner.bytes[MASK_SIZE_OFFSET].store(mask_size, Ordering::SeqCst);
        Self { inner: Arc::new(inner) }
    }

    /// Device side: reads the byte at `offset` without touching the counters.
    pub fn device_read(&self, offset: usize) -> u8 {
        self.inner.bytes[offset].load(Ordering::SeqCst)
    }

    /// Device side: writes the byte at `offset` without touching the counters.
    pub fn device_write(&self, offset: usize, value: u8) {
        self.inner.bytes[offset].store(value, Ordering::SeqCst);
    }

    /// Device side: stores a request mask and raises both pending bits, the
    /// way the device publishes a new request before interrupting the guest.
    pub fn publish_request(&self, request: &[u8]) {
        for (i, byte) in request.iter().enumerate() {
            self.device_write(REQUEST_MASK_OFFSET + i, *byte);
        }
        let control = self.device_read(CONTROL_OFFSET)
            | (Control::INTERRUPT_PENDING | Control::HOTPLUG_PENDING).bits();
        self.device_write(CONTROL_OFFSET, control);
    }

    /// Device side: the response mask for the declared mask size.
    pub fn response(&self) -> Vec<u8> {
        let size = self.device_read(MASK_SIZE_OFFSET) as usize;
        (0..size).map(|i| self.device_read(REQUEST_MASK_OFFSET + size + i)).collect()
    }

    /// Device side: the current contents of the control register.
    pub fn control(&self) -> Control {
        Control::from_bits_retain(self.device_read(CONTROL_OFFSET))
    }

    /// Number of guest-side reads so far.
    pub fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Number of guest-side writes so far.
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Total number of guest-side accesses so far.
    pub fn accesses(&self) -> usize {
        self.reads() + self.writes()
    }
}

impl RegisterWindow for TestWindow {
    fn read(&self, offset: usize) -> u8 {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.bytes[offset].load(Ordering::SeqCst)
    }

    fn write(&self, offset: usize, value: u8) {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.bytes[offset].store(value, Ordering::SeqCst);
    }
}

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

use crate::{ProtocolError, WINDOW_LEN};

/// Byte-granular access to the device register window.
///
/// The protocol only ever issues single-byte accesses and assumes no
/// multi-byte atomicity. Implementations must cover at least [`WINDOW_LEN`]
/// bytes; offsets are always below that bound.
pub trait RegisterWindow {
    /// Reads the byte at `offset`.
    fn read(&self, offset: usize) -> u8;
    /// Writes the byte at `offset`.
    fn write(&self, offset: usize, value: u8);
}

/// A register window backed by a device mapping in the process address space.
pub struct MmioWindow {
    base: *mut u8,
}

impl MmioWindow {
    /// Creates a window over a mapping of `len` bytes starting at `base`.
    ///
    /// Fails if the mapping cannot hold the full window, so that no access
    /// issued later can fall outside it.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `base` points to a valid mapping of at
    /// least `len` bytes of device memory, that the mapping outlives the
    /// window, and that nothing else in the process accesses it.
    pub unsafe fn new(base: *mut u8, len: usize) -> Result<Self, ProtocolError> {
        if len < WINDOW_LEN {
            return Err(ProtocolError::WindowTooSmall(len));
        }
        Ok(Self { base })
    }
}

impl RegisterWindow for MmioWindow {
    fn read(&self, offset: usize) -> u8 {
        assert!(offset < WINDOW_LEN);
        // Safety:
        //   - new() checked that the mapping covers WINDOW_LEN bytes
        //   - the assert keeps offset within that span
        //   - when calling new() we were promised the mapping is valid
        unsafe { self.base.add(offset).read_volatile() }
    }

    fn write(&self, offset: usize, value: u8) {
        assert!(offset < WINDOW_LEN);
        // Safety:
        //   - new() checked that the mapping covers WINDOW_LEN bytes
        //   - the assert keeps offset within that span
        //   - when calling new() we were promised the mapping is valid
        unsafe { self.base.add(offset).write_volatile(value) }
    }
}

// Safety: the window holds the only pointer to the mapping and touches it
// exclusively through volatile single-byte accesses, which cannot tear.
unsafe impl Send for MmioWindow {}
unsafe impl Sync for MmioWindow {}

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

//! Register-level protocol spoken by the VCPU hotplug device.
//!
//! The device exposes a byte-addressed register window: an 8 byte header
//! (mask size, control register, six reserved bytes) followed by the request
//! mask and, immediately after it, the response mask. All accesses are single
//! bytes; the protocol provides no multi-byte atomicity.

#![no_std]

#[cfg(feature = "std")]
extern crate std;

pub mod mask;
pub mod registers;
#[cfg(feature = "std")]
pub mod test_helpers;
pub mod window;

pub use mask::CpuMask;
pub use registers::HotplugRegisters;
pub use window::{MmioWindow, RegisterWindow};

use core::fmt;

use bitflags::bitflags;
use static_assertions::{const_assert, const_assert_eq};

/// Offset of the mask size register. Holds the size of each mask in bytes.
pub const MASK_SIZE_OFFSET: usize = 0;
/// Offset of the control register.
pub const CONTROL_OFFSET: usize = 1;
/// Length of the window header in bytes. Bytes 2..8 are reserved.
pub const HEADER_LEN: usize = 8;
/// Offset of the first byte of the request mask.
pub const REQUEST_MASK_OFFSET: usize = HEADER_LEN;

/// Largest number of CPUs the protocol can address.
pub const MAX_CPUS: usize = 256;
/// Largest request or response mask the protocol carries, in bytes.
pub const MASK_SIZE_MAX: usize = MAX_CPUS / 8;
/// Span of the register window in bytes: the header followed by the request
/// and response masks at their largest.
pub const WINDOW_LEN: usize = HEADER_LEN + 2 * MASK_SIZE_MAX;

const_assert_eq!(WINDOW_LEN, 72);
// The mask size register is a single byte.
const_assert!(MASK_SIZE_MAX <= u8::MAX as usize);

bitflags! {
    /// Contents of the control register.
    ///
    /// Bits 2..8 are reserved; updates must preserve them, which is why all
    /// writes to the register go through read-modify-write sequences.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Control: u8 {
        /// Raised by the device together with its interrupt; cleared by the
        /// guest to acknowledge delivery.
        const INTERRUPT_PENDING = 1 << 0;
        /// Raised by the device when it publishes a new request mask; cleared
        /// by the guest once the response mask has been written.
        const HOTPLUG_PENDING = 1 << 1;
    }
}

/// The ways a device can declare a window layout the protocol cannot carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The declared mask size exceeds [`MASK_SIZE_MAX`].
    MaskTooLarge(usize),
    /// The supplied mapping is smaller than [`WINDOW_LEN`].
    WindowTooSmall(usize),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MaskTooLarge(size) => {
                write!(f, "mask of {} bytes exceeds the maximum of {} bytes", size, MASK_SIZE_MAX)
            }
            ProtocolError::WindowTooSmall(len) => {
                write!(f, "window of {} bytes is below the minimum of {} bytes", len, WINDOW_LEN)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProtocolError {}

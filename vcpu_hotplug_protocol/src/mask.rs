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

use core::fmt;

use crate::{ProtocolError, MASK_SIZE_MAX};

/// A set of CPUs in the wire encoding of the request and response masks.
///
/// Bit `i` lives in byte `i / 8` at position `i % 8`. The mask carries an
/// explicit size in bytes, matching the size register in the window header;
/// bits beyond that size do not exist as far as the protocol is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuMask {
    bytes: [u8; MASK_SIZE_MAX],
    size: usize,
}

impl CpuMask {
    /// Creates an all-clear mask spanning `size` bytes.
    pub fn new(size: usize) -> Result<Self, ProtocolError> {
        if size > MASK_SIZE_MAX {
            return Err(ProtocolError::MaskTooLarge(size));
        }
        Ok(Self { bytes: [0; MASK_SIZE_MAX], size })
    }

    /// Creates a mask from its wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut mask = Self::new(bytes.len())?;
        mask.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(mask)
    }

    /// The size of the mask in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size
    }

    /// The number of CPUs the mask can describe.
    pub fn bit_len(&self) -> usize {
        self.size * 8
    }

    /// The wire encoding of the mask.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.size]
    }

    /// Whether the bit for `cpu` is set. CPUs beyond the mask read as absent.
    pub fn get(&self, cpu: usize) -> bool {
        if cpu >= self.bit_len() {
            return false;
        }
        self.bytes[cpu / 8] & (1 << (cpu % 8)) != 0
    }

    /// Sets the bit for `cpu`. Bits beyond the mask are ignored.
    pub fn set(&mut self, cpu: usize) {
        if cpu < self.bit_len() {
            self.bytes[cpu / 8] |= 1 << (cpu % 8);
        }
    }

    /// Clears the bit for `cpu`. Bits beyond the mask are ignored.
    pub fn clear(&mut self, cpu: usize) {
        if cpu < self.bit_len() {
            self.bytes[cpu / 8] &= !(1 << (cpu % 8));
        }
    }
}

impl fmt::Display for CpuMask {
    /// Formats the mask as colon-separated hex bytes, lowest byte first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_addressing() {
        let mut mask = CpuMask::new(2).unwrap();
        mask.set(0);
        mask.set(9);
        mask.set(15);
        assert_eq!(mask.as_bytes(), &[0b0000_0001, 0b1000_0010]);
        assert!(mask.get(0));
        assert!(!mask.get(1));
        assert!(mask.get(9));
        assert!(mask.get(15));
    }

    #[test]
    fn clear_resets_a_single_bit() {
        let mut mask = CpuMask::from_bytes(&[0xff]).unwrap();
        mask.clear(3);
        assert_eq!(mask.as_bytes(), &[0b1111_0111]);
    }

    #[test]
    fn bits_beyond_the_mask_read_as_absent() {
        let mut mask = CpuMask::new(1).unwrap();
        mask.set(8);
        assert!(!mask.get(8));
        assert_eq!(mask.as_bytes(), &[0]);
    }

    #[test]
    fn zero_size_mask_is_empty() {
        let mask = CpuMask::new(0).unwrap();
        assert_eq!(mask.bit_len(), 0);
        assert_eq!(mask.as_bytes(), &[] as &[u8]);
    }

    #[test]
    fn oversize_mask_is_rejected() {
        assert_eq!(
            CpuMask::new(MASK_SIZE_MAX + 1),
            Err(ProtocolError::MaskTooLarge(MASK_SIZE_MAX + 1))
        );
        assert!(CpuMask::new(MASK_SIZE_MAX).is_ok());
    }

    #[test]
    fn display_matches_the_wire_order() {
        let mask = CpuMask::from_bytes(&[0x0b, 0x00, 0xa0]).unwrap();
        assert_eq!(std::format!("{}", mask), "0b:00:a0");
    }
}

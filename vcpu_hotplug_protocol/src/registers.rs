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

use crate::{
    mask::CpuMask, window::RegisterWindow, Control, ProtocolError, CONTROL_OFFSET, MASK_SIZE_MAX,
    MASK_SIZE_OFFSET, REQUEST_MASK_OFFSET,
};

/// The guest-side view of the hotplug device registers.
///
/// Pure register accesses only. The control register is shared with the
/// device and updated with read-modify-write sequences; callers are
/// responsible for serializing those sequences between their own threads.
pub struct HotplugRegisters<W: RegisterWindow> {
    window: W,
}

impl<W: RegisterWindow> HotplugRegisters<W> {
    pub fn new(window: W) -> Self {
        Self { window }
    }

    /// Reads the size of the request and response masks in bytes.
    pub fn mask_size(&self) -> usize {
        self.window.read(MASK_SIZE_OFFSET) as usize
    }

    /// Reads the control register, keeping any reserved bits that are set.
    pub fn control(&self) -> Control {
        Control::from_bits_retain(self.window.read(CONTROL_OFFSET))
    }

    /// Sets `bits` in the control register, leaving all other bits untouched.
    pub fn set_control(&self, bits: Control) {
        let control = self.control();
        self.window.write(CONTROL_OFFSET, control.union(bits).bits());
    }

    /// Clears `bits` in the control register, leaving all other bits
    /// untouched. Reserved bits survive because the update works on the raw
    /// byte rather than on the known flags only.
    pub fn clear_control(&self, bits: Control) {
        let control = self.control();
        self.window.write(CONTROL_OFFSET, control.difference(bits).bits());
    }

    /// Reads the first `size` bytes of the request mask.
    pub fn read_request_mask(&self, size: usize) -> Result<CpuMask, ProtocolError> {
        if size > MASK_SIZE_MAX {
            return Err(ProtocolError::MaskTooLarge(size));
        }
        let mut bytes = [0u8; MASK_SIZE_MAX];
        for (i, byte) in bytes[..size].iter_mut().enumerate() {
            *byte = self.window.read(REQUEST_MASK_OFFSET + i);
        }
        CpuMask::from_bytes(&bytes[..size])
    }

    /// Writes the response mask into the region immediately after a request
    /// mask of the same size.
    pub fn write_response_mask(&self, mask: &CpuMask) {
        let base = REQUEST_MASK_OFFSET + mask.size_bytes();
        for (i, byte) in mask.as_bytes().iter().enumerate() {
            self.window.write(base + i, *byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestWindow;

    #[test]
    fn reads_the_declared_mask_size() {
        let window = TestWindow::new(3);
        let registers = HotplugRegisters::new(window);
        assert_eq!(registers.mask_size(), 3);
    }

    #[test]
    fn decodes_the_request_mask() {
        let window = TestWindow::new(2);
        window.publish_request(&[0x0f, 0x80]);
        let registers = HotplugRegisters::new(window);
        let request = registers.read_request_mask(2).unwrap();
        assert_eq!(request.as_bytes(), &[0x0f, 0x80]);
    }

    #[test]
    fn rejects_an_oversize_request_mask() {
        let window = TestWindow::new(0xff);
        let registers = HotplugRegisters::new(window);
        assert_eq!(registers.read_request_mask(0xff), Err(ProtocolError::MaskTooLarge(0xff)));
    }

    #[test]
    fn response_lands_immediately_after_the_request() {
        let window = TestWindow::new(2);
        let registers = HotplugRegisters::new(window.clone());
        let response = CpuMask::from_bytes(&[0x03, 0x01]).unwrap();
        registers.write_response_mask(&response);
        assert_eq!(window.device_read(REQUEST_MASK_OFFSET + 2), 0x03);
        assert_eq!(window.device_read(REQUEST_MASK_OFFSET + 3), 0x01);
        // The request region itself is untouched.
        assert_eq!(window.device_read(REQUEST_MASK_OFFSET), 0);
        assert_eq!(window.device_read(REQUEST_MASK_OFFSET + 1), 0);
    }

    #[test]
    fn control_updates_preserve_reserved_bits() {
        let window = TestWindow::new(1);
        window.device_write(CONTROL_OFFSET, 0b1000_0011);
        let registers = HotplugRegisters::new(window.clone());

        registers.clear_control(Control::INTERRUPT_PENDING);
        assert_eq!(window.device_read(CONTROL_OFFSET), 0b1000_0010);

        registers.clear_control(Control::HOTPLUG_PENDING);
        assert_eq!(window.device_read(CONTROL_OFFSET), 0b1000_0000);

        registers.set_control(Control::HOTPLUG_PENDING);
        assert_eq!(window.device_read(CONTROL_OFFSET), 0b1000_0010);
    }

    #[test]
    fn control_reports_pending_flags() {
        let window = TestWindow::new(1);
        window.device_write(CONTROL_OFFSET, 0x03);
        let registers = HotplugRegisters::new(window);
        let control = registers.control();
        assert!(control.contains(Control::INTERRUPT_PENDING));
        assert!(control.contains(Control::HOTPLUG_PENDING));
    }
}

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

use std::sync::Mutex;

use vcpu_hotplug_protocol::{Control, CpuMask, HotplugRegisters, ProtocolError, RegisterWindow};

/// A hotplug device paired with the lock that serializes control register
/// updates.
///
/// The interrupt handler and the worker both read-modify-write the control
/// register, so those sequences take the lock. The mask regions are only
/// ever touched by the worker and need no locking.
pub struct HotplugDevice<W: RegisterWindow> {
    registers: HotplugRegisters<W>,
    control_lock: Mutex<()>,
}

impl<W: RegisterWindow> HotplugDevice<W> {
    pub fn new(window: W) -> Self {
        Self { registers: HotplugRegisters::new(window), control_lock: Mutex::new(()) }
    }

    /// Acknowledges a raised interrupt by clearing the pending bit. Returns
    /// whether the bit was actually set.
    pub fn ack_interrupt(&self) -> bool {
        let _guard = self.control_lock.lock().unwrap();
        if !self.registers.control().contains(Control::INTERRUPT_PENDING) {
            return false;
        }
        self.registers.clear_control(Control::INTERRUPT_PENDING);
        true
    }

    /// Reports the current request as served by clearing the hotplug pending
    /// bit.
    pub fn complete_pass(&self) {
        let _guard = self.control_lock.lock().unwrap();
        self.registers.clear_control(Control::HOTPLUG_PENDING);
    }

    /// The mask size currently declared by the device, in bytes.
    pub fn mask_size(&self) -> usize {
        self.registers.mask_size()
    }

    /// Reads the first `size` bytes of the request mask.
    pub fn read_request_mask(&self, size: usize) -> Result<CpuMask, ProtocolError> {
        self.registers.read_request_mask(size)
    }

    /// Writes the response mask next to a request mask of the same size.
    pub fn write_response_mask(&self, mask: &CpuMask) {
        self.registers.write_response_mask(mask)
    }
}

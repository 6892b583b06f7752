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

use std::sync::Arc;

use vcpu_hotplug_protocol::RegisterWindow;

use crate::{device::HotplugDevice, signal::ReconcileSignal};

/// Outcome of an interrupt delivery, for dispatch on a shared line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqStatus {
    /// The device had raised the interrupt and it was acknowledged.
    Handled,
    /// The interrupt was not this device's; nothing was touched.
    Ignored,
}

/// The interrupt-context half of the driver.
///
/// Does only what an interrupt may: acknowledge the device and wake the
/// worker. It never reads or writes the mask regions and never blocks on
/// anything but the control register lock.
pub struct InterruptHandler<W: RegisterWindow> {
    device: Arc<HotplugDevice<W>>,
    signal: Arc<ReconcileSignal>,
}

impl<W: RegisterWindow> InterruptHandler<W> {
    pub(crate) fn new(device: Arc<HotplugDevice<W>>, signal: Arc<ReconcileSignal>) -> Self {
        Self { device, signal }
    }

    /// Services one interrupt delivery.
    pub fn handle(&self) -> IrqStatus {
        if !self.device.ack_interrupt() {
            return IrqStatus::Ignored;
        }
        self.signal.raise();
        IrqStatus::Handled
    }
}

impl<W: RegisterWindow> Clone for InterruptHandler<W> {
    fn clone(&self) -> Self {
        Self { device: self.device.clone(), signal: self.signal.clone() }
    }
}

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

//! Guest-side driver for the VCPU hotplug device.
//!
//! The device publishes a request mask naming the CPUs it wants online and
//! raises an interrupt. The interrupt handler acknowledges the device and
//! wakes a worker thread, which reconciles the platform topology against the
//! request and writes back a response mask describing the state actually
//! reached. Splitting the two keeps the interrupt path free of mask I/O and
//! CPU transitions.

pub mod device;
pub mod driver;
pub mod interrupt;
pub mod reconcile;
pub mod signal;
pub mod topology;
pub mod worker;


pub use driver::HotplugDriver;
pub use interrupt::{InterruptHandler, IrqStatus};
pub use reconcile::reconcile;
pub use topology::{CpuTopology, SysfsTopology};

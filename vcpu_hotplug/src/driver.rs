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

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use anyhow::Context;
use log::error;
use vcpu_hotplug_protocol::RegisterWindow;

use crate::{
    device::HotplugDevice, interrupt::InterruptHandler, signal::ReconcileSignal,
    topology::CpuTopology, worker::Worker,
};

/// An attached instance of the hotplug driver.
///
/// Owns the worker thread. [`HotplugDriver::detach`] stops and joins it;
/// dropping the driver does the same so that the thread never outlives the
/// register window it works on.
pub struct HotplugDriver<W: RegisterWindow> {
    device: Arc<HotplugDevice<W>>,
    signal: Arc<ReconcileSignal>,
    passes: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl<W: RegisterWindow + Send + Sync + 'static> HotplugDriver<W> {
    /// Attaches to a device window and starts the worker thread.
    pub fn attach<T>(window: W, topology: T) -> anyhow::Result<Self>
    where
        T: CpuTopology + Send + 'static,
    {
        let device = Arc::new(HotplugDevice::new(window));
        let signal = Arc::new(ReconcileSignal::new());
        let passes = Arc::new(AtomicU64::new(0));
        let mut worker = Worker::new(device.clone(), signal.clone(), topology, passes.clone());
        let worker = thread::Builder::new()
            .name("vcpu-hotplug-worker".to_string())
            .spawn(move || worker.run())
            .context("spawning the hotplug worker thread")?;
        Ok(Self { device, signal, passes, worker: Some(worker) })
    }

    /// A handler suitable for wiring into interrupt delivery. Handlers are
    /// cheap to clone and stay valid until the driver detaches.
    pub fn interrupt_handler(&self) -> InterruptHandler<W> {
        InterruptHandler::new(self.device.clone(), self.signal.clone())
    }

    /// Number of reconciliation passes completed since attach.
    pub fn passes_completed(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Stops the worker and waits for it to exit. A pass that is already
    /// running finishes first.
    pub fn detach(mut self) -> anyhow::Result<()> {
        self.signal.request_stop();
        match self.worker.take() {
            Some(worker) => {
                worker.join().map_err(|_| anyhow::anyhow!("the hotplug worker panicked"))
            }
            None => Ok(()),
        }
    }
}

impl<W: RegisterWindow> Drop for HotplugDriver<W> {
    fn drop(&mut self) {
        self.signal.request_stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("the hotplug worker panicked");
            }
        }
    }
}

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

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::{debug, warn};
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use vcpu_hotplug_protocol::{RegisterWindow, MASK_SIZE_MAX};

use crate::{
    device::HotplugDevice,
    reconcile::reconcile,
    signal::{ReconcileSignal, Wake},
    topology::CpuTopology,
};

/// The CPU the worker pins itself to. Reconciliation could take the worker's
/// own CPU offline if it ran anywhere else; CPU 0 is the one CPU that is
/// never offlined.
const WORKER_CPU: usize = 0;

/// The thread-context half of the driver: waits for the interrupt handler's
/// signal and runs reconciliation passes until stopped.
pub struct Worker<W: RegisterWindow, T: CpuTopology> {
    device: Arc<HotplugDevice<W>>,
    signal: Arc<ReconcileSignal>,
    topology: T,
    passes: Arc<AtomicU64>,
}

impl<W: RegisterWindow, T: CpuTopology> Worker<W, T> {
    pub fn new(
        device: Arc<HotplugDevice<W>>,
        signal: Arc<ReconcileSignal>,
        topology: T,
        passes: Arc<AtomicU64>,
    ) -> Self {
        Self { device, signal, topology, passes }
    }

    /// Runs until a stop request arrives. Intended for a dedicated thread.
    pub fn run(&mut self) {
        pin_to_cpu(WORKER_CPU);
        loop {
            match self.signal.wait() {
                Wake::Stop => break,
                Wake::Reconcile => self.run_pass(),
            }
        }
        debug!("hotplug worker exiting");
    }

    /// Serves one published request end to end.
    fn run_pass(&mut self) {
        let declared = self.device.mask_size();
        let size = if declared > MASK_SIZE_MAX {
            warn!("device declared a {} byte mask, clamping to {} bytes", declared, MASK_SIZE_MAX);
            MASK_SIZE_MAX
        } else {
            declared
        };
        if size == 0 {
            // No CPUs are addressable, but the handshake still completes.
            self.device.complete_pass();
            self.passes.fetch_add(1, Ordering::SeqCst);
            return;
        }
        let requested = match self.device.read_request_mask(size) {
            Ok(requested) => requested,
            Err(err) => {
                warn!("ignoring unreadable request: {}", err);
                return;
            }
        };
        debug!("request mask {}", requested);
        let achieved = reconcile(&requested, &mut self.topology);
        self.device.write_response_mask(&achieved);
        self.device.complete_pass();
        self.passes.fetch_add(1, Ordering::SeqCst);
        debug!("response mask {}", achieved);
    }
}

/// Pins the calling thread to `cpu`. Failure leaves the thread unpinned and
/// the driver still functional, so it is reported but not propagated.
fn pin_to_cpu(cpu: usize) {
    let mut cpu_set = CpuSet::new();
    if let Err(err) = cpu_set.set(cpu) {
        warn!("failed to build the CPU set for CPU {}: {}", cpu, err);
        return;
    }
    // Pid 0 is the calling thread.
    if let Err(err) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        warn!("failed to pin the worker to CPU {}: {}", cpu, err);
    }
}

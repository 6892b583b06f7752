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

//! Userspace agent connecting the VCPU hotplug driver to its device.
//!
//! The device's register window and interrupt are surfaced through UIO. The
//! agent maps the window, attaches the driver, and then pumps interrupt
//! events from the UIO file descriptor into the driver's handler until it is
//! told to shut down.

use std::{
    fs::{File, OpenOptions},
    num::NonZeroUsize,
    os::{fd::AsRawFd, unix::fs::OpenOptionsExt},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use log::{debug, info, warn};
use nix::{
    errno::Errno,
    sys::mman::{mmap, munmap, MapFlags, ProtFlags},
    unistd,
};
use signal_hook::{
    consts::signal::{SIGINT, SIGTERM},
    flag,
};
use vcpu_hotplug::{HotplugDriver, InterruptHandler, IrqStatus, SysfsTopology};
use vcpu_hotplug_protocol::{MmioWindow, RegisterWindow};

/// Guest agent for the VCPU hotplug device.
#[derive(Parser, Debug)]
struct Args {
    /// UIO device exposing the hotplug register window.
    #[arg(long, default_value = "/dev/uio0")]
    device: PathBuf,
    /// Length of the register window mapping in bytes.
    #[arg(long, default_value_t = 4096)]
    map_len: usize,
    /// Root of the sysfs CPU tree.
    #[arg(long, default_value = SysfsTopology::DEFAULT_ROOT)]
    cpu_root: PathBuf,
}

/// How long the pump waits before rechecking a quiet device.
const QUIET_POLL: Duration = Duration::from_millis(100);

/// Registers SIGINT and SIGTERM to raise the returned stop flag.
fn install_stop_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, Arc::clone(&stop)).context("registering the SIGINT handler")?;
    flag::register(SIGTERM, Arc::clone(&stop)).context("registering the SIGTERM handler")?;
    Ok(stop)
}

/// Feeds UIO interrupt events to the driver's handler until the stop flag is
/// raised.
///
/// The device must be open with `O_NONBLOCK`. The stop handlers restart any
/// read they interrupt, so a blocking read would keep the pump parked until
/// the next interrupt; instead the pump backs off briefly whenever the device
/// has no event pending.
fn pump_events<W: RegisterWindow>(
    stop: &AtomicBool,
    device: &File,
    handler: &InterruptHandler<W>,
) -> anyhow::Result<()> {
    while !stop.load(Ordering::SeqCst) {
        // Writing 1 to the UIO device re-enables the interrupt.
        unistd::write(device.as_raw_fd(), &1u32.to_ne_bytes())
            .context("re-arming the UIO interrupt")?;
        let mut count = [0u8; 4];
        match unistd::read(device.as_raw_fd(), &mut count) {
            Ok(4) => {
                debug!("interrupt event {}", u32::from_ne_bytes(count));
                if handler.handle() == IrqStatus::Ignored {
                    debug!("spurious interrupt");
                }
            }
            Ok(n) => warn!("short read of {} bytes from the UIO event counter", n),
            Err(Errno::EAGAIN) => thread::sleep(QUIET_POLL),
            Err(err) => return Err(err).context("reading the UIO event counter"),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(&args.device)
        .with_context(|| format!("opening {}", args.device.display()))?;
    let len = NonZeroUsize::new(args.map_len).context("the mapping length must not be zero")?;
    // Safety: we map a fresh region at an address chosen by the kernel, so
    // nothing else aliases it.
    let base = unsafe {
        mmap(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            Some(&device),
            0,
        )
    }
    .context("mapping the register window")?;
    // Safety: the mapping covers map_len bytes of device memory and stays
    // mapped until after the driver detaches below.
    let window = unsafe { MmioWindow::new(base.cast(), args.map_len) }
        .context("validating the register window")?;

    let topology = SysfsTopology::new(&args.cpu_root)
        .with_context(|| format!("reading the CPU topology under {}", args.cpu_root.display()))?;
    let cpus = topology.possible_cpus();
    info!("managing {} possible CPUs: {:?}", cpus.len(), cpus);

    let stop = install_stop_flag()?;
    let driver = HotplugDriver::attach(window, topology).context("attaching the hotplug driver")?;
    let handler = driver.interrupt_handler();
    info!("attached to {}", args.device.display());

    let result = pump_events(&stop, &device, &handler);

    drop(handler);
    driver.detach().context("detaching the hotplug driver")?;
    // Safety: the worker has exited and the handler is gone, so nothing
    // references the mapping any more.
    unsafe { munmap(base, args.map_len) }.context("unmapping the register window")?;
    info!("detached");
    result
}

#[cfg(test)]
mod tests {
    use vcpu_hotplug::CpuTopology;
    use vcpu_hotplug_protocol::test_helpers::TestWindow;

    use super::*;

    /// A topology with nothing to manage. The pump tests never deliver an
    /// event, so the driver's worker has no reason to touch it.
    struct EmptyTopology;

    impl CpuTopology for EmptyTopology {
        fn is_possible(&self, _cpu: usize) -> bool {
            false
        }

        fn is_online(&self, _cpu: usize) -> bool {
            false
        }

        fn set_online(&mut self, cpu: usize) -> anyhow::Result<()> {
            anyhow::bail!("no CPU {} to bring online", cpu)
        }

        fn set_offline(&mut self, cpu: usize) -> anyhow::Result<()> {
            anyhow::bail!("no CPU {} to take offline", cpu)
        }
    }

    #[test]
    fn pump_returns_at_once_when_stop_is_already_raised() {
        let stop = AtomicBool::new(true);
        let device = tempfile::tempfile().unwrap();
        let driver = HotplugDriver::attach(TestWindow::new(1), EmptyTopology).unwrap();
        let handler = driver.interrupt_handler();

        pump_events(&stop, &device, &handler).unwrap();

        // The pump checked the flag before touching the device at all.
        assert_eq!(device.metadata().unwrap().len(), 0);
    }

    #[test]
    fn pump_stops_without_waiting_for_another_event() {
        let stop = Arc::new(AtomicBool::new(false));
        let device = tempfile::tempfile().unwrap();
        let driver = HotplugDriver::attach(TestWindow::new(1), EmptyTopology).unwrap();
        let handler = driver.interrupt_handler();

        let setter = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                stop.store(true, Ordering::SeqCst);
            })
        };
        // No interrupt event ever arrives; the pump must come back anyway.
        pump_events(&stop, &device, &handler).unwrap();
        setter.join().unwrap();
    }
}

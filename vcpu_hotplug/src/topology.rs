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

use std::{fs, io::ErrorKind, path::PathBuf};

use anyhow::Context;
use log::warn;

/// The CPU topology of the platform, as far as hotplug is concerned.
pub trait CpuTopology {
    /// Whether the platform could ever run `cpu`.
    fn is_possible(&self, cpu: usize) -> bool;
    /// Whether `cpu` is currently online.
    fn is_online(&self, cpu: usize) -> bool;
    /// Brings `cpu` online.
    fn set_online(&mut self, cpu: usize) -> anyhow::Result<()>;
    /// Takes `cpu` offline.
    fn set_offline(&mut self, cpu: usize) -> anyhow::Result<()>;
}

/// The live topology exposed by the kernel under `/sys/devices/system/cpu`.
///
/// The possible set is fixed at boot, so it is parsed once at construction;
/// online state is read back from sysfs on every query because other agents
/// can change it at any time.
pub struct SysfsTopology {
    root: PathBuf,
    possible: Vec<bool>,
}

impl SysfsTopology {
    pub const DEFAULT_ROOT: &'static str = "/sys/devices/system/cpu";

    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        let list = fs::read_to_string(root.join("possible"))
            .with_context(|| format!("reading {}/possible", root.display()))?;
        let possible = parse_cpu_list(list.trim())
            .with_context(|| format!("parsing possible CPU list {:?}", list.trim()))?;
        Ok(Self { root, possible })
    }

    /// The CPUs the platform could ever run, in ascending order.
    pub fn possible_cpus(&self) -> Vec<usize> {
        self.possible
            .iter()
            .enumerate()
            .filter_map(|(cpu, &possible)| possible.then_some(cpu))
            .collect()
    }

    fn online_path(&self, cpu: usize) -> PathBuf {
        self.root.join(format!("cpu{}/online", cpu))
    }
}

impl CpuTopology for SysfsTopology {
    fn is_possible(&self, cpu: usize) -> bool {
        self.possible.get(cpu).copied().unwrap_or(false)
    }

    fn is_online(&self, cpu: usize) -> bool {
        match fs::read_to_string(self.online_path(cpu)) {
            Ok(contents) => contents.trim() == "1",
            // CPUs the kernel never offlines (typically the boot CPU) carry
            // no online file; they are up whenever their directory exists.
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.root.join(format!("cpu{}", cpu)).is_dir()
            }
            Err(err) => {
                warn!("failed to read the online state of CPU {}: {}", cpu, err);
                false
            }
        }
    }

    fn set_online(&mut self, cpu: usize) -> anyhow::Result<()> {
        fs::write(self.online_path(cpu), "1")
            .with_context(|| format!("bringing CPU {} online", cpu))
    }

    fn set_offline(&mut self, cpu: usize) -> anyhow::Result<()> {
        fs::write(self.online_path(cpu), "0")
            .with_context(|| format!("taking CPU {} offline", cpu))
    }
}

/// Parses the kernel's cpulist format, e.g. `0-3,5`.
fn parse_cpu_list(list: &str) -> anyhow::Result<Vec<bool>> {
    let mut possible = Vec::new();
    if list.is_empty() {
        return Ok(possible);
    }
    for part in list.split(',') {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (start.trim().parse::<usize>()?, end.trim().parse::<usize>()?),
            None => {
                let cpu = part.trim().parse::<usize>()?;
                (cpu, cpu)
            }
        };
        if end < start {
            anyhow::bail!("invalid CPU range {:?}", part);
        }
        if possible.len() <= end {
            possible.resize(end + 1, false);
        }
        for cpu in start..=end {
            possible[cpu] = true;
        }
    }
    Ok(possible)
}

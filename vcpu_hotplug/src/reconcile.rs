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

use log::{info, warn};
use vcpu_hotplug_protocol::CpuMask;

use crate::topology::CpuTopology;

/// Drives the platform topology towards `requested` and returns the state
/// actually reached, bit for bit.
///
/// The boot CPU is reported online no matter what was requested. CPUs the
/// platform can never run are reported absent. A CPU whose transition fails
/// keeps its true state in the result; failures never abort the pass, so
/// every other CPU is still served.
pub fn reconcile<T: CpuTopology>(requested: &CpuMask, topology: &mut T) -> CpuMask {
    let mut achieved = requested.clone();
    if achieved.bit_len() == 0 {
        return achieved;
    }
    // CPU 0 stays up; it runs the worker itself.
    achieved.set(0);
    for cpu in 1..achieved.bit_len() {
        if !topology.is_possible(cpu) {
            if achieved.get(cpu) {
                info!("CPU {} is not possible on this platform, ignoring request", cpu);
                achieved.clear(cpu);
            }
            continue;
        }
        let want_online = achieved.get(cpu);
        if want_online == topology.is_online(cpu) {
            continue;
        }
        if want_online {
            match topology.set_online(cpu) {
                Ok(()) => info!("CPU {} brought online", cpu),
                Err(err) => {
                    warn!("failed to bring CPU {} online: {:#}", cpu, err);
                    achieved.clear(cpu);
                }
            }
        } else {
            match topology.set_offline(cpu) {
                Ok(()) => info!("CPU {} taken offline", cpu),
                Err(err) => {
                    warn!("failed to take CPU {} offline: {:#}", cpu, err);
                    achieved.set(cpu);
                }
            }
        }
    }
    achieved
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use rand::{rngs::StdRng, Rng, SeedableRng};
    use vcpu_hotplug_protocol::CpuMask;

    use super::*;
    use crate::test::FakeTopology;

    #[test]
    fn boot_cpu_is_always_reported_online() {
        let mut topology = FakeTopology::new(&[0, 1, 2, 3], &[0, 1, 2, 3]);
        let requested = CpuMask::from_bytes(&[0x00]).unwrap();
        let achieved = reconcile(&requested, &mut topology);
        // CPUs 1..3 were offlined as requested; CPU 0 stayed up.
        assert_eq!(achieved.as_bytes(), &[0x01]);
        assert!(topology.is_online(0));
        for cpu in 1..4 {
            assert!(!topology.is_online(cpu), "CPU {}", cpu);
        }
    }

    #[test]
    fn a_request_for_an_impossible_cpu_alone_still_pins_the_boot_cpu() {
        let mut topology = FakeTopology::new(&[0, 1], &[0, 1]);
        let requested = CpuMask::from_bytes(&[0x20]).unwrap();
        let achieved = reconcile(&requested, &mut topology);
        // Bit 5 is forced off; CPU 1 was requested offline and went down.
        assert_eq!(achieved.as_bytes(), &[0x01]);
        assert!(!topology.is_online(1));
    }

    #[test]
    fn impossible_cpus_are_cleared() {
        let mut topology = FakeTopology::new(&[0, 1], &[0, 1]);
        let mut requested = CpuMask::new(1).unwrap();
        requested.set(0);
        requested.set(1);
        requested.set(5);
        let achieved = reconcile(&requested, &mut topology);
        assert!(!achieved.get(5));
        assert_eq!(achieved.as_bytes(), &[0x03]);
    }

    #[test]
    fn failed_transitions_report_the_true_state() {
        let mut topology = FakeTopology::new(&[0, 1, 2, 3], &[0]);
        topology.fail_online(2);
        let requested = CpuMask::from_bytes(&[0x0f]).unwrap();
        let achieved = reconcile(&requested, &mut topology);
        // CPU 2 refused to come up; CPUs 1 and 3 still made it.
        assert_eq!(achieved.as_bytes(), &[0x0b]);
        assert!(topology.is_online(1));
        assert!(!topology.is_online(2));
        assert!(topology.is_online(3));
    }

    #[test]
    fn failed_offline_keeps_the_bit_set() {
        let mut topology = FakeTopology::new(&[0, 1], &[0, 1]);
        topology.fail_offline(1);
        let requested = CpuMask::from_bytes(&[0x01]).unwrap();
        let achieved = reconcile(&requested, &mut topology);
        assert_eq!(achieved.as_bytes(), &[0x03]);
        assert!(topology.is_online(1));
    }

    #[test]
    fn second_pass_makes_no_transitions() {
        let mut topology = FakeTopology::new(&[0, 1, 2, 3], &[0, 3]);
        let transitions = topology.transition_counter();
        let requested = CpuMask::from_bytes(&[0x07]).unwrap();

        let first = reconcile(&requested, &mut topology);
        let after_first = transitions.load(Ordering::SeqCst);
        assert!(after_first > 0);

        let second = reconcile(&requested, &mut topology);
        assert_eq!(first, second);
        assert_eq!(transitions.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn empty_request_is_a_no_op() {
        let mut topology = FakeTopology::new(&[0, 1], &[0, 1]);
        let transitions = topology.transition_counter();
        let requested = CpuMask::new(0).unwrap();
        let achieved = reconcile(&requested, &mut topology);
        assert_eq!(achieved.bit_len(), 0);
        assert_eq!(transitions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn matches_an_oracle_on_random_requests() {
        let mut rng = StdRng::seed_from_u64(0x76637075);
        for _ in 0..100 {
            let possible: Vec<usize> = (0..16).filter(|_| rng.gen_bool(0.7)).collect();
            let online: Vec<usize> =
                possible.iter().copied().filter(|&cpu| cpu == 0 || rng.gen_bool(0.5)).collect();
            let mut topology = FakeTopology::new(&possible, &online);
            let requested = CpuMask::from_bytes(&[rng.gen(), rng.gen()]).unwrap();

            let achieved = reconcile(&requested, &mut topology);

            for cpu in 0..achieved.bit_len() {
                let expected = if cpu == 0 {
                    true
                } else if !possible.contains(&cpu) {
                    false
                } else {
                    requested.get(cpu)
                };
                assert_eq!(achieved.get(cpu), expected, "CPU {}", cpu);
                let online = expected && possible.contains(&cpu);
                assert_eq!(topology.is_online(cpu), online, "CPU {}", cpu);
            }
        }
    }
}

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

use std::sync::{Condvar, Mutex};

/// What a waiter was woken up for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// A reconciliation request is pending.
    Reconcile,
    /// The worker must exit.
    Stop,
}

/// Sticky wake-up flag connecting the interrupt handler to the worker.
///
/// A raise is remembered until a waiter consumes it. Raising while the
/// worker is busy therefore still produces one further pass, and any number
/// of raises before that pass coalesce into it. Stop requests also stick,
/// are never consumed, and win over pending work.
#[derive(Default)]
pub struct ReconcileSignal {
    state: Mutex<State>,
    wakeup: Condvar,
}

#[derive(Default)]
struct State {
    pending: bool,
    stopping: bool,
}

impl ReconcileSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the device raised an interrupt and wakes the worker.
    pub fn raise(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending = true;
        self.wakeup.notify_one();
    }

    /// Asks the worker to exit once any pass it is currently running ends.
    pub fn request_stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopping = true;
        self.wakeup.notify_all();
    }

    /// Blocks until there is something to do.
    ///
    /// Stop is checked first on every wake-up, so a stop request beats a
    /// pending reconciliation that has not started yet.
    pub fn wait(&self) -> Wake {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.stopping {
                return Wake::Stop;
            }
            if state.pending {
                state.pending = false;
                return Wake::Reconcile;
            }
            state = self.wakeup.wait(state).unwrap();
        }
    }
}

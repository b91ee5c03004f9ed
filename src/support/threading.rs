//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of mhbox.
//
// mhbox is free software: you can redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// mhbox is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// mhbox. If not, see <http://www.gnu.org/licenses/>.

//! Running long folder operations off the calling thread.
//!
//! The storage engine itself is synchronous. A caller that needs to stay
//! responsive (e.g. while scanning a large tree) hands the work to
//! `run_in_background()` and then polls the returned `Pending` from its own
//! loop. There is no way to cancel work once started; dropping the `Pending`
//! only abandons interest in the result.

use std::thread;
use std::time::Duration;

use crossbeam::channel;

/// The eventual result of a task started with `run_in_background()`.
pub struct Pending<T> {
    result: channel::Receiver<thread::Result<T>>,
    done: Option<thread::Result<T>>,
}

/// Run `task` on a new worker thread.
pub fn run_in_background<T: Send + 'static>(
    task: impl FnOnce() -> T + Send + 'static,
) -> Pending<T> {
    let (send, recv) = channel::bounded(1);
    thread::spawn(move || {
        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        // The receiver may have been dropped; nobody cares about the result
        // in that case.
        let _ = send.send(result);
    });

    Pending {
        result: recv,
        done: None,
    }
}

impl<T> Pending<T> {
    /// Check whether the task has finished, without blocking.
    pub fn is_done(&mut self) -> bool {
        if self.done.is_none() {
            self.done = self.result.try_recv().ok();
        }

        self.done.is_some()
    }

    /// Wait up to `timeout` for the task to finish.
    ///
    /// Returns whether it has finished.
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        if self.done.is_none() {
            self.done = self.result.recv_timeout(timeout).ok();
        }

        self.done.is_some()
    }

    /// Take the result if the task has finished.
    ///
    /// A panic on the worker is returned as `Err` with the panic payload.
    pub fn poll(&mut self) -> Option<thread::Result<T>> {
        if self.is_done() {
            self.done.take()
        } else {
            None
        }
    }

    /// Block until the task finishes and return its result.
    pub fn wait(mut self) -> thread::Result<T> {
        match self.done.take() {
            Some(r) => r,
            None => self.result.recv().unwrap_or_else(|_| {
                Err(Box::new("worker thread vanished without a result")
                    as Box<dyn std::any::Any + Send>)
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn result_arrives() {
        let (go_send, go_recv) = channel::bounded::<()>(0);
        let mut pending = run_in_background(move || {
            go_recv.recv().unwrap();
            42
        });

        assert!(!pending.is_done());
        assert!(pending.poll().is_none());
        go_send.send(()).unwrap();
        assert!(pending.wait_timeout(Duration::from_secs(10)));
        assert_eq!(42, pending.poll().unwrap().unwrap());
    }

    #[test]
    fn panics_are_reported() {
        let pending = run_in_background(|| -> u32 { panic!("oops") });
        assert!(pending.wait().is_err());
    }
}

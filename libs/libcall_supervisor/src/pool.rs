// Copyright 2026, The Android Open Source Project
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

//! Fixed-size worker pool whose submissions can be waited on with a deadline.

use anyhow::{anyhow, Context, Result};
use log::debug;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct WorkerPool {
    jobs: Sender<Job>,
    size: usize,
}

impl WorkerPool {
    /// Starts `size` worker threads named `<name>-<index>`.
    ///
    /// Workers are detached: dropping the pool lets idle workers exit, busy ones exit after
    /// their current job returns.
    pub fn new(name: &str, size: usize) -> Result<WorkerPool> {
        let (jobs, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&receiver))
                .with_context(|| format!("Failed to spawn worker {index} of {name}"))?;
        }
        Ok(WorkerPool { jobs, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queues `work`. A panic inside `work` is reported as an error result.
    pub fn submit<T, F>(&self, work: F) -> Pending<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
                Err(anyhow!("work panicked: {}", panic_message(&*payload)))
            });
            // The caller may have stopped waiting; the result is then discarded.
            let _ = sender.send(result);
        });
        if self.jobs.send(job).is_err() {
            // Every worker is gone. Dropping the job disconnects the receiver, which the caller
            // observes as an interruption.
            debug!("Worker pool is shut down, dropping job");
        }
        Pending { receiver }
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Job>>) {
    loop {
        let job = receiver.lock().unwrap_or_else(PoisonError::into_inner).recv();
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Handle to the result of a submitted job.
pub(crate) struct Pending<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Waits up to `timeout` for the job to finish. `Disconnected` means the job was dropped
    /// without running.
    pub fn wait(&self, timeout: Duration) -> Result<Result<T>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

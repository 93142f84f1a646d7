//! The collector thread.
//!
//! Collections do not run on the mutator thread that asked for one. A mutator hands the
//! collection to a single dedicated thread and blocks until it replies. The live memory
//! source uses the same arrangement to keep every process-control request on one thread.

use crossbeam::channel::{self, Receiver, Sender};
use std::io;
use std::thread::{self, JoinHandle, ThreadId};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A worker thread that runs the tasks it is given one at a time, in order, and hands each
/// result back to the thread that is waiting for it.
pub struct SingleThreadExecutor {
    name: String,
    sender: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl SingleThreadExecutor {
    pub fn spawn(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = channel::unbounded::<Task>();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run(receiver))?;
        let worker_id = worker.thread().id();
        debug!("[{}: started]", name);
        Ok(SingleThreadExecutor {
            name,
            sender: Some(sender),
            worker: Some(worker),
            worker_id,
        })
    }

    fn run(receiver: Receiver<Task>) {
        // The loop ends when the executor drops its sender.
        while let Ok(task) = receiver.recv() {
            task();
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Run `task` on the worker thread and wait for its result. A task submitted from the
    /// worker thread itself runs inline. If the task panics, the panic is reported on the
    /// calling thread.
    pub fn execute<R, F>(&self, task: F) -> R
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_worker_thread() {
            return task();
        }
        let (reply_sender, reply_receiver) = channel::bounded::<thread::Result<R>>(1);
        let boxed: Task = Box::new(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
            // The requester waits for this reply, so the receiving end is still alive.
            let _ = reply_sender.send(result);
        });
        trace!("[{}: request sent]", self.name);
        self.sender
            .as_ref()
            .expect("executor sender is only taken on drop")
            .send(boxed)
            .unwrap_or_else(|_| panic!("{} thread is gone", self.name));
        match reply_receiver.recv() {
            Ok(Ok(result)) => {
                trace!("[{}: reply received]", self.name);
                result
            }
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(_) => panic!("{} thread exited without replying", self.name),
        }
    }
}

impl Drop for SingleThreadExecutor {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("[{}: worker panicked]", self.name);
            }
        }
        debug!("[{}: stopped]", self.name);
    }
}

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;

use tokio::task::JoinHandle;

// Handle to one of the agent's long-running actors (a virtual network
// worker, the RIB synchronizer, the watch reader, a signal loop).
//
// Actor lifetimes follow their owner: dropping the handle aborts the task.
// Fire-and-forget work opts out with [`Worker::forget`]; owners that need
// the actor's outcome use [`Worker::join_or`].
#[derive(Debug)]
pub struct Worker<T> {
    handle: Option<JoinHandle<T>>,
}

// ===== impl Worker =====

impl<T> Worker<T> {
    pub fn spawn<Fut>(future: Fut) -> Worker<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Worker {
            handle: Some(tokio::spawn(future)),
        }
    }

    // Waits for the actor to finish and returns its outcome. An actor that
    // was aborted or panicked yields the fallback instead.
    pub async fn join_or(mut self, fallback: T) -> T {
        let Some(handle) = self.handle.take() else {
            return fallback;
        };
        handle.await.unwrap_or(fallback)
    }

    // Lets the actor keep running after the handle is gone.
    pub fn forget(mut self) {
        self.handle.take();
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

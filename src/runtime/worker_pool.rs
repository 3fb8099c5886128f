// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Shared worker pool for source production.
//!
//! Responsibilities:
//! - Lazily build one process-wide pool sized by `RILL_EXEC_THREADS`.
//! - Run source worker closures off the caller's thread; operators downstream
//!   of a source execute synchronously on whichever worker pushed the batch.
//!
//! Current limitations:
//! - No per-plan quota; plans share the pool and fairness is FIFO.

use std::sync::OnceLock;

use threadpool::ThreadPool;

use crate::common::config::config;

static POOL: OnceLock<ThreadPool> = OnceLock::new();

pub fn global_pool() -> &'static ThreadPool {
    POOL.get_or_init(|| ThreadPool::with_name("rill-exec".to_string(), config().exec_threads))
}

/// Spawn a job on the shared pool.
pub fn spawn<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    global_pool().execute(job);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn pool_runs_jobs_concurrently_enough() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = channel();
        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            let tx = tx.clone();
            spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                tx.send(()).expect("receiver alive");
            });
        }
        for _ in 0..32 {
            rx.recv_timeout(std::time::Duration::from_secs(10))
                .expect("job finished");
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }
}

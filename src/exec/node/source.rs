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
//! Source node: pulls batches from a user generator and pushes them
//! downstream on pool workers.
//!
//! With `parallelism > 1` the workers share one generator; the lock is held
//! only around the pull, so downstream work from different batches overlaps.
//! The last worker to retire propagates end-of-input.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arrow::datatypes::SchemaRef;

use crate::common::error::{ErrorKind, PlanResult};
use crate::common::logging::warn;
use crate::exec::batch::ExecBatch;
use crate::exec::node::{Node, NodeId, NodeKind};
use crate::exec::plan::ExecPlan;
use crate::runtime::worker_pool;

/// Pull-style batch producer. `Ok(None)` means exhausted.
pub type BatchGenerator = Box<dyn FnMut() -> PlanResult<Option<ExecBatch>> + Send>;

pub struct SourceOptions {
    pub schema: SchemaRef,
    pub generator: BatchGenerator,
    pub parallelism: usize,
}

impl SourceOptions {
    pub fn new(schema: SchemaRef, generator: BatchGenerator) -> Self {
        SourceOptions {
            schema,
            generator,
            parallelism: 1,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }
}

pub struct SourceState {
    generator: Arc<Mutex<BatchGenerator>>,
    stop: AtomicBool,
    active_workers: AtomicUsize,
    parallelism: usize,
}

impl SourceState {
    pub fn new(generator: BatchGenerator, parallelism: usize) -> Self {
        SourceState {
            generator: Arc::new(Mutex::new(generator)),
            stop: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            parallelism: parallelism.max(1),
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn start(&self, node: &Node, plan: &Arc<ExecPlan>) -> PlanResult<()> {
        self.active_workers.store(self.parallelism, Ordering::SeqCst);
        for _ in 0..self.parallelism {
            let plan = Arc::clone(plan);
            let node_id = node.id;
            worker_pool::spawn(move || run_worker(plan, node_id));
        }
        Ok(())
    }
}

fn source_state(node: &Node) -> &SourceState {
    match &node.kind {
        NodeKind::Source(s) => s,
        _ => unreachable!("worker spawned for a non-source node"),
    }
}

fn run_worker(plan: Arc<ExecPlan>, node_id: NodeId) {
    let node = plan.node(node_id);
    let state = source_state(&node);
    loop {
        if state.stop_requested() {
            break;
        }
        let pulled = {
            let mut generator = state.generator.lock().expect("source generator");
            (generator)()
        };
        match pulled {
            Ok(Some(batch)) => {
                if let Err(err) = node.push_to_outputs(&plan, batch) {
                    plan.abort(err);
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                if err.kind() == ErrorKind::Cancelled {
                    break;
                }
                warn!("source '{}' failed: {}", node.label, err);
                plan.abort(err);
                node.mark_errored();
                break;
            }
        }
    }
    if state.active_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
        if let Err(err) = node.finish(&plan) {
            plan.abort(err);
        }
    }
}

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
//! Sink node: hands finished batches to the plan's consumer.
//!
//! Batches cross a bounded channel, so a slow consumer applies backpressure
//! to the workers pushing into the sink. `Ok(None)` on the channel marks a
//! clean end of stream; an `Err` carries an aborted plan's error.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex};

use arrow::datatypes::SchemaRef;

use crate::common::config::config;
use crate::common::error::{PlanError, PlanResult};
use crate::common::logging::debug;
use crate::exec::batch::ExecBatch;
use crate::exec::plan::ExecPlan;

type Message = PlanResult<Option<ExecBatch>>;

pub struct SinkState {
    tx: Mutex<Option<SyncSender<Message>>>,
}

impl SinkState {
    pub(crate) fn new() -> (Self, Receiver<Message>) {
        let (tx, rx) = sync_channel(config().operator_buffer_batches);
        (
            SinkState {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Blocking hand-off of one batch to the consumer.
    pub(crate) fn deliver(&self, plan: &Arc<ExecPlan>, batch: ExecBatch) -> PlanResult<()> {
        let sender = self.tx.lock().expect("sink sender").clone();
        match sender {
            // Stream already closed by a stop; drop the batch.
            None => Ok(()),
            Some(tx) => {
                if tx.send(Ok(Some(batch))).is_err() {
                    // Consumer dropped its handle; treat as a stop request,
                    // not an error.
                    debug!("sink consumer gone, stopping plan");
                    plan.stop();
                }
                Ok(())
            }
        }
    }

    /// Close the stream with a clean end-of-stream marker.
    pub(crate) fn close(&self) {
        if let Some(tx) = self.tx.lock().expect("sink sender").take() {
            let _ = tx.try_send(Ok(None));
        }
    }

    /// Close the stream delivering `err` to the consumer.
    pub(crate) fn deliver_error(&self, err: PlanError) {
        if let Some(tx) = self.tx.lock().expect("sink sender").take() {
            let _ = tx.try_send(Err(err));
        }
    }
}

/// Consumer end of a sink node.
pub struct SinkHandle {
    schema: SchemaRef,
    rx: Mutex<Receiver<Message>>,
    plan: Arc<ExecPlan>,
}

impl SinkHandle {
    pub(crate) fn new(schema: SchemaRef, rx: Receiver<Message>, plan: Arc<ExecPlan>) -> Self {
        SinkHandle {
            schema,
            rx: Mutex::new(rx),
            plan,
        }
    }

    /// Schema of the batches this handle yields.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Next batch, blocking. `Ok(None)` once the stream is exhausted.
    pub fn recv(&self) -> PlanResult<Option<ExecBatch>> {
        let rx = self.rx.lock().expect("sink receiver");
        match rx.recv() {
            Ok(message) => message,
            // Senders dropped without a marker; surface the plan's verdict.
            Err(_) => match self.plan.completion_result() {
                Some(Err(err)) => Err(err),
                _ => Ok(None),
            },
        }
    }

    /// Drain the stream into memory. On an aborted plan returns the error
    /// even if some batches were already received.
    pub fn collect(&self) -> PlanResult<Vec<ExecBatch>> {
        let mut batches = Vec::new();
        loop {
            match self.recv()? {
                Some(batch) => batches.push(batch),
                None => return Ok(batches),
            }
        }
    }

    /// Non-blocking probe used by tests; `Ok(None)` when nothing is queued.
    pub fn try_recv(&self) -> PlanResult<Option<ExecBatch>> {
        let rx = self.rx.lock().expect("sink receiver");
        match rx.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => match self.plan.completion_result() {
                Some(Err(err)) => Err(err),
                _ => Ok(None),
            },
        }
    }
}

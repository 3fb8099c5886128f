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
//! Execution nodes.
//!
//! Responsibilities:
//! - Hold per-node state and the closed set of node kinds.
//! - Route batches: a producer pushes into `handle_batch`, which runs the
//!   node's operator synchronously on the caller's thread and pushes any
//!   output further downstream.
//! - Propagate end-of-input: when the last input of a node finishes, the
//!   node emits its final output (aggregates) and finishes its own outputs.
//!
//! Current limitations:
//! - One operator per node; no intra-node pipelining or morsel splitting.

pub mod aggregate;
pub mod filter;
pub mod project;
pub mod sink;
pub mod source;

use std::sync::{Arc, Mutex};

use arrow::datatypes::SchemaRef;

use crate::common::error::{PlanError, PlanResult};
use crate::common::logging::debug;
use crate::exec::batch::ExecBatch;
use crate::exec::plan::ExecPlan;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Validated,
    Producing,
    Stopped,
    Finished,
    Errored,
}

/// Closed set of operators; adding a kind means teaching the plan builder
/// and this dispatch about it.
pub enum NodeKind {
    Source(source::SourceState),
    Filter(filter::FilterState),
    Project(project::ProjectState),
    ScalarAggregate(aggregate::ScalarAggregateState),
    GroupedAggregate(aggregate::GroupedAggregateState),
    Sink(sink::SinkState),
    Dummy(DummyState),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Source(_) => "source",
            NodeKind::Filter(_) => "filter",
            NodeKind::Project(_) => "project",
            NodeKind::ScalarAggregate(_) => "scalar_aggregate",
            NodeKind::GroupedAggregate(_) => "grouped_aggregate",
            NodeKind::Sink(_) => "sink",
            NodeKind::Dummy(_) => "dummy",
        }
    }
}

/// A no-op node used to exercise plan lifecycle; it forwards batches
/// unchanged and can be armed to fail its start.
pub struct DummyState {
    start_error: Mutex<Option<PlanError>>,
}

impl DummyState {
    pub fn new(start_error: Option<PlanError>) -> Self {
        DummyState {
            start_error: Mutex::new(start_error),
        }
    }

    fn take_start_error(&self) -> Option<PlanError> {
        self.start_error.lock().expect("dummy state").take()
    }
}

pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub inputs: Vec<NodeId>,
    pub has_output: bool,
    pub output_schema: SchemaRef,
    pub(crate) kind: NodeKind,
    pub(crate) outputs: Mutex<Vec<NodeId>>,
    state: Mutex<NodeState>,
    finished_inputs: Mutex<usize>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        label: impl Into<String>,
        inputs: Vec<NodeId>,
        has_output: bool,
        output_schema: SchemaRef,
        kind: NodeKind,
    ) -> Self {
        Node {
            id,
            label: label.into(),
            inputs,
            has_output,
            output_schema,
            kind,
            outputs: Mutex::new(Vec::new()),
            state: Mutex::new(NodeState::Created),
            finished_inputs: Mutex::new(0),
        }
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock().expect("node state")
    }

    pub(crate) fn mark_validated(&self) {
        let mut state = self.state.lock().expect("node state");
        if *state == NodeState::Created {
            *state = NodeState::Validated;
        }
    }

    pub(crate) fn mark_errored(&self) {
        let mut state = self.state.lock().expect("node state");
        if *state != NodeState::Finished {
            *state = NodeState::Errored;
        }
    }

    pub(crate) fn start(&self, plan: &Arc<ExecPlan>) -> PlanResult<()> {
        {
            let mut state = self.state.lock().expect("node state");
            if *state != NodeState::Validated {
                return Err(PlanError::invalid(format!(
                    "node '{}' cannot start from state {:?}",
                    self.label, *state
                )));
            }
            *state = NodeState::Producing;
        }
        plan.record_started(&self.label);
        debug!("starting {} node '{}'", self.kind.name(), self.label);
        match &self.kind {
            NodeKind::Source(s) => s.start(self, plan),
            NodeKind::Dummy(d) => match d.take_start_error() {
                Some(err) => Err(err),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    pub(crate) fn stop(&self, plan: &Arc<ExecPlan>) {
        {
            let mut state = self.state.lock().expect("node state");
            if matches!(
                *state,
                NodeState::Stopped | NodeState::Finished | NodeState::Errored
            ) {
                return;
            }
            *state = NodeState::Stopped;
        }
        plan.record_stopped(&self.label);
        debug!("stopping {} node '{}'", self.kind.name(), self.label);
        match &self.kind {
            NodeKind::Source(s) => s.request_stop(),
            NodeKind::Sink(s) => s.close(),
            _ => {}
        }
    }

    /// Run this node's operator over one batch on the caller's thread.
    pub(crate) fn handle_batch(&self, plan: &Arc<ExecPlan>, batch: ExecBatch) -> PlanResult<()> {
        if self.state() != NodeState::Producing {
            // Late batch racing a stop; drop it.
            return Ok(());
        }
        match &self.kind {
            NodeKind::Source(_) => Err(PlanError::execution(format!(
                "source node '{}' cannot receive batches",
                self.label
            ))),
            NodeKind::Filter(f) => {
                let out = f.apply(batch)?;
                self.push_to_outputs(plan, out)
            }
            NodeKind::Project(p) => {
                let out = p.apply(batch)?;
                self.push_to_outputs(plan, out)
            }
            NodeKind::ScalarAggregate(a) => a.consume(&batch),
            NodeKind::GroupedAggregate(a) => a.consume(&batch),
            NodeKind::Sink(s) => s.deliver(plan, batch),
            NodeKind::Dummy(_) => self.push_to_outputs(plan, batch),
        }
    }

    pub(crate) fn push_to_outputs(&self, plan: &Arc<ExecPlan>, batch: ExecBatch) -> PlanResult<()> {
        let outputs = self.outputs.lock().expect("node outputs").clone();
        match outputs.split_last() {
            None => Ok(()),
            Some((last, rest)) => {
                for id in rest {
                    plan.node(*id).handle_batch(plan, batch.clone())?;
                }
                plan.node(*last).handle_batch(plan, batch)
            }
        }
    }

    /// One of this node's inputs has produced its last batch.
    pub(crate) fn input_finished(&self, plan: &Arc<ExecPlan>) -> PlanResult<()> {
        let all_done = {
            let mut finished = self.finished_inputs.lock().expect("finished inputs");
            *finished += 1;
            *finished >= self.inputs.len()
        };
        if !all_done {
            return Ok(());
        }
        match &self.kind {
            NodeKind::ScalarAggregate(a) => {
                let out = a.finish()?;
                self.push_to_outputs(plan, out)?;
            }
            NodeKind::GroupedAggregate(a) => {
                let out = a.finish()?;
                self.push_to_outputs(plan, out)?;
            }
            NodeKind::Sink(s) => s.close(),
            _ => {}
        }
        self.finish(plan)
    }

    /// Mark finished and cascade end-of-input downstream.
    pub(crate) fn finish(&self, plan: &Arc<ExecPlan>) -> PlanResult<()> {
        {
            let mut state = self.state.lock().expect("node state");
            if matches!(
                *state,
                NodeState::Finished | NodeState::Stopped | NodeState::Errored
            ) {
                return Ok(());
            }
            *state = NodeState::Finished;
        }
        debug!("{} node '{}' finished", self.kind.name(), self.label);
        let outputs = self.outputs.lock().expect("node outputs").clone();
        for id in outputs {
            plan.node(id).input_finished(plan)?;
        }
        plan.node_finished();
        Ok(())
    }
}

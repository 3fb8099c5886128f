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
//! Execution plan: a DAG of nodes with a shared lifecycle.
//!
//! Responsibilities:
//! - Build and validate the graph (schemas resolved at add time, topology
//!   at start).
//! - Drive the lifecycle: start consumers before their producers, stop
//!   producers before their consumers, settle one promise exactly once.
//! - Fan errors out: an abort latches the error, hands it to every sink,
//!   then tears the pipeline down.
//!
//! Current limitations:
//! - A plan runs once; there is no restart.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use arrow::datatypes::SchemaRef;

use crate::common::error::{PlanError, PlanResult};
use crate::common::logging::{debug, info, warn};
use crate::exec::expr::Expr;
use crate::exec::node::aggregate::{Aggregate, GroupedAggregateState, ScalarAggregateState};
use crate::exec::node::filter::FilterState;
use crate::exec::node::project::ProjectState;
use crate::exec::node::sink::{SinkHandle, SinkState};
use crate::exec::node::source::{SourceOptions, SourceState};
use crate::exec::node::{DummyState, Node, NodeId, NodeKind};

/// One-shot promise settled when the plan finishes, stops or aborts.
/// The first settlement wins.
struct PlanCompletion {
    state: Mutex<Option<PlanResult<()>>>,
    cv: Condvar,
}

impl PlanCompletion {
    fn new() -> Self {
        PlanCompletion {
            state: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn settle(&self, result: PlanResult<()>) {
        let mut state = self.state.lock().expect("completion state");
        if state.is_none() {
            *state = Some(result);
            self.cv.notify_all();
        }
    }

    fn wait(&self) -> PlanResult<()> {
        let mut state = self.state.lock().expect("completion state");
        while state.is_none() {
            state = self.cv.wait(state).expect("completion state");
        }
        state.clone().expect("settled")
    }

    fn peek(&self) -> Option<PlanResult<()>> {
        self.state.lock().expect("completion state").clone()
    }
}

#[derive(Default)]
struct Lifecycle {
    started: bool,
    stopped: bool,
}

pub struct ExecPlan {
    nodes: RwLock<Vec<Arc<Node>>>,
    topo: Mutex<Option<Vec<NodeId>>>,
    lifecycle: Mutex<Lifecycle>,
    completion: PlanCompletion,
    /// Nodes that have not yet finished producing.
    remaining: AtomicUsize,
    started_log: Mutex<Vec<String>>,
    stopped_log: Mutex<Vec<String>>,
}

impl ExecPlan {
    pub fn new() -> Arc<Self> {
        Arc::new(ExecPlan {
            nodes: RwLock::new(Vec::new()),
            topo: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
            completion: PlanCompletion::new(),
            remaining: AtomicUsize::new(0),
            started_log: Mutex::new(Vec::new()),
            stopped_log: Mutex::new(Vec::new()),
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.read().expect("plan nodes").len()
    }

    pub(crate) fn node(&self, id: NodeId) -> Arc<Node> {
        Arc::clone(&self.nodes.read().expect("plan nodes")[id])
    }

    pub fn node_label(&self, id: NodeId) -> String {
        self.node(id).label.clone()
    }

    pub fn output_schema(&self, id: NodeId) -> SchemaRef {
        Arc::clone(&self.node(id).output_schema)
    }

    fn add_node(&self, node: Node) -> PlanResult<NodeId> {
        if self.lifecycle.lock().expect("plan lifecycle").started {
            return Err(PlanError::invalid("cannot add nodes to a started plan"));
        }
        let mut nodes = self.nodes.write().expect("plan nodes");
        let id = nodes.len();
        debug_assert_eq!(node.id, id);
        nodes.push(Arc::new(node));
        Ok(id)
    }

    fn next_id(&self) -> NodeId {
        self.nodes.read().expect("plan nodes").len()
    }

    /// Look up an upstream node that can feed another node.
    fn producer(&self, id: NodeId) -> PlanResult<Arc<Node>> {
        let nodes = self.nodes.read().expect("plan nodes");
        let node = nodes.get(id).ok_or_else(|| {
            PlanError::invalid(format!("input node {} does not exist", id))
        })?;
        if !node.has_output {
            return Err(PlanError::invalid(format!(
                "node '{}' has no output to consume",
                node.label
            )));
        }
        Ok(Arc::clone(node))
    }

    pub fn add_source(&self, label: impl Into<String>, options: SourceOptions) -> PlanResult<NodeId> {
        let SourceOptions {
            schema,
            generator,
            parallelism,
        } = options;
        let id = self.next_id();
        let state = SourceState::new(generator, parallelism);
        self.add_node(Node::new(
            id,
            label,
            Vec::new(),
            true,
            schema,
            NodeKind::Source(state),
        ))
    }

    pub fn add_filter(
        &self,
        label: impl Into<String>,
        input: NodeId,
        predicate: Expr,
    ) -> PlanResult<NodeId> {
        let upstream = self.producer(input)?;
        let schema = Arc::clone(&upstream.output_schema);
        let state = FilterState::try_new(predicate, Arc::clone(&schema))?;
        let id = self.next_id();
        self.add_node(Node::new(
            id,
            label,
            vec![input],
            true,
            schema,
            NodeKind::Filter(state),
        ))
    }

    pub fn add_project(
        &self,
        label: impl Into<String>,
        input: NodeId,
        exprs: Vec<(Expr, String)>,
    ) -> PlanResult<NodeId> {
        let upstream = self.producer(input)?;
        let (state, schema) = ProjectState::try_new(exprs, Arc::clone(&upstream.output_schema))?;
        let id = self.next_id();
        self.add_node(Node::new(
            id,
            label,
            vec![input],
            true,
            schema,
            NodeKind::Project(state),
        ))
    }

    pub fn add_scalar_aggregate(
        &self,
        label: impl Into<String>,
        input: NodeId,
        aggregates: Vec<Aggregate>,
    ) -> PlanResult<NodeId> {
        let upstream = self.producer(input)?;
        let (state, schema) =
            ScalarAggregateState::try_new(aggregates, &upstream.output_schema)?;
        let id = self.next_id();
        self.add_node(Node::new(
            id,
            label,
            vec![input],
            true,
            schema,
            NodeKind::ScalarAggregate(state),
        ))
    }

    pub fn add_grouped_aggregate(
        &self,
        label: impl Into<String>,
        input: NodeId,
        keys: Vec<String>,
        aggregates: Vec<Aggregate>,
    ) -> PlanResult<NodeId> {
        let upstream = self.producer(input)?;
        let (state, schema) =
            GroupedAggregateState::try_new(keys, aggregates, &upstream.output_schema)?;
        let id = self.next_id();
        self.add_node(Node::new(
            id,
            label,
            vec![input],
            true,
            schema,
            NodeKind::GroupedAggregate(state),
        ))
    }

    pub fn add_sink(
        self: &Arc<Self>,
        label: impl Into<String>,
        input: NodeId,
    ) -> PlanResult<SinkHandle> {
        let upstream = self.producer(input)?;
        let schema = Arc::clone(&upstream.output_schema);
        let (state, rx) = SinkState::new();
        let id = self.next_id();
        self.add_node(Node::new(
            id,
            label,
            vec![input],
            false,
            Arc::clone(&schema),
            NodeKind::Sink(state),
        ))?;
        Ok(SinkHandle::new(schema, rx, Arc::clone(self)))
    }

    /// A pass-through node; useful for lifecycle tests and graph stitching.
    pub fn add_dummy(
        &self,
        label: impl Into<String>,
        inputs: Vec<NodeId>,
        start_error: Option<PlanError>,
    ) -> PlanResult<NodeId> {
        let schema = match inputs.first() {
            Some(first) => Arc::clone(&self.producer(*first)?.output_schema),
            None => Arc::new(arrow::datatypes::Schema::empty()),
        };
        for input in inputs.iter().skip(1) {
            self.producer(*input)?;
        }
        let id = self.next_id();
        self.add_node(Node::new(
            id,
            label,
            inputs,
            true,
            schema,
            NodeKind::Dummy(DummyState::new(start_error)),
        ))
    }

    /// Check the graph and compute a topological order, sources first.
    fn validate(&self) -> PlanResult<Vec<NodeId>> {
        let nodes = self.nodes.read().expect("plan nodes");
        if nodes.is_empty() {
            return Err(PlanError::invalid("plan has no nodes"));
        }

        // Rebuild output edges from input edges.
        for node in nodes.iter() {
            node.outputs.lock().expect("node outputs").clear();
        }
        for node in nodes.iter() {
            for input in &node.inputs {
                nodes[*input]
                    .outputs
                    .lock()
                    .expect("node outputs")
                    .push(node.id);
            }
        }

        for node in nodes.iter() {
            let consumers = node.outputs.lock().expect("node outputs").len();
            if node.has_output && consumers == 0 {
                return Err(PlanError::invalid(format!(
                    "node '{}' has an unbound output",
                    node.label
                )));
            }
        }

        // Kahn's algorithm; the builder cannot create cycles, but validate
        // anyway so the invariant does not rest on the builder alone.
        let mut indegree: Vec<usize> = nodes.iter().map(|n| n.inputs.len()).collect();
        let mut ready: std::collections::VecDeque<NodeId> = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for consumer in nodes[id].outputs.lock().expect("node outputs").iter() {
                indegree[*consumer] -= 1;
                if indegree[*consumer] == 0 {
                    ready.push_back(*consumer);
                }
            }
        }
        if order.len() != nodes.len() {
            return Err(PlanError::invalid("plan contains a cycle"));
        }
        for node in nodes.iter() {
            node.mark_validated();
        }
        Ok(order)
    }

    /// Nodes with no inputs.
    pub fn sources(&self) -> Vec<NodeId> {
        self.nodes
            .read()
            .expect("plan nodes")
            .iter()
            .filter(|n| n.inputs.is_empty())
            .map(|n| n.id)
            .collect()
    }

    /// Nodes whose output feeds no other node, the sinks included.
    pub fn sinks(&self) -> Vec<NodeId> {
        let nodes = self.nodes.read().expect("plan nodes");
        let mut consumed = vec![false; nodes.len()];
        for node in nodes.iter() {
            for input in &node.inputs {
                consumed[*input] = true;
            }
        }
        nodes
            .iter()
            .filter(|n| !consumed[n.id])
            .map(|n| n.id)
            .collect()
    }

    /// Start every node, consumers before producers. On a node failing to
    /// start, already-started nodes are stopped in reverse start order and
    /// the error settles the plan.
    pub fn start(self: &Arc<Self>) -> PlanResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock().expect("plan lifecycle");
            if lifecycle.started {
                return Err(PlanError::invalid("plan cannot be restarted"));
            }
            if lifecycle.stopped {
                return Err(PlanError::invalid("plan cannot start after being stopped"));
            }
            lifecycle.started = true;
        }
        let order = match self.validate() {
            Ok(order) => order,
            Err(err) => {
                self.completion.settle(Err(err.clone()));
                return Err(err);
            }
        };
        *self.topo.lock().expect("plan topology") = Some(order.clone());
        self.remaining.store(order.len(), Ordering::SeqCst);
        info!("starting plan with {} nodes", order.len());

        let mut started: Vec<NodeId> = Vec::with_capacity(order.len());
        for id in order.iter().rev() {
            let node = self.node(*id);
            if let Err(err) = node.start(self) {
                warn!("node '{}' failed to start: {}", node.label, err);
                for started_id in started.iter().rev() {
                    self.node(*started_id).stop(self);
                }
                node.mark_errored();
                self.mark_stopped();
                self.completion.settle(Err(err.clone()));
                return Err(err);
            }
            started.push(*id);
        }
        Ok(())
    }

    fn mark_stopped(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().expect("plan lifecycle");
        if lifecycle.stopped {
            return false;
        }
        lifecycle.stopped = true;
        true
    }

    /// Stop producing, producers before consumers. Idempotent; resolves the
    /// plan as finished unless an error was already latched.
    pub fn stop(self: &Arc<Self>) {
        if !self.mark_stopped() {
            return;
        }
        info!("stopping plan");
        let order = self.topo.lock().expect("plan topology").clone();
        match order {
            Some(order) => {
                for id in &order {
                    self.node(*id).stop(self);
                }
            }
            None => {
                // Never started; nothing to tear down.
            }
        }
        self.completion.settle(Ok(()));
    }

    /// Latch `err` as the plan result, surface it at every sink, then stop.
    pub fn abort(self: &Arc<Self>, err: PlanError) {
        warn!("aborting plan: {}", err);
        self.completion.settle(Err(err.clone()));
        let nodes: Vec<Arc<Node>> = self.nodes.read().expect("plan nodes").clone();
        for node in &nodes {
            if let NodeKind::Sink(sink) = &node.kind {
                sink.deliver_error(err.clone());
            }
        }
        self.stop();
    }

    /// Block until the plan settles.
    pub fn wait(&self) -> PlanResult<()> {
        self.completion.wait()
    }

    pub fn completion_result(&self) -> Option<PlanResult<()>> {
        self.completion.peek()
    }

    pub(crate) fn node_finished(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            debug!("all nodes finished");
            self.completion.settle(Ok(()));
        }
    }

    pub(crate) fn record_started(&self, label: &str) {
        self.started_log
            .lock()
            .expect("started log")
            .push(label.to_string());
    }

    pub(crate) fn record_stopped(&self, label: &str) {
        self.stopped_log
            .lock()
            .expect("stopped log")
            .push(label.to_string());
    }

    /// Labels in the order nodes started.
    pub fn started_labels(&self) -> Vec<String> {
        self.started_log.lock().expect("started log").clone()
    }

    /// Labels in the order nodes stopped.
    pub fn stopped_labels(&self) -> Vec<String> {
        self.stopped_log.lock().expect("stopped log").clone()
    }
}

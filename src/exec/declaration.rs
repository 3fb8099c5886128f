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
//! Declarative plan construction.
//!
//! A `Declaration` is a node blueprint with its upstream blueprints nested
//! inside; `add_to_plan` materializes the subtree. `sequence` folds a list
//! into a linear pipeline, first element upstream.

use std::sync::Arc;

use crate::common::error::{PlanError, PlanResult};
use crate::exec::batch::ExecBatch;
use crate::exec::expr::Expr;
use crate::exec::node::aggregate::Aggregate;
use crate::exec::node::source::SourceOptions;
use crate::exec::node::NodeId;
use crate::exec::plan::ExecPlan;

pub enum NodeOptions {
    Source(SourceOptions),
    Filter {
        predicate: Expr,
    },
    Project {
        exprs: Vec<(Expr, String)>,
    },
    ScalarAggregate {
        aggregates: Vec<Aggregate>,
    },
    GroupedAggregate {
        keys: Vec<String>,
        aggregates: Vec<Aggregate>,
    },
}

pub struct Declaration {
    label: String,
    options: NodeOptions,
    inputs: Vec<Declaration>,
}

impl Declaration {
    pub fn new(label: impl Into<String>, options: NodeOptions) -> Self {
        Declaration {
            label: label.into(),
            options,
            inputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: Declaration) -> Self {
        self.inputs.push(input);
        self
    }

    /// Fold a list into a pipeline: each element consumes the previous one.
    pub fn sequence(decls: Vec<Declaration>) -> PlanResult<Declaration> {
        let mut iter = decls.into_iter();
        let mut current = iter
            .next()
            .ok_or_else(|| PlanError::invalid("empty declaration sequence"))?;
        for next in iter {
            current = next.with_input(current);
        }
        Ok(current)
    }

    /// Materialize this declaration (and its inputs) into `plan`.
    pub fn add_to_plan(self, plan: &Arc<ExecPlan>) -> PlanResult<NodeId> {
        let Declaration {
            label,
            options,
            inputs,
        } = self;
        let mut input_ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            input_ids.push(input.add_to_plan(plan)?);
        }
        let single_input = |ids: &[NodeId]| -> PlanResult<NodeId> {
            match ids {
                [one] => Ok(*one),
                _ => Err(PlanError::invalid(format!(
                    "node '{}' takes exactly one input, got {}",
                    label,
                    ids.len()
                ))),
            }
        };
        match options {
            NodeOptions::Source(source_options) => {
                if !input_ids.is_empty() {
                    return Err(PlanError::invalid(format!(
                        "source '{}' cannot have inputs",
                        label
                    )));
                }
                plan.add_source(label, source_options)
            }
            NodeOptions::Filter { predicate } => {
                let input = single_input(&input_ids)?;
                plan.add_filter(label, input, predicate)
            }
            NodeOptions::Project { exprs } => {
                let input = single_input(&input_ids)?;
                plan.add_project(label, input, exprs)
            }
            NodeOptions::ScalarAggregate { aggregates } => {
                let input = single_input(&input_ids)?;
                plan.add_scalar_aggregate(label, input, aggregates)
            }
            NodeOptions::GroupedAggregate { keys, aggregates } => {
                let input = single_input(&input_ids)?;
                plan.add_grouped_aggregate(label, input, keys, aggregates)
            }
        }
    }

    /// Build a plan around this declaration, run it to completion and
    /// return the sink's batches.
    pub fn run_and_collect(self) -> PlanResult<Vec<ExecBatch>> {
        let plan = ExecPlan::new();
        let output = self.add_to_plan(&plan)?;
        let handle = plan.add_sink("sink", output)?;
        plan.start()?;
        let batches = handle.collect()?;
        plan.wait()?;
        Ok(batches)
    }
}

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
//! Sum, product and mean over numeric inputs.
//!
//! Integer inputs accumulate in i64 (wrapping) and finalize as Int64;
//! float inputs accumulate in f64. Mean always finalizes as Float64.

use std::any::Any;

use arrow::datatypes::DataType;

use crate::common::error::{PlanError, PlanResult};
use crate::exec::agg::view::NumericView;
use crate::exec::agg::{AggregateKernel, ScalarAggregateOptions};
use crate::exec::batch::Datum;

fn is_integer_type(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
    )
}

/// Shared accumulation over one input column, parameterized by the fold.
struct NumericState {
    int_acc: i64,
    float_acc: f64,
    count: i64,
    poisoned: bool,
    integer: bool,
    options: ScalarAggregateOptions,
}

enum Fold {
    Add,
    Multiply,
}

impl NumericState {
    fn new(input_type: &DataType, options: ScalarAggregateOptions, fold: &Fold) -> Self {
        let identity = match fold {
            Fold::Add => (0i64, 0.0f64),
            Fold::Multiply => (1i64, 1.0f64),
        };
        NumericState {
            int_acc: identity.0,
            float_acc: identity.1,
            count: 0,
            poisoned: false,
            integer: is_integer_type(input_type),
            options,
        }
    }

    fn fold_one(&mut self, fold: &Fold, view: &NumericView<'_>, i: usize) {
        match fold {
            Fold::Add => {
                if self.integer {
                    self.int_acc = self.int_acc.wrapping_add(view.value_i64(i));
                } else {
                    self.float_acc += view.value_f64(i);
                }
            }
            Fold::Multiply => {
                if self.integer {
                    self.int_acc = self.int_acc.wrapping_mul(view.value_i64(i));
                } else {
                    self.float_acc *= view.value_f64(i);
                }
            }
        }
        self.count += 1;
    }

    fn consume(&mut self, fold: &Fold, input: &Datum, length: usize) -> PlanResult<()> {
        match input {
            Datum::Array(array) => {
                let view = NumericView::try_new(array.as_ref())?;
                for i in 0..view.len() {
                    if view.is_valid(i) {
                        self.fold_one(fold, &view, i);
                    } else if !self.options.skip_nulls {
                        self.poisoned = true;
                    }
                }
            }
            Datum::Scalar(array) => {
                let view = NumericView::try_new(array.as_ref())?;
                if view.is_valid(0) {
                    for _ in 0..length {
                        self.fold_one(fold, &view, 0);
                    }
                } else if !self.options.skip_nulls && length > 0 {
                    self.poisoned = true;
                }
            }
        }
        Ok(())
    }

    fn merge_from(&mut self, fold: &Fold, other: &NumericState) {
        self.poisoned |= other.poisoned;
        self.count += other.count;
        match fold {
            Fold::Add => {
                self.int_acc = self.int_acc.wrapping_add(other.int_acc);
                self.float_acc += other.float_acc;
            }
            Fold::Multiply => {
                self.int_acc = self.int_acc.wrapping_mul(other.int_acc);
                self.float_acc *= other.float_acc;
            }
        }
    }

    fn is_null_result(&self) -> bool {
        self.poisoned || (self.count as usize) < self.options.min_count
    }
}

pub struct SumKernel {
    state: NumericState,
}

impl SumKernel {
    pub fn new(input_type: &DataType, options: ScalarAggregateOptions) -> Self {
        SumKernel {
            state: NumericState::new(input_type, options, &Fold::Add),
        }
    }
}

impl AggregateKernel for SumKernel {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()> {
        self.state.consume(&Fold::Add, input, length)
    }

    fn merge_from(&mut self, other: &dyn AggregateKernel) -> PlanResult<()> {
        let other = other
            .as_any()
            .downcast_ref::<SumKernel>()
            .ok_or_else(|| PlanError::execution("merging mismatched sum states"))?;
        self.state.merge_from(&Fold::Add, &other.state);
        Ok(())
    }

    fn finalize(&self) -> PlanResult<Datum> {
        if self.state.is_null_result() {
            return Datum::null_scalar(&self.output_type());
        }
        Ok(if self.state.integer {
            Datum::scalar_i64(self.state.int_acc)
        } else {
            Datum::scalar_f64(self.state.float_acc)
        })
    }

    fn output_type(&self) -> DataType {
        if self.state.integer {
            DataType::Int64
        } else {
            DataType::Float64
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct ProductKernel {
    state: NumericState,
}

impl ProductKernel {
    pub fn new(input_type: &DataType, options: ScalarAggregateOptions) -> Self {
        ProductKernel {
            state: NumericState::new(input_type, options, &Fold::Multiply),
        }
    }
}

impl AggregateKernel for ProductKernel {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()> {
        self.state.consume(&Fold::Multiply, input, length)
    }

    fn merge_from(&mut self, other: &dyn AggregateKernel) -> PlanResult<()> {
        let other = other
            .as_any()
            .downcast_ref::<ProductKernel>()
            .ok_or_else(|| PlanError::execution("merging mismatched product states"))?;
        self.state.merge_from(&Fold::Multiply, &other.state);
        Ok(())
    }

    fn finalize(&self) -> PlanResult<Datum> {
        if self.state.is_null_result() {
            return Datum::null_scalar(&self.output_type());
        }
        Ok(if self.state.integer {
            Datum::scalar_i64(self.state.int_acc)
        } else {
            Datum::scalar_f64(self.state.float_acc)
        })
    }

    fn output_type(&self) -> DataType {
        if self.state.integer {
            DataType::Int64
        } else {
            DataType::Float64
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Arithmetic mean; integer sums stay exact in i64 before the division.
pub struct MeanKernel {
    state: NumericState,
}

impl MeanKernel {
    pub fn new(input_type: &DataType, options: ScalarAggregateOptions) -> Self {
        MeanKernel {
            state: NumericState::new(input_type, options, &Fold::Add),
        }
    }
}

impl AggregateKernel for MeanKernel {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()> {
        self.state.consume(&Fold::Add, input, length)
    }

    fn merge_from(&mut self, other: &dyn AggregateKernel) -> PlanResult<()> {
        let other = other
            .as_any()
            .downcast_ref::<MeanKernel>()
            .ok_or_else(|| PlanError::execution("merging mismatched mean states"))?;
        self.state.merge_from(&Fold::Add, &other.state);
        Ok(())
    }

    fn finalize(&self) -> PlanResult<Datum> {
        if self.state.is_null_result() || self.state.count == 0 {
            return Datum::null_scalar(&DataType::Float64);
        }
        let sum = if self.state.integer {
            self.state.int_acc as f64
        } else {
            self.state.float_acc
        };
        Ok(Datum::scalar_f64(sum / self.state.count as f64))
    }

    fn output_type(&self) -> DataType {
        DataType::Float64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

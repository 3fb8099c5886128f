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
//! Boolean `any` / `all` reductions.
//!
//! With `skip_nulls = false` the result follows Kleene logic: a null input
//! only matters when the known values do not already decide the outcome.

use std::any::Any;

use arrow::array::{Array, BooleanArray};
use arrow::datatypes::DataType;

use crate::common::error::{PlanError, PlanResult};
use crate::exec::agg::{AggregateKernel, ScalarAggregateOptions};
use crate::exec::batch::Datum;

#[derive(Default, Clone, Copy)]
struct BoolState {
    count: i64,
    has_true: bool,
    has_false: bool,
    saw_null: bool,
}

impl BoolState {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()> {
        let array = input
            .inner()
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| {
                PlanError::not_implemented(format!("boolean aggregate over {:?}", input.data_type()))
            })?;
        match input {
            Datum::Array(_) => {
                for value in array.iter() {
                    match value {
                        Some(true) => {
                            self.has_true = true;
                            self.count += 1;
                        }
                        Some(false) => {
                            self.has_false = true;
                            self.count += 1;
                        }
                        None => self.saw_null = true,
                    }
                }
            }
            Datum::Scalar(_) => {
                if length == 0 {
                    return Ok(());
                }
                if array.is_valid(0) {
                    if array.value(0) {
                        self.has_true = true;
                    } else {
                        self.has_false = true;
                    }
                    self.count += length as i64;
                } else {
                    self.saw_null = true;
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, other: &BoolState) {
        self.count += other.count;
        self.has_true |= other.has_true;
        self.has_false |= other.has_false;
        self.saw_null |= other.saw_null;
    }
}

fn finalize_bool(value: Option<bool>) -> PlanResult<Datum> {
    match value {
        Some(v) => Ok(Datum::scalar_bool(v)),
        None => Datum::null_scalar(&DataType::Boolean),
    }
}

pub struct AnyKernel {
    state: BoolState,
    options: ScalarAggregateOptions,
}

impl AnyKernel {
    pub fn new(options: ScalarAggregateOptions) -> Self {
        AnyKernel {
            state: BoolState::default(),
            options,
        }
    }
}

impl AggregateKernel for AnyKernel {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()> {
        self.state.consume(input, length)
    }

    fn merge_from(&mut self, other: &dyn AggregateKernel) -> PlanResult<()> {
        let other = other
            .as_any()
            .downcast_ref::<AnyKernel>()
            .ok_or_else(|| PlanError::execution("merging mismatched any states"))?;
        self.state.merge(&other.state);
        Ok(())
    }

    fn finalize(&self) -> PlanResult<Datum> {
        if (self.state.count as usize) < self.options.min_count {
            return finalize_bool(None);
        }
        if self.options.skip_nulls {
            finalize_bool(Some(self.state.has_true))
        } else if self.state.has_true {
            finalize_bool(Some(true))
        } else if self.state.saw_null {
            finalize_bool(None)
        } else {
            finalize_bool(Some(false))
        }
    }

    fn output_type(&self) -> DataType {
        DataType::Boolean
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct AllKernel {
    state: BoolState,
    options: ScalarAggregateOptions,
}

impl AllKernel {
    pub fn new(options: ScalarAggregateOptions) -> Self {
        AllKernel {
            state: BoolState::default(),
            options,
        }
    }
}

impl AggregateKernel for AllKernel {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()> {
        self.state.consume(input, length)
    }

    fn merge_from(&mut self, other: &dyn AggregateKernel) -> PlanResult<()> {
        let other = other
            .as_any()
            .downcast_ref::<AllKernel>()
            .ok_or_else(|| PlanError::execution("merging mismatched all states"))?;
        self.state.merge(&other.state);
        Ok(())
    }

    fn finalize(&self) -> PlanResult<Datum> {
        if (self.state.count as usize) < self.options.min_count {
            return finalize_bool(None);
        }
        if self.options.skip_nulls {
            finalize_bool(Some(!self.state.has_false))
        } else if self.state.has_false {
            finalize_bool(Some(false))
        } else if self.state.saw_null {
            finalize_bool(None)
        } else {
            finalize_bool(Some(true))
        }
    }

    fn output_type(&self) -> DataType {
        DataType::Boolean
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::ArrayRef;

    use super::*;

    fn bools(values: Vec<Option<bool>>) -> Datum {
        Datum::Array(Arc::new(BooleanArray::from(values)) as ArrayRef)
    }

    fn result_of(kernel: &dyn AggregateKernel) -> Option<bool> {
        let out = kernel.finalize().unwrap();
        let array = out.inner().as_any().downcast_ref::<BooleanArray>().unwrap();
        array.is_valid(0).then(|| array.value(0))
    }

    #[test]
    fn any_skipping_nulls_ignores_them() {
        let mut kernel = AnyKernel::new(ScalarAggregateOptions::default());
        kernel
            .consume(&bools(vec![Some(false), None, Some(true)]), 3)
            .unwrap();
        assert_eq!(result_of(&kernel), Some(true));
    }

    #[test]
    fn any_kleene_null_wins_over_all_false() {
        let options = ScalarAggregateOptions {
            skip_nulls: false,
            min_count: 1,
        };
        let mut kernel = AnyKernel::new(options.clone());
        kernel
            .consume(&bools(vec![Some(false), None, Some(false)]), 3)
            .unwrap();
        assert_eq!(result_of(&kernel), None);

        let mut kernel = AnyKernel::new(options);
        kernel
            .consume(&bools(vec![Some(true), None]), 2)
            .unwrap();
        assert_eq!(result_of(&kernel), Some(true));
    }

    #[test]
    fn all_kleene_false_wins_over_null() {
        let options = ScalarAggregateOptions {
            skip_nulls: false,
            min_count: 1,
        };
        let mut kernel = AllKernel::new(options);
        kernel
            .consume(&bools(vec![Some(true), None, Some(false)]), 3)
            .unwrap();
        assert_eq!(result_of(&kernel), Some(false));
    }

    #[test]
    fn all_skipping_nulls_over_trues_is_true() {
        let mut kernel = AllKernel::new(ScalarAggregateOptions::default());
        kernel
            .consume(&bools(vec![Some(true), None, Some(true)]), 3)
            .unwrap();
        assert_eq!(result_of(&kernel), Some(true));
    }

    #[test]
    fn min_count_yields_null() {
        let mut kernel = AnyKernel::new(ScalarAggregateOptions {
            skip_nulls: true,
            min_count: 3,
        });
        kernel.consume(&bools(vec![Some(true), None]), 2).unwrap();
        assert_eq!(result_of(&kernel), None);
    }

    #[test]
    fn merge_combines_truth_evidence() {
        let mut a = AnyKernel::new(ScalarAggregateOptions::default());
        let mut b = AnyKernel::new(ScalarAggregateOptions::default());
        a.consume(&bools(vec![Some(false)]), 1).unwrap();
        b.consume(&bools(vec![Some(true)]), 1).unwrap();
        a.merge_from(&b).unwrap();
        assert_eq!(result_of(&a), Some(true));
    }
}

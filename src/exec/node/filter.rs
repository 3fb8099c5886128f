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
//! Filter node: keeps rows whose predicate is true.
//!
//! A null predicate value drops the row. Empty batches are still emitted so
//! batch tags stay observable downstream.

use std::sync::Arc;

use arrow::array::{Array, BooleanArray};
use arrow::compute;
use arrow::datatypes::{DataType, SchemaRef};

use crate::common::error::{PlanError, PlanResult};
use crate::exec::batch::{Datum, ExecBatch};
use crate::exec::expr::Expr;

#[derive(Debug)]
pub struct FilterState {
    predicate: Expr,
    input_schema: SchemaRef,
}

impl FilterState {
    pub(crate) fn try_new(predicate: Expr, input_schema: SchemaRef) -> PlanResult<Self> {
        let result_type = predicate.result_type(&input_schema)?;
        if result_type != DataType::Boolean {
            return Err(PlanError::invalid(format!(
                "filter predicate must be boolean, got {:?}",
                result_type
            )));
        }
        Ok(FilterState {
            predicate,
            input_schema,
        })
    }

    pub(crate) fn apply(&self, batch: ExecBatch) -> PlanResult<ExecBatch> {
        let verdict = self.predicate.evaluate(&batch, &self.input_schema)?;
        let bools = verdict
            .inner()
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| PlanError::execution("filter predicate produced a non-boolean"))?;
        match &verdict {
            Datum::Scalar(_) => {
                if bools.is_valid(0) && bools.value(0) {
                    Ok(batch)
                } else {
                    Ok(empty_like(&batch))
                }
            }
            Datum::Array(_) => {
                // Null verdicts drop the row.
                let mask: BooleanArray = bools
                    .iter()
                    .map(|v| Some(v.unwrap_or(false)))
                    .collect();
                let kept = mask.true_count();
                let tag = batch.tag;
                let values = batch
                    .values
                    .iter()
                    .map(|value| match value {
                        Datum::Array(a) => {
                            Ok(Datum::Array(compute::filter(a.as_ref(), &mask)?))
                        }
                        Datum::Scalar(a) => Ok(Datum::Scalar(Arc::clone(a))),
                    })
                    .collect::<PlanResult<Vec<_>>>()?;
                let mut out = ExecBatch::try_new(values, kept)?;
                out.tag = tag;
                Ok(out)
            }
        }
    }

}

fn empty_like(batch: &ExecBatch) -> ExecBatch {
    let values = batch
        .values
        .iter()
        .map(|value| match value {
            Datum::Array(a) => Datum::Array(a.slice(0, 0)),
            Datum::Scalar(a) => Datum::Scalar(Arc::clone(a)),
        })
        .collect();
    ExecBatch {
        values,
        length: 0,
        tag: batch.tag,
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{ArrayRef, BooleanArray, Int32Array};
    use arrow::datatypes::{Field, Schema};

    use super::*;
    use crate::exec::expr::{eq, field_ref, literal_bool, literal_i32};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("i32", DataType::Int32, true),
            Field::new("bool", DataType::Boolean, true),
        ]))
    }

    fn batch() -> ExecBatch {
        let ints: ArrayRef = Arc::new(Int32Array::from(vec![Some(5), Some(6), None, Some(6)]));
        let bools: ArrayRef = Arc::new(BooleanArray::from(vec![
            Some(true),
            Some(false),
            Some(true),
            None,
        ]));
        ExecBatch::try_new(vec![Datum::Array(ints), Datum::Array(bools)], 4)
            .unwrap()
            .with_tag(7)
    }

    #[test]
    fn keeps_matching_rows_and_drops_null_verdicts() {
        let state =
            FilterState::try_new(eq(field_ref("i32"), literal_i32(6)), schema()).unwrap();
        let out = state.apply(batch()).unwrap();
        assert_eq!(out.length, 2);
        assert_eq!(out.tag, Some(7));
        let ints = out.column(0).inner();
        let ints = ints.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(ints.iter().collect::<Vec<_>>(), vec![Some(6), Some(6)]);
    }

    #[test]
    fn scalar_false_emits_an_empty_batch() {
        let state = FilterState::try_new(literal_bool(false), schema()).unwrap();
        let out = state.apply(batch()).unwrap();
        assert_eq!(out.length, 0);
        assert_eq!(out.num_columns(), 2);
        assert_eq!(out.tag, Some(7));
    }

    #[test]
    fn scalar_true_passes_the_batch_through() {
        let state = FilterState::try_new(literal_bool(true), schema()).unwrap();
        let input = batch();
        let out = state.apply(input.clone()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn non_boolean_predicate_is_rejected_at_build() {
        let err = FilterState::try_new(field_ref("i32"), schema()).unwrap_err();
        assert!(matches!(err, PlanError::Invalid(_)));
    }
}

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
//! Columnar batch representation flowing between nodes.
//!
//! A value in a batch is either a full-length array or a scalar (a
//! one-element array broadcast to the batch length). Keeping scalars
//! unexpanded lets constant columns ride through filters and projections
//! without materialization.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, UInt32Array,
};
use arrow::compute;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::common::error::{PlanError, PlanResult};

/// A column value: either an array spanning the batch or a broadcast scalar.
#[derive(Debug, Clone)]
pub enum Datum {
    Array(ArrayRef),
    /// Invariant: the inner array has length 1.
    Scalar(ArrayRef),
}

impl Datum {
    pub fn scalar_i32(v: i32) -> Self {
        Datum::Scalar(Arc::new(Int32Array::from(vec![v])))
    }

    pub fn scalar_i64(v: i64) -> Self {
        Datum::Scalar(Arc::new(Int64Array::from(vec![v])))
    }

    pub fn scalar_f64(v: f64) -> Self {
        Datum::Scalar(Arc::new(Float64Array::from(vec![v])))
    }

    pub fn scalar_bool(v: bool) -> Self {
        Datum::Scalar(Arc::new(BooleanArray::from(vec![v])))
    }

    pub fn null_scalar(data_type: &DataType) -> PlanResult<Self> {
        let array = arrow::array::new_null_array(data_type, 1);
        Ok(Datum::Scalar(array))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Datum::Scalar(_))
    }

    pub fn data_type(&self) -> &DataType {
        match self {
            Datum::Array(a) | Datum::Scalar(a) => a.data_type(),
        }
    }

    pub fn inner(&self) -> &ArrayRef {
        match self {
            Datum::Array(a) | Datum::Scalar(a) => a,
        }
    }

    /// Materialize as an array of `length` rows, repeating scalars.
    pub fn to_array(&self, length: usize) -> PlanResult<ArrayRef> {
        match self {
            Datum::Array(a) => {
                if a.len() != length {
                    return Err(PlanError::execution(format!(
                        "array datum length {} does not match batch length {}",
                        a.len(),
                        length
                    )));
                }
                Ok(Arc::clone(a))
            }
            Datum::Scalar(a) => {
                let indices = UInt32Array::from(vec![0u32; length]);
                Ok(compute::take(a.as_ref(), &indices, None)?)
            }
        }
    }
}

// Lets arrow's cmp/arithmetic kernels broadcast scalars and propagate nulls
// without a local re-implementation.
impl arrow::array::Datum for Datum {
    fn get(&self) -> (&dyn Array, bool) {
        match self {
            Datum::Array(a) => (a.as_ref(), false),
            Datum::Scalar(a) => (a.as_ref(), true),
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.is_scalar() == other.is_scalar() && self.inner().to_data() == other.inner().to_data()
    }
}

/// The unit of data exchange between nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecBatch {
    pub values: Vec<Datum>,
    pub length: usize,
    /// Optional producer-assigned ordinal; carried through 1:1 operators.
    pub tag: Option<i64>,
}

impl ExecBatch {
    /// Build a batch, validating that every array value spans `length`.
    pub fn try_new(values: Vec<Datum>, length: usize) -> PlanResult<Self> {
        for (i, value) in values.iter().enumerate() {
            if let Datum::Array(a) = value {
                if a.len() != length {
                    return Err(PlanError::invalid(format!(
                        "batch column {} has length {}, expected {}",
                        i,
                        a.len(),
                        length
                    )));
                }
            }
        }
        Ok(ExecBatch {
            values,
            length,
            tag: None,
        })
    }

    pub fn with_tag(mut self, tag: i64) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn num_columns(&self) -> usize {
        self.values.len()
    }

    pub fn column(&self, i: usize) -> &Datum {
        &self.values[i]
    }

    pub fn from_record_batch(batch: &RecordBatch) -> Self {
        ExecBatch {
            values: batch
                .columns()
                .iter()
                .map(|c| Datum::Array(Arc::clone(c)))
                .collect(),
            length: batch.num_rows(),
            tag: None,
        }
    }

    /// Expand scalars and assemble a `RecordBatch` against `schema`.
    pub fn to_record_batch(
        &self,
        schema: arrow::datatypes::SchemaRef,
    ) -> PlanResult<RecordBatch> {
        let columns = self
            .values
            .iter()
            .map(|v| v.to_array(self.length))
            .collect::<PlanResult<Vec<_>>>()?;
        let options =
            arrow::record_batch::RecordBatchOptions::new().with_row_count(Some(self.length));
        RecordBatch::try_new_with_options(schema, columns, &options).map_err(PlanError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_new_rejects_mismatched_array_length() {
        let short: ArrayRef = Arc::new(Int32Array::from(vec![1, 2]));
        let err = ExecBatch::try_new(vec![Datum::Array(short)], 3).unwrap_err();
        assert!(matches!(err, PlanError::Invalid(_)));
    }

    #[test]
    fn scalars_broadcast_to_array() {
        let datum = Datum::scalar_i64(7);
        let array = datum.to_array(4).unwrap();
        let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(array.values(), &[7, 7, 7, 7]);
    }

    #[test]
    fn null_scalar_broadcasts_nulls() {
        let datum = Datum::null_scalar(&DataType::Int32).unwrap();
        let array = datum.to_array(3).unwrap();
        assert_eq!(array.null_count(), 3);
    }

    #[test]
    fn record_batch_round_trip_keeps_columns() {
        let a: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        let schema = Arc::new(arrow::datatypes::Schema::new(vec![
            arrow::datatypes::Field::new("a", DataType::Int32, true),
        ]));
        let rb = RecordBatch::try_new(Arc::clone(&schema), vec![a]).unwrap();
        let batch = ExecBatch::from_record_batch(&rb);
        assert_eq!(batch.length, 3);
        let back = batch.to_record_batch(schema).unwrap();
        assert_eq!(back, rb);
    }
}

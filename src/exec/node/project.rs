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
//! Project node: rewrites each batch's columns through expressions,
//! preserving row count and tag.

use std::sync::Arc;

use arrow::datatypes::{Field, Schema, SchemaRef};

use crate::common::error::{PlanError, PlanResult};
use crate::exec::batch::ExecBatch;
use crate::exec::expr::Expr;

#[derive(Debug)]
pub struct ProjectState {
    exprs: Vec<Expr>,
    input_schema: SchemaRef,
}

impl ProjectState {
    pub(crate) fn try_new(
        exprs: Vec<(Expr, String)>,
        input_schema: SchemaRef,
    ) -> PlanResult<(Self, SchemaRef)> {
        if exprs.is_empty() {
            return Err(PlanError::invalid("project requires at least one expression"));
        }
        let mut fields = Vec::with_capacity(exprs.len());
        let mut bare = Vec::with_capacity(exprs.len());
        for (expr, name) in exprs {
            let dt = expr.result_type(&input_schema)?;
            fields.push(Field::new(&name, dt, true));
            bare.push(expr);
        }
        let schema = Arc::new(Schema::new(fields));
        Ok((
            ProjectState {
                exprs: bare,
                input_schema,
            },
            schema,
        ))
    }

    pub(crate) fn apply(&self, batch: ExecBatch) -> PlanResult<ExecBatch> {
        let values = self
            .exprs
            .iter()
            .map(|expr| expr.evaluate(&batch, &self.input_schema))
            .collect::<PlanResult<Vec<_>>>()?;
        let mut out = ExecBatch::try_new(values, batch.length)?;
        out.tag = batch.tag;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{ArrayRef, Int32Array};
    use arrow::datatypes::DataType;

    use super::*;
    use crate::exec::batch::Datum;
    use crate::exec::expr::{add, field_ref, literal_i32, multiply};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, true)]))
    }

    #[test]
    fn projects_expressions_and_names_columns() {
        let (state, out_schema) = ProjectState::try_new(
            vec![
                (add(field_ref("x"), literal_i32(1)), "plus_one".to_string()),
                (multiply(field_ref("x"), literal_i32(2)), "doubled".to_string()),
            ],
            schema(),
        )
        .unwrap();
        assert_eq!(out_schema.field(0).name(), "plus_one");
        assert_eq!(out_schema.field(1).name(), "doubled");

        let xs: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        let batch = ExecBatch::try_new(vec![Datum::Array(xs)], 3)
            .unwrap()
            .with_tag(3);
        let out = state.apply(batch).unwrap();
        assert_eq!(out.length, 3);
        assert_eq!(out.tag, Some(3));
        let plus = out.column(0).inner();
        let plus = plus.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(plus.values(), &[2, 3, 4]);
        let doubled = out.column(1).inner();
        let doubled = doubled.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(doubled.values(), &[2, 4, 6]);
    }

    #[test]
    fn empty_projection_is_rejected() {
        let err = ProjectState::try_new(vec![], schema()).unwrap_err();
        assert!(matches!(err, PlanError::Invalid(_)));
    }

    #[test]
    fn unknown_column_fails_at_build() {
        let err =
            ProjectState::try_new(vec![(field_ref("nope"), "y".to_string())], schema())
                .unwrap_err();
        assert!(matches!(err, PlanError::Invalid(_)));
    }
}

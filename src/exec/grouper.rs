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
//! Group id assignment over multi-column keys.
//!
//! Responsibilities:
//! - Map each row's key tuple to a dense u32 group id, first-seen order.
//! - Reconstruct the distinct key columns on demand.
//! - Turn an id column into row selections, and apply those selections to
//!   demultiplex payload columns.
//!
//! Keys are compared by their row-format encoding, so nulls are grouped
//! like any other key value.

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute;
use arrow::datatypes::DataType;
use arrow::row::{RowConverter, SortField};

use hashbrown::HashMap;

use crate::common::error::{PlanError, PlanResult};

pub struct Grouper {
    converter: RowConverter,
    /// Row-format key bytes to group id.
    map: HashMap<Box<[u8]>, u32>,
    /// Distinct keys in insertion order; index == group id.
    uniques: Vec<Box<[u8]>>,
}

impl Grouper {
    pub fn try_new(key_types: &[DataType]) -> PlanResult<Self> {
        if key_types.is_empty() {
            return Err(PlanError::invalid("grouper requires at least one key"));
        }
        let fields = key_types
            .iter()
            .map(|dt| SortField::new(dt.clone()))
            .collect();
        let converter = RowConverter::new(fields)?;
        Ok(Grouper {
            converter,
            map: HashMap::new(),
            uniques: Vec::new(),
        })
    }

    pub fn num_groups(&self) -> u32 {
        self.uniques.len() as u32
    }

    /// Assign a group id to every row of `keys`, growing the group set.
    pub fn consume(&mut self, keys: &[ArrayRef]) -> PlanResult<UInt32Array> {
        let rows = self.converter.convert_columns(keys)?;
        let mut ids = Vec::with_capacity(rows.num_rows());
        for row in rows.iter() {
            let bytes = row.as_ref();
            let id = match self.map.get(bytes) {
                Some(id) => *id,
                None => {
                    let id = self.uniques.len() as u32;
                    let owned: Box<[u8]> = bytes.into();
                    self.map.insert(owned.clone(), id);
                    self.uniques.push(owned);
                    id
                }
            };
            ids.push(id);
        }
        Ok(UInt32Array::from(ids))
    }

    /// The distinct key columns, ordered by group id.
    pub fn get_uniques(&self) -> PlanResult<Vec<ArrayRef>> {
        let parser = self.converter.parser();
        let rows = self.uniques.iter().map(|bytes| parser.parse(bytes));
        Ok(self.converter.convert_rows(rows)?)
    }

    /// Group ids into per-group row selections. Ids must be < `num_groups`
    /// and non-null.
    pub fn make_groupings(ids: &UInt32Array, num_groups: u32) -> PlanResult<Vec<Vec<u32>>> {
        let mut groupings: Vec<Vec<u32>> = vec![Vec::new(); num_groups as usize];
        for (row, id) in ids.iter().enumerate() {
            let id = id.ok_or_else(|| PlanError::invalid("group id column contains nulls"))?;
            if id >= num_groups {
                return Err(PlanError::invalid(format!(
                    "group id {} out of range, only {} groups",
                    id, num_groups
                )));
            }
            groupings[id as usize].push(row as u32);
        }
        Ok(groupings)
    }

    /// Gather `values` once per group selection.
    pub fn apply_groupings(
        groupings: &[Vec<u32>],
        values: &ArrayRef,
    ) -> PlanResult<Vec<ArrayRef>> {
        groupings
            .iter()
            .map(|rows| {
                let indices = UInt32Array::from(rows.clone());
                compute::take(values.as_ref(), &indices, None).map_err(PlanError::from)
            })
            .collect()
    }
}

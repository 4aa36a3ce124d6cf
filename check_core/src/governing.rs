//! Governing-value resolution.
//!
//! The governing value is the candidate the selector picks among every
//! recorded value of the result variable (by default the minimum, since the
//! weakest failure mode controls a capacity). Quantities are compared in SI
//! base units, so `1 kN` and `1000 N` tie.
//!
//! Every candidate whose value equals the governing value is marked, so two
//! failure modes with identical capacity both show `<<<--- GOVERNS`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{CalcError, CalcResult};
use crate::ledger::{ResultCandidate, Selector};
use crate::namespace::Value;

/// The selected value and the indices of every candidate holding it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Governing {
    pub value: Value,
    pub indices: Vec<usize>,
}

impl Governing {
    pub fn governs(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }
}

/// Resolve the governing value of `var` among `records`.
///
/// Only candidates whose context carries `var` with a numeric value take
/// part. Fails with `EmptyResultSet` when there are none, and with
/// `InvalidInput` when a custom selector returns a value no candidate holds.
pub fn resolve(records: &[ResultCandidate], var: &str, selector: Selector) -> CalcResult<Governing> {
    let candidates: Vec<(usize, &Value, f64)> = records
        .iter()
        .enumerate()
        .filter_map(|(i, rec)| {
            let value = rec.context.get(var)?;
            value.comparable().map(|key| (i, value, key))
        })
        .collect();

    let keys: Vec<f64> = candidates.iter().map(|(_, _, key)| *key).collect();
    let selected = selector
        .select(&keys)
        .ok_or_else(|| CalcError::empty_result_set(var))?;

    let indices: Vec<usize> = candidates
        .iter()
        .filter(|(_, _, key)| *key == selected)
        .map(|(i, _, _)| *i)
        .collect();

    let Some(first) = indices.first() else {
        return Err(CalcError::invalid_input(
            "selector",
            selected.to_string(),
            "Selector must return one of the candidate values",
        ));
    };
    let value = candidates
        .iter()
        .find(|(i, _, _)| i == first)
        .map(|(_, v, _)| (*v).clone())
        .ok_or_else(|| CalcError::empty_result_set(var))?;

    debug!(var, value = %value, governing = indices.len(), selector = selector.name(), "governing value resolved");
    Ok(Governing { value, indices })
}

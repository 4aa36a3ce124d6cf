//! Standard Value Tables
//!
//! Design codes tabulate detailing values only for specific standard sizes:
//! minimum edge distance per bolt diameter, usual gauge per angle leg, and so
//! on. [`table_search`] maps an arbitrary query onto the nearest tabulated
//! size.
//!
//! ## Bucket Search
//!
//! Each key owns the bucket reaching half-way to the next larger key. A query
//! exactly on a midpoint falls into the lower bucket. The last key's bucket
//! has the same half-width as the last gap in the table.
//!
//! ```text
//! keys:      16      20      22
//! buckets: ..16..18]..20..21]..22..23]
//! ```
//!
//! ```rust
//! use check_core::table::table_search;
//!
//! // CSA S16 Table 6: bolt diameter -> (min end distance, min edge distance)
//! let table6 = [(16.0, (28.0, 22.0)), (20.0, (34.0, 26.0)), (22.0, (38.0, 28.0))];
//!
//! assert_eq!(table_search(20.0, &table6).unwrap(), &(34.0, 26.0));
//! assert_eq!(table_search(18.0, &table6).unwrap(), &(28.0, 22.0)); // midpoint -> lower
//! assert!(table_search(23.5, &table6).is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};
use crate::format::format_sigfigs;

/// Search a table sorted by strictly ascending key and return the data of the
/// bucket containing `v`.
///
/// The table must be sorted by strictly ascending key; that is a precondition
/// and is not checked.
pub fn table_search<T>(v: f64, table: &[(f64, T)]) -> CalcResult<&T> {
    search_impl(v, table, "table")
}

fn search_impl<'a, T>(v: f64, table: &'a [(f64, T)], name: &str) -> CalcResult<&'a T> {
    let Some(last) = table.len().checked_sub(1) else {
        return Err(CalcError::lookup_failed(name, format_sigfigs(v, 6)));
    };

    for (i, (key, data)) in table.iter().enumerate() {
        let next = if i < last { i + 1 } else { last };
        let prev = next.saturating_sub(1);
        let delta = (table[next].0 - table[prev].0) / 2.0;
        if v - key <= delta {
            return Ok(data);
        }
    }

    Err(CalcError::lookup_failed(name, format_sigfigs(v, 6)))
}

/// A named reference table. The name appears in lookup errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardTable<T> {
    pub name: String,
    pub rows: Vec<(f64, T)>,
}

impl<T> StandardTable<T> {
    /// Build a table, validating that keys are finite and strictly ascending.
    pub fn new(name: impl Into<String>, rows: Vec<(f64, T)>) -> CalcResult<Self> {
        let name = name.into();
        if rows.is_empty() {
            return Err(CalcError::invalid_input(name, "[]", "Table has no rows"));
        }
        for pair in rows.windows(2) {
            if !(pair[0].0 < pair[1].0) {
                return Err(CalcError::invalid_input(
                    name,
                    format!("{} then {}", pair[0].0, pair[1].0),
                    "Table keys must be strictly ascending",
                ));
            }
        }
        if let Some((key, _)) = rows.iter().find(|(k, _)| !k.is_finite()) {
            return Err(CalcError::invalid_input(name, key.to_string(), "Table keys must be finite"));
        }
        Ok(StandardTable { name, rows })
    }

    /// Bucket-search this table
    pub fn lookup(&self, v: f64) -> CalcResult<&T> {
        search_impl(v, &self.rows, &self.name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table6() -> Vec<(f64, (f64, f64))> {
        vec![
            (16.0, (28.0, 22.0)),
            (20.0, (34.0, 26.0)),
            (22.0, (38.0, 28.0)),
            (24.0, (42.0, 30.0)),
            (27.0, (48.0, 34.0)),
            (30.0, (52.0, 38.0)),
            (36.0, (64.0, 46.0)),
        ]
    }

    #[test]
    fn test_exact_keys() {
        let t = table6();
        for (key, data) in &t {
            assert_eq!(table_search(*key, &t).unwrap(), data);
        }
    }

    #[test]
    fn test_nearest_bucket() {
        let t = table6();
        assert_eq!(table_search(19.0, &t).unwrap(), &(34.0, 26.0));
        assert_eq!(table_search(21.5, &t).unwrap(), &(38.0, 28.0));
        assert_eq!(table_search(5.0, &t).unwrap(), &(28.0, 22.0));
    }

    #[test]
    fn test_midpoint_goes_low() {
        let t = table6();
        assert_eq!(table_search(18.0, &t).unwrap(), &(28.0, 22.0));
        assert_eq!(table_search(33.0, &t).unwrap(), &(52.0, 38.0));
    }

    #[test]
    fn test_last_bucket_uses_last_gap() {
        let t = table6();
        // last gap is 36 - 30 = 6, so the last bucket reaches 39
        assert_eq!(table_search(39.0, &t).unwrap(), &(64.0, 46.0));
        let err = table_search(39.01, &t).unwrap_err();
        assert_eq!(err.error_code(), "LOOKUP_FAILED");
    }

    #[test]
    fn test_single_and_empty_tables() {
        let single = [(10.0, "only")];
        assert_eq!(table_search(10.0, &single).unwrap(), &"only");
        assert_eq!(table_search(3.0, &single).unwrap(), &"only");
        assert!(table_search(10.5, &single).is_err());

        let empty: [(f64, u8); 0] = [];
        assert!(table_search(1.0, &empty).is_err());
    }

    #[test]
    fn test_standard_table_names_errors() {
        let t = StandardTable::new("Usual Gauges", vec![(45.0, 23.0), (50.0, 28.0)]).unwrap();
        assert_eq!(t.lookup(47.0).unwrap(), &23.0);
        match t.lookup(60.0).unwrap_err() {
            CalcError::LookupFailed { table, value } => {
                assert_eq!(table, "Usual Gauges");
                assert_eq!(value, "60");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_standard_table_rejects_unsorted() {
        assert!(StandardTable::new("bad", vec![(2.0, ()), (1.0, ())]).is_err());
        assert!(StandardTable::new("dup", vec![(2.0, ()), (2.0, ())]).is_err());
        assert!(StandardTable::<()>::new("empty", vec![]).is_err());
    }
}

//! # Scoped Variable Overlay
//!
//! An [`Overlay`] binds named values into a [`Namespace`] for the duration of
//! a scope and puts the namespace back the way it was when the scope ends.
//! Release happens in `Drop`, so it runs on normal exit, on `?` propagation
//! and during unwinding.
//!
//! While the overlay is alive it holds the only mutable borrow of the
//! namespace; code inside the scope reaches the namespace through the guard
//! (`Deref`/`DerefMut`). A nested overlay borrows the outer guard, so the
//! borrow checker enforces release in reverse order of acquisition.
//!
//! Names created inside the scope are removed on release unless they were
//! declared with [`Bindings::export`]; an exported name keeps whatever value
//! the scope left in it.
//!
//! ```rust
//! use check_core::namespace::{Namespace, Value};
//! use check_core::overlay::{Bindings, Overlay};
//!
//! let mut ns: Namespace = [("d", 20.0)].into_iter().collect();
//! {
//!     let mut scope = Overlay::enter(&mut ns, Bindings::new().bind("d", 22.0).bind("g", 30.0))?;
//!     assert_eq!(scope.get("d"), Some(&Value::Number(22.0)));
//!     scope.set("tmp", 1.0);
//! }
//! assert_eq!(ns.get("d"), Some(&Value::Number(20.0)));
//! assert!(!ns.contains("g"));
//! assert!(!ns.contains("tmp"));
//! # Ok::<(), check_core::errors::CalcError>(())
//! ```

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

use tracing::trace;

use crate::errors::{CalcError, CalcResult};
use crate::expr::parse_list;
use crate::namespace::{Namespace, Scope, Value};

/// Names and values to inject into a namespace, plus names to hide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
    locals: Vec<String>,
    exports: Vec<String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value` inside the scope
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    /// Hide `name` inside the scope. Whatever the scope assigns to it is
    /// discarded on exit and the previous value comes back.
    pub fn local(mut self, name: impl Into<String>) -> Self {
        self.locals.push(name.into());
        self
    }

    /// Keep `name` after the scope ends if the scope assigns it
    pub fn export(mut self, name: impl Into<String>) -> Self {
        self.exports.push(name.into());
        self
    }

    /// Evaluate a binding list such as `"d, b, edge = d - (g1 + g2)"` against
    /// `source` and add every item.
    ///
    /// Each item must bind a plain name; a bare expression such as `a + b`
    /// has no name to bind and is rejected.
    pub fn extract(mut self, source: &dyn Scope, list: &str) -> CalcResult<Self> {
        for spec in parse_list(list)? {
            if !spec.is_named() {
                return Err(CalcError::expression(
                    spec.target,
                    "a binding needs a name: use 'name = expression'",
                ));
            }
            let value = spec.expression.eval(source)?;
            self.entries.push((spec.target, value));
        }
        Ok(self)
    }

    /// Bound names, then local names, in the order they were added
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .map(|(n, _)| n.as_str())
            .chain(self.locals.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.locals.is_empty()
    }

    fn check_unique(&self) -> CalcResult<()> {
        let mut seen = BTreeSet::new();
        for name in self.names().chain(self.exports.iter().map(String::as_str)) {
            if !seen.insert(name) {
                return Err(CalcError::name_conflict(name));
            }
        }
        Ok(())
    }
}

/// Guard for one activation of a set of bindings.
///
/// Dropping the guard restores every name it touched and removes any name
/// that was introduced while it was alive, except exported names.
#[derive(Debug)]
pub struct Overlay<'ns> {
    ns: &'ns mut Namespace,
    /// (name, value before entry); `None` means the name did not exist
    saved: Vec<(String, Option<Value>)>,
    baseline: BTreeSet<String>,
    exports: BTreeSet<String>,
}

impl<'ns> Overlay<'ns> {
    /// Apply `bindings` to `ns`.
    ///
    /// Fails with `NameConflict` if any name appears twice among the bound,
    /// local and exported names; in that case `ns` is not modified.
    pub fn enter(ns: &'ns mut Namespace, bindings: Bindings) -> CalcResult<Self> {
        bindings.check_unique()?;

        let baseline = ns.names().map(str::to_string).collect();
        let mut saved = Vec::with_capacity(bindings.len());

        for (name, value) in bindings.entries {
            let old = ns.set(name.clone(), value);
            saved.push((name, old));
        }
        for name in bindings.locals {
            let old = ns.remove(&name);
            saved.push((name, old));
        }

        let exports = bindings.exports.into_iter().collect();
        trace!(names = saved.len(), "overlay entered");
        Ok(Overlay { ns, saved, baseline, exports })
    }

    /// Names bound or hidden by this overlay, in binding order
    pub fn touched(&self) -> impl Iterator<Item = &str> {
        self.saved.iter().map(|(n, _)| n.as_str())
    }

    /// Current values of every name this scope touched or introduced.
    ///
    /// Names the overlay bound or hid come first in binding order (skipping
    /// any that are currently unset); names created inside the scope follow
    /// in name order.
    pub fn scope_values(&self) -> Vec<(String, Value)> {
        let touched: BTreeSet<&str> = self.touched().collect();
        let mut values: Vec<(String, Value)> = self
            .touched()
            .filter_map(|name| self.ns.get(name).map(|v| (name.to_string(), v.clone())))
            .collect();
        values.extend(
            self.ns
                .iter()
                .filter(|(name, _)| !self.baseline.contains(*name) && !touched.contains(name))
                .map(|(name, v)| (name.to_string(), v.clone())),
        );
        values
    }

    /// End the scope now. Equivalent to dropping the guard.
    pub fn exit(self) {}

    fn release(&mut self) {
        for (name, old) in self.saved.drain(..).rev() {
            match old {
                Some(value) => {
                    self.ns.set(name, value);
                }
                None => {
                    self.ns.remove(&name);
                }
            }
        }
        let (baseline, exports) = (&self.baseline, &self.exports);
        self.ns.retain(|name, _| baseline.contains(name) || exports.contains(name));
        trace!("overlay released");
    }
}

impl Drop for Overlay<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl Deref for Overlay<'_> {
    type Target = Namespace;

    fn deref(&self) -> &Namespace {
        self.ns
    }
}

impl DerefMut for Overlay<'_> {
    fn deref_mut(&mut self) -> &mut Namespace {
        self.ns
    }
}

impl Scope for Overlay<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.ns.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        [("a", 1.0), ("b", 2.0)].into_iter().collect()
    }

    #[test]
    fn test_round_trip() {
        let mut ns = ns();
        let before = ns.clone();
        {
            let scope = Overlay::enter(&mut ns, Bindings::new().bind("a", 10.0).bind("c", 3.0)).unwrap();
            assert_eq!(scope.number("a").unwrap(), 10.0);
            assert_eq!(scope.number("c").unwrap(), 3.0);
        }
        assert_eq!(ns, before);
    }

    #[test]
    fn test_round_trip_on_error() {
        fn body(ns: &mut Namespace) -> CalcResult<f64> {
            let mut scope = Overlay::enter(ns, Bindings::new().bind("a", 10.0))?;
            scope.set("b", 99.0);
            scope.set("scratch", 5.0);
            scope.require("missing")?;
            Ok(1.0)
        }

        let mut ns = ns();
        let before = ns.clone();
        assert!(body(&mut ns).is_err());
        // 'b' was changed by the body but not bound by the overlay, so it keeps the change
        assert_eq!(ns.number("a").unwrap(), 1.0);
        assert_eq!(ns.number("b").unwrap(), 99.0);
        assert!(!ns.contains("scratch"));
        assert_eq!(ns.len(), before.len());
    }

    #[test]
    fn test_round_trip_on_panic() {
        let mut ns = ns();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = Overlay::enter(&mut ns, Bindings::new().bind("a", 10.0)).unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(ns.number("a").unwrap(), 1.0);
    }

    #[test]
    fn test_duplicate_names_leave_namespace_untouched() {
        let mut ns = ns();
        let before = ns.clone();
        let err = Overlay::enter(&mut ns, Bindings::new().bind("x", 1.0).bind("x", 2.0)).unwrap_err();
        assert_eq!(err, CalcError::name_conflict("x"));
        assert_eq!(ns, before);

        let err = Overlay::enter(&mut ns, Bindings::new().bind("a", 5.0).local("a")).unwrap_err();
        assert_eq!(err, CalcError::name_conflict("a"));
        assert_eq!(ns, before);
    }

    #[test]
    fn test_locals_are_hidden_and_restored() {
        let mut ns = ns();
        {
            let mut scope = Overlay::enter(&mut ns, Bindings::new().local("a").local("r")).unwrap();
            assert!(!scope.contains("a"));
            scope.set("a", 50.0);
            scope.set("r", 7.0);
        }
        assert_eq!(ns.number("a").unwrap(), 1.0);
        assert!(!ns.contains("r"));
    }

    #[test]
    fn test_nested_release_in_reverse_order() {
        let mut ns = ns();
        {
            let mut outer = Overlay::enter(&mut ns, Bindings::new().bind("a", 10.0)).unwrap();
            {
                let inner = Overlay::enter(&mut outer, Bindings::new().bind("a", 100.0)).unwrap();
                assert_eq!(inner.number("a").unwrap(), 100.0);
            }
            assert_eq!(outer.number("a").unwrap(), 10.0);
        }
        assert_eq!(ns.number("a").unwrap(), 1.0);
    }

    #[test]
    fn test_extract_from_source() {
        let source: Namespace = [("d", 102.0), ("g1", 65.0), ("g2", 0.0)].into_iter().collect();
        let bindings = Bindings::new().extract(&source, "d, edge = d - (g1 + g2)").unwrap();
        assert_eq!(bindings.names().collect::<Vec<_>>(), vec!["d", "edge"]);

        let mut ns = Namespace::new();
        let scope = Overlay::enter(&mut ns, bindings).unwrap();
        assert_eq!(scope.number("edge").unwrap(), 37.0);

        assert!(Bindings::new().extract(&source, "d + g1").is_err());
        assert!(Bindings::new().extract(&source, "nope").is_err());
    }

    #[test]
    fn test_exported_names_survive_release() {
        let mut ns = ns();
        {
            let mut scope = Overlay::enter(
                &mut ns,
                Bindings::new().bind("a", 10.0).export("area").export("unused"),
            )
            .unwrap();
            let area = scope.number("a").unwrap() * scope.number("b").unwrap();
            scope.set("area", area);
            scope.set("scratch", 1.0);
        }
        assert_eq!(ns.number("area").unwrap(), 20.0);
        assert_eq!(ns.number("a").unwrap(), 1.0);
        assert!(!ns.contains("scratch"));
        assert!(!ns.contains("unused"));

        let err = Overlay::enter(&mut ns, Bindings::new().bind("x", 1.0).export("x")).unwrap_err();
        assert_eq!(err, CalcError::name_conflict("x"));
    }

    #[test]
    fn test_scope_values() {
        let mut ns = ns();
        let mut scope = Overlay::enter(&mut ns, Bindings::new().bind("b", 20.0).local("r")).unwrap();
        scope.set("z", 1.0);
        scope.set("r", 9.0);
        let values = scope.scope_values();
        let names: Vec<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "r", "z"]);
    }
}

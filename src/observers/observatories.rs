use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;

use super::Observer;
use crate::constants::{MpcCode, GEOCENTER_CODE};
use crate::link_errors::LinkError;

/// Registry of observing sites keyed by MPC code.
///
/// A new registry always knows the geocenter (`"500"`).
#[derive(Debug, Clone)]
pub struct Observatories {
    sites: HashMap<MpcCode, Arc<Observer>, RandomState>,
}

impl Default for Observatories {
    fn default() -> Self {
        Self::new()
    }
}

impl Observatories {
    pub fn new() -> Self {
        let mut sites = HashMap::default();
        sites.insert(GEOCENTER_CODE.to_string(), Arc::new(Observer::geocenter()));
        Observatories { sites }
    }

    /// Register (or replace) the site for `code`.
    pub fn insert(&mut self, code: impl Into<MpcCode>, observer: Observer) {
        self.sites.insert(code.into(), Arc::new(observer));
    }

    /// Look up a site.
    ///
    /// Return
    /// ----------
    /// * [`LinkError::UnknownObservatory`] if `code` was never registered.
    pub fn get(&self, code: &str) -> Result<&Arc<Observer>, LinkError> {
        self.sites
            .get(code)
            .ok_or_else(|| LinkError::UnknownObservatory(code.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod observatories_test {
    use super::*;

    #[test]
    fn geocenter_is_known() {
        let obs = Observatories::new();
        assert!(obs.get("500").is_ok());
        assert_eq!(obs.len(), 1);
    }

    #[test]
    fn unknown_code() {
        let mut obs = Observatories::new();
        obs.insert(
            "F51",
            Observer::new(203.74409, 20.707233557, 3067.694, Some("Pan-STARRS 1".into())).unwrap(),
        );
        assert_eq!(obs.get("F51").unwrap().name.as_deref(), Some("Pan-STARRS 1"));
        assert_eq!(
            obs.get("XXX").unwrap_err(),
            LinkError::UnknownObservatory("XXX".into())
        );
    }
}

//! Opportunity store: holds the most recent scan result, atomically
//! replaced on every scan. Grounded on the original's
//! `updateOpportunityCache` (full-map replace under a mutex) and the
//! teacher's `monitor::Stats` copy-out pattern (§4.5 invariant: readers
//! never observe a partially-updated scan).

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

use super::ArbitrageOpportunity;

#[derive(Default)]
pub struct OpportunityStore {
    opportunities: RwLock<HashMap<String, ArbitrageOpportunity>>,
}

impl OpportunityStore {
    pub fn new() -> Self {
        Self {
            opportunities: RwLock::new(HashMap::new()),
        }
    }

    /// Atomically replaces the whole opportunity set with the result of the
    /// latest scan.
    pub fn replace_all(&self, opportunities: Vec<ArbitrageOpportunity>) {
        let map: HashMap<String, ArbitrageOpportunity> =
            opportunities.into_iter().map(|o| (o.id.clone(), o)).collect();
        *self.opportunities.write() = map;
    }

    pub fn get(&self, id: &str) -> Option<ArbitrageOpportunity> {
        let guard = self.opportunities.read();
        guard.get(id).filter(|o| !o.is_expired(Instant::now())).cloned()
    }

    pub fn get_all(&self) -> Vec<ArbitrageOpportunity> {
        let now = Instant::now();
        self.opportunities
            .read()
            .values()
            .filter(|o| !o.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.opportunities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.opportunities.read().is_empty()
    }
}

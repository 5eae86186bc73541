//! Decides whether a peripheral is the remote.
//!
//! Trust order: remembered identity, then a strong name match, then a weak
//! name match (only until an identity has been learned), then the advertised
//! service. Names are accumulated per peripheral across sightings.

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::adapter::{Advertisement, Peripheral, PeripheralId};
use crate::config::{Config, SERVICE_UUID};

/// Peripherals whose names are tracked at once. A busy unfiltered scan sees
/// many rotating addresses; past this the cache starts over.
pub const MAX_TRACKED_PERIPHERALS: usize = 64;

/// How a peripheral was recognized, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Match {
    KnownIdentity,
    StrongName,
    WeakName,
    Service,
}

impl Match {
    /// Whether an identity recognized this way may be remembered.
    pub fn is_trusted(self) -> bool {
        !matches!(self, Match::Service)
    }
}

/// A candidate device tracked by the link for one connection lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralRef {
    pub peripheral: Peripheral,
    /// Lowercased names seen so far.
    pub names: BTreeSet<String>,
    pub matched: Match,
}

impl PeripheralRef {
    pub fn id(&self) -> &PeripheralId {
        &self.peripheral.id
    }
}

#[derive(Debug, Clone)]
pub struct IdentificationPolicy {
    primary_keyword: String,
    fallback_keyword: String,
    service: Uuid,
    names: HashMap<PeripheralId, BTreeSet<String>>,
}

impl IdentificationPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            primary_keyword: config.primary_keyword.to_lowercase(),
            fallback_keyword: config.fallback_keyword.to_lowercase(),
            service: SERVICE_UUID,
            names: HashMap::new(),
        }
    }

    /// Record the names carried by this sighting and return all names seen
    /// for the peripheral so far.
    pub fn observe(
        &mut self,
        peripheral: &Peripheral,
        advertisement: Option<&Advertisement>,
    ) -> BTreeSet<String> {
        let sighted: BTreeSet<String> = peripheral
            .name
            .iter()
            .chain(advertisement.and_then(|adv| adv.local_name.as_ref()))
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        if sighted.is_empty() {
            return self.names.get(&peripheral.id).cloned().unwrap_or_default();
        }
        if !self.names.contains_key(&peripheral.id) && self.names.len() >= MAX_TRACKED_PERIPHERALS {
            trace!("name cache full, starting over");
            self.names.clear();
        }
        let names = self.names.entry(peripheral.id.clone()).or_default();
        names.extend(sighted);
        names.clone()
    }

    /// Drop the names of every peripheral except `keep`.
    pub fn retain_only(&mut self, keep: Option<&PeripheralId>) {
        self.names.retain(|id, _| Some(id) == keep);
    }

    /// Number of peripherals whose names are cached.
    pub fn tracked(&self) -> usize {
        self.names.len()
    }

    pub fn classify(
        &self,
        id: &PeripheralId,
        names: &BTreeSet<String>,
        advertisement: Option<&Advertisement>,
        known: Option<&PeripheralId>,
    ) -> Option<Match> {
        if known == Some(id) {
            return Some(Match::KnownIdentity);
        }
        if names.iter().any(|name| name.contains(&self.primary_keyword)) {
            return Some(Match::StrongName);
        }
        if known.is_none() && names.iter().any(|name| name.contains(&self.fallback_keyword)) {
            return Some(Match::WeakName);
        }
        if advertisement.is_some_and(|adv| adv.advertises(&self.service)) {
            return Some(Match::Service);
        }
        None
    }

    /// Observe a sighting and, when it is the remote, return the candidate.
    pub fn identify(
        &mut self,
        peripheral: &Peripheral,
        advertisement: Option<&Advertisement>,
        known: Option<&PeripheralId>,
    ) -> Option<PeripheralRef> {
        let names = self.observe(peripheral, advertisement);
        let matched = self.classify(&peripheral.id, &names, advertisement, known)?;
        Some(PeripheralRef {
            peripheral: peripheral.clone(),
            names,
            matched,
        })
    }

    /// Whether the candidate is trustworthy enough to remember.
    pub fn should_persist(&self, candidate: &PeripheralRef, known: Option<&PeripheralId>) -> bool {
        let names = self
            .names
            .get(candidate.id())
            .unwrap_or(&candidate.names);
        self.classify(candidate.id(), names, None, known)
            .is_some_and(Match::is_trusted)
    }
}

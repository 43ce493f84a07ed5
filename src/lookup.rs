//! Iterative lookups: node lookup, value lookup with caching, and store
//! fan-out, all built from alpha-parallel rounds over a shortlist.

use std::collections::HashSet;
use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, info};

use crate::common::{Contact, Distance, Id};
use crate::messages::{
    FindNodeRequestArguments, FindValueRequestArguments, RequestTypeSpecific, ResponseSpecific,
    StoreRequestArguments,
};
use crate::node::Node;
use crate::rpc::{CallResult, RpcClient};
use crate::Result;

/// The up-to-k closest candidates seen so far in one lookup, ascending by
/// XOR distance to the target, deduplicated by endpoint.
#[derive(Debug)]
struct Shortlist {
    target: Id,
    k: usize,
    contacts: Vec<Contact>,
}

impl Shortlist {
    fn new(target: Id, k: usize, seed: Vec<Contact>) -> Self {
        let mut shortlist = Shortlist {
            target,
            k,
            contacts: Vec::new(),
        };
        shortlist.merge(seed);

        shortlist
    }

    /// Folds candidates in, keeping the k closest distinct endpoints.
    /// Established entries win ties against new candidates.
    fn merge(&mut self, candidates: Vec<Contact>) {
        self.contacts.extend(candidates);

        let mut seen = HashSet::new();
        self.contacts.retain(|contact| seen.insert(contact.addr));

        let target = self.target;
        self.contacts.sort_by_key(|contact| contact.id.xor(&target));
        self.contacts.truncate(self.k);
    }

    fn closest_distance(&self) -> Option<Distance> {
        self.contacts
            .first()
            .map(|contact| contact.id.xor(&self.target))
    }

    /// The up-to-alpha closest entries not yet contacted.
    fn next_round(&self, contacted: &HashSet<SocketAddr>, alpha: usize) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|contact| !contacted.contains(&contact.addr))
            .take(alpha)
            .cloned()
            .collect()
    }

    /// Snapshot of the current membership, closest first.
    fn members(&self) -> Vec<Contact> {
        self.contacts.clone()
    }

    /// Entries in order, for detecting a round that changed nothing.
    fn endpoints(&self) -> Vec<SocketAddr> {
        self.contacts.iter().map(|contact| contact.addr).collect()
    }

    fn into_contacts(self) -> Vec<Contact> {
        self.contacts
    }
}

impl Node {
    // === Public Methods ===

    /// Finds the k closest contacts to `target` known to the network.
    ///
    /// Walks the network in alpha-parallel rounds, always querying the
    /// closest uncontacted candidates. A round that fails to produce a
    /// strictly closer candidate triggers one probe of every remaining
    /// uncontacted shortlist entry before the lookup concludes; a round that
    /// leaves the shortlist unchanged concludes it directly.
    pub fn iterative_find_node(&self, target: &Id) -> Vec<Contact> {
        let alpha = self.config().alpha;
        let request = RequestTypeSpecific::FindNode(FindNodeRequestArguments {
            target: target.to_hex(),
        });

        let seed = self.0.table().find_k_nearest(target);
        let mut shortlist = Shortlist::new(*target, self.config().k, seed);

        let mut contacted = HashSet::new();
        contacted.insert(self.addr());

        loop {
            let round = shortlist.next_round(&contacted, alpha);
            if round.is_empty() {
                break;
            }

            let before = shortlist.endpoints();
            let best_before = shortlist.closest_distance();

            let learned = self.probe(&mut contacted, round, request.clone());
            shortlist.merge(learned);

            if !improved(best_before, shortlist.closest_distance()) {
                // One last full-width probe of every unqueried shortlist
                // member, then stop regardless of what it brings in.
                let rest = uncontacted(shortlist.members(), &contacted);
                let learned = self.probe(&mut contacted, rest, request.clone());
                shortlist.merge(learned);
                break;
            }

            if shortlist.endpoints() == before {
                break;
            }
        }

        shortlist.into_contacts()
    }

    /// Retrieves the value stored under `key`, or `None` if no contact on
    /// the lookup path holds it.
    ///
    /// A locally stored value short-circuits without touching the network.
    /// The first value reply wins; any value found is then cached at the
    /// closest responding contact that did not hold it.
    pub fn iterative_find_value(&self, key: &str) -> Result<Option<Bytes>> {
        if let Some(value) = self.0.kv().get(key) {
            return Ok(Some(value));
        }

        let target = Id::from_hex(key)?;
        let request = RequestTypeSpecific::FindValue(FindValueRequestArguments {
            key: key.to_string(),
        });

        let alpha = self.config().alpha;
        let seed = self.0.table().find_k_nearest(&target);
        let mut shortlist = Shortlist::new(target, self.config().k, seed);

        let mut contacted = HashSet::new();
        contacted.insert(self.addr());

        let mut closest_miss: Option<Contact> = None;

        loop {
            let round = shortlist.next_round(&contacted, alpha);
            if round.is_empty() {
                return Ok(None);
            }

            let before = shortlist.endpoints();
            let best_before = shortlist.closest_distance();

            let (learned, found) =
                self.probe_for_value(&mut contacted, &mut closest_miss, &target, round, &request);
            if let Some(value) = found {
                self.cache_on_path(key, &value, closest_miss);
                return Ok(Some(value));
            }
            shortlist.merge(learned);

            if !improved(best_before, shortlist.closest_distance()) {
                let rest = uncontacted(shortlist.members(), &contacted);
                let (learned, found) = self.probe_for_value(
                    &mut contacted,
                    &mut closest_miss,
                    &target,
                    rest,
                    &request,
                );
                if let Some(value) = found {
                    self.cache_on_path(key, &value, closest_miss);
                    return Ok(Some(value));
                }
                shortlist.merge(learned);

                return Ok(None);
            }

            if shortlist.endpoints() == before {
                return Ok(None);
            }
        }
    }

    /// Publishes a value to the k contacts closest to its key, returning the
    /// contacts that acknowledged the write.
    ///
    /// The local store is not written; publishing a value a node also wants
    /// to hold is a separate [Node::store_local].
    pub fn iterative_store(&self, key: String, value: Bytes) -> Result<Vec<Contact>> {
        let target = Id::from_hex(&key)?;

        let closest = self.iterative_find_node(&target);
        let request = RequestTypeSpecific::Store(StoreRequestArguments {
            key: key.clone(),
            value,
        });

        let mut stored = Vec::new();
        for (contact, result) in self.fan_out(closest, request).iter() {
            match result {
                Ok(ResponseSpecific::Ack(_)) => stored.push(contact),
                Ok(response) => debug!(?response, ?contact, "Unexpected store response"),
                Err(error) => debug!(?error, ?contact, "Store call failed"),
            }
        }

        info!(%key, count = stored.len(), "Stored value on nearest contacts");

        Ok(stored)
    }

    // === Private Methods ===

    /// Queries `round` concurrently and collects every candidate learned
    /// from nodes replies. All round members count as contacted, responsive
    /// or not.
    fn probe(
        &self,
        contacted: &mut HashSet<SocketAddr>,
        round: Vec<Contact>,
        request: RequestTypeSpecific,
    ) -> Vec<Contact> {
        for contact in &round {
            contacted.insert(contact.addr);
        }

        let mut learned = Vec::new();
        for (contact, result) in self.fan_out(round, request).iter() {
            match result {
                Ok(ResponseSpecific::Nodes(args)) => {
                    self.0.table().add(contact);
                    learned.extend(self.admit_candidates(args.contacts));
                }
                Ok(response) => debug!(?response, ?contact, "Unexpected lookup response"),
                Err(error) => debug!(?error, ?contact, "Lookup call failed"),
            }
        }

        learned
    }

    /// Like [Node::probe], but racing for a value: the first value reply
    /// ends the round and the remaining replies are dropped. Contacts that
    /// answered with nodes instead are candidates for caching; the closest
    /// one is tracked in `closest_miss`.
    fn probe_for_value(
        &self,
        contacted: &mut HashSet<SocketAddr>,
        closest_miss: &mut Option<Contact>,
        target: &Id,
        round: Vec<Contact>,
        request: &RequestTypeSpecific,
    ) -> (Vec<Contact>, Option<Bytes>) {
        for contact in &round {
            contacted.insert(contact.addr);
        }

        let mut learned = Vec::new();
        for (contact, result) in self.fan_out(round, request.clone()).iter() {
            match result {
                Ok(ResponseSpecific::Value(args)) => {
                    self.0.table().add(contact);
                    return (learned, Some(args.value));
                }
                Ok(ResponseSpecific::Nodes(args)) => {
                    self.0.table().add(contact.clone());

                    let closer = match closest_miss {
                        Some(miss) => contact.id.xor(target) < miss.id.xor(target),
                        None => true,
                    };
                    if closer {
                        *closest_miss = Some(contact);
                    }

                    learned.extend(self.admit_candidates(args.contacts));
                }
                Ok(response) => debug!(?response, ?contact, "Unexpected lookup response"),
                Err(error) => debug!(?error, ?contact, "Lookup call failed"),
            }
        }

        (learned, None)
    }

    /// Inserts learned candidates into the routing table, dropping this
    /// node's own endpoint.
    fn admit_candidates(&self, candidates: Vec<Contact>) -> Vec<Contact> {
        let own_addr = self.addr();

        candidates
            .into_iter()
            .filter(|candidate| candidate.addr != own_addr)
            .inspect(|candidate| {
                self.0.table().add(candidate.clone());
            })
            .collect()
    }

    /// Best-effort background store of a found value at the closest queried
    /// contact that missed it.
    fn cache_on_path(&self, key: &str, value: &Bytes, closest_miss: Option<Contact>) {
        if !self.config().cache_on_lookup {
            return;
        }

        let contact = match closest_miss {
            Some(contact) => contact,
            None => return,
        };

        let rpc = self.0.rpc.clone();
        let request = RequestTypeSpecific::Store(StoreRequestArguments {
            key: key.to_string(),
            value: value.clone(),
        });

        std::thread::spawn(move || {
            if let Err(error) = rpc.call(contact.addr, request) {
                debug!(?error, ?contact, "Caching a found value failed");
            }
        });
    }

    /// One blocking call per contact on its own thread; the receiver drains
    /// completions and disconnects once all calls finish.
    fn fan_out(
        &self,
        contacts: Vec<Contact>,
        request: RequestTypeSpecific,
    ) -> flume::Receiver<(Contact, CallResult)> {
        let (tx, rx) = flume::unbounded();

        for contact in contacts {
            let rpc = self.0.rpc.clone();
            let request = request.clone();
            let tx = tx.clone();

            std::thread::spawn(move || {
                let result = rpc.call(contact.addr, request);
                let _ = tx.send((contact, result));
            });
        }

        rx
    }
}

/// The members of a shortlist snapshot that have not been queried yet.
fn uncontacted(members: Vec<Contact>, contacted: &HashSet<SocketAddr>) -> Vec<Contact> {
    members
        .into_iter()
        .filter(|contact| !contacted.contains(&contact.addr))
        .collect()
}

/// Whether the closest known distance strictly improved over a round.
fn improved(before: Option<Distance>, after: Option<Distance>) -> bool {
    match (before, after) {
        (Some(before), Some(after)) => after < before,
        (None, Some(_)) => true,
        _ => false,
    }
}

//! Kademlia routing table: 160 k-buckets keyed by XOR distance magnitude.

use std::slice::Iter;

use crate::common::{Contact, Id, ID_BITS};

/// A bounded, recency-ordered set of contacts sharing one distance range.
///
/// Contacts are ordered from least-recently-seen (front) to
/// most-recently-seen (back). No duplicate identifiers; length never
/// exceeds `k`.
#[derive(Debug, Clone)]
pub struct KBucket {
    k: usize,
    contacts: Vec<Contact>,
}

impl KBucket {
    pub fn new(k: usize) -> Self {
        KBucket {
            k,
            contacts: Vec::with_capacity(k),
        }
    }

    // === Public Methods ===

    /// Attempts to add a contact, returning `true` if the bucket now holds it.
    ///
    /// A contact with a known identifier is moved to the most-recently-seen
    /// end. When the bucket is full the least-recently-seen contact is
    /// evicted; probing it for responsiveness first would slot in here
    /// without changing this method's contract.
    pub fn add(&mut self, incoming: Contact) -> bool {
        if let Some(index) = self.contacts.iter().position(|c| c.id == incoming.id) {
            self.contacts.remove(index);
            self.contacts.push(incoming);

            return true;
        }

        if self.contacts.len() < self.k {
            self.contacts.push(incoming);
            return true;
        }

        self.contacts.remove(0);
        self.contacts.push(incoming);

        true
    }

    /// Removes a contact, returning `true` iff it existed.
    pub fn remove(&mut self, id: &Id) -> bool {
        if let Some(index) = self.contacts.iter().position(|c| c.id == *id) {
            self.contacts.remove(index);
            return true;
        }

        false
    }

    /// Current membership in recency order, least-recently-seen first.
    pub fn iter(&self) -> Iter<'_, Contact> {
        self.contacts.iter()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.contacts.iter().any(|c| c.id == *id)
    }
}

/// Routing table owned by one node: an array of 160 lazily-created
/// [KBucket]s, where bucket `i` holds contacts whose XOR distance to the
/// owner has bit-length exactly `i + 1`.
///
/// The owner's own identifier is never present in any bucket.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    owner_id: Id,
    k: usize,
    buckets: Vec<Option<KBucket>>,
}

impl RoutingTable {
    pub fn new(owner_id: Id, k: usize) -> Self {
        let mut buckets = Vec::with_capacity(ID_BITS);
        buckets.resize_with(ID_BITS, || None);

        RoutingTable {
            owner_id,
            k,
            buckets,
        }
    }

    // === Getters ===

    /// Returns the owner's [Id], where distances are measured from.
    pub fn owner_id(&self) -> &Id {
        &self.owner_id
    }

    pub fn k(&self) -> usize {
        self.k
    }

    // === Public Methods ===

    /// Attempts to add a contact, returning `true` if the table now holds it.
    ///
    /// The owner's own identifier is silently rejected.
    pub fn add(&mut self, contact: Contact) -> bool {
        let index = match self.bucket_index(&contact.id) {
            Some(index) => index,
            None => return false,
        };

        let k = self.k;
        self.buckets[index]
            .get_or_insert_with(|| KBucket::new(k))
            .add(contact)
    }

    /// Removes a contact by id, returning `true` iff it existed.
    pub fn remove(&mut self, id: &Id) -> bool {
        match self.bucket_index(id) {
            Some(index) => match &mut self.buckets[index] {
                Some(bucket) => bucket.remove(id),
                None => false,
            },
            None => false,
        }
    }

    /// Returns the contact stored under `id`, if any.
    pub fn contact(&self, id: &Id) -> Option<Contact> {
        let bucket = self.buckets[self.bucket_index(id)?].as_ref()?;

        bucket.iter().find(|c| c.id == *id).cloned()
    }

    /// The up-to-k known contacts closest to `target`, ascending by XOR
    /// distance.
    ///
    /// Starts at the target's home bucket, then expands through lower bucket
    /// indices first and higher indices second until k contacts are
    /// accumulated or the table is exhausted. The down-before-up order is a
    /// deterministic tie-break and must be preserved.
    pub fn find_k_nearest(&self, target: &Id) -> Vec<Contact> {
        let home = self
            .owner_id
            .xor(target)
            .highest_set_bit()
            .unwrap_or(0);

        let mut nearest: Vec<Contact> = Vec::with_capacity(self.k);
        self.collect_bucket(home, &mut nearest);

        let mut below = home;
        while nearest.len() < self.k && below > 0 {
            below -= 1;
            self.collect_bucket(below, &mut nearest);
        }

        let mut above = home + 1;
        while nearest.len() < self.k && above < ID_BITS {
            self.collect_bucket(above, &mut nearest);
            above += 1;
        }

        nearest.sort_by_key(|contact| contact.id.xor(target));
        nearest.truncate(self.k);

        nearest
    }

    /// Returns `true` if this routing table holds no contacts.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().flatten().all(|bucket| bucket.is_empty())
    }

    /// Number of contacts across all buckets.
    pub fn size(&self) -> usize {
        self.buckets
            .iter()
            .flatten()
            .map(|bucket| bucket.len())
            .sum()
    }

    /// Snapshot of every contact in the table, bucket order.
    pub fn contacts(&self) -> Vec<Contact> {
        self.buckets
            .iter()
            .flatten()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.contact(id).is_some()
    }

    // === Private Methods ===

    /// Bucket index for `id`: the bit length of its distance to the owner,
    /// minus one. `None` for the owner's own id.
    fn bucket_index(&self, id: &Id) -> Option<usize> {
        self.owner_id.xor(id).highest_set_bit()
    }

    fn collect_bucket(&self, index: usize, out: &mut Vec<Contact>) {
        if let Some(bucket) = &self.buckets[index] {
            out.extend(bucket.iter().cloned());
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use super::*;
    use crate::common::ID_SIZE;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Id whose big-endian magnitude is `value`.
    fn id_of(value: u64) -> Id {
        let mut bytes = [0u8; ID_SIZE];
        bytes[ID_SIZE - 8..].copy_from_slice(&value.to_be_bytes());
        Id::from_bytes(bytes).unwrap()
    }

    #[test]
    fn table_is_empty() {
        let mut table = RoutingTable::new(Id::random(), 20);
        assert!(table.is_empty());

        table.add(Contact::random());
        assert!(!table.is_empty());
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn should_not_add_self() {
        let owner = Id::random();
        let mut table = RoutingTable::new(owner, 20);

        assert!(!table.add(Contact::new(owner, addr(1))));
        assert!(table.is_empty());
    }

    #[test]
    fn buckets_are_sets() {
        let mut table = RoutingTable::new(Id::random(), 20);

        let contact = Contact::random();
        table.add(contact.clone());
        table.add(Contact::new(contact.id, contact.addr));

        assert_eq!(table.size(), 1);
    }

    #[test]
    fn remove() {
        let mut table = RoutingTable::new(Id::random(), 20);
        let contact = Contact::random();

        table.add(contact.clone());
        assert!(table.contains(&contact.id));

        assert!(table.remove(&contact.id));
        assert!(!table.contains(&contact.id));
        assert!(!table.remove(&contact.id));
    }

    #[test]
    fn refresh_moves_contact_to_most_recently_seen() {
        let mut bucket = KBucket::new(4);

        let first = Contact::random();
        bucket.add(first.clone());
        bucket.add(Contact::random());

        assert_eq!(bucket.iter().next().unwrap().id, first.id);

        assert!(bucket.add(first.clone()));

        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.iter().last().unwrap().id, first.id);
    }

    #[test]
    fn full_bucket_evicts_least_recently_seen() {
        let k = 4;
        let mut bucket = KBucket::new(k);

        let oldest = Contact::random();
        bucket.add(oldest.clone());
        for _ in 1..k {
            bucket.add(Contact::random());
        }
        assert_eq!(bucket.len(), k);

        let incoming = Contact::random();
        assert!(bucket.add(incoming.clone()));

        assert_eq!(bucket.len(), k);
        assert!(!bucket.contains(&oldest.id));
        assert_eq!(bucket.iter().last().unwrap().id, incoming.id);
    }

    #[test]
    fn find_k_nearest_is_sorted_and_bounded() {
        let mut table = RoutingTable::new(Id::random(), 20);

        for _ in 0..100 {
            table.add(Contact::random());
        }

        let target = Id::random();
        let nearest = table.find_k_nearest(&target);

        assert!(nearest.len() <= 20);

        for pair in nearest.windows(2) {
            assert!(pair[0].id.xor(&target) <= pair[1].id.xor(&target));
        }

        let mut addrs: Vec<_> = nearest.iter().map(|c| c.addr).collect();
        addrs.sort();
        addrs.dedup();
        assert_eq!(addrs.len(), nearest.len());
    }

    #[test]
    fn find_k_nearest_returns_everything_when_sparse() {
        let mut table = RoutingTable::new(Id::random(), 20);

        for _ in 0..5 {
            table.add(Contact::random());
        }

        assert_eq!(table.find_k_nearest(&Id::random()).len(), 5);
    }

    #[test]
    fn find_k_nearest_expands_across_buckets() {
        // k = 4, owner at zero. Three contacts in bucket 5 (distance
        // bit-length 6) and three in bucket 6; a target in bucket 5 must pull
        // the 4 closest by XOR distance across both buckets, ascending.
        let owner = id_of(0);
        let mut table = RoutingTable::new(owner, 4);

        for (port, value) in [(1u16, 33u64), (2, 34), (3, 40), (4, 64), (5, 65), (6, 100)] {
            assert!(table.add(Contact::new(id_of(value), addr(port))));
        }

        let target = id_of(32);
        let nearest = table.find_k_nearest(&target);

        let got: Vec<Id> = nearest.iter().map(|c| c.id).collect();
        // Distances from 32: 33->1, 34->2, 40->8, 100->68, 64->96, 65->97.
        assert_eq!(got, vec![id_of(33), id_of(34), id_of(40), id_of(100)]);
    }

    #[test]
    fn self_lookup_starts_from_the_lowest_bucket() {
        let owner = id_of(0);
        let mut table = RoutingTable::new(owner, 2);

        table.add(Contact::new(id_of(1), addr(1)));
        table.add(Contact::new(id_of(300), addr(2)));
        table.add(Contact::new(id_of(70_000), addr(3)));

        let nearest = table.find_k_nearest(&owner);
        let got: Vec<Id> = nearest.iter().map(|c| c.id).collect();

        assert_eq!(got, vec![id_of(1), id_of(300)]);
    }
}

use std::net::SocketAddr;

use crate::pair::CandidatePair;

/// The pairs confirmed reachable by a successful connectivity check.
///
/// Kept in descending priority order and unique by pair identity.
/// Membership only ever grows, except on stream teardown.
#[derive(Debug, Default)]
pub struct ValidList {
    pairs: Vec<CandidatePair>,
}

impl ValidList {
    pub(crate) fn new() -> Self {
        ValidList { pairs: Vec::new() }
    }

    /// Number of valid pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pair has been validated yet.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The valid pairs, highest priority first.
    pub fn pairs(&self) -> &[CandidatePair] {
        &self.pairs
    }

    /// Marks the pair validated and inserts it in priority order.
    ///
    /// Idempotent: re-adding a pair already present (by identity, not by
    /// priority) is a no-op and returns `false`.
    pub fn add(&mut self, mut pair: CandidatePair) -> bool {
        if self.pairs.iter().any(|p| p.same_pair(&pair)) {
            trace!("Pair already in valid list: {:?}", pair);
            return false;
        }

        pair.set_valid();

        let pos = self
            .pairs
            .iter()
            .position(|p| p.prio() < pair.prio())
            .unwrap_or(self.pairs.len());

        info!("New valid pair: {:?}", pair);
        self.pairs.insert(pos, pair);
        true
    }

    /// Whether some valid pair carries this foundation. Used to decide
    /// whether a redundant check can be skipped.
    pub fn contains_foundation(&self, foundation: &str) -> bool {
        self.pairs.iter().any(|p| p.foundation() == foundation)
    }

    /// The first (highest priority) valid pair for a component.
    pub fn pair_for_component(&self, component_id: u16) -> Option<&CandidatePair> {
        self.pairs.iter().find(|p| p.component_id() == component_id)
    }

    /// Marks the valid pair with these addresses nominated.
    pub(crate) fn nominate(&mut self, local: SocketAddr, remote: SocketAddr) -> bool {
        let Some(pair) = self.pairs.iter_mut().find(|p| p.has_addrs(local, remote)) else {
            return false;
        };
        pair.nominate();
        true
    }

    pub(crate) fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::candidate::Candidate;
    use std::net::SocketAddr;

    fn sock(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn pair(local: &str, remote: &str, prio: u64) -> CandidatePair {
        CandidatePair::new(
            Candidate::host(sock(local), 1, "udp").unwrap(),
            Candidate::host(sock(remote), 1, "udp").unwrap(),
            prio,
        )
    }

    #[test]
    fn add_is_idempotent() {
        let mut vl = ValidList::new();

        assert!(vl.add(pair("1.1.1.1:1000", "9.9.9.9:1000", 10)));
        // Same identity, different priority: still a no-op.
        assert!(!vl.add(pair("1.1.1.1:1000", "9.9.9.9:1000", 99)));
        assert_eq!(vl.len(), 1);
    }

    #[test]
    fn added_pairs_are_marked_valid() {
        let mut vl = ValidList::new();
        vl.add(pair("1.1.1.1:1000", "9.9.9.9:1000", 10));
        assert!(vl.pairs()[0].is_valid());
    }

    #[test]
    fn ordered_by_descending_prio() {
        let mut vl = ValidList::new();
        vl.add(pair("1.1.1.1:1000", "9.9.9.9:1000", 10));
        vl.add(pair("2.2.2.2:1000", "9.9.9.9:1000", 30));
        vl.add(pair("3.3.3.3:1000", "9.9.9.9:1000", 20));

        let prios: Vec<_> = vl.pairs().iter().map(|p| p.prio()).collect();
        assert_eq!(prios, vec![30, 20, 10]);
    }

    #[test]
    fn foundation_lookup() {
        let mut vl = ValidList::new();
        let p = pair("1.1.1.1:1000", "9.9.9.9:1000", 10);
        let f = p.foundation();
        vl.add(p);

        assert!(vl.contains_foundation(&f));
        assert!(!vl.contains_foundation("nope"));
    }
}

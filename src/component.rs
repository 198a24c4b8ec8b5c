use std::net::SocketAddr;

use crate::candidate::{Candidate, CandidateKind, LocalCandidate};

/// One transport flow within a media stream (e.g. RTP or RTCP), grouping
/// the local and remote candidates that serve it.
#[derive(Debug)]
pub struct Component {
    /// Component id, unique within the stream, assigned from 1.
    id: u16,

    /// Local candidates, in the order they were gathered.
    local: Vec<LocalCandidate>,

    /// Remote candidates, in the order we got to know them.
    remote: Vec<Candidate>,
}

impl Component {
    pub(crate) fn new(id: u16) -> Self {
        Component {
            id,
            local: Vec::new(),
            remote: Vec::new(),
        }
    }

    /// The id of this component.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Registers a locally gathered candidate.
    ///
    /// A candidate is redundant if its transport address and base equal
    /// those of another candidate; the one with the lower priority is
    /// eliminated. Returns `false` if the candidate was not kept.
    pub fn add_local(&mut self, mut lc: LocalCandidate) -> bool {
        if lc.candidate().component_id() != self.id {
            debug!(
                "Reject local candidate for other component: {:?}",
                lc.candidate()
            );
            return false;
        }

        let ip = lc.candidate().addr().ip();

        // https://datatracker.ietf.org/doc/html/rfc8445#section-5.1.2.1
        // The local preference MUST be an integer from 0 (lowest preference) to
        // 65535 (highest preference) inclusive. When there is only a single IP
        // address, this value SHOULD be set to 65535. If there are multiple
        // candidates for a particular component for a particular data stream
        // that have the same type, the local preference MUST be unique for each
        // one.
        //
        // We assign the following intervals for the different types of
        // candidates:
        //
        // 0     - 16384 => relay
        // 16384 - 32768 => srflx
        // 32768 - 49152 => prflx
        // 49152 - 65536 => host
        //
        // And furthermore we subdivide these to interleave IPv6 with IPv4
        // so that odd numbers are ipv6 and even are ipv4.
        let counter_start: u32 = {
            use CandidateKind::*;
            let x = match lc.candidate().kind() {
                Host => 65_535,
                PeerReflexive => 49_151,
                ServerReflexive => 32_767,
                Relayed => 16_383,
            };
            x - if ip.is_ipv6() { 0 } else { 1 }
        };

        // Count the number of existing candidates of the same kind.
        let same_kind = self
            .local
            .iter()
            .filter(|v| v.candidate().kind() == lc.candidate().kind())
            .filter(|v| v.candidate().addr().is_ipv6() == ip.is_ipv6())
            .count() as u32;

        let pref = counter_start - same_kind * 2;
        trace!("Calculated local preference: {}", pref);
        lc.candidate_mut().set_local_preference(pref);

        // NB the redundancy elimination must happen _after_
        // set_local_preference(), since prio() is calculated from it.
        let redundant = self.local.iter_mut().find(|v| {
            v.candidate().addr() == lc.candidate().addr()
                && v.candidate().base() == lc.candidate().base()
                && v.candidate().proto() == lc.candidate().proto()
        });

        if let Some(other) = redundant {
            if lc.candidate().prio() <= other.candidate().prio() {
                debug!(
                    "Reject redundant candidate, current: {:?} rejected: {:?}",
                    other, lc
                );
                return false;
            } else {
                debug!(
                    "Replace redundant candidate, current: {:?} replaced with: {:?}",
                    other, lc
                );
                other.free();
                *other = lc;
                return true;
            }
        }

        info!("Add local candidate: {:?}", lc);
        self.local.push(lc);
        true
    }

    /// Registers a candidate learned from the peer.
    ///
    /// Returns `false` for candidates already known (same address and
    /// protocol) or belonging to another component.
    pub fn add_remote(&mut self, c: Candidate) -> bool {
        if c.component_id() != self.id {
            debug!("Reject remote candidate for other component: {:?}", c);
            return false;
        }

        let duplicate = self
            .remote
            .iter()
            .any(|v| v.addr() == c.addr() && v.proto() == c.proto());

        if duplicate {
            debug!("Ignore already known remote candidate: {:?}", c);
            return false;
        }

        info!("Add remote candidate: {:?}", c);
        self.remote.push(c);
        true
    }

    /// The first local candidate with this address, if any.
    pub fn find_local_candidate(&self, addr: SocketAddr) -> Option<&Candidate> {
        self.local
            .iter()
            .map(|lc| lc.candidate())
            .find(|c| c.addr() == addr)
    }

    /// The first remote candidate with this address, if any.
    pub fn find_remote_candidate(&self, addr: SocketAddr) -> Option<&Candidate> {
        self.remote.iter().find(|c| c.addr() == addr)
    }

    /// Snapshot of the local candidate descriptors.
    pub fn local_candidates(&self) -> Vec<Candidate> {
        self.local.iter().map(|lc| lc.candidate().clone()).collect()
    }

    /// Snapshot of the remote candidates.
    pub fn remote_candidates(&self) -> Vec<Candidate> {
        self.remote.clone()
    }

    /// Number of local host candidates.
    pub fn count_host_candidates(&self) -> usize {
        self.local
            .iter()
            .filter(|lc| lc.candidate().kind() == CandidateKind::Host)
            .count()
    }

    /// Releases every local candidate's transport resource and clears
    /// both candidate collections. Idempotent.
    pub(crate) fn free(&mut self) {
        for lc in &mut self.local {
            lc.free();
        }
        self.local.clear();
        self.remote.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::candidate::CandidateSocket;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sock(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn host(s: &str) -> LocalCandidate {
        LocalCandidate::without_socket(Candidate::host(sock(s), 1, "udp").unwrap())
    }

    #[derive(Debug)]
    struct CountingSocket(Arc<AtomicUsize>);

    impl CandidateSocket for CountingSocket {
        fn close(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn local_preference_interleaves_families() {
        let mut cmp = Component::new(1);

        cmp.add_local(host("1.2.3.4:5000"));
        cmp.add_local(LocalCandidate::without_socket(
            Candidate::host(sock("[2001:db8::1]:5000"), 1, "udp").unwrap(),
        ));
        cmp.add_local(host("2.3.4.5:5000"));

        let prefs: Vec<_> = cmp
            .local_candidates()
            .iter()
            .map(|c| c.local_preference())
            .collect();

        assert_eq!(prefs, vec![65534, 65535, 65532]);
    }

    #[test]
    fn reject_redundant_lower_prio() {
        let mut cmp = Component::new(1);

        assert!(cmp.add_local(host("1.2.3.4:5000")));

        // Same address, base and proto: redundant.
        assert!(!cmp.add_local(host("1.2.3.4:5000")));
        assert_eq!(cmp.local_candidates().len(), 1);

        // Same address, different proto: distinct.
        assert!(cmp.add_local(LocalCandidate::without_socket(
            Candidate::host(sock("1.2.3.4:5000"), 1, "tcp").unwrap(),
        )));
    }

    #[test]
    fn reject_wrong_component() {
        let mut cmp = Component::new(1);
        let rtcp = Candidate::host(sock("1.2.3.4:5001"), 2, "udp").unwrap();
        assert!(!cmp.add_local(LocalCandidate::without_socket(rtcp.clone())));
        assert!(!cmp.add_remote(rtcp));
    }

    #[test]
    fn remote_dedupe_by_addr_and_proto() {
        let mut cmp = Component::new(1);
        let c = Candidate::remote(sock("9.9.9.9:1000"), 1, "udp", CandidateKind::Host, "f".into(), 100)
            .unwrap();

        assert!(cmp.add_remote(c.clone()));
        assert!(!cmp.add_remote(c));
        assert_eq!(cmp.remote_candidates().len(), 1);
    }

    #[test]
    fn find_by_address() {
        let mut cmp = Component::new(1);
        cmp.add_local(host("1.2.3.4:5000"));

        assert!(cmp.find_local_candidate(sock("1.2.3.4:5000")).is_some());
        assert!(cmp.find_local_candidate(sock("1.2.3.4:5001")).is_none());
        assert!(cmp.find_remote_candidate(sock("1.2.3.4:5000")).is_none());
    }

    #[test]
    fn free_closes_sockets_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut cmp = Component::new(1);

        cmp.add_local(LocalCandidate::new(
            Candidate::host(sock("1.2.3.4:5000"), 1, "udp").unwrap(),
            Box::new(CountingSocket(closed.clone())),
        ));

        cmp.free();
        cmp.free();

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(cmp.count_host_candidates(), 0);
    }
}

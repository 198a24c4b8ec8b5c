use std::fmt;

use crate::candidate::{Candidate, CandidateKind};

/// A pair of candidates, local and remote, subject to a connectivity
/// check.
///
/// Identity is defined by the two candidate addresses, never by priority:
/// substituting the local candidate with its base during pruning yields a
/// *different* pair value.
#[derive(Clone)]
pub struct CandidatePair {
    local: Candidate,
    remote: Candidate,

    /// Pair priority as computed at construction from the two candidate
    /// priorities and the agent role.
    prio: u64,

    /// Current state of this pair in the check scheduling.
    state: CheckState,

    /// Whether this pair was selected for actual media flow.
    nominated: bool,

    /// Whether a successful check confirmed this pair reachable.
    valid: bool,
}

/// States a candidate pair moves through while its check list is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckState {
    /// Not yet eligible for a check. Pairs are grouped by foundation and
    /// only one pair per foundation is active at a time across the whole
    /// set of check lists.
    #[default]
    Frozen,

    /// Eligible, but a check has not been sent for this pair.
    Waiting,

    /// A check has been sent for this pair, but the
    /// transaction is in progress.
    InProgress,

    /// A check has been sent for this pair, and it produced a
    /// successful result.
    Succeeded,

    /// A check has been sent for this pair, and it failed (a
    /// response to the check was never received, or a failure response
    /// was received).
    Failed,
}

impl CheckState {
    /// Succeeded and Failed are terminal for a pair.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckState::Succeeded | CheckState::Failed)
    }
}

impl CandidatePair {
    /// Creates a new pair in the default (Frozen) state.
    pub fn new(local: Candidate, remote: Candidate, prio: u64) -> Self {
        CandidatePair {
            local,
            remote,
            prio,
            state: CheckState::default(),
            nominated: false,
            valid: false,
        }
    }

    /// Pair priority per RFC 8445 section 6.1.2.3.
    ///
    /// G is the priority of the controlling side's candidate and D the
    /// controlled side's.
    pub fn calculate_prio(controlling: bool, remote_prio: u32, local_prio: u32) -> u64 {
        let (g, d) = if controlling {
            (local_prio as u64, remote_prio as u64)
        } else {
            (remote_prio as u64, local_prio as u64)
        };

        2_u64.pow(32) * g.min(d) + 2 * g.max(d) + if g > d { 1 } else { 0 }
    }

    /// The local candidate of the pair.
    pub fn local(&self) -> &Candidate {
        &self.local
    }

    /// The remote candidate of the pair.
    pub fn remote(&self) -> &Candidate {
        &self.remote
    }

    /// The pair priority. Higher priority pairs are probed first.
    pub fn prio(&self) -> u64 {
        self.prio
    }

    /// Pair foundation: the concatenation of the two candidate
    /// foundations.
    pub fn foundation(&self) -> String {
        format!("{}{}", self.local.foundation(), self.remote.foundation())
    }

    /// The component both candidates of this pair serve.
    pub fn component_id(&self) -> u16 {
        self.local.component_id()
    }

    /// Current scheduling state.
    pub fn state(&self) -> CheckState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: CheckState) {
        if self.state != state {
            trace!("Pair state {:?} -> {:?}: {:?}", self.state, state, self);
            self.state = state;
        }
    }

    /// Whether this pair was nominated for media flow.
    pub fn is_nominated(&self) -> bool {
        self.nominated
    }

    pub(crate) fn nominate(&mut self) {
        self.nominated = true;
    }

    /// Whether a successful check confirmed this pair.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_valid(&mut self) {
        self.valid = true;
    }

    /// Whether `other` is the same pair: same local and remote address,
    /// protocol and component.
    pub fn same_pair(&self, other: &CandidatePair) -> bool {
        self.has_addrs(other.local.addr(), other.remote.addr())
            && self.local.proto() == other.local.proto()
            && self.component_id() == other.component_id()
    }

    pub(crate) fn has_addrs(
        &self,
        local: std::net::SocketAddr,
        remote: std::net::SocketAddr,
    ) -> bool {
        self.local.addr() == local && self.remote.addr() == remote
    }

    /// Whether the local candidate is server reflexive and thus must be
    /// substituted with its base before checks run.
    pub(crate) fn needs_base_substitution(&self) -> bool {
        self.local.kind() == CandidateKind::ServerReflexive
    }

    /// A new pair with the local candidate replaced by its base.
    ///
    /// The pair priority is kept: the list was ordered on the original
    /// priorities and re-deriving it here would disturb that order
    /// mid-prune.
    pub(crate) fn with_local_base(&self) -> CandidatePair {
        CandidatePair {
            local: self.local.base_candidate(),
            remote: self.remote.clone(),
            prio: self.prio,
            state: self.state,
            nominated: self.nominated,
            valid: self.valid,
        }
    }
}

/// Pair equality is pair identity: the candidate tuple, not the priority.
impl PartialEq for CandidatePair {
    fn eq(&self, other: &Self) -> bool {
        self.same_pair(other)
    }
}

impl Eq for CandidatePair {}

/// The two transport addresses of the pair, local first.
impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.local.addr(), self.remote.addr())
    }
}

impl fmt::Debug for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pair({} -> {} prio={} state={:?}",
            self.local.addr(),
            self.remote.addr(),
            self.prio,
            self.state
        )?;
        if self.nominated {
            write!(f, " nominated")?;
        }
        if self.valid {
            write!(f, " valid")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::SocketAddr;

    fn sock(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn host(s: &str) -> Candidate {
        Candidate::host(sock(s), 1, "udp").unwrap()
    }

    #[test]
    fn pair_prio_formula() {
        // G=6 D=4: 2^32*4 + 2*6 + 1
        assert_eq!(
            CandidatePair::calculate_prio(true, 4, 6),
            2_u64.pow(32) * 4 + 12 + 1
        );
        // Same inputs, controlled role: G=4 D=6: 2^32*4 + 2*6 + 0
        assert_eq!(
            CandidatePair::calculate_prio(false, 4, 6),
            2_u64.pow(32) * 4 + 12
        );
        // The role-relative tiebreaker separates the two sides' views.
        assert_ne!(
            CandidatePair::calculate_prio(true, 4, 6),
            CandidatePair::calculate_prio(false, 4, 6)
        );
    }

    #[test]
    fn display_shows_addresses() {
        let p = CandidatePair::new(host("1.1.1.1:1000"), host("2.2.2.2:2000"), 10);
        assert_eq!(p.to_string(), "1.1.1.1:1000 -> 2.2.2.2:2000");
    }

    #[test]
    fn identity_ignores_prio() {
        let a = CandidatePair::new(host("1.1.1.1:1000"), host("2.2.2.2:2000"), 10);
        let b = CandidatePair::new(host("1.1.1.1:1000"), host("2.2.2.2:2000"), 99);
        assert_eq!(a, b);
    }

    #[test]
    fn base_substitution_changes_identity() {
        let srflx =
            Candidate::server_reflexive(sock("8.8.8.8:1000"), sock("1.1.1.1:1000"), 1, "udp")
                .unwrap();
        let pair = CandidatePair::new(srflx, host("2.2.2.2:2000"), 10);
        assert!(pair.needs_base_substitution());

        let substituted = pair.with_local_base();
        assert_ne!(pair, substituted);
        assert_eq!(substituted.local().addr(), sock("1.1.1.1:1000"));
        assert_eq!(substituted.prio(), pair.prio());
    }
}

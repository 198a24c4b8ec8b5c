use std::collections::HashSet;
use std::net::SocketAddr;

use crate::pair::{CandidatePair, CheckState};

/// Default limit of candidate pairs for a check list.
///
/// An agent MUST limit the total number of connectivity checks it
/// performs across all check lists (RFC 8445 section 6.1.2.5), as
/// protection against the attacks described in section 19.5.1. The value
/// MUST be configurable; 100 is the recommended default.
pub const DEFAULT_MAX_CHECK_LIST_SIZE: usize = 100;

/// Cross-stream foundation coordination.
///
/// The Frozen/Waiting split spans every check list of the owning agent:
/// a pair starts Waiting only when checks for its foundation are already
/// underway in some other stream. That knowledge lives with the agent,
/// so the check list queries it instead of storing it.
pub trait FreezePolicy {
    /// Whether checks for this foundation are already underway elsewhere.
    fn is_unfrozen(&self, foundation: &str) -> bool;
}

impl<F> FreezePolicy for F
where
    F: Fn(&str) -> bool,
{
    fn is_unfrozen(&self, foundation: &str) -> bool {
        (self)(foundation)
    }
}

/// The ordered, deduplicated, size-capped list of candidate pairs for
/// one stream, and the scheduling logic that walks it.
#[derive(Debug)]
pub struct CheckList {
    /// Stream name, for log correlation only.
    name: String,

    /// Pairs in descending priority order.
    ///
    /// NB it would be nicer to have a BTreeSet, but that makes it
    /// impossible to get mut references to the elements in the list.
    pairs: Vec<CandidatePair>,

    max_size: usize,
}

impl CheckList {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        CheckList {
            name: name.into(),
            pairs: Vec::new(),
            max_size: DEFAULT_MAX_CHECK_LIST_SIZE,
        }
    }

    pub(crate) fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    /// The configured pair cap.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of pairs currently in the list.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the list holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The pairs, highest priority first.
    pub fn pairs(&self) -> &[CandidatePair] {
        &self.pairs
    }

    pub(crate) fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Replace the contents with freshly formed pairs and run the
    /// order / prune / initial-state sequence over them.
    pub(crate) fn init(&mut self, pairs: Vec<CandidatePair>, policy: &dyn FreezePolicy) {
        self.pairs = pairs;
        self.order();
        self.prune();
        self.set_initial_states(policy);
        debug!("Check list initialized ({}): {} pairs", self.name, self.pairs.len());
    }

    /// Orders the pairs in decreasing pair priority.
    ///
    /// `sort_by` is stable: pairs of identical priority keep their
    /// relative order.
    pub fn order(&mut self) {
        self.pairs.sort_by(|a, b| b.prio().cmp(&a.prio()));
    }

    /// Removes, or as per the ICE spec "prunes", pairs we don't need to
    /// run checks for. Must run on an ordered list.
    ///
    /// Checks cannot be sent from a server reflexive address, only from
    /// its base, so every such pair is replaced with a new (base, remote)
    /// pair. If that pair duplicates one higher up the priority order it
    /// is dropped: substitution must never produce two externally
    /// indistinguishable probes. The pass also enforces the size cap on
    /// the pairs that remain after substitution.
    ///
    /// Idempotent: pruning an already pruned list changes nothing.
    pub fn prune(&mut self) {
        let mut kept: Vec<CandidatePair> = Vec::with_capacity(self.pairs.len().min(self.max_size));

        for pair in self.pairs.drain(..) {
            if kept.len() >= self.max_size {
                debug!("Prune pair over max check list size: {:?}", pair);
                continue;
            }

            let pair = if pair.needs_base_substitution() {
                let substituted = pair.with_local_base();
                trace!("Substitute base: {:?} -> {:?}", pair, substituted);
                substituted
            } else {
                pair
            };

            if kept.iter().any(|k| k.same_pair(&pair)) {
                debug!("Prune duplicate pair: {:?}", pair);
                continue;
            }

            kept.push(pair);
        }

        self.pairs = kept;
    }

    /// Sets every pair Waiting or Frozen depending on whether its
    /// foundation is already unfrozen in some other check list.
    pub(crate) fn set_initial_states(&mut self, policy: &dyn FreezePolicy) {
        for p in &mut self.pairs {
            let state = if policy.is_unfrozen(&p.foundation()) {
                CheckState::Waiting
            } else {
                CheckState::Frozen
            };
            p.set_state(state);
        }
    }

    /// Adds a pair discovered after the initial build (a remote
    /// peer-reflexive candidate seen mid-check), keeping priority order.
    ///
    /// Returns `false` if the pair is already present or the list is at
    /// its cap. New pairs start Waiting, ready for a triggered check.
    pub fn add(&mut self, mut pair: CandidatePair) -> bool {
        if self.pairs.iter().any(|p| p.same_pair(&pair)) {
            debug!("Ignore already listed pair: {:?}", pair);
            return false;
        }

        if self.pairs.len() >= self.max_size {
            debug!("Drop pair over max check list size: {:?}", pair);
            return false;
        }

        pair.set_state(CheckState::Waiting);

        let pos = self
            .pairs
            .iter()
            .position(|p| p.prio() < pair.prio())
            .unwrap_or(self.pairs.len());

        debug!("Add pair to check list ({}): {:?}", self.name, pair);
        self.pairs.insert(pos, pair);
        true
    }

    /// The pair with the given local and remote addresses, if listed.
    pub fn find(&self, local: SocketAddr, remote: SocketAddr) -> Option<&CandidatePair> {
        self.pairs.iter().find(|p| p.has_addrs(local, remote))
    }

    fn position(&self, local: SocketAddr, remote: SocketAddr) -> Option<usize> {
        self.pairs.iter().position(|p| p.has_addrs(local, remote))
    }

    /// The next pair to dispatch a connectivity check for.
    ///
    /// Picks the highest priority Waiting pair whose foundation has no
    /// check in flight (one active check per foundation). If nothing is
    /// Waiting, the highest priority Frozen pair of an idle foundation is
    /// promoted so a lone check list cannot stall (RFC 8445 section
    /// 6.1.4.2). The dequeued pair moves to InProgress and unfreezes the
    /// rest of its foundation.
    pub fn next_check(&mut self) -> Option<CandidatePair> {
        let busy: HashSet<String> = self
            .pairs
            .iter()
            .filter(|p| p.state() == CheckState::InProgress)
            .map(|p| p.foundation())
            .collect();

        let pos = self
            .pairs
            .iter()
            .position(|p| p.state() == CheckState::Waiting && !busy.contains(&p.foundation()))
            .or_else(|| {
                self.pairs
                    .iter()
                    .position(|p| p.state() == CheckState::Frozen && !busy.contains(&p.foundation()))
            })?;

        self.pairs[pos].set_state(CheckState::InProgress);
        let pair = self.pairs[pos].clone();

        self.unfreeze_foundation(&pair.foundation());

        trace!("Next check ({}): {:?}", self.name, pair);
        Some(pair)
    }

    /// Records a successful check for the pair with these addresses.
    ///
    /// Returns the succeeded pair (for valid list insertion), or `None`
    /// if no such pair exists or it already reached a terminal state.
    pub fn record_success(
        &mut self,
        local: SocketAddr,
        remote: SocketAddr,
    ) -> Option<CandidatePair> {
        let pos = self.position(local, remote)?;

        if self.pairs[pos].state().is_terminal() {
            debug!("Ignore check result for terminal pair: {:?}", self.pairs[pos]);
            return None;
        }

        self.pairs[pos].set_state(CheckState::Succeeded);
        let pair = self.pairs[pos].clone();

        // A success unblocks the rest of the foundation group.
        self.unfreeze_foundation(&pair.foundation());

        Some(pair)
    }

    /// Records a failed check (error response, timeout exhaustion or
    /// unrecovered role conflict) for the pair with these addresses.
    pub fn record_failure(&mut self, local: SocketAddr, remote: SocketAddr) -> bool {
        let Some(pos) = self.position(local, remote) else {
            return false;
        };

        if self.pairs[pos].state().is_terminal() {
            debug!("Ignore check result for terminal pair: {:?}", self.pairs[pos]);
            return false;
        }

        self.pairs[pos].set_state(CheckState::Failed);
        true
    }

    /// Fails every InProgress pair. Used on stream teardown, when no
    /// outcome will ever be reported for in-flight checks.
    pub(crate) fn fail_in_progress(&mut self) {
        for p in &mut self.pairs {
            if p.state() == CheckState::InProgress {
                p.set_state(CheckState::Failed);
            }
        }
    }

    pub(crate) fn set_nominated(&mut self, local: SocketAddr, remote: SocketAddr) {
        if let Some(pos) = self.position(local, remote) {
            self.pairs[pos].nominate();
        }
    }

    fn unfreeze_foundation(&mut self, foundation: &str) {
        for p in &mut self.pairs {
            if p.state() == CheckState::Frozen && p.foundation() == foundation {
                p.set_state(CheckState::Waiting);
            }
        }
    }
}

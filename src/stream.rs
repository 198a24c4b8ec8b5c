use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::candidate::{Candidate, LocalCandidate};
use crate::check_list::{CheckList, FreezePolicy};
use crate::component::Component;
use crate::pair::CandidatePair;
use crate::valid_list::ValidList;
use crate::IceError;

/// A media stream from the ICE perspective: a collection of components
/// plus the check list and valid list driving its connectivity checks.
///
/// This is the aggregate root the owning agent drives: create components,
/// populate them with candidates, build the check list, drain it through
/// [`IceMediaStream::next_check`] while feeding outcomes back, and poll
/// the completion predicates.
///
/// Workers running checks and the agent's control path touch the stream
/// concurrently, so each shared collection sits behind its own lock
/// (components, check list, valid list). The locks are never held two at
/// a time, and every accessor returns an owned snapshot rather than a
/// live view.
#[derive(Debug)]
pub struct IceMediaStream {
    /// The name of this media stream, equal to the value in the SDP
    /// description.
    name: String,

    /// Whether the owning agent is in the controlling role. Feeds the
    /// pair priority formula.
    controlling: AtomicBool,

    components: Mutex<ComponentMap>,
    check_list: Mutex<CheckList>,
    valid_list: Mutex<ValidList>,
}

#[derive(Debug)]
struct ComponentMap {
    /// The id last assigned to a component.
    last_id: u16,
    /// Components by id; BTreeMap iteration follows the sequential ids,
    /// i.e. insertion order.
    map: BTreeMap<u16, Component>,
}

/// One-line progress summary, suitable for log correlation.
impl fmt::Display for IceMediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components = self.component_count();
        let checks = lock(&self.check_list).len();
        let valid = lock(&self.valid_list).len();

        write!(
            f,
            "media stream {} components={} checks={} valid={}",
            self.name, components, checks, valid
        )
    }
}

/// Poison recovery: a panicked worker must not wedge the whole stream.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl IceMediaStream {
    /// Creates a stream with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        IceMediaStream {
            check_list: Mutex::new(CheckList::new(name.clone())),
            valid_list: Mutex::new(ValidList::new()),
            components: Mutex::new(ComponentMap {
                last_id: 0,
                map: BTreeMap::new(),
            }),
            controlling: AtomicBool::new(false),
            name,
        }
    }

    /// The name of this media stream.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set whether the owning agent is the controlling side.
    ///
    /// Must be decided before [`IceMediaStream::init_check_list`], since
    /// pair priorities are computed from the role.
    pub fn set_controlling(&self, v: bool) {
        self.controlling.store(v, Ordering::Relaxed);
    }

    /// Whether this side is controlling or controlled.
    pub fn controlling(&self) -> bool {
        self.controlling.load(Ordering::Relaxed)
    }

    /// Caps the number of pairs kept after pruning.
    ///
    /// The cap MUST be configurable per RFC 8445 section 6.1.2.5; the
    /// agent sets it before the check list is built.
    pub fn set_max_check_list_size(&self, max: usize) {
        lock(&self.check_list).set_max_size(max);
    }

    /// Creates and adds a component to this stream, returning its id.
    ///
    /// Ids are assigned sequentially starting at 1.
    pub fn create_component(&self) -> u16 {
        let mut components = lock(&self.components);
        components.last_id += 1;
        let id = components.last_id;
        components.map.insert(id, Component::new(id));
        debug!("Create component {} in stream {}", id, self.name);
        id
    }

    /// Removes a component and frees all its candidate resources.
    pub fn remove_component(&self, id: u16) -> bool {
        let mut components = lock(&self.components);
        match components.map.remove(&id) {
            Some(mut cmp) => {
                cmp.free();
                true
            }
            None => false,
        }
    }

    /// The ids of all components, in creation order.
    pub fn component_ids(&self) -> Vec<u16> {
        lock(&self.components).map.keys().copied().collect()
    }

    /// Number of components in this stream.
    pub fn component_count(&self) -> usize {
        lock(&self.components).map.len()
    }

    /// Registers a locally gathered candidate with a component.
    ///
    /// Returns whether the candidate was kept (`false` means it was
    /// redundant) or an error if the component does not exist.
    pub fn add_local_candidate(
        &self,
        component_id: u16,
        lc: LocalCandidate,
    ) -> Result<bool, IceError> {
        let mut components = lock(&self.components);
        let cmp = components
            .map
            .get_mut(&component_id)
            .ok_or(IceError::NoSuchComponent(component_id))?;
        Ok(cmp.add_local(lc))
    }

    /// Registers a candidate learned from the peer with a component.
    pub fn add_remote_candidate(&self, component_id: u16, c: Candidate) -> Result<bool, IceError> {
        let mut components = lock(&self.components);
        let cmp = components
            .map
            .get_mut(&component_id)
            .ok_or(IceError::NoSuchComponent(component_id))?;
        Ok(cmp.add_remote(c))
    }

    /// The local candidate with this address, searching every component.
    pub fn find_local_candidate(&self, addr: SocketAddr) -> Option<Candidate> {
        let components = lock(&self.components);
        components
            .map
            .values()
            .find_map(|cmp| cmp.find_local_candidate(addr).cloned())
    }

    /// The remote candidate with this address, searching every component.
    pub fn find_remote_candidate(&self, addr: SocketAddr) -> Option<Candidate> {
        let components = lock(&self.components);
        components
            .map
            .values()
            .find_map(|cmp| cmp.find_remote_candidate(addr).cloned())
    }

    /// Number of local host candidates across all components.
    pub fn count_host_candidates(&self) -> usize {
        let components = lock(&self.components);
        components.map.values().map(|c| c.count_host_candidates()).sum()
    }

    /// Creates, orders and prunes the list of candidate pairs to be used
    /// in the connectivity checks for all components of this stream.
    ///
    /// Every local candidate is paired with every remote candidate of the
    /// *same* component where [`Candidate::can_reach`] holds: an
    /// exhaustive cross product, since the pruning pass depends on seeing
    /// all combinations. Initial Frozen/Waiting states come from the
    /// agent's `policy`.
    pub fn init_check_list(&self, policy: &dyn FreezePolicy) {
        let controlling = self.controlling();

        // Form the pairs into an owned list so the component lock is
        // released before the check list lock is taken.
        let mut pairs = Vec::new();
        {
            let components = lock(&self.components);
            for cmp in components.map.values() {
                let locals = cmp.local_candidates();
                let remotes = cmp.remote_candidates();

                for local in &locals {
                    for remote in &remotes {
                        if !local.can_reach(remote) {
                            trace!("Skip unreachable pairing: {:?} / {:?}", local, remote);
                            continue;
                        }

                        let prio = CandidatePair::calculate_prio(
                            controlling,
                            remote.prio(),
                            local.prio(),
                        );
                        pairs.push(CandidatePair::new(local.clone(), remote.clone(), prio));
                    }
                }
            }
        }

        let mut check_list = lock(&self.check_list);
        check_list.init(pairs, policy);
        info!(
            "Check list initialized for stream {}: {} pairs",
            self.name,
            check_list.len()
        );
    }

    /// Snapshot of the check list pairs, highest priority first.
    pub fn pairs(&self) -> Vec<CandidatePair> {
        lock(&self.check_list).pairs().to_vec()
    }

    /// The pair with these local and remote addresses, if the check list
    /// contains it.
    pub fn find_pair(&self, local: SocketAddr, remote: SocketAddr) -> Option<CandidatePair> {
        lock(&self.check_list).find(local, remote).cloned()
    }

    /// The next pair the transaction layer should dispatch a check for.
    ///
    /// The returned pair has already been moved to InProgress.
    pub fn next_check(&self) -> Option<CandidatePair> {
        lock(&self.check_list).next_check()
    }

    /// Adds a pair to the check list during the connectivity check phase,
    /// when new pairs with remote peer-reflexive candidates are
    /// discovered.
    ///
    /// Pairings the local candidate cannot reach are silently refused.
    pub fn add_to_check_list(&self, pair: CandidatePair) -> bool {
        if !pair.local().can_reach(pair.remote()) {
            debug!("Refuse unreachable pair: {:?}", pair);
            return false;
        }
        if pair.local().component_id() != pair.remote().component_id() {
            debug!("Refuse cross-component pair: {:?}", pair);
            return false;
        }

        lock(&self.check_list).add(pair)
    }

    /// Reports a successful connectivity check for the pair with these
    /// addresses. The pair becomes Succeeded and joins the valid list.
    pub fn check_succeeded(&self, local: SocketAddr, remote: SocketAddr) -> bool {
        let pair = { lock(&self.check_list).record_success(local, remote) };

        match pair {
            Some(pair) => {
                self.add_valid_pair(pair);
                true
            }
            None => false,
        }
    }

    /// Reports a failed connectivity check for the pair with these
    /// addresses.
    pub fn check_failed(&self, local: SocketAddr, remote: SocketAddr) -> bool {
        lock(&self.check_list).record_failure(local, remote)
    }

    /// Adds a pair to the valid list this stream is maintaining.
    ///
    /// Idempotent by pair identity: re-adding an already present pair
    /// leaves the list unchanged and returns `false`.
    pub fn add_valid_pair(&self, pair: CandidatePair) -> bool {
        lock(&self.valid_list).add(pair)
    }

    /// Snapshot of the valid list, highest priority first.
    pub fn valid_pairs(&self) -> Vec<CandidatePair> {
        lock(&self.valid_list).pairs().to_vec()
    }

    /// Whether the valid list contains a pair with this foundation.
    ///
    /// A positive answer lets the agent skip checks that would only
    /// reconfirm connectivity the foundation group already proved.
    pub fn valid_list_contains_foundation(&self, foundation: &str) -> bool {
        lock(&self.valid_list).contains_foundation(foundation)
    }

    /// The first valid pair belonging to this component, if any.
    pub fn get_valid_pair(&self, component_id: u16) -> Option<CandidatePair> {
        lock(&self.valid_list).pair_for_component(component_id).cloned()
    }

    /// Whether the valid list contains at least one pair for each
    /// component of the stream.
    pub fn valid_list_contains_all_components(&self) -> bool {
        let ids = self.component_ids();

        let valid_list = lock(&self.valid_list);
        ids.iter()
            .all(|id| valid_list.pair_for_component(*id).is_some())
    }

    /// Whether there is at least one nominated pair in the valid list
    /// for every component of this stream.
    ///
    /// This is the stream level completion predicate the agent polls.
    pub fn all_components_are_nominated(&self) -> bool {
        // Working copy of the component ids; every nominated valid pair
        // strikes its component off.
        let mut remaining = self.component_ids();

        {
            let valid_list = lock(&self.valid_list);
            for pair in valid_list.pairs() {
                if pair.is_nominated() {
                    remaining.retain(|id| *id != pair.component_id());
                }
            }
        }

        remaining.is_empty()
    }

    /// Nominates the valid pair with these addresses for media flow.
    ///
    /// Returns `false` if no such pair has been validated. The flag is
    /// mirrored onto the check list entry when one exists.
    pub fn nominate(&self, local: SocketAddr, remote: SocketAddr) -> bool {
        let ok = { lock(&self.valid_list).nominate(local, remote) };

        if ok {
            lock(&self.check_list).set_nominated(local, remote);
            info!("Nominated pair {} -> {} in stream {}", local, remote, self.name);
        }

        ok
    }

    /// Removes this stream's components and candidates and releases the
    /// resources they had allocated (like sockets).
    ///
    /// In-flight checks are failed, since no outcome can be delivered for
    /// them anymore. Idempotent.
    pub fn free(&self) {
        info!("Free media stream: {}", self.name);

        {
            let mut check_list = lock(&self.check_list);
            check_list.fail_in_progress();
            check_list.clear();
        }

        lock(&self.valid_list).clear();

        let mut components = lock(&self.components);
        for cmp in components.map.values_mut() {
            cmp.free();
        }
        components.map.clear();
    }
}

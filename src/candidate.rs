use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::net::Protocol;
use crate::IceError;

/// ICE candidates are network addresses used to connect to a peer.
///
/// There are different kinds of ICE candidates. The simplest kind is a
/// host candidate which is a socket address on a local (host) network
/// interface.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    /// An arbitrary string used in the freezing algorithm to
    /// group similar candidates.
    ///
    /// It is the same for two candidates that have the same type, base IP
    /// address, protocol (UDP, TCP, etc.), and STUN or TURN server. If any
    /// of these are different, then the foundation will be different.
    ///
    /// For remote, this is communicated, and locally it's calculated.
    foundation: Option<String>, // 1-32 "ice chars", ALPHA / DIGIT / "+" / "/"

    /// A component is a piece of a data stream.
    ///
    /// A data stream may require multiple components, each of which has to
    /// work in order for the data stream as a whole to work. For RTP/RTCP
    /// data streams, unless RTP and RTCP are multiplexed in the same port,
    /// there are two components per data stream -- one for RTP, and one
    /// for RTCP.
    component_id: u16, // 1 for RTP, 2 for RTCP

    /// Protocol for the candidate.
    proto: Protocol,

    /// Priority.
    ///
    /// For remote, this is communicated, and locally it's (mostly)
    /// calculated. For peer reflexive it is set.
    prio: Option<u32>, // 1-10 digits

    /// The actual address to use. This might be a host address, server
    /// reflex, relay etc.
    addr: SocketAddr, // ip/port

    /// The base address
    ///
    /// "Base" refers to the address an agent sends from for a
    /// particular candidate. Thus, as a degenerate case, host candidates
    /// also have a base, but it's the same as the host candidate.
    ///
    /// * host - same as `addr`, i.e the local interface address
    /// * peer/server reflexive - the local interface address
    /// * relay - same as `addr`, the allocation on the TURN server
    ///
    /// Kept as an address, never as an owning reference, so derived
    /// candidates cannot form ownership cycles with their base.
    base: Option<SocketAddr>, // the "base" used for local candidates.

    /// Type of candidate.
    kind: CandidateKind, // host/srflx/prflx/relay

    /// Related address.
    ///
    /// For server-reflexive candidates, this is the internal IP/port the
    /// candidate corresponds to (the one behind the NAT, usually). For
    /// relay candidates, this is the mapped address selected by the TURN
    /// server.
    raddr: Option<SocketAddr>, // ip/port

    /// The component might assign a local preference if we have multiple
    /// candidates that are the same type.
    local_preference: Option<u32>,
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate({}={}/{}", self.kind, self.addr, self.proto)?;
        if let Some(base) = self.base {
            if base != self.addr {
                write!(f, " base={base}")?;
            }
        }
        if let Some(raddr) = self.raddr {
            write!(f, " raddr={raddr}")?;
        }
        write!(f, " comp={} prio={})", self.component_id, self.prio())
    }
}

impl Candidate {
    #[allow(clippy::too_many_arguments)]
    fn new(
        foundation: Option<String>,
        component_id: u16,
        proto: Protocol,
        prio: Option<u32>,
        addr: SocketAddr,
        base: Option<SocketAddr>,
        kind: CandidateKind,
        raddr: Option<SocketAddr>,
    ) -> Self {
        Candidate {
            foundation,
            component_id,
            proto,
            prio,
            addr,
            base,
            kind,
            raddr,
            local_preference: None,
        }
    }

    /// Creates a host ICE candidate.
    ///
    /// Host candidates are local sockets directly on the host.
    pub fn host(
        addr: SocketAddr,
        component_id: u16,
        proto: impl TryInto<Protocol>,
    ) -> Result<Self, IceError> {
        if !is_valid_ip(addr.ip()) {
            return Err(IceError::BadCandidate(format!("invalid ip {}", addr.ip())));
        }
        check_component_id(component_id)?;

        Ok(Candidate::new(
            None,
            component_id,
            parse_proto(proto)?,
            None,
            addr,
            Some(addr),
            CandidateKind::Host,
            None,
        ))
    }

    /// Creates a server reflexive ICE candidate.
    ///
    /// Server reflexive candidates are local sockets mapped to external ip
    /// discovered via a STUN binding request.
    /// The `base` is the local interface that this address corresponds to.
    pub fn server_reflexive(
        addr: SocketAddr,
        base: SocketAddr,
        component_id: u16,
        proto: impl TryInto<Protocol>,
    ) -> Result<Self, IceError> {
        if !is_valid_ip(addr.ip()) {
            return Err(IceError::BadCandidate(format!("invalid ip {}", addr.ip())));
        }

        if addr.is_ipv4() != base.is_ipv4() {
            return Err(IceError::BadCandidate(
                "addr and base are different IP versions".to_owned(),
            ));
        }
        check_component_id(component_id)?;

        Ok(Candidate::new(
            None,
            component_id,
            parse_proto(proto)?,
            None,
            addr,
            Some(base),
            CandidateKind::ServerReflexive,
            Some(addr),
        ))
    }

    /// Creates a relayed ICE candidate.
    ///
    /// Relayed candidates are server sockets relaying traffic to a local
    /// socket. `addr` is the TURN server's allocated address that will be
    /// used for communication with the peer.
    pub fn relayed(
        addr: SocketAddr,
        component_id: u16,
        proto: impl TryInto<Protocol>,
    ) -> Result<Self, IceError> {
        if !is_valid_ip(addr.ip()) {
            return Err(IceError::BadCandidate(format!("invalid ip {}", addr.ip())));
        }
        check_component_id(component_id)?;

        Ok(Candidate::new(
            None,
            component_id,
            parse_proto(proto)?,
            None,
            addr,
            Some(addr),
            CandidateKind::Relayed,
            Some(addr),
        ))
    }

    /// Creates a peer reflexive ICE candidate.
    ///
    /// Peer reflexive candidates are NAT:ed addresses discovered via STUN
    /// binding responses. `addr` is the discovered address. `base` is the
    /// local (host) address inside the NAT we used to get this response.
    pub fn peer_reflexive(
        addr: SocketAddr,
        base: SocketAddr,
        component_id: u16,
        proto: impl TryInto<Protocol>,
        prio: u32,
        foundation: Option<String>,
    ) -> Result<Self, IceError> {
        if addr.is_ipv4() != base.is_ipv4() {
            return Err(IceError::BadCandidate(
                "addr and base are different IP versions".to_owned(),
            ));
        }
        check_component_id(component_id)?;

        Ok(Candidate::new(
            foundation,
            component_id,
            parse_proto(proto)?,
            Some(prio),
            addr,
            Some(base),
            CandidateKind::PeerReflexive,
            None,
        ))
    }

    /// Creates a remote candidate learned from the peer.
    ///
    /// Remote candidates are address-only: the foundation and priority are
    /// whatever the peer communicated, and there is no base.
    pub fn remote(
        addr: SocketAddr,
        component_id: u16,
        proto: impl TryInto<Protocol>,
        kind: CandidateKind,
        foundation: String,
        prio: u32,
    ) -> Result<Self, IceError> {
        if !is_valid_ip(addr.ip()) {
            return Err(IceError::BadCandidate(format!("invalid ip {}", addr.ip())));
        }
        check_component_id(component_id)?;

        Ok(Candidate::new(
            Some(foundation),
            component_id,
            parse_proto(proto)?,
            Some(prio),
            addr,
            None,
            kind,
            None,
        ))
    }

    /// Candidate foundation.
    ///
    /// For local candidates this is calculated.
    pub fn foundation(&self) -> String {
        if let Some(v) = &self.foundation {
            return v.clone();
        }

        // Two candidates have the same foundation when all of the
        // following are true:
        let mut hasher = DefaultHasher::new();

        //  o  They have the same type (host, relayed, server reflexive, or peer
        //     reflexive).
        self.kind.hash(&mut hasher);

        //  o  Their bases have the same IP address (the ports can be different).
        self.base().ip().hash(&mut hasher);

        //  o  For reflexive and relayed candidates, the STUN or TURN servers
        //     used to obtain them have the same IP address (the IP address used
        //     by the agent to contact the STUN or TURN server).
        if let Some(raddr) = self.raddr {
            raddr.ip().hash(&mut hasher);
        }

        //  o  They were obtained using the same transport protocol (TCP, UDP).
        self.proto.hash(&mut hasher);

        let hash = hasher.finish();

        format!("{hash:x}")
    }

    /// Returns the priority value for this ICE candidate.
    ///
    /// The priority is a positive integer between 1 and 2^31 - 1
    /// (inclusive), calculated according to RFC 8445, Section 5.1.2,
    /// unless communicated by the peer.
    pub fn prio(&self) -> u32 {
        // Remote candidates have their prio calculated on their side.
        if let Some(prio) = &self.prio {
            return *prio;
        }

        // Per RFC 8445 Sec. 5.1.2.2, the RECOMMENDED values for type preferences are
        // 126 for host candidates, 110 for peer-reflexive candidates, 100 for
        // server-reflexive candidates, and 0 for relayed candidates. The variations
        // for non-UDP protocols are taken from libwebrtc:
        // <https://webrtc.googlesource.com/src/+/refs/heads/main/p2p/base/port.h#68>
        let type_preference = match (self.kind, self.proto) {
            (CandidateKind::Host, Protocol::Udp) => 126,
            (CandidateKind::PeerReflexive, Protocol::Udp) => 110,
            (CandidateKind::ServerReflexive, _) => 100,
            (CandidateKind::Host, _) => 90,
            (CandidateKind::PeerReflexive, _) => 80,
            (CandidateKind::Relayed, Protocol::Udp) => 2,
            (CandidateKind::Relayed, Protocol::Tcp) => 1,
            (CandidateKind::Relayed, _) => 0,
        };

        // The recommended formula combines a preference for the candidate type
        // (server reflexive, peer reflexive, relayed, and host), a preference
        // for the IP address for which the candidate was obtained, and a
        // component ID using the following formula:
        //
        // priority = (2^24)*(type preference) +
        //     (2^8)*(local preference) +
        //     (2^0)*(256 - component ID)
        let prio = type_preference << 24
            | self.local_preference() << 8
            | (256 - self.component_id as u32);

        // https://datatracker.ietf.org/doc/html/rfc8445#section-5.1.2
        // MUST be a positive integer between 1 and (2**31 - 1)
        assert!(prio >= 1 && prio < 2_u32.pow(31));

        prio
    }

    pub(crate) fn local_preference(&self) -> u32 {
        self.local_preference
            .unwrap_or_else(|| if self.addr.is_ipv6() { 65_535 } else { 65_534 })
    }

    pub(crate) fn set_local_preference(&mut self, v: u32) {
        self.local_preference = Some(v);
    }

    /// The component this candidate serves (1 for RTP, 2 for RTCP).
    pub fn component_id(&self) -> u16 {
        self.component_id
    }

    /// Returns the address for this ICE candidate.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The transport protocol of this candidate.
    pub fn proto(&self) -> Protocol {
        self.proto
    }

    /// The base address, i.e. the address the agent sends from for this
    /// candidate. For host candidates this is the address itself.
    pub fn base(&self) -> SocketAddr {
        self.base.unwrap_or(self.addr)
    }

    /// The related address, if any.
    pub fn raddr(&self) -> Option<SocketAddr> {
        self.raddr
    }

    /// Returns the kind of this candidate.
    pub fn kind(&self) -> CandidateKind {
        self.kind
    }

    /// Whether a check from this (local) candidate can reach the remote
    /// candidate at all.
    ///
    /// Pairs failing this test are silently excluded from the check list,
    /// they are not an error.
    pub fn can_reach(&self, remote: &Candidate) -> bool {
        self.proto == remote.proto && self.addr.is_ipv4() == remote.addr.is_ipv4()
    }

    /// The host candidate at this candidate's base address.
    ///
    /// Used by check list pruning: checks cannot be sent from a server
    /// reflexive address, only from its base.
    pub(crate) fn base_candidate(&self) -> Candidate {
        let base = self.base();
        Candidate::new(
            None,
            self.component_id,
            self.proto,
            None,
            base,
            Some(base),
            CandidateKind::Host,
            None,
        )
    }
}

/// Type of candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    /// Host (local network interface)
    Host,
    /// Prflx (Peer reflexive)
    #[serde(rename = "prflx")]
    PeerReflexive,
    /// Srflx (STUN)
    #[serde(rename = "srflx")]
    ServerReflexive,
    /// Relay (TURN)
    #[serde(rename = "relay")]
    Relayed,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = match self {
            CandidateKind::Host => "host",
            CandidateKind::PeerReflexive => "prflx",
            CandidateKind::ServerReflexive => "srflx",
            CandidateKind::Relayed => "relay",
        };
        write!(f, "{x}")
    }
}

fn parse_proto(proto: impl TryInto<Protocol>) -> Result<Protocol, IceError> {
    proto
        .try_into()
        .map_err(|_| IceError::BadCandidate("invalid protocol".into()))
}

// https://datatracker.ietf.org/doc/html/rfc8445#section-4
// The component ID MUST be an integer between 1 and 256 inclusive. The
// priority formula also relies on this range (it folds `256 - id` into
// the lowest octet).
fn check_component_id(component_id: u16) -> Result<(), IceError> {
    if (1..=256).contains(&component_id) {
        Ok(())
    } else {
        Err(IceError::BadCandidate(format!(
            "component id out of range: {component_id}"
        )))
    }
}

fn is_valid_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v) => {
            !v.is_link_local() && !v.is_broadcast() && !v.is_multicast() && !v.is_unspecified()
        }
        IpAddr::V6(v) => !v.is_multicast() && !v.is_unspecified(),
    }
}

/// The candidate-attribute form, as it would appear in an SDP line.
impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation(),
            self.component_id,
            self.proto,
            self.prio(),
            self.addr.ip(),
            self.addr.port(),
            self.kind
        )?;
        if let Some(raddr) = self.raddr {
            write!(f, " raddr {} rport {}", raddr.ip(), raddr.port())?;
        }
        Ok(())
    }
}

/// Serialize [Candidate] with the foundation and priority made concrete,
/// so the receiving side can treat them as communicated values.
impl Serialize for Candidate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut o = serializer.serialize_struct("Candidate", 6)?;
        o.serialize_field("foundation", &self.foundation())?;
        o.serialize_field("component", &self.component_id)?;
        o.serialize_field("proto", &self.proto)?;
        o.serialize_field("prio", &self.prio())?;
        o.serialize_field("addr", &self.addr)?;
        o.serialize_field("kind", &self.kind)?;
        o.end()
    }
}

/// Deserialize [Candidate] as a remote (address-only) candidate.
impl<'de> Deserialize<'de> for Candidate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CandidateInfo {
            foundation: String,
            component: u16,
            proto: Protocol,
            prio: u32,
            addr: SocketAddr,
            kind: CandidateKind,
        }

        let info = CandidateInfo::deserialize(deserializer)?;

        Candidate::remote(
            info.addr,
            info.component,
            info.proto,
            info.kind,
            info.foundation,
            info.prio,
        )
        .map_err(serde::de::Error::custom)
    }
}

/// A locally gathered candidate, together with the transport handle the
/// gathering subsystem opened for it.
pub struct LocalCandidate {
    candidate: Candidate,
    socket: Option<Box<dyn CandidateSocket>>,
}

/// Transport resource behind a local candidate.
///
/// This is the narrow seam towards the gathering subsystem: the engine
/// never reads or writes through the socket, it only closes it on
/// teardown.
pub trait CandidateSocket: Send {
    /// Release the underlying transport resource.
    fn close(&mut self);
}

impl LocalCandidate {
    /// A local candidate backed by a transport handle.
    pub fn new(candidate: Candidate, socket: Box<dyn CandidateSocket>) -> Self {
        LocalCandidate {
            candidate,
            socket: Some(socket),
        }
    }

    /// A local candidate without a transport handle.
    ///
    /// Useful when socket lifecycle is managed entirely outside the
    /// engine.
    pub fn without_socket(candidate: Candidate) -> Self {
        LocalCandidate {
            candidate,
            socket: None,
        }
    }

    /// The candidate descriptor.
    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub(crate) fn candidate_mut(&mut self) -> &mut Candidate {
        &mut self.candidate
    }

    /// Close the transport resource. Exactly once, no matter how many
    /// times this is called.
    pub(crate) fn free(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            trace!("Close transport for local candidate: {:?}", self.candidate);
            socket.close();
        }
    }
}

impl fmt::Debug for LocalCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Local{:?}{}",
            self.candidate,
            if self.socket.is_some() { "+socket" } else { "" }
        )
    }
}

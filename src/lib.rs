#![allow(clippy::new_without_default)]

//! Sans I/O core for ICE (Interactive Connectivity Establishment)
//! connectivity checks.
//!
//! This crate implements the pairing, scheduling and validation engine of
//! an ICE agent: given locally gathered candidates and candidates learned
//! from the remote peer, it builds the per-stream check list (pair, order,
//! prune), walks it under the frozen/waiting state machine, accumulates
//! the valid list, and answers the stream completion questions
//! ([`IceMediaStream::valid_list_contains_all_components`] and
//! [`IceMediaStream::all_components_are_nominated`]).
//!
//! It deliberately does *no* network talking. Candidate gathering, STUN
//! encoding, retransmission and SDP are collaborators:
//!
//! * The gathering subsystem hands the stream [`LocalCandidate`]s (with
//!   their transport handle) and remote [`Candidate`]s.
//! * The transaction layer polls [`IceMediaStream::next_check`] for the
//!   next pair to probe and reports the outcome back via
//!   [`IceMediaStream::check_succeeded`] / [`IceMediaStream::check_failed`].
//! * The owning agent answers the cross-stream freezing question through
//!   the [`FreezePolicy`] trait and polls the completion predicates.
//!
//! ```
//! use ice_checks::{Candidate, IceMediaStream, LocalCandidate};
//!
//! let stream = IceMediaStream::new("audio");
//! stream.set_controlling(true);
//! let rtp = stream.create_component();
//!
//! let host = Candidate::host("10.0.0.17:5000".parse().unwrap(), rtp, "udp").unwrap();
//! stream.add_local_candidate(rtp, LocalCandidate::without_socket(host)).unwrap();
//!
//! let remote = Candidate::remote(
//!     "93.184.216.34:6000".parse().unwrap(),
//!     rtp,
//!     "udp",
//!     ice_checks::CandidateKind::Host,
//!     "f1".into(),
//!     2_130_706_175,
//! ).unwrap();
//! stream.add_remote_candidate(rtp, remote).unwrap();
//!
//! // No other stream has unfrozen anything yet.
//! stream.init_check_list(&|_: &str| false);
//!
//! let check = stream.next_check().unwrap();
//! stream.check_succeeded(check.local().addr(), check.remote().addr());
//! assert!(stream.valid_list_contains_all_components());
//! ```

#[macro_use]
extern crate tracing;

use thiserror::Error;

mod candidate;
pub use candidate::{Candidate, CandidateKind, CandidateSocket, LocalCandidate};

mod net;
pub use net::Protocol;

mod pair;
pub use pair::{CandidatePair, CheckState};

mod check_list;
pub use check_list::{CheckList, FreezePolicy, DEFAULT_MAX_CHECK_LIST_SIZE};

mod valid_list;
pub use valid_list::ValidList;

mod component;
pub use component::Component;

mod stream;
pub use stream::IceMediaStream;

/// Errors from the ICE check engine.
///
/// The error surface is deliberately narrow: lookup misses are `Option`,
/// capacity overruns are silent drops (the cap is a security control),
/// and unreachable pairings are excluded rather than rejected.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum IceError {
    #[error("ICE bad candidate: {0}")]
    BadCandidate(String),

    #[error("ICE no such component: {0}")]
    NoSuchComponent(u16),
}

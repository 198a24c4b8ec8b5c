#![allow(unused)]
use std::net::SocketAddr;
use std::sync::Once;

use ice_checks::{Candidate, CandidateKind, LocalCandidate};

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

pub fn sock(s: impl Into<String>) -> SocketAddr {
    let s: String = s.into();
    s.parse().unwrap()
}

pub fn host(s: impl Into<String>, component: u16) -> LocalCandidate {
    LocalCandidate::without_socket(Candidate::host(sock(s), component, "udp").unwrap())
}

pub fn srflx(addr: impl Into<String>, base: impl Into<String>, component: u16) -> LocalCandidate {
    LocalCandidate::without_socket(
        Candidate::server_reflexive(sock(addr), sock(base), component, "udp").unwrap(),
    )
}

pub fn remote_host(s: impl Into<String>, component: u16, foundation: &str) -> Candidate {
    Candidate::remote(
        sock(s),
        component,
        "udp",
        CandidateKind::Host,
        foundation.into(),
        2_130_706_175,
    )
    .unwrap()
}

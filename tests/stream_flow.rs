use common::{host, init_log, remote_host, sock, srflx};
use ice_checks::{Candidate, CandidateKind, CandidatePair, CheckState, IceMediaStream};

mod common;

#[test]
pub fn srflx_pairs_collapse_into_base() {
    init_log();

    let stream = IceMediaStream::new("audio");
    stream.set_controlling(true);
    let rtp = stream.create_component();

    stream
        .add_local_candidate(rtp, host("10.0.0.17:5000", rtp))
        .unwrap();
    stream
        .add_local_candidate(rtp, srflx("83.209.13.2:15000", "10.0.0.17:5000", rtp))
        .unwrap();
    stream
        .add_remote_candidate(rtp, remote_host("93.184.216.34:6000", rtp, "f1"))
        .unwrap();

    stream.init_check_list(&|_: &str| false);

    // Two pairings formed, but the srflx pair substitutes down to the
    // same (base, remote) probe as the host pair and is pruned.
    let pairs = stream.pairs();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].local().addr(), sock("10.0.0.17:5000"));
}

#[test]
pub fn cap_keeps_highest_priority_pairs() {
    init_log();

    let stream = IceMediaStream::new("audio");
    stream.set_controlling(true);
    stream.set_max_check_list_size(2);
    let rtp = stream.create_component();

    // Three local hosts on distinct IPs give three distinct foundations.
    for ip in ["10.0.0.17:5000", "10.0.0.18:5000", "10.0.0.19:5000"] {
        stream.add_local_candidate(rtp, host(ip, rtp)).unwrap();
    }
    stream
        .add_remote_candidate(rtp, remote_host("93.184.216.34:6000", rtp, "f1"))
        .unwrap();

    stream.init_check_list(&|_: &str| false);

    let pairs = stream.pairs();
    assert_eq!(pairs.len(), 2);
    assert!(pairs[0].prio() >= pairs[1].prio());
}

#[test]
pub fn full_check_cycle_to_nomination() {
    init_log();

    let stream = IceMediaStream::new("av");
    stream.set_controlling(true);
    let rtp = stream.create_component();
    let rtcp = stream.create_component();

    for (id, l, r) in [
        (rtp, "10.0.0.17:5000", "93.184.216.34:6000"),
        (rtcp, "10.0.0.17:5001", "93.184.216.34:6001"),
    ] {
        stream.add_local_candidate(id, host(l, id)).unwrap();
        stream
            .add_remote_candidate(id, remote_host(r, id, "f1"))
            .unwrap();
    }

    stream.init_check_list(&|_: &str| false);
    assert_eq!(stream.pairs().len(), 2);

    // Drain the check list, reporting every probe successful.
    let mut checked = Vec::new();
    while let Some(check) = stream.next_check() {
        assert_eq!(check.state(), CheckState::InProgress);
        assert!(stream.check_succeeded(check.local().addr(), check.remote().addr()));
        checked.push(check);
    }
    assert_eq!(checked.len(), 2);

    // Both components reachable, nothing nominated yet.
    assert!(stream.valid_list_contains_all_components());
    assert!(!stream.all_components_are_nominated());

    // Nominating only the RTP pair is not enough.
    let p = stream.get_valid_pair(rtp).unwrap();
    assert!(stream.nominate(p.local().addr(), p.remote().addr()));
    assert!(!stream.all_components_are_nominated());

    let p = stream.get_valid_pair(rtcp).unwrap();
    assert!(stream.nominate(p.local().addr(), p.remote().addr()));
    assert!(stream.all_components_are_nominated());

    // A peer reflexive discovery after completion adds another valid but
    // un-nominated pair. The predicate must not flip back.
    let local = stream.find_local_candidate(sock("10.0.0.17:5000")).unwrap();
    let prflx = Candidate::remote(
        sock("198.51.100.7:7000"),
        rtp,
        "udp",
        CandidateKind::PeerReflexive,
        "pf1".into(),
        1_860_000_000,
    )
    .unwrap();
    let prio = CandidatePair::calculate_prio(true, prflx.prio(), local.prio());
    assert!(stream.add_to_check_list(CandidatePair::new(local, prflx, prio)));

    let check = stream.next_check().unwrap();
    assert!(stream.check_succeeded(check.local().addr(), check.remote().addr()));

    assert_eq!(stream.valid_pairs().len(), 3);
    assert!(stream.all_components_are_nominated());
    assert!(stream.valid_list_contains_all_components());
}

#[test]
pub fn failed_component_never_completes() {
    init_log();

    let stream = IceMediaStream::new("av");
    stream.set_controlling(true);
    let rtp = stream.create_component();
    let rtcp = stream.create_component();

    for (id, l, r) in [
        (rtp, "10.0.0.17:5000", "93.184.216.34:6000"),
        (rtcp, "10.0.0.17:5001", "93.184.216.34:6001"),
    ] {
        stream.add_local_candidate(id, host(l, id)).unwrap();
        stream
            .add_remote_candidate(id, remote_host(r, id, "f1"))
            .unwrap();
    }

    stream.init_check_list(&|_: &str| false);

    while let Some(check) = stream.next_check() {
        if check.component_id() == rtp {
            stream.check_succeeded(check.local().addr(), check.remote().addr());
        } else {
            stream.check_failed(check.local().addr(), check.remote().addr());
        }
    }

    assert!(stream.get_valid_pair(rtp).is_some());
    assert!(stream.get_valid_pair(rtcp).is_none());
    assert!(!stream.valid_list_contains_all_components());
    assert!(!stream.all_components_are_nominated());
}

#[test]
pub fn freeze_policy_drives_initial_states() {
    init_log();

    let stream = IceMediaStream::new("audio");
    stream.set_controlling(true);
    let rtp = stream.create_component();

    stream
        .add_local_candidate(rtp, host("10.0.0.17:5000", rtp))
        .unwrap();
    stream
        .add_local_candidate(rtp, host("10.0.0.18:5000", rtp))
        .unwrap();
    stream
        .add_remote_candidate(rtp, remote_host("93.184.216.34:6000", rtp, "f1"))
        .unwrap();

    // First build: another stream already runs checks for one of the two
    // foundations, so only that pair starts Waiting.
    stream.init_check_list(&|_: &str| false);
    let unfrozen = stream.pairs()[0].foundation();

    stream.init_check_list(&move |f: &str| f == unfrozen);

    let states: Vec<_> = stream.pairs().iter().map(|p| p.state()).collect();
    assert_eq!(states, vec![CheckState::Waiting, CheckState::Frozen]);
}

#[test]
pub fn concurrent_workers_share_the_stream() {
    init_log();

    // The stream is driven from multiple worker threads reporting check
    // outcomes while another thread polls the completion predicates.
    let stream = std::sync::Arc::new(IceMediaStream::new("audio"));
    stream.set_controlling(true);
    let rtp = stream.create_component();

    for i in 0..8 {
        stream
            .add_local_candidate(rtp, host(format!("10.0.0.{}:5000", 10 + i), rtp))
            .unwrap();
    }
    stream
        .add_remote_candidate(rtp, remote_host("93.184.216.34:6000", rtp, "f1"))
        .unwrap();

    stream.init_check_list(&|_: &str| true);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let stream = stream.clone();
            std::thread::spawn(move || {
                while let Some(check) = stream.next_check() {
                    stream.check_succeeded(check.local().addr(), check.remote().addr());
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(stream.valid_pairs().len(), 8);
    assert!(stream.valid_list_contains_all_components());
    assert!(stream
        .pairs()
        .iter()
        .all(|p| p.state() == CheckState::Succeeded));
}

#[test]
pub fn candidate_roundtrips_as_json() {
    init_log();

    let lc = srflx("83.209.13.2:15000", "10.0.0.17:5000", 1);
    let json = serde_json::to_string(lc.candidate()).unwrap();

    let back: ice_checks::Candidate = serde_json::from_str(&json).unwrap();
    assert_eq!(back.addr(), sock("83.209.13.2:15000"));
    assert_eq!(back.kind(), lc.candidate().kind());
    assert_eq!(back.foundation(), lc.candidate().foundation());
    assert_eq!(back.prio(), lc.candidate().prio());
}

#[test]
pub fn freed_stream_takes_no_candidates() {
    init_log();

    let stream = IceMediaStream::new("audio");
    let rtp = stream.create_component();
    stream
        .add_local_candidate(rtp, host("10.0.0.17:5000", rtp))
        .unwrap();

    stream.free();

    // The component is gone, so registration now errors.
    let err = stream.add_local_candidate(rtp, host("10.0.0.18:5000", rtp));
    assert!(err.is_err());
}

use pretty_assertions::assert_eq;
use rstest::*;

use svchain_chaining::chain::{ChainCounters, reconcile_chains};
use svchain_chaining::observer::ChainFinderState;
use svchain_chaining::proposed::LinkSkipType;
use svchain_chaining::{ChainFinder, ChainingConfig, RecordingObserver, SvChain};
use svchain_core::models::{Breakend, BreakendId, SvCluster, SvType, SvVarData};

fn sv(id: u32, sv_type: SvType, s: (&str, i64, i8), e: (&str, i64, i8), jcn: f64) -> SvVarData {
    SvVarData::new(
        id,
        sv_type,
        Breakend::new(s.0, s.1, s.2),
        Some(Breakend::new(e.0, e.1, e.2)),
        jcn,
    )
}

fn assert_contiguous(chain: &SvChain) {
    for pair in chain.links().windows(2) {
        assert_eq!(pair[0].second.other(), pair[1].first, "chain {} broken", chain);
    }
}

/// Two translocations meeting on chr1, nothing else can pair.
#[fixture]
fn simple_pair() -> SvCluster {
    let svs = vec![
        sv(1, SvType::Bnd, ("1", 1000, -1), ("2", 100, 1), 1.0),
        sv(2, SvType::Bnd, ("1", 1600, 1), ("3", 100, 1), 1.0),
    ];
    SvCluster::new(1, "S1", svs)
}

/// A JCN 2 breakend facing both ends of a JCN 1 foldback. The breakend runs
/// through the foldback twice, so it carries twice the foldback's JCN.
#[fixture]
fn foldback_cluster() -> SvCluster {
    let svs = vec![
        sv(1, SvType::Bnd, ("1", 1000, -1), ("2", 500, 1), 2.0),
        sv(2, SvType::Inv, ("1", 6000, 1), ("1", 6400, 1), 1.0).with_foldback(),
    ];
    SvCluster::new(2, "S1", svs)
        .with_replication(true)
        .with_foldback(BreakendId::start(1), BreakendId::end(1))
}

/// Three assembled links, one of which spans the short DEL the other two run through.
#[fixture]
fn multi_connection_cluster() -> SvCluster {
    let svs = vec![
        sv(1, SvType::Bnd, ("2", 100, 1), ("1", 100, -1), 1.0),
        sv(2, SvType::Del, ("1", 500, 1), ("1", 700, -1), 1.0),
        sv(3, SvType::Bnd, ("1", 1100, 1), ("3", 100, -1), 1.0),
    ];
    SvCluster::new(3, "S1", svs)
        .with_assembled_link(BreakendId::end(0), BreakendId::start(2))
        .with_assembled_link(BreakendId::end(0), BreakendId::start(1))
        .with_assembled_link(BreakendId::end(1), BreakendId::start(2))
}

/// DELs in a row on chr1, each facing the next.
#[fixture]
fn del_run() -> SvCluster {
    let svs = vec![
        sv(1, SvType::Del, ("1", 1000, 1), ("1", 5000, -1), 1.0),
        sv(2, SvType::Del, ("1", 5500, 1), ("1", 9000, -1), 1.0),
        sv(3, SvType::Del, ("1", 9400, 1), ("1", 12000, -1), 1.0),
        sv(4, SvType::Del, ("1", 12300, 1), ("1", 15000, -1), 1.0),
    ];
    SvCluster::new(4, "S1", svs)
}

/// The same run with uneven JCNs in a replication cluster, so chains split and merge.
#[fixture]
fn uneven_del_run() -> SvCluster {
    let svs = vec![
        sv(1, SvType::Del, ("1", 1000, 1), ("1", 5000, -1), 1.0),
        sv(2, SvType::Del, ("1", 5500, 1), ("1", 9000, -1), 1.3),
        sv(3, SvType::Del, ("1", 9400, 1), ("1", 12000, -1), 0.9),
        sv(4, SvType::Del, ("1", 12300, 1), ("1", 15000, -1), 1.2),
    ];
    SvCluster::new(6, "S1", svs).with_replication(true)
}

/// Sum of chain JCN over every link occurrence touching a breakend.
fn chained_jcn(chains: &[SvChain], breakend: BreakendId) -> f64 {
    chains
        .iter()
        .map(|chain| {
            let touches = chain
                .links()
                .iter()
                .map(|l| (l.first == breakend) as usize + (l.second == breakend) as usize)
                .sum::<usize>();
            chain.jcn() * touches as f64
        })
        .sum()
}

#[rstest]
fn test_single_matching_pair(simple_pair: SvCluster) {
    let outcome = ChainFinder::new(&simple_pair, &ChainingConfig::default()).form_chains();

    assert!(outcome.is_valid);
    assert!(outcome.converged);
    assert_eq!(outcome.chains.len(), 1);

    let chain = &outcome.chains[0];
    assert_eq!(chain.link_count(), 1);
    assert_eq!(
        chain.links()[0].key(),
        (BreakendId::start(0), BreakendId::start(1))
    );
    assert_eq!(
        chain.open_breakends(&simple_pair),
        (Some(BreakendId::end(0)), Some(BreakendId::end(1)))
    );
}

#[rstest]
fn test_foldback_is_explained(foldback_cluster: SvCluster) {
    let mut recorder = RecordingObserver::new();
    let outcome = ChainFinder::new(&foldback_cluster, &ChainingConfig::default())
        .with_observer(&mut recorder)
        .form_chains();

    assert!(outcome.is_valid);

    let links: Vec<_> = outcome.chains.iter().flat_map(|c| c.links()).collect();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.has_breakend(BreakendId::start(0))));
    assert_eq!(outcome.diagnostics.foldbacks, 1);

    assert!(
        recorder
            .diag_lines()
            .iter()
            .all(|line| !line.contains("MULTI_CONN"))
    );
}

#[rstest]
fn test_spanning_assembled_link_dropped(multi_connection_cluster: SvCluster) {
    let mut recorder = RecordingObserver::new();
    let outcome = ChainFinder::new(&multi_connection_cluster, &ChainingConfig::default())
        .with_observer(&mut recorder)
        .form_chains();

    assert!(outcome.is_valid);

    let links: Vec<_> = outcome.chains.iter().flat_map(|c| c.links()).collect();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.is_assembled));
    assert!(
        links
            .iter()
            .all(|l| l.key() != (BreakendId::end(0), BreakendId::start(2)))
    );

    let removed: Vec<String> = recorder
        .diag_lines()
        .into_iter()
        .filter(|line| line.starts_with("CHAIN_DIAG: MULTI_CONN,S1,3,1,"))
        .collect();
    assert_eq!(removed.len(), 1);
}

#[rstest]
fn test_stagnation_stops_search(del_run: SvCluster) {
    let config = ChainingConfig::default();
    assert_eq!(config.max_iterations_without_progress, 50);

    let mut finder = ChainFinder::new(&del_run, &config);
    finder.initialise();
    for link in finder.allocator().catalog().all_links() {
        finder
            .allocator_mut()
            .skip_link(&del_run, &link, LinkSkipType::JcnMismatch);
    }

    finder.search();
    assert_eq!(finder.iterations(), 50);

    finder.finalise();
    assert!(finder.allocator().is_valid());
    assert!(finder.allocator().chains().is_empty());
    assert_eq!(finder.state(), ChainFinderState::Converged);
}

#[rstest]
fn test_reconcile_splits_higher_jcn_chain() {
    // A(0) -> X(1) on chr1, X(1) -> B(2) on chr2
    let svs = vec![
        sv(200, SvType::Bnd, ("3", 100, 1), ("1", 1000, -1), 2.0),
        sv(201, SvType::Bnd, ("1", 2000, 1), ("2", 1000, -1), 2.0),
        sv(202, SvType::Bnd, ("2", 3000, 1), ("4", 100, -1), 1.0),
    ];
    let cluster = SvCluster::new(5, "S1", svs).with_replication(true);

    let mut counters = ChainCounters::new();
    let mut upper = SvChain::new(counters.next_chain_id()).with_jcn(2.0, 0.0);
    let link1 = cluster
        .form_link(BreakendId::end(0), BreakendId::start(1))
        .unwrap();
    assert!(upper.add_link(&cluster, &link1, false));

    let mut lower = SvChain::new(counters.next_chain_id()).with_jcn(1.0, 0.0);
    let link2 = cluster
        .form_link(BreakendId::end(1), BreakendId::start(2))
        .unwrap();
    assert!(lower.add_link(&cluster, &link2, false));

    let mut chains = vec![upper, lower];
    for chain in chains.iter_mut() {
        chain.assign_link_instances(&mut counters);
    }
    let total_before: f64 = chains.iter().map(|c| c.jcn() * c.link_count() as f64).sum();

    let merges = reconcile_chains(&mut chains, &cluster, &mut counters, 50);
    assert_eq!(merges, 1);
    assert_eq!(chains.len(), 2);

    let merged = chains.iter().find(|c| c.link_count() == 2).unwrap();
    let remainder = chains.iter().find(|c| c.link_count() == 1).unwrap();
    assert_eq!(merged.jcn(), 1.0);
    assert_eq!(remainder.jcn(), 1.0);
    assert_contiguous(merged);

    let total_after: f64 = chains.iter().map(|c| c.jcn() * c.link_count() as f64).sum();
    assert_eq!(total_before, total_after);

    // idempotent once nothing is left to merge
    let before = chains.clone();
    assert_eq!(reconcile_chains(&mut chains, &cluster, &mut counters, 50), 0);
    assert_eq!(chains, before);
}

#[rstest]
fn test_chains_are_contiguous_and_unshared(del_run: SvCluster) {
    let outcome = ChainFinder::new(&del_run, &ChainingConfig::default()).form_chains();

    assert!(outcome.is_valid);
    assert_eq!(outcome.chains.len(), 1);
    assert_eq!(outcome.chains[0].link_count(), 3);

    let mut instances = Vec::new();
    for chain in &outcome.chains {
        assert_contiguous(chain);
        assert!(chain.is_consistent(&del_run).is_ok());
        instances.extend(chain.links().iter().filter_map(|l| l.instance));
    }
    let count = instances.len();
    instances.sort();
    instances.dedup();
    assert_eq!(instances.len(), count);
}

#[rstest]
#[case::pair(simple_pair())]
#[case::foldback(foldback_cluster())]
#[case::dels(del_run())]
fn test_ledger_within_jcn(#[case] cluster: SvCluster) {
    let outcome = ChainFinder::new(&cluster, &ChainingConfig::default()).form_chains();

    for state in &outcome.sv_states {
        for is_start in [true, false] {
            let committed = state.linked(is_start);
            assert!(
                committed <= state.jcn + state.jcn_uncertainty + 1e-6,
                "sv {} committed {} over jcn {}",
                state.sv,
                committed,
                state.jcn
            );
        }
    }
}

#[rstest]
#[case::pair(simple_pair())]
#[case::foldback(foldback_cluster())]
#[case::assembled(multi_connection_cluster())]
#[case::dels(del_run())]
fn test_deterministic(#[case] cluster: SvCluster) {
    let config = ChainingConfig::default();
    let first = ChainFinder::new(&cluster, &config).form_chains();
    let second = ChainFinder::new(&cluster, &config).form_chains();

    assert_eq!(first.chain_records(&cluster), second.chain_records(&cluster));
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[rstest]
#[case::pair(simple_pair())]
#[case::foldback(foldback_cluster())]
#[case::dels(del_run())]
#[case::uneven_dels(uneven_del_run())]
fn test_ledger_matches_chains(#[case] cluster: SvCluster) {
    let outcome = ChainFinder::new(&cluster, &ChainingConfig::default()).form_chains();
    assert!(outcome.is_valid);

    for state in &outcome.sv_states {
        for is_start in [true, false] {
            let breakend = BreakendId::new(state.sv, is_start);
            let chained = chained_jcn(&outcome.chains, breakend);
            assert!(
                (state.linked(is_start) - chained).abs() < 1e-6,
                "{} ledger {} chains {}",
                breakend,
                state.linked(is_start),
                chained
            );
        }
    }
}

#[rstest]
fn test_foldback_without_doubled_jcn_is_not_split() {
    // breakend and foldback both at JCN 2: the breakend cannot run through
    // the foldback twice, so it takes a single link to one end
    let svs = vec![
        sv(1, SvType::Bnd, ("1", 1000, -1), ("2", 500, 1), 2.0),
        sv(2, SvType::Inv, ("1", 6000, 1), ("1", 6400, 1), 2.0).with_foldback(),
    ];
    let cluster = SvCluster::new(7, "S1", svs)
        .with_replication(true)
        .with_foldback(BreakendId::start(1), BreakendId::end(1));

    let outcome = ChainFinder::new(&cluster, &ChainingConfig::default()).form_chains();

    assert!(outcome.is_valid);
    assert_eq!(outcome.diagnostics.foldbacks, 0);

    let links: Vec<_> = outcome.chains.iter().flat_map(|c| c.links()).collect();
    assert_eq!(links.len(), 1);
    assert!(links[0].has_breakend(BreakendId::start(0)));
    assert_eq!(chained_jcn(&outcome.chains, BreakendId::start(0)), 2.0);
}

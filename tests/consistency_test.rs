mod common;

use common::TestCluster;
use replicated_store::{CheckOutcome, ExtentId};

const EXTENT: ExtentId = 1025;

fn write_extent(tc: &TestCluster, partition_id: u64, addr: &str, data: &[u8]) {
    let partition = tc.network.data_node(addr).space.partition(partition_id).unwrap();
    let store = partition.store();
    if !store.exists(EXTENT) {
        store.create(EXTENT, 7).unwrap();
    }
    let size = store.size(EXTENT).unwrap();
    store.write(EXTENT, size, data).unwrap();
}

async fn load_headers(tc: &TestCluster, partition_id: u64) {
    for host in tc.hosts(partition_id).await {
        let partition = tc.network.data_node(&host).space.partition(partition_id).unwrap();
        partition.force_load_header();
    }
    tc.network.heartbeat(&tc.cluster).await;
}

#[tokio::test]
async fn skipped_until_every_replica_loaded_its_headers() {
    let tc = TestCluster::start(3).await;
    let pid = tc.data_partition(3).await;
    let partition = tc.cluster.partition(pid).unwrap();

    assert_eq!(CheckOutcome::Skipped, tc.cluster.load_data_partition(&partition).await);
}

#[tokio::test]
async fn identical_replicas_are_consistent() {
    let tc = TestCluster::start(3).await;
    let pid = tc.data_partition(3).await;
    for host in tc.hosts(pid).await {
        write_extent(&tc, pid, &host, &[0xAB; 4096]);
    }
    load_headers(&tc, pid).await;

    let partition = tc.cluster.partition(pid).unwrap();
    partition.set_needs_recovery(true);
    assert_eq!(CheckOutcome::Consistent, tc.cluster.load_data_partition(&partition).await);
    assert!(!partition.needs_recovery());
}

#[tokio::test]
async fn crc_mismatch_flags_recovery() {
    let tc = TestCluster::start(3).await;
    let pid = tc.data_partition(3).await;
    let hosts = tc.hosts(pid).await;
    write_extent(&tc, pid, &hosts[0], &[0xAB; 4096]);
    write_extent(&tc, pid, &hosts[1], &[0xAB; 4096]);
    write_extent(&tc, pid, &hosts[2], &[0xCD; 4096]);
    load_headers(&tc, pid).await;

    let partition = tc.cluster.partition(pid).unwrap();
    match tc.cluster.load_data_partition(&partition).await {
        CheckOutcome::Inconsistent(problems) => assert!(!problems.is_empty()),
        other => panic!("Unexpected outcome {:?}", other),
    }
    assert!(partition.needs_recovery());
}

#[tokio::test]
async fn shorter_replica_is_left_to_repair() {
    let tc = TestCluster::start(3).await;
    let pid = tc.data_partition(3).await;
    let hosts = tc.hosts(pid).await;
    write_extent(&tc, pid, &hosts[0], &[0xAB; 4096]);
    write_extent(&tc, pid, &hosts[1], &[0xAB; 4096]);
    write_extent(&tc, pid, &hosts[2], &[0xAB; 1024]);
    load_headers(&tc, pid).await;

    let partition = tc.cluster.partition(pid).unwrap();
    assert_eq!(CheckOutcome::Consistent, tc.cluster.load_data_partition(&partition).await);
}

#[tokio::test]
async fn partial_responses_leave_recovery_flag_alone() {
    let tc = TestCluster::start(3).await;
    let pid = tc.data_partition(3).await;
    let hosts = tc.hosts(pid).await;
    for host in &hosts {
        write_extent(&tc, pid, host, &[0xAB; 4096]);
    }
    load_headers(&tc, pid).await;

    let partition = tc.cluster.partition(pid).unwrap();
    partition.set_needs_recovery(true);
    tc.network.set_down(&hosts[2], true);

    assert_eq!(CheckOutcome::Incomplete, tc.cluster.load_data_partition(&partition).await);
    assert!(partition.needs_recovery());
}

#[tokio::test]
async fn check_consistency_covers_every_partition() {
    let tc = TestCluster::start(3).await;
    let first = tc.data_partition(3).await;
    let second = tc.cluster.create_data_partition("ltptest", 1 << 30).await.unwrap().partition_id();
    for pid in [first, second].iter().copied() {
        for host in tc.hosts(pid).await {
            write_extent(&tc, pid, &host, b"consistent");
        }
    }
    tc.network.refresh_leaders().await;
    load_headers(&tc, first).await;
    load_headers(&tc, second).await;

    let mut outcomes = tc.cluster.check_consistency().await;
    outcomes.sort_by_key(|(pid, _)| *pid);
    assert_eq!(
        vec![(first, CheckOutcome::Consistent), (second, CheckOutcome::Consistent)],
        outcomes
    );
}

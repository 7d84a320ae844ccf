mod common;

use common::{eventually, TestCluster, DISK_TOTAL};
use replicated_store::{default_tiny_extent_ids, MembershipError, NodeKind, TaskRequest, Volume};
use tokio::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

async fn spare(tc: &TestCluster, partition_id: u64) -> String {
    let hosts = tc.hosts(partition_id).await;
    tc.network
        .data_nodes()
        .into_iter()
        .map(|n| n.addr.clone())
        .find(|addr| !hosts.contains(addr))
        .expect("every node is a host")
}

async fn leader(tc: &TestCluster, partition_id: u64) -> String {
    let hosts = tc.hosts(partition_id).await;
    let leader_id = tc.consensus.leader(partition_id);
    hosts
        .into_iter()
        .find(|h| tc.node_id(h) == leader_id)
        .expect("leader is not a host")
}

async fn follower(tc: &TestCluster, partition_id: u64) -> String {
    let leader = leader(tc, partition_id).await;
    tc.hosts(partition_id)
        .await
        .into_iter()
        .find(|h| *h != leader)
        .unwrap()
}

#[tokio::test]
async fn decommission_of_non_host_changes_nothing() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let spare = spare(&tc, pid).await;
    let before = tc.cluster.partition(pid).unwrap().membership().await;
    let sent_before = tc.network.sent_tasks().len();

    tc.cluster.decommission_partition(pid, &spare).await.unwrap();

    let after = tc.cluster.partition(pid).unwrap().membership().await;
    assert_eq!(before, after);
    assert_eq!(sent_before, tc.network.sent_tasks().len());
}

#[tokio::test]
async fn decommission_replaces_the_replica() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let spare = spare(&tc, pid).await;
    let removed = follower(&tc, pid).await;

    tc.cluster.decommission_partition(pid, &removed).await.unwrap();

    let hosts = tc.hosts(pid).await;
    let peers = tc.peer_addrs(pid).await;
    assert_eq!(3, hosts.len());
    assert!(!hosts.contains(&removed), "{:?}", hosts);
    assert!(!peers.contains(&removed), "{:?}", peers);
    assert!(hosts.contains(&spare));
    assert!(peers.contains(&spare));

    let persisted = tc.store.partition(pid).unwrap();
    assert_eq!(hosts, persisted.hosts);
    assert_eq!(peers, persisted.peers.iter().map(|p| p.addr.clone()).collect::<Vec<_>>());

    let members = tc.consensus.members(pid);
    assert!(!members.contains(&tc.node_id(&removed)));
    assert!(members.contains(&tc.node_id(&spare)));
    assert!(tc.cluster.partition(pid).unwrap().replica(&removed).is_none());

    // Queued follow-ups: the old replica goes away, the new one learns the membership.
    let removed_node = tc.network.data_node(&removed);
    assert!(eventually(WAIT, || removed_node.space.partition(pid).is_none()).await);
    let spare_node = tc.network.data_node(&spare);
    let spare_partition = spare_node.space.partition(pid).unwrap();
    assert!(eventually(WAIT, || spare_partition.replica_hosts() == hosts).await);

    tc.network.refresh_leaders().await;
    tc.network.heartbeat(&tc.cluster).await;
    let health = tc.cluster.partition_health(pid).await.unwrap();
    assert!(health.healthy, "{:?}", health);
    assert!(tc.cluster.diagnose().await.lack_replica_partitions.is_empty());
}

#[tokio::test]
async fn removing_the_leader_hands_leadership_over() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let old_leader = leader(&tc, pid).await;

    tc.cluster.decommission_partition(pid, &old_leader).await.unwrap();

    let hosts = tc.hosts(pid).await;
    assert_eq!(3, hosts.len());
    assert!(!hosts.contains(&old_leader));

    let successor = hosts[0].clone();
    assert_eq!(tc.node_id(&successor), tc.consensus.leader(pid));
    assert!(tc
        .network
        .sent_names(pid)
        .contains(&(successor, "TryToLeader")));
}

#[tokio::test]
async fn membership_change_fails_over_from_a_stale_leader() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let believed = leader(&tc, pid).await;

    // Leadership moves without the cluster hearing about it.
    let hosts = tc.hosts(pid).await;
    let actual = hosts.iter().rev().find(|h| **h != believed).unwrap().clone();
    tc.consensus.set_leader(pid, tc.node_id(&actual));
    let removed = hosts.iter().find(|h| **h != believed && **h != actual).unwrap().clone();

    tc.cluster.decommission_partition(pid, &removed).await.unwrap();

    let sent = tc.network.sent_names(pid);
    let removes: Vec<&String> = sent
        .iter()
        .filter(|(_, name)| *name == "RemoveRaftMember")
        .map(|(addr, _)| addr)
        .collect();
    assert_eq!(&believed, removes[0]);
    assert_eq!(Some(&&actual), removes.last());
    assert!(!tc.hosts(pid).await.contains(&removed));
}

#[tokio::test]
async fn decommission_needs_a_live_majority() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let hosts = tc.hosts(pid).await;
    tc.network.heartbeat_unavailable(&tc.cluster, &hosts[1]).await;

    let result = tc.cluster.decommission_partition(pid, &hosts[0]).await;
    assert!(
        matches!(
            result,
            Err(MembershipError::NotEnoughLiveReplicas { live: 1, required: 2, .. })
        ),
        "{:?}",
        result
    );
    assert_eq!(hosts, tc.hosts(pid).await);
    assert!(!tc
        .network
        .sent_tasks()
        .iter()
        .any(|(_, p, request)| *p == pid && matches!(request, TaskRequest::RemoveRaftMember(_))));
}

#[tokio::test]
async fn decommission_without_replacement_is_refused() {
    let tc = TestCluster::start(3).await;
    let pid = tc.data_partition(3).await;
    let hosts = tc.hosts(pid).await;

    let result = tc.cluster.decommission_partition(pid, &hosts[1]).await;
    assert!(matches!(result, Err(MembershipError::NoReplacementHost(p)) if p == pid));
    assert_eq!(hosts, tc.hosts(pid).await);
}

#[tokio::test]
async fn delete_replica_keeps_replica_num() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let hosts = tc.hosts(pid).await;

    let result = tc.cluster.delete_replica(pid, &hosts[2]).await;
    assert!(matches!(
        result,
        Err(MembershipError::ReplicaCountBelowMinimum {
            remaining: 2,
            replica_num: 3,
            ..
        })
    ));

    let spare = spare(&tc, pid).await;
    tc.cluster.add_replica(pid, &spare).await.unwrap();
    assert_eq!(4, tc.hosts(pid).await.len());

    tc.cluster.delete_replica(pid, &hosts[2]).await.unwrap();
    let after = tc.hosts(pid).await;
    assert_eq!(3, after.len());
    assert!(!after.contains(&hosts[2]));
}

#[tokio::test]
async fn add_replica_validates_target() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let hosts = tc.hosts(pid).await;

    assert!(matches!(
        tc.cluster.add_replica(pid, &hosts[0]).await,
        Err(MembershipError::HostAlreadyPresent { .. })
    ));
    assert!(matches!(
        tc.cluster.add_replica(pid, "10.9.9.9:17310").await,
        Err(MembershipError::NodeNotFound(_))
    ));
    assert!(matches!(
        tc.cluster.add_replica(pid + 100, &hosts[0]).await,
        Err(MembershipError::PartitionNotFound(_))
    ));
    assert!(matches!(
        tc.cluster.delete_replica(pid, "10.9.9.9:17310").await,
        Err(MembershipError::NotAHost { .. })
    ));
}

#[tokio::test]
async fn replacement_keeps_the_volume_write_mode() {
    let tc = TestCluster::start(4).await;
    tc.cluster.add_volume(Volume::new("appendvol", 3).append_only()).await.unwrap();
    let pid = tc.cluster.create_data_partition("appendvol", 1 << 30).await.unwrap().partition_id();
    tc.network.refresh_leaders().await;
    tc.network.heartbeat(&tc.cluster).await;
    assert!(!tc.cluster.partition(pid).unwrap().random_write());
    assert!(!tc.store.partition(pid).unwrap().random_write);

    let replacement = spare(&tc, pid).await;
    let removed = follower(&tc, pid).await;
    tc.cluster.decommission_partition(pid, &removed).await.unwrap();

    for host in tc.hosts(pid).await {
        let partition = tc.network.data_node(&host).space.partition(pid).unwrap();
        assert!(!partition.random_write(), "{} accepts overwrites", host);
    }
    assert!(tc.network.sent_tasks().iter().any(|(addr, p, request)| {
        *p == pid && *addr == replacement && matches!(request, TaskRequest::CreateDataPartition(r) if !r.random_write)
    }));
}

#[tokio::test]
async fn add_replica_stops_at_one_extra_host() {
    let tc = TestCluster::start(5).await;
    let pid = tc.data_partition(3).await;
    let hosts = tc.hosts(pid).await;
    let spares: Vec<String> = tc
        .network
        .data_nodes()
        .into_iter()
        .map(|n| n.addr.clone())
        .filter(|addr| !hosts.contains(addr))
        .collect();
    assert_eq!(2, spares.len());

    tc.cluster.add_replica(pid, &spares[0]).await.unwrap();
    assert_eq!(4, tc.hosts(pid).await.len());

    let result = tc.cluster.add_replica(pid, &spares[1]).await;
    assert!(
        matches!(
            result,
            Err(MembershipError::ReplicaCountAboveMaximum {
                hosts: 4,
                replica_num: 3,
                ..
            })
        ),
        "{:?}",
        result
    );
    assert_eq!(4, tc.hosts(pid).await.len());
    assert!(!tc
        .network
        .sent_tasks()
        .iter()
        .any(|(addr, p, request)| *p == pid && *addr == spares[1] && matches!(request, TaskRequest::CreateDataPartition(_))));
}

#[tokio::test]
async fn add_replica_rejects_a_meta_node_for_data() {
    let tc = TestCluster::start(3).await;
    let pid = tc.data_partition(3).await;
    let meta = tc.network.start_meta_node(1, 1000, 100);
    tc.cluster.register_node(101, &meta, NodeKind::Meta, 1).unwrap();

    let result = tc.cluster.add_replica(pid, &meta).await;
    assert!(
        matches!(&result, Err(MembershipError::NodeKindMismatch { addr, expected: NodeKind::Data }) if *addr == meta),
        "{:?}",
        result
    );
    assert_eq!(3, tc.hosts(pid).await.len());
}

#[tokio::test]
async fn one_membership_change_at_a_time() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let removed = follower(&tc, pid).await;
    let spare = spare(&tc, pid).await;
    tc.network.set_admin_delay(Some(Duration::from_millis(50)));

    let (first, second) = tokio::join!(
        tc.cluster.decommission_partition(pid, &removed),
        tc.cluster.add_replica(pid, &spare),
    );

    let rejected = |r: &Result<(), MembershipError>| matches!(r, Err(MembershipError::OperationInProgress(p)) if *p == pid);
    assert!(
        (first.is_ok() && rejected(&second)) || (second.is_ok() && rejected(&first)),
        "{:?} {:?}",
        first,
        second
    );
}

#[tokio::test]
async fn failed_persist_keeps_membership() {
    let tc = TestCluster::start(4).await;
    let pid = tc.data_partition(3).await;
    let before = tc.hosts(pid).await;
    let removed = follower(&tc, pid).await;
    tc.store.set_unavailable(true);

    let result = tc.cluster.decommission_partition(pid, &removed).await;
    assert!(matches!(result, Err(MembershipError::Persist(_))), "{:?}", result);
    assert_eq!(before, tc.hosts(pid).await);
    assert_eq!(before, tc.store.partition(pid).unwrap().hosts);
}

#[tokio::test]
async fn heartbeats_travel_through_node_queues() {
    let tc = TestCluster::start(3).await;
    let late = tc.network.start_data_node(4, Some(tc.consensus.clone()), default_tiny_extent_ids());
    let node = tc.cluster.register_node(4, &late.addr, NodeKind::Data, 1).unwrap();
    assert_eq!(0, node.total());

    assert_eq!(4, tc.cluster.heartbeat_tick());
    assert!(eventually(WAIT, || node.total() == DISK_TOTAL).await);
    assert!(eventually(WAIT, || tc.cluster.pending_tasks().is_empty()).await);

    let stat = tc.cluster.update_stat_info();
    assert_eq!(4 * DISK_TOTAL, stat.data_nodes.total);
}

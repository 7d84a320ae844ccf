mod common;

use common::{create_request, eventually, DataNode, LocalNetwork};
use replicated_store::{DataPartition, ExtentId, ExtentRepairMode, ExtentStore, RepairOutcome};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Duration;

const PARTITION_ID: u64 = 11;

struct Replicas {
    _network: Arc<LocalNetwork>,
    leader: Arc<DataNode>,
    follower: Arc<DataNode>,
}

impl Replicas {
    // Tiny extents live at 1001..=1064 here, so low IDs are normal extents.
    fn start() -> Replicas {
        let network = LocalNetwork::new();
        let leader = network.start_data_node(1, None, 1001..=1064);
        let follower = network.start_data_node(2, None, 1001..=1064);
        let request = create_request(&[(1, leader.addr.clone()), (2, follower.addr.clone())]);
        leader.space.create_partition(PARTITION_ID, request.clone()).unwrap();
        follower.space.create_partition(PARTITION_ID, request).unwrap();

        Replicas {
            _network: network,
            leader,
            follower,
        }
    }

    fn partition(node: &DataNode) -> Arc<DataPartition> {
        node.space.partition(PARTITION_ID).unwrap()
    }
}

fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

fn put(store: &Arc<dyn ExtentStore>, extent_id: ExtentId, data: &[u8]) {
    if !store.exists(extent_id) {
        store.create(extent_id, extent_id * 10).unwrap();
    }
    let size = store.size(extent_id).unwrap();
    store.write(extent_id, size, data).unwrap();
}

fn read_all(store: &Arc<dyn ExtentStore>, extent_id: ExtentId) -> Vec<u8> {
    let mut buf = vec![0; store.size(extent_id).unwrap() as usize];
    store.read(extent_id, 0, &mut buf).unwrap();
    buf
}

/// Leader holds {1: 100, 2: 50}, follower holds {1: 100, 2: 80, 3: 30}.
fn diverged() -> Replicas {
    let replicas = Replicas::start();
    let leader = Replicas::partition(&replicas.leader);
    let follower = Replicas::partition(&replicas.follower);

    put(leader.store(), 1, &pattern(1, 100));
    put(leader.store(), 2, &pattern(2, 80)[..50]);

    put(follower.store(), 1, &pattern(1, 100));
    put(follower.store(), 2, &pattern(2, 80));
    put(follower.store(), 3, &pattern(3, 30));
    replicas
}

#[tokio::test]
async fn leader_gets_fix_and_add_tasks() {
    let replicas = diverged();
    let leader = Replicas::partition(&replicas.leader);
    let engine = replicas.leader.space.repair_engine();

    let (inventories, tasks) = engine
        .build_repair_tasks(&leader, ExtentRepairMode::Normal, &BTreeSet::new())
        .await
        .unwrap();
    assert_eq!(2, inventories.len());
    assert_eq!(replicas.leader.addr, inventories[0].addr);

    let local = &tasks[0];
    let fixes: Vec<(ExtentId, u64)> = local.fix_extent_sizes.iter().map(|e| (e.file_id, e.size)).collect();
    let adds: Vec<(ExtentId, u64)> = local.add_extents.iter().map(|e| (e.file_id, e.size)).collect();
    assert_eq!(vec![(2, 80)], fixes);
    assert_eq!(vec![(3, 30)], adds);
    assert_eq!(replicas.follower.addr, local.fix_extent_sizes[0].source);
    assert!(tasks[1].is_empty());
}

#[tokio::test]
async fn repair_converges_and_is_idempotent() {
    let replicas = diverged();
    let leader = Replicas::partition(&replicas.leader);
    let engine = replicas.leader.space.repair_engine();

    let outcome = engine.repair(&leader, ExtentRepairMode::Normal).await.unwrap();
    assert_eq!(1, outcome.created);
    assert_eq!(0, outcome.failed);

    assert_eq!(pattern(1, 100), read_all(leader.store(), 1));
    assert_eq!(pattern(2, 80), read_all(leader.store(), 2));
    assert_eq!(pattern(3, 30), read_all(leader.store(), 3));

    let (_, tasks) = engine
        .build_repair_tasks(&leader, ExtentRepairMode::Normal, &BTreeSet::new())
        .await
        .unwrap();
    assert!(tasks.iter().all(|t| t.is_empty()), "{:?}", tasks);

    let again = engine.repair(&leader, ExtentRepairMode::Normal).await.unwrap();
    assert_eq!(RepairOutcome::default(), again);
}

#[tokio::test]
async fn follower_is_repaired_after_notification() {
    let replicas = Replicas::start();
    let leader = Replicas::partition(&replicas.leader);
    let follower = Replicas::partition(&replicas.follower);
    put(leader.store(), 4, &pattern(4, 200_000));
    put(leader.store(), 5, &pattern(5, 10));
    put(follower.store(), 5, &pattern(5, 4));

    let engine = replicas.leader.space.repair_engine();
    let outcome = engine.repair(&leader, ExtentRepairMode::Normal).await.unwrap();
    assert_eq!(RepairOutcome::default(), outcome);

    let store = follower.store().clone();
    assert!(
        eventually(Duration::from_secs(5), || {
            store.size(4).ok() == Some(200_000) && store.size(5).ok() == Some(10)
        })
        .await
    );
    assert_eq!(pattern(4, 200_000), read_all(follower.store(), 4));
    assert_eq!(pattern(5, 10), read_all(follower.store(), 5));
}

#[tokio::test]
async fn tiny_cycle_only_checks_pending_extents() {
    let replicas = Replicas::start();
    let leader = Replicas::partition(&replicas.leader);
    let follower = Replicas::partition(&replicas.follower);

    put(leader.store(), 1001, &pattern(9, 10));
    put(follower.store(), 1001, &pattern(9, 40));
    put(leader.store(), 1002, &pattern(8, 5));
    put(follower.store(), 1002, &pattern(8, 25));

    leader.store().promote_tiny_extents(1);
    assert_eq!(vec![1001], leader.store().pending_tiny_extents());

    let engine = replicas.leader.space.repair_engine();
    engine.repair(&leader, ExtentRepairMode::Tiny).await.unwrap();

    assert_eq!(pattern(9, 40), read_all(leader.store(), 1001));
    assert_eq!(5, leader.store().size(1002).unwrap());
    assert!(leader.store().pending_tiny_extents().is_empty());
}

mod common;

use common::{TestNet, CHAIN_ID};
use concord_consensus::{
    create_single_commit, CommitEndpoint, ConsensusError, SingleCommitsPacket, DEFAULT_PENALTY,
};
use concord_core::{serialize, SingleCommit};

fn packet(commits: &[SingleCommit]) -> Vec<u8> {
    serialize::to_bytes(&SingleCommitsPacket {
        commits: commits
            .iter()
            .map(|c| serialize::to_bytes(c).unwrap())
            .collect(),
    })
    .unwrap()
}

fn endpoint(net: &TestNet) -> CommitEndpoint<concord_state::MemoryStorage> {
    CommitEndpoint::new(net.pool.clone(), net.network.clone(), DEFAULT_PENALTY)
}

#[tokio::test]
async fn test_valid_packet_is_added() {
    let net = TestNet::new(3, 2);
    net.append_blocks(2).await;
    net.set_heights(2, 2, 0).await;
    let commits = vec![net.commit_at(2, 0).await, net.commit_at(2, 1).await];

    let added = endpoint(&net)
        .handle_commits(&packet(&commits), "peer-1")
        .await
        .unwrap();

    assert_eq!(added, 2);
    assert_eq!(net.pool.get_commits_by_height(2).await, commits);
    assert!(net.network.penalties().is_empty());
}

#[tokio::test]
async fn test_garbage_packet_penalizes() {
    let net = TestNet::new(3, 2);

    let result = endpoint(&net).handle_commits(&[0xde, 0xad], "peer-1").await;

    assert!(matches!(result, Err(ConsensusError::ApplyPenalty(_))));
    assert_eq!(
        net.network.penalties(),
        vec![("peer-1".to_string(), DEFAULT_PENALTY)]
    );
}

#[tokio::test]
async fn test_bad_signature_penalizes() {
    let net = TestNet::new(3, 2);
    net.append_blocks(2).await;
    net.set_heights(2, 2, 0).await;
    let header = net.header_at(2).await;
    let forged = create_single_commit(&header, &net.validators[0].info, CHAIN_ID + 1).unwrap();

    let result = endpoint(&net)
        .handle_commits(&packet(&[forged]), "peer-1")
        .await;

    assert!(matches!(
        result,
        Err(ConsensusError::InvalidCommitSignature { .. })
    ));
    assert_eq!(
        net.network.penalties(),
        vec![("peer-1".to_string(), DEFAULT_PENALTY)]
    );
    assert!(net.pool.get_commits_by_height(2).await.is_empty());
}

#[tokio::test]
async fn test_mismatched_commit_is_skipped() {
    let net = TestNet::new(3, 2);
    net.append_blocks(2).await;
    net.set_heights(2, 2, 0).await;

    let mut stale = net.commit_at(1, 0).await;
    stale.block_id = net.header_at(2).await.id;
    let good = net.commit_at(2, 1).await;

    let added = endpoint(&net)
        .handle_commits(&packet(&[stale, good.clone()]), "peer-1")
        .await
        .unwrap();

    assert_eq!(added, 1);
    assert_eq!(net.pool.get_commits_by_height(2).await, vec![good]);
    assert!(net.pool.get_commits_by_height(1).await.is_empty());
    assert!(net.network.penalties().is_empty());
}

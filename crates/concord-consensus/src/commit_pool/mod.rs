//! Commit pool: collects single commits, aggregates a quorum into an
//! aggregate commit and gossips a bounded selection to peers.

mod list;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concord_core::crypto::bls;
use concord_core::{
    serialize, Address, AggregateCommit, BlockHeader, BlsPublicKey, BlsSignature, Certificate,
    SingleCommit, ValidatorInfo,
};
use concord_state::{ChainStore, Storage};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::bft::BftMethod;
use crate::error::{BftError, ConsensusError};
use crate::network::{Network, SingleCommitsPacket, NETWORK_EVENT_POST_SINGLE_COMMITS};
use list::CommitList;

/// Number of heights below max height precommitted for which commits are kept
pub const COMMIT_RANGE_STORED: u64 = 100;

#[derive(Debug, Clone)]
pub struct CommitPoolConfig {
    /// Network identifier used to domain-separate certificate signatures
    pub chain_id: u64,
    /// Block time in seconds; the job runs every half block time
    pub block_time: u64,
    pub commit_range_stored: u64,
    /// Validators run by this node, gossiped first
    pub local_validators: Vec<Address>,
}

impl Default for CommitPoolConfig {
    fn default() -> Self {
        CommitPoolConfig {
            chain_id: 1,
            block_time: 10,
            commit_range_stored: COMMIT_RANGE_STORED,
            local_validators: Vec::new(),
        }
    }
}

/// Number of commits per collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitCounts {
    pub non_gossiped: usize,
    pub gossiped: usize,
}

#[derive(Debug, Default)]
struct CommitLists {
    non_gossiped: CommitList,
    gossiped: CommitList,
}

impl CommitLists {
    fn contains(&self, commit: &SingleCommit) -> bool {
        self.non_gossiped.exists(commit) || self.gossiped.exists(commit)
    }

    fn promote(&mut self, commit: &SingleCommit) {
        if self.non_gossiped.get_by_height(commit.height).contains(commit) {
            self.non_gossiped.delete_single(commit);
            self.gossiped.add(commit.clone());
        }
    }
}

/// Clears the running flag when the job finishes or its task is aborted
struct JobGuard<'a>(&'a AtomicBool);

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sign the certificate of `header` as `validator`
pub fn create_single_commit(
    header: &BlockHeader,
    validator: &ValidatorInfo,
    chain_id: u64,
) -> Result<SingleCommit, ConsensusError> {
    let certificate = Certificate::from_header(header);
    Ok(SingleCommit {
        block_id: header.id,
        height: header.height,
        validator_address: validator.address,
        certificate_signature: certificate.sign(&validator.bls_secret_key, chain_id)?,
    })
}

pub struct CommitPool<S: Storage> {
    config: CommitPoolConfig,
    bft: Arc<dyn BftMethod>,
    chain: Arc<RwLock<ChainStore<S>>>,
    network: Arc<dyn Network>,
    lists: RwLock<CommitLists>,
    job_running: AtomicBool,
    job: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Storage + 'static> CommitPool<S> {
    pub fn new(
        config: CommitPoolConfig,
        bft: Arc<dyn BftMethod>,
        chain: Arc<RwLock<ChainStore<S>>>,
        network: Arc<dyn Network>,
    ) -> Self {
        CommitPool {
            config,
            bft,
            chain,
            network,
            lists: RwLock::new(CommitLists::default()),
            job_running: AtomicBool::new(false),
            job: Mutex::new(None),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Spawn the recurring job on the current runtime
    pub async fn start(self: &Arc<Self>) {
        let mut job = self.job.lock().await;
        if job.is_some() {
            return;
        }

        let period = Duration::from_millis((self.config.block_time * 1000 / 2).max(1));
        let pool = Arc::clone(self);
        *job = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = pool.run_job().await {
                    error!("Commit pool job failed: {}", e);
                }
            }
        }));
        info!("Started commit pool job every {}ms", period.as_millis());
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.job.lock().await.take() {
            handle.abort();
            info!("Stopped commit pool job");
        }
    }

    /// Insert without validation; a commit already held in either
    /// collection is ignored.
    pub async fn add_commit(&self, commit: SingleCommit) {
        let mut lists = self.lists.write().await;
        if lists.contains(&commit) {
            return;
        }
        debug!(
            "Added commit from {} at height {}",
            commit.validator_address, commit.height
        );
        lists.non_gossiped.add(commit);
    }

    /// `Ok(false)` rejects silently; an inactive validator or a bad
    /// signature is an error the caller penalizes.
    pub async fn validate_commit(&self, commit: &SingleCommit) -> Result<bool, ConsensusError> {
        let header = self.chain.read().await.header_by_id(&commit.block_id)?;
        let Some(header) = header.filter(|h| h.height == commit.height) else {
            debug!(
                "Commit at height {} does not match the chain, ignoring",
                commit.height
            );
            return Ok(false);
        };

        if self.lists.read().await.contains(commit) {
            return Ok(false);
        }

        let removal_height = self.removal_height().await?;
        let max_height_precommitted = self.bft.get_bft_heights().await?.max_height_precommitted;
        if !self
            .is_retained(commit.height, removal_height, max_height_precommitted)
            .await?
        {
            return Ok(false);
        }

        let params = self.bft.get_bft_parameters(commit.height).await?;
        let Some(validator) = params.validator(&commit.validator_address) else {
            return Err(ConsensusError::InactiveValidator {
                address: commit.validator_address.to_hex(),
                height: commit.height,
            });
        };

        let certificate = Certificate::from_header(&header);
        if !certificate.verify_single(
            &validator.bls_key,
            &commit.certificate_signature,
            self.config.chain_id,
        ) {
            return Err(ConsensusError::InvalidCommitSignature {
                address: commit.validator_address.to_hex(),
                height: commit.height,
            });
        }

        Ok(true)
    }

    /// Non-gossiped commits first, then gossiped ones
    pub async fn get_commits_by_height(&self, height: u64) -> Vec<SingleCommit> {
        let lists = self.lists.read().await;
        lists
            .non_gossiped
            .get_by_height(height)
            .iter()
            .chain(lists.gossiped.get_by_height(height))
            .cloned()
            .collect()
    }

    pub async fn counts(&self) -> CommitCounts {
        let lists = self.lists.read().await;
        CommitCounts {
            non_gossiped: lists.non_gossiped.size(),
            gossiped: lists.gossiped.size(),
        }
    }

    /// Aggregate commits of one height, the height of the first commit.
    /// The result does not depend on the order of `commits`.
    pub async fn aggregate_single_commits(
        &self,
        commits: &[SingleCommit],
    ) -> Result<AggregateCommit, ConsensusError> {
        let Some(first) = commits.first() else {
            return Err(ConsensusError::EmptyCommits);
        };
        let height = first.height;
        let params = self.bft.get_bft_parameters(height).await?;

        let mut keys: Vec<BlsPublicKey> = params.validators.iter().map(|v| v.bls_key).collect();
        let mut pairs: Vec<(BlsPublicKey, BlsSignature)> = commits
            .iter()
            .map(|commit| {
                params
                    .validator(&commit.validator_address)
                    .map(|v| (v.bls_key, commit.certificate_signature))
                    .ok_or_else(|| ConsensusError::MissingBlsKey(commit.validator_address.to_hex()))
            })
            .collect::<Result<_, _>>()?;
        keys.sort();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let (aggregation_bits, signature) = bls::create_aggregate(&keys, &pairs)?;
        Ok(AggregateCommit {
            height,
            aggregation_bits,
            certificate_signature: signature.to_vec(),
        })
    }

    pub async fn verify_aggregate_commit(
        &self,
        aggregate_commit: &AggregateCommit,
    ) -> Result<bool, ConsensusError> {
        let heights = self.bft.get_bft_heights().await?;
        let height = aggregate_commit.height;

        if aggregate_commit.is_empty() && height == heights.max_height_certified {
            return Ok(true);
        }
        if aggregate_commit.aggregation_bits.is_empty()
            || aggregate_commit.certificate_signature.is_empty()
        {
            return Ok(false);
        }
        if height <= heights.max_height_certified || height > heights.max_height_precommitted {
            return Ok(false);
        }
        match self
            .bft
            .get_next_height_bft_parameters(heights.max_height_certified + 1)
            .await
        {
            Ok(next) if height > next.saturating_sub(1) => return Ok(false),
            Ok(_) | Err(BftError::ParametersNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let Some(header) = self.chain.read().await.header_by_height(height)? else {
            return Ok(false);
        };
        let certificate = Certificate::from_header(&header).with_proof(
            aggregate_commit.aggregation_bits.clone(),
            aggregate_commit.certificate_signature.clone(),
        );

        // keys as registered in the parameters of this height
        let params = self.bft.get_bft_parameters(height).await?;
        let keys_and_weights: Vec<(BlsPublicKey, u64)> = params
            .validators
            .iter()
            .map(|v| (v.bls_key, v.bft_weight))
            .collect();

        Ok(certificate.verify_aggregate(
            &keys_and_weights,
            params.certificate_threshold,
            self.config.chain_id,
        ))
    }

    /// Aggregate for the highest height in reach whose commits carry the
    /// certificate threshold, or the empty aggregate at max height certified.
    pub async fn get_aggregate_commit(&self) -> Result<AggregateCommit, ConsensusError> {
        let heights = self.bft.get_bft_heights().await?;
        let certified = heights.max_height_certified;
        let ceiling = match self.bft.get_next_height_bft_parameters(certified + 1).await {
            Ok(next) => next.saturating_sub(1).min(heights.max_height_precommitted),
            Err(BftError::ParametersNotFound(_)) => heights.max_height_precommitted,
            Err(e) => return Err(e.into()),
        };

        let mut candidates: Vec<u64> = {
            let lists = self.lists.read().await;
            let stored: HashSet<u64> = lists
                .non_gossiped
                .heights()
                .into_iter()
                .chain(lists.gossiped.heights())
                .collect();
            stored
                .into_iter()
                .filter(|h| *h > certified && *h <= ceiling)
                .collect()
        };
        candidates.sort_unstable_by(|a, b| b.cmp(a));

        for height in candidates {
            let params = self.bft.get_bft_parameters(height).await?;
            let mut voters = HashSet::new();
            let mut weight: u64 = 0;
            let mut commits = Vec::new();
            for commit in self.get_commits_by_height(height).await {
                if !voters.insert(commit.validator_address) {
                    continue;
                }
                let validator = params.validator(&commit.validator_address).ok_or_else(|| {
                    ConsensusError::InactiveValidator {
                        address: commit.validator_address.to_hex(),
                        height,
                    }
                })?;
                weight = weight.saturating_add(validator.bft_weight);
                commits.push(commit);
            }

            if !commits.is_empty() && weight >= params.certificate_threshold {
                debug!(
                    "Selected aggregate commit at height {} with weight {}",
                    height, weight
                );
                return self.aggregate_single_commits(&commits).await;
            }
        }

        Ok(AggregateCommit::empty(certified))
    }

    /// Height of the aggregate commit carried by the finalized block
    pub async fn removal_height(&self) -> Result<u64, ConsensusError> {
        let chain = self.chain.read().await;
        let finalized = chain.finalized_height();
        let header = chain
            .header_by_height(finalized)?
            .ok_or(ConsensusError::HeaderNotFound(finalized))?;
        Ok(header.aggregate_commit.height)
    }

    async fn is_retained(
        &self,
        height: u64,
        removal_height: u64,
        max_height_precommitted: u64,
    ) -> Result<bool, ConsensusError> {
        if height <= removal_height {
            return Ok(false);
        }
        let window_start = max_height_precommitted.saturating_sub(self.config.commit_range_stored);
        if height >= window_start && height <= max_height_precommitted {
            return Ok(true);
        }
        Ok(self.bft.exist_bft_parameters(height + 1).await?)
    }

    /// Prune, select and gossip. A run that overlaps a running one is skipped.
    pub async fn run_job(&self) -> Result<(), ConsensusError> {
        if self.job_running.swap(true, Ordering::AcqRel) {
            debug!("Commit pool job still running, skipping");
            return Ok(());
        }
        let _guard = JobGuard(&self.job_running);
        self.job().await
    }

    async fn job(&self) -> Result<(), ConsensusError> {
        let removal_height = self.removal_height().await?;
        let max_height_precommitted = self.bft.get_bft_heights().await?.max_height_precommitted;

        let stored: Vec<u64> = {
            let lists = self.lists.read().await;
            let mut heights = lists.non_gossiped.heights();
            heights.extend(lists.gossiped.heights());
            heights.sort_unstable();
            heights.dedup();
            heights
        };
        let mut expired = Vec::new();
        for height in stored {
            if !self
                .is_retained(height, removal_height, max_height_precommitted)
                .await?
            {
                expired.push(height);
            }
        }

        let next_height = self.chain.read().await.last_block()?.height() + 1;
        let target = self.bft.get_bft_parameters(next_height).await?.validators.len();
        let window_start = max_height_precommitted.saturating_sub(self.config.commit_range_stored);

        let selected = {
            let mut lists = self.lists.write().await;
            for height in &expired {
                lists.non_gossiped.delete_by_height(*height);
                lists.gossiped.delete_by_height(*height);
            }
            self.select_gossip(&mut lists, window_start, target)
        };
        if !expired.is_empty() {
            debug!(
                "Pruned commits at {} heights, removal height {}",
                expired.len(),
                removal_height
            );
        }

        let packet = SingleCommitsPacket {
            commits: selected
                .iter()
                .map(|commit| serialize::to_bytes(commit))
                .collect::<Result<_, _>>()?,
        };
        self.network
            .send(NETWORK_EVENT_POST_SINGLE_COMMITS, serialize::to_bytes(&packet)?)
            .await?;
        debug!("Gossiped {} single commits", selected.len());
        Ok(())
    }

    fn select_gossip(
        &self,
        lists: &mut CommitLists,
        window_start: u64,
        target: usize,
    ) -> Vec<SingleCommit> {
        let mut selected: Vec<SingleCommit> = lists
            .gossiped
            .all()
            .chain(lists.non_gossiped.all())
            .filter(|c| c.height < window_start)
            .cloned()
            .collect();
        selected.sort_by_key(|c| c.height);
        selected.truncate(target);

        let mut pending: Vec<SingleCommit> = lists
            .non_gossiped
            .all()
            .filter(|c| c.height >= window_start)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.height.cmp(&a.height));
        let (local, others): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|c| self.config.local_validators.contains(&c.validator_address));

        for commit in local.into_iter().chain(others) {
            if selected.len() >= target {
                break;
            }
            selected.push(commit);
        }

        for commit in &selected {
            lists.promote(commit);
        }
        selected
    }
}

use concord_core::BlockHeader;

/// Classification of a candidate block relative to the current tip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkStatus {
    IdenticalBlock,
    ValidBlock,
    DoubleForging,
    TieBreak,
    DifferentChain,
    Discard,
}

/// Local receive times (unix seconds) fed into the fork choice
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiveTimes {
    pub candidate: u64,
    /// None when the tip was loaded from storage rather than received
    pub tip: Option<u64>,
}

pub trait ForkChoice: Send + Sync {
    fn fork_status(
        &self,
        candidate: &BlockHeader,
        tip: &BlockHeader,
        received: ReceiveTimes,
    ) -> ForkStatus;
}

/// Slot based fork choice rule; a slot lasts one block time
#[derive(Debug, Clone)]
pub struct SlotForkChoice {
    block_time: u64,
}

impl SlotForkChoice {
    pub fn new(block_time: u64) -> Self {
        SlotForkChoice {
            block_time: block_time.max(1),
        }
    }

    fn slot(&self, timestamp: u64) -> u64 {
        timestamp / self.block_time
    }

    fn received_within_slot(&self, header: &BlockHeader, received_at: Option<u64>) -> bool {
        received_at.is_some_and(|at| self.slot(at) == self.slot(header.timestamp))
    }
}

fn is_valid_block(candidate: &BlockHeader, tip: &BlockHeader) -> bool {
    candidate.height == tip.height + 1 && candidate.previous_block_id == tip.id
}

fn is_duplicate_block(candidate: &BlockHeader, tip: &BlockHeader) -> bool {
    candidate.height == tip.height
        && candidate.max_height_prevoted == tip.max_height_prevoted
        && candidate.previous_block_id == tip.previous_block_id
}

fn is_different_chain(candidate: &BlockHeader, tip: &BlockHeader) -> bool {
    tip.max_height_prevoted < candidate.max_height_prevoted
        || (tip.max_height_prevoted == candidate.max_height_prevoted && tip.height < candidate.height)
}

impl ForkChoice for SlotForkChoice {
    fn fork_status(
        &self,
        candidate: &BlockHeader,
        tip: &BlockHeader,
        received: ReceiveTimes,
    ) -> ForkStatus {
        if candidate.id == tip.id {
            return ForkStatus::IdenticalBlock;
        }
        if is_valid_block(candidate, tip) {
            return ForkStatus::ValidBlock;
        }
        if is_duplicate_block(candidate, tip) {
            if candidate.generator_address == tip.generator_address {
                return ForkStatus::DoubleForging;
            }
            if self.slot(tip.timestamp) < self.slot(candidate.timestamp)
                && !self.received_within_slot(tip, received.tip)
                && self.received_within_slot(candidate, Some(received.candidate))
            {
                return ForkStatus::TieBreak;
            }
        }
        if is_different_chain(candidate, tip) {
            return ForkStatus::DifferentChain;
        }
        ForkStatus::Discard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{hash_blake3, AggregateCommit, Address, Hash, PublicKey, Sig, BLOCK_VERSION};

    fn header(height: u64, timestamp: u64, previous: Hash, generator: u8) -> BlockHeader {
        let mut header = BlockHeader {
            version: BLOCK_VERSION,
            height,
            timestamp,
            previous_block_id: previous,
            generator_address: Address([generator; 20]),
            generator_public_key: PublicKey::default(),
            reward: 0,
            transaction_root: Hash::ZERO,
            state_root: Hash::ZERO,
            validators_hash: Hash::ZERO,
            max_height_prevoted: 5,
            max_height_generated: 0,
            aggregate_commit: AggregateCommit::empty(0),
            signature: Sig::default(),
            id: Hash::ZERO,
        };
        header.id = header.compute_id().unwrap();
        header
    }

    fn received(candidate: u64, tip: Option<u64>) -> ReceiveTimes {
        ReceiveTimes { candidate, tip }
    }

    #[test]
    fn test_identical_and_valid() {
        let fork_choice = SlotForkChoice::new(10);
        let tip = header(10, 100, hash_blake3(b"parent"), 1);
        let next = header(11, 110, tip.id, 2);

        assert_eq!(
            fork_choice.fork_status(&tip, &tip, received(100, Some(100))),
            ForkStatus::IdenticalBlock
        );
        assert_eq!(
            fork_choice.fork_status(&next, &tip, received(110, Some(100))),
            ForkStatus::ValidBlock
        );
    }

    #[test]
    fn test_double_forging_same_generator() {
        let fork_choice = SlotForkChoice::new(10);
        let parent = hash_blake3(b"parent");
        let tip = header(10, 100, parent, 1);
        let conflicting = header(10, 101, parent, 1);

        assert_eq!(
            fork_choice.fork_status(&conflicting, &tip, received(101, Some(100))),
            ForkStatus::DoubleForging
        );
    }

    #[test]
    fn test_tie_break_requires_late_tip() {
        let fork_choice = SlotForkChoice::new(10);
        let parent = hash_blake3(b"parent");
        let tip = header(10, 100, parent, 1);
        let candidate = header(10, 110, parent, 2);

        // tip arrived one slot late, candidate on time
        assert_eq!(
            fork_choice.fork_status(&candidate, &tip, received(112, Some(111))),
            ForkStatus::TieBreak
        );
        // tip arrived on time
        assert_eq!(
            fork_choice.fork_status(&candidate, &tip, received(112, Some(105))),
            ForkStatus::Discard
        );
        // candidate late
        assert_eq!(
            fork_choice.fork_status(&candidate, &tip, received(125, Some(111))),
            ForkStatus::Discard
        );
    }

    #[test]
    fn test_different_chain_and_discard() {
        let fork_choice = SlotForkChoice::new(10);
        let tip = header(10, 100, hash_blake3(b"parent"), 1);

        let mut higher = header(15, 150, hash_blake3(b"other"), 2);
        higher.max_height_prevoted = 6;
        assert_eq!(
            fork_choice.fork_status(&higher, &tip, received(150, None)),
            ForkStatus::DifferentChain
        );

        let taller = header(12, 120, hash_blake3(b"other"), 2);
        assert_eq!(
            fork_choice.fork_status(&taller, &tip, received(120, None)),
            ForkStatus::DifferentChain
        );

        let stale = header(8, 80, hash_blake3(b"other"), 2);
        assert_eq!(
            fork_choice.fork_status(&stale, &tip, received(120, None)),
            ForkStatus::Discard
        );
    }
}

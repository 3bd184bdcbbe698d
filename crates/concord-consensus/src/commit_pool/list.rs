use std::collections::BTreeMap;

use concord_core::SingleCommit;

/// Single commits indexed by height, insertion order kept per height
#[derive(Debug, Default)]
pub(crate) struct CommitList {
    commits: BTreeMap<u64, Vec<SingleCommit>>,
}

impl CommitList {
    pub(crate) fn get_by_height(&self, height: u64) -> &[SingleCommit] {
        self.commits.get(&height).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Same vote (validator and block) or the very same signature
    pub(crate) fn exists(&self, commit: &SingleCommit) -> bool {
        self.get_by_height(commit.height).iter().any(|c| {
            (c.validator_address == commit.validator_address && c.block_id == commit.block_id)
                || c.certificate_signature == commit.certificate_signature
        })
    }

    pub(crate) fn add(&mut self, commit: SingleCommit) {
        self.commits.entry(commit.height).or_default().push(commit);
    }

    pub(crate) fn delete_single(&mut self, commit: &SingleCommit) {
        if let Some(list) = self.commits.get_mut(&commit.height) {
            list.retain(|c| c != commit);
            if list.is_empty() {
                self.commits.remove(&commit.height);
            }
        }
    }

    pub(crate) fn delete_by_height(&mut self, height: u64) {
        self.commits.remove(&height);
    }

    pub(crate) fn heights(&self) -> Vec<u64> {
        self.commits.keys().copied().collect()
    }

    /// All commits in ascending height order
    pub(crate) fn all(&self) -> impl Iterator<Item = &SingleCommit> {
        self.commits.values().flatten()
    }

    pub(crate) fn size(&self) -> usize {
        self.commits.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{hash_blake3, Address, BlsSignature};

    fn commit(height: u64, validator: u8, sig: u8) -> SingleCommit {
        SingleCommit {
            block_id: hash_blake3(&height.to_be_bytes()),
            height,
            validator_address: Address([validator; 20]),
            certificate_signature: BlsSignature([sig; 96]),
        }
    }

    #[test]
    fn test_exists_matches_vote_or_signature() {
        let mut list = CommitList::default();
        list.add(commit(10, 1, 1));

        assert!(list.exists(&commit(10, 1, 9)));
        assert!(list.exists(&commit(10, 2, 1)));
        assert!(!list.exists(&commit(10, 2, 2)));
        assert!(!list.exists(&commit(11, 1, 9)));
    }

    #[test]
    fn test_delete_keeps_order() {
        let mut list = CommitList::default();
        list.add(commit(12, 1, 1));
        list.add(commit(10, 1, 2));
        list.add(commit(10, 2, 3));
        list.add(commit(10, 3, 4));

        list.delete_single(&commit(10, 2, 3));
        let validators: Vec<u8> = list
            .get_by_height(10)
            .iter()
            .map(|c| c.validator_address.0[0])
            .collect();
        assert_eq!(validators, vec![1, 3]);
        assert_eq!(list.heights(), vec![10, 12]);

        list.delete_by_height(10);
        assert_eq!(list.size(), 1);
        assert_eq!(list.all().next().map(|c| c.height), Some(12));
    }
}

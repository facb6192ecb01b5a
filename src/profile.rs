// CLASSIFICATION: COMMUNITY
// Filename: profile.rs v0.2
// Date Modified: 2026-07-20
// Author: Lukas Bower

//! PCR protection profile accumulator.
//!
//! A profile is the ordered list of PCR operations that the sealed-key
//! policy will be bound to. The policy services append operations for the
//! PCRs they model; the final values can be computed for logging and for
//! handing to the TPM service.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Digest algorithm of a profile operation. Only SHA-256 is in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PcrAlg {
    /// SHA-256.
    Sha256,
}

impl PcrAlg {
    /// Digest size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Sha256 => 32,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ProfileOp {
    AddValue {
        alg: PcrAlg,
        pcr: u32,
        value: Vec<u8>,
    },
    Extend {
        alg: PcrAlg,
        pcr: u32,
        digest: Vec<u8>,
    },
}

/// Ordered PCR operations describing one policy branch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PcrProtectionProfile {
    ops: Vec<ProfileOp>,
}

impl PcrProtectionProfile {
    /// An empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a PCR to an explicit value.
    pub fn add_pcr_value(&mut self, alg: PcrAlg, pcr: u32, value: Vec<u8>) {
        self.ops.push(ProfileOp::AddValue { alg, pcr, value });
    }

    /// Extend a PCR: `new = H(old || digest)`.
    pub fn extend_pcr(&mut self, alg: PcrAlg, pcr: u32, digest: Vec<u8>) {
        self.ops.push(ProfileOp::Extend { alg, pcr, digest });
    }

    /// The PCR indices this profile touches, sorted and deduplicated.
    pub fn pcr_selection(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .ops
            .iter()
            .map(|op| match op {
                ProfileOp::AddValue { pcr, .. } | ProfileOp::Extend { pcr, .. } => *pcr,
            })
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Replay the operations into final PCR values. An extend of a PCR that
    /// was never set starts from all zeroes, as after a TPM reset.
    pub fn compute_pcr_values(&self) -> BTreeMap<(PcrAlg, u32), Vec<u8>> {
        let mut values: BTreeMap<(PcrAlg, u32), Vec<u8>> = BTreeMap::new();
        for op in &self.ops {
            match op {
                ProfileOp::AddValue { alg, pcr, value } => {
                    values.insert((*alg, *pcr), value.clone());
                }
                ProfileOp::Extend { alg, pcr, digest } => {
                    let current = values
                        .entry((*alg, *pcr))
                        .or_insert_with(|| vec![0u8; alg.size()]);
                    let mut hasher = Sha256::new();
                    hasher.update(current.as_slice());
                    hasher.update(digest);
                    *current = hasher.finalize().to_vec();
                }
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha256(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    #[test]
    fn extend_starts_from_zeroes() {
        let mut profile = PcrProtectionProfile::new();
        let digest = sha256(b"event");
        profile.extend_pcr(PcrAlg::Sha256, 4, digest.clone());

        let mut expected = vec![0u8; 32];
        expected.extend_from_slice(&digest);
        let values = profile.compute_pcr_values();
        assert_eq!(values[&(PcrAlg::Sha256, 4)], sha256(&expected));
    }

    #[test]
    fn add_value_resets_the_slot() {
        let mut profile = PcrProtectionProfile::new();
        profile.extend_pcr(PcrAlg::Sha256, 12, sha256(b"before"));
        profile.add_pcr_value(PcrAlg::Sha256, 12, vec![0u8; 32]);
        profile.extend_pcr(PcrAlg::Sha256, 12, sha256(b"after"));

        let mut expected = vec![0u8; 32];
        expected.extend_from_slice(&sha256(b"after"));
        let values = profile.compute_pcr_values();
        assert_eq!(values[&(PcrAlg::Sha256, 12)], sha256(&expected));
    }

    #[test]
    fn selection_is_sorted_and_unique() {
        let mut profile = PcrProtectionProfile::new();
        profile.add_pcr_value(PcrAlg::Sha256, 7, vec![0u8; 32]);
        profile.add_pcr_value(PcrAlg::Sha256, 4, vec![0u8; 32]);
        profile.extend_pcr(PcrAlg::Sha256, 7, sha256(b"x"));
        profile.add_pcr_value(PcrAlg::Sha256, 12, vec![0u8; 32]);
        assert_eq!(profile.pcr_selection(), [4, 7, 12]);
    }
}

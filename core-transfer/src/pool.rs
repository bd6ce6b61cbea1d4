//! Identity pool used to escape per-identity rate limits.

use crate::{Result, TransferError};
use core_auth::Identity;
use rand::Rng;
use tracing::{debug, warn};

/// Ordered identities with a cursor and a rotation budget.
///
/// A pool lives for one job. Starting from a random identity, `size`
/// successive rotations visit every identity once; the next one fails with
/// [`TransferError::PoolExhausted`].
#[derive(Debug, Clone)]
pub struct ServiceAccountPool {
    identities: Vec<Identity>,
    index: usize,
    rotations: usize,
}

impl ServiceAccountPool {
    /// Create a pool starting at a random identity.
    pub fn new(identities: Vec<Identity>) -> Result<Self> {
        if identities.is_empty() {
            return Err(TransferError::Config(
                "Identity pool requires at least one identity".to_string(),
            ));
        }
        let start = rand::thread_rng().gen_range(0..identities.len());
        Self::with_start_index(identities, start)
    }

    pub fn with_start_index(identities: Vec<Identity>, start: usize) -> Result<Self> {
        if start >= identities.len() {
            return Err(TransferError::Config(format!(
                "Start index {} is outside a pool of {} identities",
                start,
                identities.len()
            )));
        }
        debug!(size = identities.len(), start, "Created identity pool");
        Ok(Self {
            identities,
            index: start,
            rotations: 0,
        })
    }

    pub fn current(&self) -> &Identity {
        &self.identities[self.index]
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn rotations(&self) -> usize {
        self.rotations
    }

    /// Advance to the next identity.
    pub fn rotate(&mut self) -> Result<&Identity> {
        if self.rotations >= self.identities.len() {
            warn!(size = self.identities.len(), "Identity pool exhausted");
            return Err(TransferError::PoolExhausted {
                pool_size: self.identities.len(),
            });
        }

        self.index = (self.index + 1) % self.identities.len();
        self.rotations += 1;
        debug!(
            identity = %self.identities[self.index],
            rotations = self.rotations,
            "Rotated identity"
        );
        Ok(&self.identities[self.index])
    }
}

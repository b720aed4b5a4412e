// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BLOCK ARCHIVE
//
// The real archive/index is an external collaborator (spec.md §1, §6).
// `NullArchive` drops everything it's handed; it exists so the node can
// run without a separate archive product.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::NodeError;
use pactum_chain::Block;
use pactum_crypto::Token;

/// Requests a replay of matching actions from the archive, as described
/// in spec.md §6. `keep_alive = false` means the archive should close
/// the stream with a trailing 8-byte end-epoch marker once it has
/// caught up to `from_epoch`.
pub struct NewIndexJob {
    pub conn: Token,
    pub tokens: Vec<Token>,
    pub from_epoch: u64,
    pub keep_alive: bool,
}

pub trait BlockArchiveSink: Send + Sync {
    fn append_block(&self, block: &Block);
    fn append_job(&self, job: NewIndexJob) -> Result<(), NodeError>;
    fn close(&self);
}

#[derive(Default)]
pub struct NullArchive;

impl BlockArchiveSink for NullArchive {
    fn append_block(&self, block: &Block) {
        tracing::debug!(epoch = block.epoch, "null archive discarding committed block");
    }

    fn append_job(&self, job: NewIndexJob) -> Result<(), NodeError> {
        if job.tokens.is_empty() {
            return Err(NodeError::Archive("index job named no tokens to replay".to_string()));
        }
        tracing::debug!(conn = ?job.conn, from_epoch = job.from_epoch, "null archive discarding index job");
        Ok(())
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactum_crypto::{PrivateKey, ZERO_HASH};

    #[test]
    fn null_archive_accepts_blocks_and_jobs_without_error() {
        let archive = NullArchive;
        let proposer = PrivateKey::generate();
        let block = Block::new(0, 1, 0, ZERO_HASH, proposer.public_key(), None, ZERO_HASH);
        archive.append_block(&block);

        let job = NewIndexJob { conn: proposer.public_key(), tokens: vec![proposer.public_key()], from_epoch: 0, keep_alive: false };
        archive.append_job(job).unwrap();
        archive.close();
    }

    #[test]
    fn null_archive_rejects_a_job_naming_no_tokens() {
        let archive = NullArchive;
        let proposer = PrivateKey::generate();
        let job = NewIndexJob { conn: proposer.public_key(), tokens: vec![], from_epoch: 0, keep_alive: false };
        assert!(matches!(archive.append_job(job), Err(NodeError::Archive(_))));
    }
}

//! Execution of an approved proposal, either as one atomic call or one
//! instruction at a time behind a monotonically advancing cursor.
//!
//! Transport and signing stay behind the [`Submitter`] trait; instruction
//! addresses come from the [`AddressDeriver`] trait. Both are pure seams:
//! the executor itself never does I/O and never blocks.

use solana_program::pubkey::Pubkey;

use crate::dedup::{dedupe, ExecuteStep};
use crate::error::EngineError;
use crate::state::{AccountMetaEntry, Proposal, ProposalStatus};

/// Seed tag under which attached instructions are derived from their
/// proposal address.
pub const INSTRUCTION_SEED: &[u8] = b"instruction";

/// Accepts one compiled call for submission. Implementations wrap the
/// actual transport; a failed submission must report the failure verbatim
/// and must be safe to retry.
pub trait Submitter {
    fn submit(
        &mut self,
        program_id: &Pubkey,
        accounts: &[AccountMetaEntry],
        data: &[u8],
    ) -> Result<(), EngineError>;
}

/// Deterministically derives a child address from a seed tag, a parent
/// address and an index.
pub trait AddressDeriver {
    fn derive(&self, seed_tag: &[u8], parent: &Pubkey, index: u32) -> Pubkey;
}

pub struct Executor<S, D> {
    /// Program the atomic execution call is addressed to.
    pub program_id: Pubkey,
    pub submitter: S,
    pub deriver: D,
}

impl<S: Submitter, D: AddressDeriver> Executor<S, D> {
    pub fn new(program_id: Pubkey, submitter: S, deriver: D) -> Self {
        Self {
            program_id,
            submitter,
            deriver,
        }
    }

    /// Executes every attached instruction in a single call.
    ///
    /// The call's data is the V1 index map over the combined deduplicated
    /// account list, its account list is that unique list. All-or-nothing:
    /// on failure the proposal (including its cursor) is left untouched.
    pub fn execute_atomic(
        &mut self,
        proposal: &mut Proposal,
        transaction_address: &Pubkey,
    ) -> Result<(), EngineError> {
        if proposal.status != ProposalStatus::ExecuteReady {
            return Err(EngineError::InvalidState);
        }

        let steps: Vec<ExecuteStep<'_>> = proposal
            .instructions
            .iter()
            .map(|record| ExecuteStep {
                instruction_address: self.deriver.derive(
                    INSTRUCTION_SEED,
                    transaction_address,
                    u32::from(record.index),
                ),
                record,
            })
            .collect();
        let unique = dedupe(&steps);
        let index_map: Vec<u8> = unique
            .index_map
            .iter()
            .map(|&index| u8::try_from(index).map_err(|_| EngineError::TooManyAccounts))
            .collect::<Result<Vec<u8>, EngineError>>()?;

        self.submitter
            .submit(&self.program_id, &unique.accounts, &index_map)?;

        proposal.record_atomic_execution()?;
        log::debug!(
            "proposal {} executed atomically over {} unique accounts",
            proposal.transaction_index,
            unique.accounts.len()
        );
        Ok(())
    }

    /// Executes exactly the instruction after the current cursor and
    /// advances it by one. A failed submission leaves the cursor where it
    /// was, so the retry resumes at the failed step; already-applied steps
    /// are never rolled back.
    pub fn execute_next(&mut self, proposal: &mut Proposal) -> Result<u8, EngineError> {
        if proposal.status != ProposalStatus::ExecuteReady {
            return Err(EngineError::InvalidState);
        }
        // Authority 0 is reserved for internal calls and cannot be
        // executed step by step.
        if proposal.authority_index == 0 {
            return Err(EngineError::InvalidAuthorityIndex);
        }

        let next = proposal.executed_index + 1;
        let (program_id, keys, data) = {
            let record = proposal
                .instruction(next)
                .ok_or(EngineError::InvalidInstructionIndex)?;
            (record.program_id, record.keys.clone(), record.data.clone())
        };

        self.submitter.submit(&program_id, &keys, &data)?;

        proposal.record_execution(next)?;
        log::debug!(
            "proposal {} executed step {}/{}",
            proposal.transaction_index,
            next,
            proposal.instruction_count
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{InstructionPayload, Multisig};
    use solana_program::hash::hashv;

    /// Derives by hashing, deterministic and collision-free enough for tests.
    struct HashDeriver;

    impl AddressDeriver for HashDeriver {
        fn derive(&self, seed_tag: &[u8], parent: &Pubkey, index: u32) -> Pubkey {
            let digest = hashv(&[seed_tag, parent.as_ref(), &index.to_le_bytes()]);
            Pubkey::from(digest.to_bytes())
        }
    }

    #[derive(Default)]
    struct RecordingSubmitter {
        calls: Vec<(Pubkey, Vec<AccountMetaEntry>, Vec<u8>)>,
        failures_left: usize,
    }

    impl Submitter for RecordingSubmitter {
        fn submit(
            &mut self,
            program_id: &Pubkey,
            accounts: &[AccountMetaEntry],
            data: &[u8],
        ) -> Result<(), EngineError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(EngineError::Submission("insufficient funds".into()));
            }
            self.calls
                .push((*program_id, accounts.to_vec(), data.to_vec()));
            Ok(())
        }
    }

    fn ready_proposal(steps: usize) -> (Multisig, Proposal) {
        let member = Pubkey::new_unique();
        let ms = Multisig::new(1, vec![member]).unwrap();
        let mut proposal = Proposal::new(member, Pubkey::new_unique(), 1, 1);
        for _ in 0..steps {
            proposal
                .add_instruction(InstructionPayload {
                    program_id: Pubkey::new_unique(),
                    keys: vec![
                        AccountMetaEntry::new(Pubkey::new_unique(), false, true),
                        AccountMetaEntry::new(Pubkey::new_unique(), false, false),
                    ],
                    data: vec![1, 2, 3],
                })
                .unwrap();
        }
        proposal.activate().unwrap();
        proposal.approve(&ms, member).unwrap();
        (ms, proposal)
    }

    fn executor() -> Executor<RecordingSubmitter, HashDeriver> {
        Executor::new(Pubkey::new_unique(), RecordingSubmitter::default(), HashDeriver)
    }

    #[test]
    fn atomic_execution_submits_index_map_and_unique_accounts() {
        let (_, mut proposal) = ready_proposal(2);
        let transaction_address = Pubkey::new_unique();
        let mut exec = executor();

        exec.execute_atomic(&mut proposal, &transaction_address)
            .unwrap();

        assert_eq!(proposal.status, ProposalStatus::Executed);
        assert_eq!(proposal.executed_index, 2);
        assert!(proposal.instructions.iter().all(|record| record.executed));

        let (program_id, accounts, data) = &exec.submitter.calls[0];
        assert_eq!(*program_id, exec.program_id);
        // Two steps, four distinct keys plus derived address and program
        // per step: 8 unique accounts, 8 references.
        assert_eq!(accounts.len(), 8);
        assert_eq!(data.len(), 8);
        assert!(data
            .iter()
            .all(|&index| usize::from(index) < accounts.len()));
    }

    #[test]
    fn atomic_failure_leaves_proposal_untouched() {
        let (_, mut proposal) = ready_proposal(2);
        let before = proposal.clone();
        let mut exec = executor();
        exec.submitter.failures_left = 1;

        let err = exec
            .execute_atomic(&mut proposal, &Pubkey::new_unique())
            .unwrap_err();

        assert_eq!(err, EngineError::Submission("insufficient funds".into()));
        assert_eq!(proposal, before);
    }

    #[test]
    fn atomic_execution_requires_execute_ready() {
        let mut proposal = Proposal::new(Pubkey::new_unique(), Pubkey::new_unique(), 1, 1);
        let mut exec = executor();
        assert_eq!(
            exec.execute_atomic(&mut proposal, &Pubkey::new_unique()),
            Err(EngineError::InvalidState)
        );
    }

    #[test]
    fn per_step_execution_retries_at_the_failed_step() {
        let (_, mut proposal) = ready_proposal(3);
        let mut exec = executor();

        assert_eq!(exec.execute_next(&mut proposal).unwrap(), 1);
        assert_eq!(proposal.executed_index, 1);
        assert_eq!(proposal.status, ProposalStatus::ExecuteReady);

        exec.submitter.failures_left = 1;
        let err = exec.execute_next(&mut proposal).unwrap_err();
        assert_eq!(err, EngineError::Submission("insufficient funds".into()));
        // Step 1 stays applied, the cursor stays at the failed step.
        assert_eq!(proposal.executed_index, 1);

        assert_eq!(exec.execute_next(&mut proposal).unwrap(), 2);
        assert_eq!(exec.execute_next(&mut proposal).unwrap(), 3);
        assert_eq!(proposal.status, ProposalStatus::Executed);
        assert_eq!(
            exec.execute_next(&mut proposal),
            Err(EngineError::InvalidState)
        );
    }

    #[test]
    fn per_step_submits_the_recorded_instruction() {
        let (_, mut proposal) = ready_proposal(1);
        let mut exec = executor();

        exec.execute_next(&mut proposal).unwrap();

        let record = proposal.instruction(1).unwrap();
        let (program_id, accounts, data) = &exec.submitter.calls[0];
        assert_eq!(program_id, &record.program_id);
        assert_eq!(accounts, &record.keys);
        assert_eq!(data, &record.data);
    }

    #[test]
    fn per_step_refuses_internal_authority() {
        let (ms, _) = ready_proposal(1);
        let member = ms.members[0];
        let mut proposal = Proposal::new(member, Pubkey::new_unique(), 2, 0);
        proposal
            .add_instruction(InstructionPayload {
                program_id: Pubkey::new_unique(),
                keys: vec![],
                data: vec![],
            })
            .unwrap();
        proposal.activate().unwrap();
        proposal.approve(&ms, member).unwrap();

        let mut exec = executor();
        assert_eq!(
            exec.execute_next(&mut proposal),
            Err(EngineError::InvalidAuthorityIndex)
        );
    }
}

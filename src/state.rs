use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;

use crate::error::EngineError;

/// One account reference inside an instruction: address plus privilege flags.
#[derive(BorshSerialize, BorshDeserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccountMetaEntry {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMetaEntry {
    pub fn new(pubkey: Pubkey, is_signer: bool, is_writable: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable,
        }
    }

    /// A non-signer, read-only reference. Program ids and derived
    /// instruction addresses are always referenced this way.
    pub fn readonly(pubkey: Pubkey) -> Self {
        Self::new(pubkey, false, false)
    }
}

/// The raw shape of an instruction before it is attached to a proposal
/// or compiled into a message.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct InstructionPayload {
    pub program_id: Pubkey,
    pub keys: Vec<AccountMetaEntry>,
    pub data: Vec<u8>,
}

/// An instruction attached to a proposal. `index` is 1-based and assigned
/// at attach time; `executed` flips exactly once during per-step execution.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct InstructionRecord {
    pub index: u8,
    pub program_id: Pubkey,
    pub keys: Vec<AccountMetaEntry>,
    pub data: Vec<u8>,
    pub executed: bool,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProposalStatus {
    Draft,
    Active,
    ExecuteReady,
    Executed,
    Rejected,
    Cancelled,
}

/// The multisig a proposal belongs to. Members are kept sorted so
/// membership checks are a binary search.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Multisig {
    pub threshold: u16,
    pub transaction_index: u32,
    pub members: Vec<Pubkey>,
}

impl Multisig {
    pub fn new(threshold: u16, mut members: Vec<Pubkey>) -> Result<Self, EngineError> {
        members.sort();
        members.dedup();
        if members.is_empty() {
            return Err(EngineError::EmptyMembers);
        }
        if usize::from(threshold) < 1 || usize::from(threshold) > members.len() {
            return Err(EngineError::InvalidThreshold);
        }
        Ok(Self {
            threshold,
            transaction_index: 0,
            members,
        })
    }

    pub fn is_member(&self, key: &Pubkey) -> bool {
        self.members.binary_search(key).is_ok()
    }

    /// Reserves and returns the index for the next proposal.
    pub fn next_transaction_index(&mut self) -> u32 {
        self.transaction_index = self.transaction_index.saturating_add(1);
        self.transaction_index
    }

    pub fn add_member(&mut self, new_member: Pubkey) {
        if let Err(pos) = self.members.binary_search(&new_member) {
            self.members.insert(pos, new_member);
        }
    }

    /// Removes a member. The threshold is clamped down when the member
    /// count falls below it, so the multisig never becomes unexecutable.
    pub fn remove_member(&mut self, old_member: &Pubkey) -> Result<(), EngineError> {
        if self.members.len() == 1 {
            return Err(EngineError::CannotRemoveSoloMember);
        }
        let pos = self
            .members
            .binary_search(old_member)
            .map_err(|_| EngineError::KeyNotInMultisig)?;
        self.members.remove(pos);
        if self.members.len() < usize::from(self.threshold) {
            self.threshold = self.members.len() as u16;
        }
        Ok(())
    }

    pub fn change_threshold(&mut self, new_threshold: u16) -> Result<(), EngineError> {
        if new_threshold < 1 {
            return Err(EngineError::InvalidThreshold);
        }
        if usize::from(new_threshold) > self.members.len() {
            self.threshold = self.members.len() as u16;
        } else {
            self.threshold = new_threshold;
        }
        Ok(())
    }
}

/// A multi-step transaction pending multi-party approval.
///
/// All mutation goes through the transition methods below; they check the
/// current status first and leave the record untouched on failure. A voter
/// key lives in at most one of `approved`/`rejected`/`cancelled` at any time:
/// every cast clears the other two sets before inserting.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub creator: Pubkey,
    pub multisig: Pubkey,
    pub transaction_index: u32,
    pub authority_index: u32,
    pub status: ProposalStatus,
    pub instruction_count: u8,
    pub instructions: Vec<InstructionRecord>,
    pub approved: Vec<Pubkey>,
    pub rejected: Vec<Pubkey>,
    pub cancelled: Vec<Pubkey>,
    pub executed_index: u8,
}

impl Proposal {
    pub fn new(
        creator: Pubkey,
        multisig: Pubkey,
        transaction_index: u32,
        authority_index: u32,
    ) -> Self {
        Self {
            creator,
            multisig,
            transaction_index,
            authority_index,
            status: ProposalStatus::Draft,
            instruction_count: 0,
            instructions: Vec::new(),
            approved: Vec::new(),
            rejected: Vec::new(),
            cancelled: Vec::new(),
            executed_index: 0,
        }
    }

    /// Attaches an instruction to a draft proposal and returns its
    /// 1-based index.
    pub fn add_instruction(&mut self, payload: InstructionPayload) -> Result<u8, EngineError> {
        if self.status != ProposalStatus::Draft {
            return Err(EngineError::InvalidState);
        }
        let index = self
            .instruction_count
            .checked_add(1)
            .ok_or(EngineError::InvalidInstructionIndex)?;
        self.instructions.push(InstructionRecord {
            index,
            program_id: payload.program_id,
            keys: payload.keys,
            data: payload.data,
            executed: false,
        });
        self.instruction_count = index;
        Ok(index)
    }

    /// Opens the proposal for voting.
    pub fn activate(&mut self) -> Result<(), EngineError> {
        if self.status != ProposalStatus::Draft {
            return Err(EngineError::InvalidState);
        }
        if self.instruction_count == 0 {
            return Err(EngineError::EmptyProposal);
        }
        self.status = ProposalStatus::Active;
        log::debug!(
            "proposal {} activated with {} instruction(s)",
            self.transaction_index,
            self.instruction_count
        );
        Ok(())
    }

    /// Casts an approval. Reaching the threshold flips the proposal to
    /// `ExecuteReady`. Approving twice is an idempotent success.
    pub fn approve(&mut self, ms: &Multisig, member: Pubkey) -> Result<ProposalStatus, EngineError> {
        if self.status != ProposalStatus::Active {
            return Err(EngineError::InvalidState);
        }
        if !ms.is_member(&member) {
            return Err(EngineError::KeyNotInMultisig);
        }
        Self::remove_vote(&mut self.rejected, &member);
        Self::remove_vote(&mut self.cancelled, &member);
        Self::insert_vote(&mut self.approved, member);

        if self.approved.len() >= usize::from(ms.threshold) {
            self.status = ProposalStatus::ExecuteReady;
            log::debug!("proposal {} reached approval threshold", self.transaction_index);
        }
        Ok(self.status)
    }

    /// Casts a rejection. Once approval becomes mathematically unreachable
    /// (rejections exceed members minus threshold) the proposal is `Rejected`.
    pub fn reject(&mut self, ms: &Multisig, member: Pubkey) -> Result<ProposalStatus, EngineError> {
        if self.status != ProposalStatus::Active {
            return Err(EngineError::InvalidState);
        }
        if !ms.is_member(&member) {
            return Err(EngineError::KeyNotInMultisig);
        }
        Self::remove_vote(&mut self.approved, &member);
        Self::remove_vote(&mut self.cancelled, &member);
        Self::insert_vote(&mut self.rejected, member);

        let cutoff = ms.members.len().saturating_sub(usize::from(ms.threshold));
        if self.rejected.len() > cutoff {
            self.status = ProposalStatus::Rejected;
            log::debug!("proposal {} rejected", self.transaction_index);
        }
        Ok(self.status)
    }

    /// Votes to cancel an execute-ready proposal. Cancellation takes the
    /// same threshold as approval.
    pub fn cancel(&mut self, ms: &Multisig, member: Pubkey) -> Result<ProposalStatus, EngineError> {
        if self.status != ProposalStatus::ExecuteReady {
            return Err(EngineError::InvalidState);
        }
        if !ms.is_member(&member) {
            return Err(EngineError::KeyNotInMultisig);
        }
        Self::remove_vote(&mut self.approved, &member);
        Self::remove_vote(&mut self.rejected, &member);
        Self::insert_vote(&mut self.cancelled, member);

        if self.cancelled.len() >= usize::from(ms.threshold) {
            self.status = ProposalStatus::Cancelled;
            log::debug!("proposal {} cancelled", self.transaction_index);
        }
        Ok(self.status)
    }

    pub fn has_voted_approve(&self, member: &Pubkey) -> bool {
        self.approved.binary_search(member).is_ok()
    }

    pub fn has_voted_reject(&self, member: &Pubkey) -> bool {
        self.rejected.binary_search(member).is_ok()
    }

    pub fn has_cancelled(&self, member: &Pubkey) -> bool {
        self.cancelled.binary_search(member).is_ok()
    }

    pub fn instruction(&self, index: u8) -> Option<&InstructionRecord> {
        self.instructions.iter().find(|record| record.index == index)
    }

    /// Marks one instruction executed. Steps must be applied strictly in
    /// order, one past the current cursor; executing the final step flips
    /// the proposal to `Executed`.
    pub fn record_execution(&mut self, index: u8) -> Result<ProposalStatus, EngineError> {
        if self.status != ProposalStatus::ExecuteReady {
            return Err(EngineError::InvalidState);
        }
        if index != self.executed_index + 1 || index > self.instruction_count {
            return Err(EngineError::InvalidInstructionIndex);
        }
        let record = self
            .instructions
            .iter_mut()
            .find(|record| record.index == index)
            .ok_or(EngineError::InvalidInstructionIndex)?;
        if record.executed {
            return Err(EngineError::InvalidInstructionIndex);
        }
        record.executed = true;
        self.executed_index = index;
        if self.executed_index == self.instruction_count {
            self.status = ProposalStatus::Executed;
        }
        Ok(self.status)
    }

    /// Marks the whole batch executed after a successful atomic execution.
    pub fn record_atomic_execution(&mut self) -> Result<(), EngineError> {
        if self.status != ProposalStatus::ExecuteReady {
            return Err(EngineError::InvalidState);
        }
        for record in &mut self.instructions {
            record.executed = true;
        }
        self.executed_index = self.instruction_count;
        self.status = ProposalStatus::Executed;
        Ok(())
    }

    fn insert_vote(set: &mut Vec<Pubkey>, member: Pubkey) {
        if let Err(pos) = set.binary_search(&member) {
            set.insert(pos, member);
        }
    }

    fn remove_vote(set: &mut Vec<Pubkey>, member: &Pubkey) {
        if let Ok(pos) = set.binary_search(member) {
            set.remove(pos);
        }
    }
}

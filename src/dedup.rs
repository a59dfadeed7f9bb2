//! Account deduplication for atomic execution. Builds the combined account
//! list and index map that the execution call carries: every attached
//! instruction contributes its derived address, its program id, and its
//! declared keys, and each reference becomes an index into a shared unique
//! list.

use solana_program::pubkey::Pubkey;

use crate::state::{AccountMetaEntry, InstructionRecord};

/// One attached instruction paired with the derived address it lives at.
#[derive(Debug, Clone)]
pub struct ExecuteStep<'a> {
    pub instruction_address: Pubkey,
    pub record: &'a InstructionRecord,
}

/// The deduplicated account list plus one index per flattened reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueAccounts {
    pub accounts: Vec<AccountMetaEntry>,
    pub index_map: Vec<usize>,
}

/// Flattens every step into `[instruction_address, program_id, keys…]` and
/// walks the list once, reusing a unique entry only when both the address
/// and the writable flag match. The same address referenced writable in one
/// place and read-only in another keeps two distinct entries.
///
/// Signer flags are forced off: execution never grants cross-step signer
/// authority, the executing program signs with its derived authority.
pub fn dedupe(steps: &[ExecuteStep<'_>]) -> UniqueAccounts {
    let mut flattened: Vec<AccountMetaEntry> = Vec::new();
    for step in steps {
        flattened.push(AccountMetaEntry::readonly(step.instruction_address));
        flattened.push(AccountMetaEntry::readonly(step.record.program_id));
        for key in &step.record.keys {
            flattened.push(AccountMetaEntry::new(key.pubkey, false, key.is_writable));
        }
    }

    let mut accounts: Vec<AccountMetaEntry> = Vec::new();
    let mut index_map: Vec<usize> = Vec::with_capacity(flattened.len());
    for entry in flattened {
        let position = accounts
            .iter()
            .position(|seen| seen.pubkey == entry.pubkey && seen.is_writable == entry.is_writable);
        match position {
            Some(found) => index_map.push(found),
            None => {
                accounts.push(entry);
                index_map.push(accounts.len() - 1);
            }
        }
    }

    UniqueAccounts {
        accounts,
        index_map,
    }
}

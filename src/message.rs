//! The compact transaction message: a single account table shared by every
//! instruction, with instructions referencing accounts purely by index.
//!
//! Wire layout follows the on-chain message format: u8 length prefixes for
//! the key/instruction/lookup lists and per-instruction index lists, a u16
//! prefix for instruction data, little-endian throughout.

use solana_program::pubkey::Pubkey;

use crate::codec::{read_small_array, write_small_array, LenWidth, WireElement};
use crate::error::EngineError;
use crate::state::{AccountMetaEntry, InstructionPayload};

/// One instruction with its accounts resolved to table indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indexes: Vec<u8>,
    pub data: Vec<u8>,
}

/// Reference into an on-chain address lookup table. Pass-through data:
/// compilation never inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAddressTableLookup {
    pub account_key: Pubkey,
    pub writable_indexes: Vec<u8>,
    pub readonly_indexes: Vec<u8>,
}

/// The compiled message. `account_keys` is partitioned as
/// `[writable signers][readonly signers][writable non-signers][readonly
/// non-signers]`, and the three header counts describe that partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMessage {
    pub num_signers: u8,
    pub num_writable_signers: u8,
    pub num_writable_non_signers: u8,
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<CompiledInstruction>,
    pub address_table_lookups: Vec<MessageAddressTableLookup>,
}

impl CompiledMessage {
    /// Compiles a batch of instructions against one authority.
    ///
    /// The authority seeds the account table as a writable signer (it pays
    /// for and signs the executed transaction); every other reference is
    /// merged in by address with flags OR-ed together, so a key that is
    /// writable anywhere stays writable everywhere. Program ids contribute
    /// non-signer/read-only and never downgrade flags a key already earned.
    pub fn compile(
        authority: &Pubkey,
        instructions: &[InstructionPayload],
        address_table_lookups: Vec<MessageAddressTableLookup>,
    ) -> Result<Self, EngineError> {
        let mut merged: Vec<AccountMetaEntry> = vec![AccountMetaEntry::new(*authority, true, true)];
        let mut merge = |entry: AccountMetaEntry| {
            match merged.iter().position(|seen| seen.pubkey == entry.pubkey) {
                Some(position) => {
                    merged[position].is_signer |= entry.is_signer;
                    merged[position].is_writable |= entry.is_writable;
                }
                None => merged.push(entry),
            }
        };
        for payload in instructions {
            merge(AccountMetaEntry::readonly(payload.program_id));
            for key in &payload.keys {
                merge(*key);
            }
        }

        if merged.len() > usize::from(u8::MAX) {
            return Err(EngineError::TooManyAccounts);
        }
        let num_signers = merged.iter().filter(|entry| entry.is_signer).count() as u8;
        let num_writable_signers = merged
            .iter()
            .filter(|entry| entry.is_signer && entry.is_writable)
            .count() as u8;
        let num_writable_non_signers = merged
            .iter()
            .filter(|entry| !entry.is_signer && entry.is_writable)
            .count() as u8;

        // Stable: equal-privilege keys keep their first-seen order.
        merged.sort_by_key(|entry| (!entry.is_signer, !entry.is_writable));
        let account_keys: Vec<Pubkey> = merged.iter().map(|entry| entry.pubkey).collect();

        let position_of = |key: &Pubkey| -> Result<u8, EngineError> {
            account_keys
                .iter()
                .position(|seen| seen == key)
                .map(|position| position as u8)
                .ok_or(EngineError::TooManyAccounts)
        };
        let compiled = instructions
            .iter()
            .map(|payload| {
                Ok(CompiledInstruction {
                    program_id_index: position_of(&payload.program_id)?,
                    account_indexes: payload
                        .keys
                        .iter()
                        .map(|key| position_of(&key.pubkey))
                        .collect::<Result<Vec<u8>, EngineError>>()?,
                    data: payload.data.clone(),
                })
            })
            .collect::<Result<Vec<CompiledInstruction>, EngineError>>()?;

        Ok(Self {
            num_signers,
            num_writable_signers,
            num_writable_non_signers,
            account_keys,
            instructions: compiled,
            address_table_lookups,
        })
    }

    /// Whether a table index refers to a signer.
    pub fn is_signer_index(&self, index: usize) -> bool {
        index < usize::from(self.num_signers)
    }

    /// Whether a static table index refers to a writable account.
    pub fn is_static_writable_index(&self, index: usize) -> bool {
        index < usize::from(self.num_writable_signers)
            || (index >= usize::from(self.num_signers)
                && index < usize::from(self.num_signers) + usize::from(self.num_writable_non_signers))
    }

    /// Count of all account keys the message loads, static and via lookups.
    pub fn num_all_account_keys(&self) -> usize {
        let looked_up: usize = self
            .address_table_lookups
            .iter()
            .map(|lookup| lookup.writable_indexes.len() + lookup.readonly_indexes.len())
            .sum();
        self.account_keys.len() + looked_up
    }

    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::with_capacity(self.byte_size());
        self.write_into(&mut out)?;
        Ok(out)
    }

    /// Decodes a message from the front of `buf`, returning it together
    /// with the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), EngineError> {
        let mut cursor = 0;
        let message = Self::read_from(buf, &mut cursor)?;
        Ok((message, cursor))
    }

    fn write_into(&self, out: &mut Vec<u8>) -> Result<(), EngineError> {
        out.push(self.num_signers);
        out.push(self.num_writable_signers);
        out.push(self.num_writable_non_signers);
        write_small_array(LenWidth::One, &self.account_keys, out)?;
        write_small_array(LenWidth::One, &self.instructions, out)?;
        write_small_array(LenWidth::One, &self.address_table_lookups, out)
    }

    fn read_from(buf: &[u8], cursor: &mut usize) -> Result<Self, EngineError> {
        let num_signers = u8::read(buf, cursor)?;
        let num_writable_signers = u8::read(buf, cursor)?;
        let num_writable_non_signers = u8::read(buf, cursor)?;
        Ok(Self {
            num_signers,
            num_writable_signers,
            num_writable_non_signers,
            account_keys: read_small_array(LenWidth::One, buf, cursor)?,
            instructions: read_small_array(LenWidth::One, buf, cursor)?,
            address_table_lookups: read_small_array(LenWidth::One, buf, cursor)?,
        })
    }

    fn byte_size(&self) -> usize {
        3 + 1
            + self.account_keys.iter().map(WireElement::byte_size).sum::<usize>()
            + 1
            + self.instructions.iter().map(WireElement::byte_size).sum::<usize>()
            + 1
            + self
                .address_table_lookups
                .iter()
                .map(WireElement::byte_size)
                .sum::<usize>()
    }
}

impl WireElement for Pubkey {
    fn byte_size(&self) -> usize {
        32
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), EngineError> {
        out.extend_from_slice(self.as_ref());
        Ok(())
    }

    fn read(buf: &[u8], cursor: &mut usize) -> Result<Self, EngineError> {
        let end = cursor
            .checked_add(32)
            .filter(|end| *end <= buf.len())
            .ok_or(EngineError::MalformedLength)?;
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&buf[*cursor..end]);
        *cursor = end;
        Ok(Pubkey::from(raw))
    }
}

impl WireElement for CompiledInstruction {
    fn byte_size(&self) -> usize {
        1 + 1 + self.account_indexes.len() + 2 + self.data.len()
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), EngineError> {
        out.push(self.program_id_index);
        write_small_array(LenWidth::One, &self.account_indexes, out)?;
        write_small_array(LenWidth::Two, &self.data, out)
    }

    fn read(buf: &[u8], cursor: &mut usize) -> Result<Self, EngineError> {
        Ok(Self {
            program_id_index: u8::read(buf, cursor)?,
            account_indexes: read_small_array(LenWidth::One, buf, cursor)?,
            data: read_small_array(LenWidth::Two, buf, cursor)?,
        })
    }
}

impl WireElement for MessageAddressTableLookup {
    fn byte_size(&self) -> usize {
        32 + 1 + self.writable_indexes.len() + 1 + self.readonly_indexes.len()
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), EngineError> {
        self.account_key.write(out)?;
        write_small_array(LenWidth::One, &self.writable_indexes, out)?;
        write_small_array(LenWidth::One, &self.readonly_indexes, out)
    }

    fn read(buf: &[u8], cursor: &mut usize) -> Result<Self, EngineError> {
        Ok(Self {
            account_key: Pubkey::read(buf, cursor)?,
            writable_indexes: read_small_array(LenWidth::One, buf, cursor)?,
            readonly_indexes: read_small_array(LenWidth::One, buf, cursor)?,
        })
    }
}

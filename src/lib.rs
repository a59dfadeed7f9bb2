//! Client-side engine for threshold multisig transactions.
//!
//! Compiles a batch of heterogeneous instructions into a compact,
//! index-referenced message and tracks the surrounding proposal through its
//! approval lifecycle: draft, voting, execute-ready, and sequential or
//! atomic execution. Transport, signing and address derivation live behind
//! the traits in [`executor`].

pub mod codec;
pub mod dedup;
pub mod error;
pub mod executor;
pub mod message;
pub mod state;

pub use error::EngineError;
pub use executor::{AddressDeriver, Executor, Submitter};
pub use message::{CompiledInstruction, CompiledMessage, MessageAddressTableLookup};
pub use state::{
    AccountMetaEntry, InstructionPayload, InstructionRecord, Multisig, Proposal, ProposalStatus,
};

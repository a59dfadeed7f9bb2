use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Transition not allowed from the current proposal status")]
    InvalidState,

    #[error("Proposal has no instructions attached")]
    EmptyProposal,

    #[error("Instruction index out of order or already executed")]
    InvalidInstructionIndex,

    #[error("Length prefix inconsistent with buffer size")]
    MalformedLength,

    #[error("Message references more than 256 unique accounts")]
    TooManyAccounts,

    #[error("Authority index not valid for this operation")]
    InvalidAuthorityIndex,

    #[error("Threshold must be between 1 and the member count")]
    InvalidThreshold,

    #[error("Member list cannot be empty")]
    EmptyMembers,

    #[error("Key is not a member of the multisig")]
    KeyNotInMultisig,

    #[error("Cannot remove the only remaining member")]
    CannotRemoveSoloMember,

    #[error("Submission failed: {0}")]
    Submission(String),
}

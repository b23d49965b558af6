//! Error taxonomy for the LedgerKeep protocol.
//!
//! Kinds mirror the consensus error taxonomy, not a language exception
//! hierarchy: `Format`, `Crypto`, `Script`, `Rules`, `Chain`, `Storage`,
//! `Network`, `Config`. Untrusted-input errors (`Format`/`Crypto`/`Script`/
//! `Rules`) are handled by callers per the propagation policy — logged and
//! the offending item dropped, never a crash or disconnect.

use thiserror::Error;

/// Malformed data at a serialization boundary: bad hex, bad Base58, bad
/// JSON, or a field of the wrong shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid base58check")]
    InvalidBase58Check,
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("wrong field type: expected {expected}, got {got}")]
    WrongFieldType { expected: &'static str, got: String },
    #[error("wrong length: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize },
}

/// Cryptographic primitive failures. Per spec §4.1, callers must not
/// distinguish sub-causes for consensus purposes beyond this one kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")]
    InvalidPublicKey,
    #[error("invalid DER signature bytes")]
    InvalidSignature,
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("unknown curve or key format")]
    UnknownCurve,
}

/// Script interpreter failures (spec §4.4). All are equivalent to the
/// script returning `false`; none indicate a bug in the interpreter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("OP_EQUALVERIFY mismatch")]
    EqualVerifyMismatch,
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),
    #[error("signature check failed under OP_CHECKSIG")]
    BadCheckSig,
    #[error("final stack top is empty or zero")]
    FalseResult,
}

/// Consensus-rule violations (spec §4.10–§4.13).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("insufficient proof of work")]
    InsufficientPoW,
    #[error("merkle root mismatch")]
    MerkleMismatch,
    #[error("tx_hash does not match canonical preimage")]
    TxHashMismatch,
    #[error("block_hash does not match canonical preimage")]
    BlockHashMismatch,
    #[error("block has no transactions")]
    EmptyBlock,
    #[error("intra-block double spend on {0}")]
    IntraBlockDoubleSpend(String),
    #[error("referenced utxo not found: {0}")]
    MissingUtxo(String),
    #[error("monetary balance violated: sum_out+fee {sum_out_fee} > sum_in {sum_in}")]
    BalanceViolation { sum_out_fee: u64, sum_in: u64 },
    #[error("zero-value transaction")]
    ZeroValueTransaction,
    #[error("arithmetic overflow summing {0}")]
    ArithmeticOverflow(&'static str),
    #[error("script authorization failed on input {0}")]
    ScriptAuthFailed(usize),
    #[error("coinbase shape violation: {0}")]
    CoinbaseShape(&'static str),
    #[error("coinbase reward {got} exceeds allowed {allowed}")]
    CoinbaseRewardExceeded { got: u64, allowed: u64 },
}

/// Chain-manager dispatch outcomes that are errors rather than accepted
/// states (spec §4.14).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("parent block unknown: {0}")]
    Orphan(String),
    #[error("weak fork ignored at height {0}")]
    WeakFork(u64),
    #[error("fork assembly incomplete: no common ancestor found")]
    ForkAssemblyIncomplete,
    #[error("empty chain: no tip recorded")]
    EmptyChain,
    #[error("height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },
    #[error("header chain broken at index {index}: previous_hash does not match the prior block's hash")]
    HeaderChainBroken { index: u64 },
}

/// Persistence failures (spec §4.5/§4.7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("integrity constraint violated: {0}")]
    IntegrityConstraint(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// P2P transport failures (spec §4.17).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("connection refused: {0}")]
    ConnectRefused(String),
    #[error("timeout")]
    Timeout,
    #[error("receive buffer overflow: {size} > {max}")]
    BufferOverflow { size: usize, max: usize },
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("peer limit reached")]
    PeerLimitReached,
}

/// Configuration failures. Always fatal at startup (spec §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown storage engine: {0}")]
    UnknownStorageEngine(String),
    #[error("invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Top-level sum type composing every subsystem's error kind (spec §9
/// design note: "a single `Result<T, ConsensusError>` sum type").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ConsensusError {
    /// Whether this error originates from untrusted input (peer messages,
    /// user API requests) and therefore must never cause a disconnect or
    /// crash — only a logged drop of the offending item (spec §7).
    pub fn is_untrusted_input(&self) -> bool {
        matches!(
            self,
            ConsensusError::Format(_)
                | ConsensusError::Crypto(_)
                | ConsensusError::Script(_)
                | ConsensusError::Rules(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untrusted_input_classification() {
        assert!(ConsensusError::from(FormatError::InvalidBase58Check).is_untrusted_input());
        assert!(ConsensusError::from(CryptoError::InvalidSignature).is_untrusted_input());
        assert!(ConsensusError::from(ScriptError::StackUnderflow).is_untrusted_input());
        assert!(ConsensusError::from(RulesError::InsufficientPoW).is_untrusted_input());
        assert!(!ConsensusError::from(ChainError::EmptyChain).is_untrusted_input());
        assert!(!ConsensusError::from(StorageError::NotFound("x".into())).is_untrusted_input());
        assert!(!ConsensusError::from(NetworkError::Timeout).is_untrusted_input());
        assert!(!ConsensusError::from(ConfigError::UnknownStorageEngine("x".into()))
            .is_untrusted_input());
    }

    #[test]
    fn display_messages_are_informative() {
        let err = ConsensusError::from(RulesError::MissingUtxo("abcd:0".into()));
        assert!(err.to_string().contains("abcd:0"));
    }
}

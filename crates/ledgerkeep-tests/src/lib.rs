//! End-to-end scenario tests for LedgerKeep (spec §8): the six literal
//! end-to-end scenarios exercised against the real consensus, storage,
//! and network crates rather than mocks.

pub mod helpers;

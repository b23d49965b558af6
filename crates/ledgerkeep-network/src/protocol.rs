//! Gossip & sync wire messages (spec §4.18).
//!
//! Grounded on the teacher's tagged-enum message shape in
//! `protocol.rs` (`NetworkMessage`/`encode`/`decode`), re-expressed as
//! the `{type, payload, _net_t}` JSON envelope spec §4.18 describes
//! instead of the teacher's bincode + magic-bytes framing — JSON is the
//! wire format the transport layer below commits to (spec §4.17).

use ledgerkeep_core::types::{Block, BlockHeader, Hash256, Transaction, TxOut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every message on the wire is this envelope; `payload` is interpreted
/// according to `message_type`. Unknown `message_type` is ignored
/// silently by the dispatcher (spec §4.18, last line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Value,
    pub _net_t: i64,
}

impl Envelope {
    pub fn new(message_type: &str, payload: Value, timestamp: i64) -> Self {
        Self {
            message_type: message_type.to_string(),
            payload,
            _net_t: timestamp,
        }
    }
}

pub const TYPE_HANDSHAKE: &str = "HANDSHAKE";
pub const TYPE_BLOCK: &str = "BLOCK";
pub const TYPE_TRANSACTION: &str = "TRANSACTION";
pub const TYPE_SYNC_REQUEST: &str = "SYNC_REQUEST";
pub const TYPE_SYNC_BATCH: &str = "SYNC_BATCH";
pub const TYPE_GET_HEADERS: &str = "GET_HEADERS";
pub const TYPE_HEADERS: &str = "HEADERS";
pub const TYPE_GET_MERKLE_PROOF: &str = "GET_MERKLE_PROOF";
pub const TYPE_MERKLE_PROOF: &str = "MERKLE_PROOF";
pub const TYPE_GET_UTXOS: &str = "GET_UTXOS";
pub const TYPE_UTXO_SET: &str = "UTXO_SET";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub version: String,
    pub height: u32,
    pub node_id: String,
    pub agent: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockPayload {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl From<Block> for BlockPayload {
    fn from(block: Block) -> Self {
        Self {
            header: block.header,
            transactions: block.transactions,
        }
    }
}

impl From<BlockPayload> for Block {
    fn from(payload: BlockPayload) -> Self {
        Block {
            header: payload.header,
            transactions: payload.transactions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequestPayload {
    pub start_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatchPayload {
    pub blocks: Vec<BlockPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHeadersPayload {
    pub start_hash: Hash256,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadersPayload {
    pub headers: Vec<BlockHeader>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMerkleProofPayload {
    pub tx_hash: Hash256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProofStep {
    pub left: bool,
    pub sibling: Hash256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProofPayload {
    pub tx_hash: Hash256,
    pub block_hash: Hash256,
    pub merkle_root: Hash256,
    pub proof: Vec<MerkleProofStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUtxosPayload {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub tx_hash: Hash256,
    pub output_index: u32,
    pub output: TxOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtxoSetPayload {
    pub address: String,
    pub utxos: Vec<UtxoEntry>,
}

/// A decoded, typed message. `decode` returns `None` for an unrecognized
/// `message_type` or a payload that doesn't match its expected shape,
/// both of which the dispatcher treats as silent drops.
#[derive(Debug, Clone)]
pub enum Message {
    Handshake(HandshakePayload),
    Block(BlockPayload),
    Transaction(Transaction),
    SyncRequest(SyncRequestPayload),
    SyncBatch(SyncBatchPayload),
    GetHeaders(GetHeadersPayload),
    Headers(HeadersPayload),
    GetMerkleProof(GetMerkleProofPayload),
    MerkleProof(MerkleProofPayload),
    GetUtxos(GetUtxosPayload),
    UtxoSet(UtxoSetPayload),
}

impl Message {
    pub fn encode(&self, timestamp: i64) -> serde_json::Result<String> {
        let (message_type, payload) = match self {
            Message::Handshake(p) => (TYPE_HANDSHAKE, serde_json::to_value(p)?),
            Message::Block(p) => (TYPE_BLOCK, serde_json::to_value(p)?),
            Message::Transaction(p) => (TYPE_TRANSACTION, serde_json::to_value(p)?),
            Message::SyncRequest(p) => (TYPE_SYNC_REQUEST, serde_json::to_value(p)?),
            Message::SyncBatch(p) => (TYPE_SYNC_BATCH, serde_json::to_value(p)?),
            Message::GetHeaders(p) => (TYPE_GET_HEADERS, serde_json::to_value(p)?),
            Message::Headers(p) => (TYPE_HEADERS, serde_json::to_value(p)?),
            Message::GetMerkleProof(p) => (TYPE_GET_MERKLE_PROOF, serde_json::to_value(p)?),
            Message::MerkleProof(p) => (TYPE_MERKLE_PROOF, serde_json::to_value(p)?),
            Message::GetUtxos(p) => (TYPE_GET_UTXOS, serde_json::to_value(p)?),
            Message::UtxoSet(p) => (TYPE_UTXO_SET, serde_json::to_value(p)?),
        };
        let envelope = Envelope::new(message_type, payload, timestamp);
        serde_json::to_string(&envelope)
    }

    /// Parse one `\n`-terminated JSON frame. Returns `None` for
    /// malformed JSON, an unknown `type`, or a shape mismatch — all
    /// silent drops per spec §4.18.
    pub fn decode(frame: &str) -> Option<Self> {
        let envelope: Envelope = serde_json::from_str(frame).ok()?;
        match envelope.message_type.as_str() {
            TYPE_HANDSHAKE => serde_json::from_value(envelope.payload).ok().map(Message::Handshake),
            TYPE_BLOCK => serde_json::from_value(envelope.payload).ok().map(Message::Block),
            TYPE_TRANSACTION => serde_json::from_value(envelope.payload).ok().map(Message::Transaction),
            TYPE_SYNC_REQUEST => serde_json::from_value(envelope.payload).ok().map(Message::SyncRequest),
            TYPE_SYNC_BATCH => serde_json::from_value(envelope.payload).ok().map(Message::SyncBatch),
            TYPE_GET_HEADERS => serde_json::from_value(envelope.payload).ok().map(Message::GetHeaders),
            TYPE_HEADERS => serde_json::from_value(envelope.payload).ok().map(Message::Headers),
            TYPE_GET_MERKLE_PROOF => serde_json::from_value(envelope.payload).ok().map(Message::GetMerkleProof),
            TYPE_MERKLE_PROOF => serde_json::from_value(envelope.payload).ok().map(Message::MerkleProof),
            TYPE_GET_UTXOS => serde_json::from_value(envelope.payload).ok().map(Message::GetUtxos),
            TYPE_UTXO_SET => serde_json::from_value(envelope.payload).ok().map(Message::UtxoSet),
            _ => None,
        }
    }
}

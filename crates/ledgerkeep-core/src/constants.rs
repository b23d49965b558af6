//! Protocol constants. All monetary values are atomic units (1 coin = `COIN_FACTOR`).

/// Atomic units per coin.
pub const COIN_FACTOR: u64 = 100_000_000;

/// Default starting subsidy, in atomic units (50 coins).
pub const DEFAULT_INITIAL_SUBSIDY: u64 = 50 * COIN_FACTOR;

/// Default blocks between subsidy halvings.
pub const DEFAULT_HALVING_INTERVAL: u64 = 210_000;

/// Default seconds between blocks, used to size the retarget window.
pub const DEFAULT_TARGET_BLOCK_TIME_SECS: u64 = 60;

/// Default blocks per difficulty retarget.
pub const DEFAULT_DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Default compact target for a freshly bootstrapped chain.
pub const DEFAULT_INITIAL_DIFFICULTY_BITS: u32 = 0x207f_ffff;

/// Compact target used by the literal genesis block in `spec.md` §6.3.
pub const GENESIS_DIFFICULTY_BITS: u32 = 0x1f00_ffff;

/// Genesis block timestamp (Unix seconds), a fixed consensus constant.
pub const GENESIS_TIMESTAMP: i64 = 1_704_067_200;

/// Mantissa/exponent pair defining `MAX_TARGET`: mantissa `0x7fffff`, exponent `0x20`.
pub const MAX_TARGET_MANTISSA: u32 = 0x007f_ffff;
pub const MAX_TARGET_EXPONENT: u8 = 0x20;

/// Default mempool capacity (pending transaction count).
pub const DEFAULT_MEMPOOL_MAX_SIZE: usize = 5000;

/// Default maximum serialized block size, in bytes.
pub const DEFAULT_MAX_BLOCK_SIZE_BYTES: usize = 1_000_000;

/// Default ceiling on the miner's nonce search per candidate header.
pub const DEFAULT_MAX_NONCE: u32 = u32::MAX;

/// Default maximum transactions selected into a single block template.
pub const DEFAULT_MAX_TX_PER_BLOCK: usize = 2000;

/// Coinbase input's sentinel previous-output index (marks a coinbase input).
pub const COINBASE_OUTPUT_INDEX: u32 = 0xFFFF_FFFF;

/// Default P2P listen port.
pub const DEFAULT_P2P_PORT: u16 = 18333;

/// Default inbound connection ceiling.
pub const DEFAULT_MAX_PEERS: usize = 50;

/// Default per-connection receive buffer cap, in bytes (5 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 5 * 1024 * 1024;

/// Block-range sync batch size (`SYNC_BATCH`).
pub const SYNC_BATCH_SIZE: usize = 500;

/// Maximum headers returned per `HEADERS` response.
pub const MAX_HEADERS_PER_RESPONSE: usize = 2000;

/// Base58Check version byte for mainnet P2PKH addresses.
pub const ADDRESS_VERSION_BYTE: u8 = 0x00;

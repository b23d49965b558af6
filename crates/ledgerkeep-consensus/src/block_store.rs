//! RocksDB-backed append-only block store (spec §4.7, §6.4).
//!
//! Column families mirror the spec's persisted-state layout: blocks keyed
//! by hash, a height→hash index for range scans, and a metadata family
//! for the current tip. Unlike the teacher's
//! [`storage`](../../ledgerkeep-node/src/storage.rs) module this store
//! carries no undo log — reorg (spec §4.15) rebuilds the UTXO set from a
//! full replay rather than disconnecting blocks one at a time, so the
//! block store only needs to hold canonical history plus an atomic
//! whole-chain swap for `save_atomic`.

use ledgerkeep_core::error::StorageError;
use ledgerkeep_core::types::{Block, BlockHeader, Hash256};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;

const CF_BLOCKS: &str = "blocks";
const CF_HEIGHT_INDEX: &str = "height_index";
const CF_METADATA: &str = "metadata";

const ALL_CFS: &[&str] = &[CF_BLOCKS, CF_HEIGHT_INDEX, CF_METADATA];

const META_TIP_HEIGHT: &[u8] = b"tip_height";
const META_TIP_HASH: &[u8] = b"tip_hash";

fn storage_err(e: impl ToString) -> StorageError {
    StorageError::WriteFailed(e.to_string())
}

fn height_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

fn encode_block(block: &Block) -> Result<Vec<u8>, StorageError> {
    bincode::encode_to_vec(block, bincode::config::standard()).map_err(storage_err)
}

fn decode_block(bytes: &[u8]) -> Result<Block, StorageError> {
    let (block, _) =
        bincode::decode_from_slice(bytes, bincode::config::standard()).map_err(storage_err)?;
    Ok(block)
}

pub struct BlockStore {
    db: DB,
}

impl BlockStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(storage_err)?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::IntegrityConstraint(format!("missing column family: {name}")))
    }

    /// Idempotent insert: re-saving an already-stored block is a no-op
    /// success, not an error.
    pub fn save(&self, block: &Block) -> Result<(), StorageError> {
        let cf_blocks = self.cf(CF_BLOCKS)?;
        let hash_bytes = block.header.block_hash.as_bytes();

        if self
            .db
            .get_cf(cf_blocks, hash_bytes)
            .map_err(storage_err)?
            .is_some()
        {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_blocks, hash_bytes, encode_block(block)?);
        batch.put_cf(
            self.cf(CF_HEIGHT_INDEX)?,
            height_key(block.header.index),
            hash_bytes,
        );

        let (tip_height, _) = self.tip()?.unwrap_or((0, Hash256::ZERO));
        if block.header.index >= tip_height || self.tip()?.is_none() {
            batch.put_cf(
                self.cf(CF_METADATA)?,
                META_TIP_HEIGHT,
                block.header.index.to_le_bytes(),
            );
            batch.put_cf(self.cf(CF_METADATA)?, META_TIP_HASH, hash_bytes);
        }

        self.db.write(batch).map_err(storage_err)
    }

    /// Atomically replace the entire canonical chain with `chain`, used
    /// by reorg (spec §4.15 step 3). Every delete of the existing chain
    /// and every put of the new one is collected into a single
    /// `WriteBatch` committed with one `db.write` call, so a crash or
    /// write error leaves either the old chain intact or the new chain
    /// fully installed — never a store emptied of blocks midway through.
    pub fn save_atomic(&self, chain: &[Block]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        self.enqueue_clear(&mut batch)?;

        let cf_blocks = self.cf(CF_BLOCKS)?;
        let cf_height = self.cf(CF_HEIGHT_INDEX)?;

        for block in chain {
            let hash_bytes = block.header.block_hash.as_bytes();
            batch.put_cf(cf_blocks, hash_bytes, encode_block(block)?);
            batch.put_cf(cf_height, height_key(block.header.index), hash_bytes);
        }

        if let Some(last) = chain.last() {
            batch.put_cf(
                self.cf(CF_METADATA)?,
                META_TIP_HEIGHT,
                last.header.index.to_le_bytes(),
            );
            batch.put_cf(
                self.cf(CF_METADATA)?,
                META_TIP_HASH,
                last.header.block_hash.as_bytes(),
            );
        }

        self.db.write(batch).map_err(storage_err)
    }

    pub fn get_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StorageError> {
        match self
            .db
            .get_cf(self.cf(CF_BLOCKS)?, hash.as_bytes())
            .map_err(storage_err)?
        {
            Some(bytes) => Ok(Some(decode_block(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_hash_at_height(&self, height: u32) -> Result<Option<Hash256>, StorageError> {
        match self
            .db
            .get_cf(self.cf(CF_HEIGHT_INDEX)?, height_key(height))
            .map_err(storage_err)?
        {
            Some(bytes) if bytes.len() == 32 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Some(Hash256::from_bytes(arr)))
            }
            _ => Ok(None),
        }
    }

    pub fn get_last(&self) -> Result<Option<Block>, StorageError> {
        match self.tip()? {
            Some((_, hash)) => self.get_by_hash(&hash),
            None => Ok(None),
        }
    }

    fn tip(&self) -> Result<Option<(u32, Hash256)>, StorageError> {
        let cf = self.cf(CF_METADATA)?;
        let hash_bytes = match self.db.get_cf(cf, META_TIP_HASH).map_err(storage_err)? {
            Some(bytes) if bytes.len() == 32 => bytes,
            _ => return Ok(None),
        };
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&hash_bytes);
        let hash = Hash256::from_bytes(arr);

        let height_bytes = self
            .db
            .get_cf(cf, META_TIP_HEIGHT)
            .map_err(storage_err)?
            .ok_or_else(|| StorageError::IntegrityConstraint("tip hash without tip height".into()))?;
        let height = u32::from_le_bytes(
            height_bytes
                .try_into()
                .map_err(|_| StorageError::IntegrityConstraint("corrupt tip height".into()))?,
        );
        Ok(Some((height, hash)))
    }

    /// Up to `limit` consecutive blocks starting at `start_index`,
    /// ascending.
    pub fn range(&self, start_index: u32, limit: usize) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();
        for height in start_index..start_index.saturating_add(limit as u32) {
            match self.get_hash_at_height(height)? {
                Some(hash) => match self.get_by_hash(&hash)? {
                    Some(block) => blocks.push(block),
                    None => break,
                },
                None => break,
            }
        }
        Ok(blocks)
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        Ok(self.tip()?.map(|(h, _)| u64::from(h) + 1).unwrap_or(0))
    }

    /// Up to `limit` consecutive headers starting just after
    /// `start_hash`, ascending by height.
    pub fn header_range(
        &self,
        start_hash: &Hash256,
        limit: usize,
    ) -> Result<Vec<BlockHeader>, StorageError> {
        let start_height = match self.get_by_hash(start_hash)? {
            Some(block) => block.header.index,
            None => return Ok(Vec::new()),
        };

        let mut headers = Vec::new();
        for height in (start_height + 1).. {
            if headers.len() >= limit {
                break;
            }
            match self.get_hash_at_height(height)? {
                Some(hash) => match self.get_by_hash(&hash)? {
                    Some(block) => headers.push(block.header),
                    None => break,
                },
                None => break,
            }
        }
        Ok(headers)
    }

    /// Enumerate every key across all column families and queue its
    /// deletion onto `batch`, without committing anything. Shared by
    /// [`Self::clear`] (its own standalone commit) and
    /// [`Self::save_atomic`] (folded into one larger commit alongside the
    /// new chain's puts).
    fn enqueue_clear(&self, batch: &mut WriteBatch) -> Result<(), StorageError> {
        for cf_name in ALL_CFS {
            let cf = self.cf(cf_name)?;
            for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
                let (key, _) = item.map_err(storage_err)?;
                batch.delete_cf(cf, key);
            }
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        self.enqueue_clear(&mut batch)?;
        self.db.write(batch).map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkeep_core::types::CompactBits;

    fn header(index: u32, previous_hash: Hash256, block_hash: Hash256) -> BlockHeader {
        BlockHeader {
            index,
            timestamp: 1_700_000_000 + i64::from(index),
            previous_hash,
            bits: CompactBits(0x1f00_ffff),
            merkle_root: Hash256::ZERO,
            nonce: 0,
            block_hash,
        }
    }

    fn block(index: u32, previous_hash: Hash256, block_hash: Hash256) -> Block {
        Block {
            header: header(index, previous_hash, block_hash),
            transactions: vec![],
        }
    }

    fn temp_store() -> (BlockStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(dir.path().join("blocks")).unwrap();
        (store, dir)
    }

    #[test]
    fn new_store_is_empty() {
        let (store, _dir) = temp_store();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.get_last().unwrap().is_none());
    }

    #[test]
    fn save_then_get_by_hash() {
        let (store, _dir) = temp_store();
        let b = block(0, Hash256::ZERO, Hash256([1; 32]));
        store.save(&b).unwrap();
        assert_eq!(store.get_by_hash(&Hash256([1; 32])).unwrap(), Some(b));
    }

    #[test]
    fn save_is_idempotent() {
        let (store, _dir) = temp_store();
        let b = block(0, Hash256::ZERO, Hash256([1; 32]));
        store.save(&b).unwrap();
        store.save(&b).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn save_advances_tip() {
        let (store, _dir) = temp_store();
        let b0 = block(0, Hash256::ZERO, Hash256([1; 32]));
        let b1 = block(1, Hash256([1; 32]), Hash256([2; 32]));
        store.save(&b0).unwrap();
        store.save(&b1).unwrap();

        let last = store.get_last().unwrap().unwrap();
        assert_eq!(last.header.index, 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn range_returns_consecutive_blocks() {
        let (store, _dir) = temp_store();
        let b0 = block(0, Hash256::ZERO, Hash256([1; 32]));
        let b1 = block(1, Hash256([1; 32]), Hash256([2; 32]));
        let b2 = block(2, Hash256([2; 32]), Hash256([3; 32]));
        store.save(&b0).unwrap();
        store.save(&b1).unwrap();
        store.save(&b2).unwrap();

        let range = store.range(1, 2).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].header.index, 1);
        assert_eq!(range[1].header.index, 2);
    }

    #[test]
    fn range_stops_at_gap() {
        let (store, _dir) = temp_store();
        let b0 = block(0, Hash256::ZERO, Hash256([1; 32]));
        store.save(&b0).unwrap();
        let range = store.range(0, 10).unwrap();
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn header_range_returns_headers_after_start() {
        let (store, _dir) = temp_store();
        let b0 = block(0, Hash256::ZERO, Hash256([1; 32]));
        let b1 = block(1, Hash256([1; 32]), Hash256([2; 32]));
        let b2 = block(2, Hash256([2; 32]), Hash256([3; 32]));
        store.save(&b0).unwrap();
        store.save(&b1).unwrap();
        store.save(&b2).unwrap();

        let headers = store.header_range(&Hash256([1; 32]), 10).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].index, 1);
        assert_eq!(headers[1].index, 2);
    }

    #[test]
    fn header_range_unknown_start_is_empty() {
        let (store, _dir) = temp_store();
        let headers = store.header_range(&Hash256([9; 32]), 10).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn save_atomic_replaces_chain() {
        let (store, _dir) = temp_store();
        let b0 = block(0, Hash256::ZERO, Hash256([1; 32]));
        store.save(&b0).unwrap();

        let fork0 = block(0, Hash256::ZERO, Hash256([9; 32]));
        let fork1 = block(1, Hash256([9; 32]), Hash256([10; 32]));
        store.save_atomic(&[fork0.clone(), fork1.clone()]).unwrap();

        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get_by_hash(&Hash256([1; 32])).unwrap(), None);
        assert_eq!(store.get_last().unwrap(), Some(fork1));
    }

    #[test]
    fn clear_empties_store() {
        let (store, _dir) = temp_store();
        let b0 = block(0, Hash256::ZERO, Hash256([1; 32]));
        store.save(&b0).unwrap();
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.get_last().unwrap().is_none());
    }
}

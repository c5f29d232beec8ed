//! Job Record Store
//!
//! RocksDB-backed persistence for the sync core:
//! - `chain` column family: the scan checkpoint under a fixed key
//! - `jobs` column family: one JSON record per job address
//!
//! Every write is a read/modify/write under the store's write lock, so an
//! update only overlays the fields its caller owns and replaying it is a no-op.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, error, info};

use crate::config::StorageConfig;
use crate::types::{Address, CompletionRequest, Job, SyncError, SyncResult};

const CF_CHAIN: &str = "chain";
const CF_JOBS: &str = "jobs";

const LAST_BLOCK_KEY: &[u8] = b"lastBlock";

/// Durable job mirror and checkpoint
#[derive(Clone)]
pub struct JobStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl JobStore {
    /// Open or create the store described by `config`
    pub fn open(config: &StorageConfig) -> SyncResult<Self> {
        Self::open_path(&config.db_path)
    }

    /// Open or create the store at `path`
    pub fn open_path(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Database(format!("Failed to create database directory: {}", e)))?;
        }

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let db = DB::open_cf(&db_opts, path, [CF_CHAIN, CF_JOBS])?;

        info!("Opened job store at {}", path.display());

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> SyncResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| SyncError::Database(format!("column family {} not found", name)))
    }

    /// Highest block height fully scanned, if any scan has completed
    pub fn checkpoint(&self) -> SyncResult<Option<u64>> {
        let cf = self.cf(CF_CHAIN)?;
        Ok(self.db.get_cf(cf, LAST_BLOCK_KEY)?.map(|bytes| decode_height(&bytes)))
    }

    /// Move the checkpoint forward to `height`.
    ///
    /// Never lowers the stored value; returns the checkpoint after the call.
    pub fn advance_checkpoint(&self, height: u64) -> SyncResult<u64> {
        let _guard = self.write_lock.lock();
        let cf = self.cf(CF_CHAIN)?;

        if let Some(current) = self.db.get_cf(cf, LAST_BLOCK_KEY)?.map(|b| decode_height(&b)) {
            if current >= height {
                return Ok(current);
            }
        }

        self.db.put_cf(cf, LAST_BLOCK_KEY, height.to_be_bytes())?;
        debug!(height, "checkpoint advanced");
        Ok(height)
    }

    /// Load a single job record
    pub fn get_job(&self, address: &Address) -> SyncResult<Option<Job>> {
        self.read_for_update(address)
    }

    /// Load every job record; records that fail to decode are logged and skipped
    pub fn list_jobs(&self) -> SyncResult<Vec<Job>> {
        let cf = self.cf(CF_JOBS)?;
        let mut jobs = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            match serde_json::from_slice::<Job>(&value) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    let address = Address::from_slice(&key);
                    error!(job = %address, error = %e, "error unmarshaling job");
                }
            }
        }

        Ok(jobs)
    }

    /// Completion requests recorded on jobs still present in the store
    pub fn pending_completions(&self) -> SyncResult<Vec<CompletionRequest>> {
        Ok(self
            .list_jobs()?
            .iter()
            .filter_map(Job::completion_request)
            .collect())
    }

    /// Merge-upsert: load the record for `address` (or start a fresh one), let
    /// `update` overlay its fields, and write it back.
    pub fn merge_job<F>(&self, address: Address, update: F) -> SyncResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        let _guard = self.write_lock.lock();
        let job = self.read_for_update(&address)?.unwrap_or_else(|| Job {
            job_address: address,
            ..Default::default()
        });
        self.write_merged(address, job, update)
    }

    /// Like [`merge_job`](Self::merge_job) but only for records that already exist
    pub fn update_existing<F>(&self, address: Address, update: F) -> SyncResult<Option<Job>>
    where
        F: FnOnce(&mut Job),
    {
        let _guard = self.write_lock.lock();
        match self.read_for_update(&address)? {
            Some(job) => self.write_merged(address, job, update).map(Some),
            None => Ok(None),
        }
    }

    /// Record an external completion request on an observed job
    pub fn request_completion(&self, address: Address, signature: Vec<u8>) -> SyncResult<Job> {
        self.update_existing(address, |job| {
            job.completion_requested = true;
            job.completion_signature = signature;
        })?
        .ok_or(SyncError::JobNotFound(address))
    }

    /// Delete a job record; returns whether one existed
    pub fn delete_job(&self, address: &Address) -> SyncResult<bool> {
        let _guard = self.write_lock.lock();
        let cf = self.cf(CF_JOBS)?;
        let existed = self.db.get_cf(cf, address.as_bytes())?.is_some();
        self.db.delete_cf(cf, address.as_bytes())?;
        Ok(existed)
    }

    /// Number of job records
    pub fn job_count(&self) -> SyncResult<usize> {
        let cf = self.cf(CF_JOBS)?;
        Ok(self.db.iterator_cf(cf, IteratorMode::Start).count())
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> SyncResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn read_for_update(&self, address: &Address) -> SyncResult<Option<Job>> {
        let cf = self.cf(CF_JOBS)?;
        match self.db.get_cf(cf, address.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_merged<F>(&self, address: Address, mut job: Job, update: F) -> SyncResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        update(&mut job);
        job.job_address = address;

        let value = serde_json::to_vec(&job)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_JOBS)?, address.as_bytes(), value);
        self.db.write(batch)?;

        Ok(job)
    }
}

/// Checkpoint values are big-endian; shorter encodings are accepted
fn decode_height(bytes: &[u8]) -> u64 {
    let tail = &bytes[bytes.len().saturating_sub(8)..];
    tail.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

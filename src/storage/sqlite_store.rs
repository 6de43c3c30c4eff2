// src/storage/sqlite_store.rs
//! SQLite persistence collaborator.
//!
//! Two tables:
//! - `did_documents(did PRIMARY KEY, document JSON, created_at)`
//! - `blockchain(block_index PRIMARY KEY, block_data JSON, block_hash,
//!   previous_hash, timestamp)`
//!
//! Documents are upserted. Blocks use a plain `INSERT`, so an index that is
//! already stored fails with `BlockConflict` instead of being overwritten.
//! Stored hashes are returned exactly as written; checking them is the
//! ledger's job.

use crate::error::PersistenceError;
use crate::models::block::{Block, Payload};
use crate::models::did::DIDDocument;
use crate::storage::PersistenceGateway;
use crate::utils::serialization::{deserialize, serialize};
use log::info;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Special path that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// SQLite-backed documents and blocks behind a single connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// `":memory:"` opens a private in-memory database. File databases run in
    /// WAL mode.
    ///
    /// # Errors
    /// `PersistenceError::Database` if the file cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if path == Path::new(IN_MEMORY) {
            return Self::open_in_memory();
        }

        info!("Opening SQLite store at {}", path.display());
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init_schema(&conn)?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), PersistenceError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS did_documents (
                did TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS blockchain (
                block_index INTEGER PRIMARY KEY,
                block_data TEXT NOT NULL,
                block_hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }
}

impl PersistenceGateway for SqliteStore {
    fn save_document(&self, did: &str, document: &DIDDocument) -> Result<(), PersistenceError> {
        let json = serialize(document)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO did_documents (did, document) VALUES (?1, ?2)",
            params![did, json],
        )?;
        Ok(())
    }

    fn get_document(&self, did: &str) -> Result<Option<DIDDocument>, PersistenceError> {
        let json: Option<String> = self
            .conn()?
            .query_row(
                "SELECT document FROM did_documents WHERE did = ?1",
                params![did],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(deserialize(&json)?)),
            None => Ok(None),
        }
    }

    fn document_exists(&self, did: &str) -> Result<bool, PersistenceError> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM did_documents WHERE did = ?1",
                params![did],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn append_block(&self, block: &Block) -> Result<(), PersistenceError> {
        let data = serialize(&block.payload)?;
        let inserted = self.conn()?.execute(
            r#"
            INSERT INTO blockchain (block_index, block_data, block_hash, previous_hash, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                block.index as i64,
                data,
                block.hash,
                block.previous_hash,
                block.timestamp,
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(PersistenceError::BlockConflict { index: block.index })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load_chain(&self) -> Result<Vec<Block>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT block_index, block_data, block_hash, previous_hash, timestamp
            FROM blockchain
            ORDER BY block_index
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)? as u64,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut blocks = Vec::new();
        for row in rows {
            let (index, data, hash, previous_hash, timestamp) = row?;
            let payload: Payload = deserialize(&data)?;
            blocks.push(Block {
                index,
                timestamp,
                payload,
                previous_hash,
                hash,
            });
        }
        Ok(blocks)
    }
}

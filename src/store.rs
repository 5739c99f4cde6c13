use std::path::PathBuf;

use async_trait::async_trait;
use tokio::{
    fs::OpenOptions,
    io::{AsyncWriteExt, BufWriter},
    sync::Mutex,
};

use crate::bet::{Bet, BetParseErr};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("malformed bet at line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: BetParseErr,
    },
}

/// Append-only persistence of every submitted bet
#[async_trait]
pub trait BetStore: Send + Sync {
    /// Appends a list of bets, concurrent calls must never interleave their records
    async fn store_bets(&self, bets: &[Bet]) -> Result<(), StoreError>;

    /// Reads back every bet stored so far, in the order they were stored
    async fn load_bets(&self) -> Result<Vec<Bet>, StoreError>;
}

/// Stores bets as lines of comma separated values in a single file
#[derive(Debug)]
pub struct CsvBetStore {
    path: PathBuf,
    // serializes access to the file across handlers
    lock: Mutex<()>,
}

impl CsvBetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::default(),
        }
    }
}

#[async_trait]
impl BetStore for CsvBetStore {
    async fn store_bets(&self, bets: &[Bet]) -> Result<(), StoreError> {
        if bets.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock().await;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        // use a buffer to avoid a syscall per row
        let mut writer = BufWriter::new(file);
        for bet in bets {
            writer.write_all(format!("{}\n", bet).as_bytes()).await?;
        }
        writer.flush().await?;

        Ok(())
    }

    async fn load_bets(&self) -> Result<Vec<Bet>, StoreError> {
        let _guard = self.lock.lock().await;

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            // nothing was ever stored
            Err(err) if err.kind() == tokio::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(err.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, row)| !row.trim().is_empty())
            .map(|(idx, row)| {
                row.parse::<Bet>().map_err(|source| StoreError::Corrupt {
                    line: idx + 1,
                    source,
                })
            })
            .collect()
    }
}

use super::models::Checkpoint;
use super::repository::truncate_torn_tail;
use crate::error::{AppError, AppResult};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Durable per-chain watermark
///
/// One `chain,height` line per advance; the latest line per chain wins on
/// replay. Regressions are rejected rather than applied.
pub struct CheckpointStore {
    path: PathBuf,
    log: File,
    heights: HashMap<String, u64>,
    genesis: HashMap<String, u64>,
}

impl CheckpointStore {
    /// Open the store; `genesis` supplies the height for chains never advanced
    pub fn open(path: impl AsRef<Path>, genesis: HashMap<String, u64>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let log = OpenOptions::new().create(true).append(true).open(&path)?;
        truncate_torn_tail(&path)?;
        let heights = Self::replay(&path)?;

        for (chain, height) in &heights {
            info!("📍 Checkpoint restored: {} @ {}", chain, height);
        }

        Ok(Self {
            path,
            log,
            heights,
            genesis,
        })
    }

    fn replay(path: &Path) -> AppResult<HashMap<String, u64>> {
        let mut heights = HashMap::new();
        let reader = BufReader::new(File::open(path)?);

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parsed = line
                .rsplit_once(',')
                .and_then(|(chain, height)| {
                    height.trim().parse::<u64>().ok().map(|h| (chain.trim(), h))
                });

            let Some((chain, height)) = parsed else {
                return Err(AppError::InvariantViolation(format!(
                    "malformed checkpoint line {} in {}: {:?}",
                    line_no + 1,
                    path.display(),
                    line
                )));
            };

            heights.insert(chain.to_string(), height);
        }

        Ok(heights)
    }

    /// Last fully processed height for `chain`, or its configured genesis height
    pub fn get(&self, chain: &str) -> u64 {
        self.heights
            .get(chain)
            .or_else(|| self.genesis.get(chain))
            .copied()
            .unwrap_or(0)
    }

    /// Move the watermark for `chain` forward to `height`
    ///
    /// Equal heights are a no-op. Lower heights fail with
    /// `InvariantViolation`: an adapter or the orchestrator has a bug.
    pub fn advance(&mut self, chain: &str, height: u64) -> AppResult<()> {
        let current = self.get(chain);

        if height < current {
            return Err(AppError::InvariantViolation(format!(
                "checkpoint regression on {}: {} -> {}",
                chain, current, height
            )));
        }

        if height == current && self.heights.contains_key(chain) {
            return Ok(());
        }

        let line = format!("{},{}\n", chain, height);
        self.log.write_all(line.as_bytes())?;
        self.log.flush()?;
        self.log.sync_data()?;

        self.heights.insert(chain.to_string(), height);
        info!("📍 Checkpoint advanced: {} @ {}", chain, height);
        Ok(())
    }

    pub fn all(&self) -> Vec<Checkpoint> {
        let mut chains: Vec<&String> = self.heights.keys().chain(self.genesis.keys()).collect();
        chains.sort();
        chains.dedup();

        chains
            .into_iter()
            .map(|chain| Checkpoint {
                chain_name: chain.clone(),
                height: self.get(chain),
            })
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! Host-facing reputation manager.
//!
//! Validates host input, lazily migrates users from the legacy store and
//! routes every call through the kernel as an `EngineAction`, so that the
//! optional journal holds exactly what the engine executed.
//!
//! Journal writes happen after the action is applied. A journal error
//! means the live store is ahead of the log; the host must stop.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use reputation_kernel::actions::EngineAction;
use reputation_kernel::arithmetic::mul_frac;
use reputation_kernel::domain::{RoundId, Time};
use reputation_kernel::error::ParamsError;
use reputation_kernel::legacy::LegacyReader;
use reputation_kernel::{Int, KvStore, MemKvStore, ReputationEngine, ReputationParams};

use crate::config::RuntimeConfig;
use crate::journal::ActionLog;
use crate::snapshot_codec::{export_table_to_file, import_table_from_file, SnapshotError};

/// Staking grants 0.15% of the staked amount as free score.
const STAKE_SCORE_NUM: i64 = 15;
const STAKE_SCORE_DENOM: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountKey(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permlink(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin(pub Int);

impl AccountKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Permlink {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountKey {
    fn from(s: &str) -> Self {
        AccountKey(s.to_string())
    }
}

impl From<&str> for Permlink {
    fn from(s: &str) -> Self {
        Permlink(s.to_string())
    }
}

impl From<i64> for Coin {
    fn from(v: i64) -> Self {
        Coin(Int::from(v))
    }
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("account not found: {0:?}")]
    AccountNotFound(String),
    #[error("post not found: {0:?}")]
    PostNotFound(String),
    #[error("donation amount must not be negative, got {0}")]
    NegativeAmount(Int),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error("action journal failure: {0}")]
    Journal(#[from] std::io::Error),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub struct ReputationManager<S: KvStore, L: KvStore = MemKvStore> {
    engine: ReputationEngine<S>,
    legacy: Option<LegacyReader<L>>,
    journal: Option<ActionLog>,
}

impl ReputationManager<MemKvStore> {
    /// Fresh in-memory manager per `config`. When a journal path is
    /// configured, every action already journaled is replayed first and
    /// new actions are appended to the same log.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ManagerError> {
        let mut manager = Self::new(MemKvStore::new(), config.params.clone())?;
        if let Some(path) = &config.journal_path {
            let log = ActionLog::open(path)?;
            let actions = log.load_actions()?;
            manager.engine.apply_sequence(&actions);
            info!(
                path = %path.display(),
                actions = actions.len(),
                "store recovered from action journal"
            );
            manager.journal = Some(log);
        }
        Ok(manager)
    }
}

impl<S: KvStore, L: KvStore> ReputationManager<S, L> {
    pub fn new(kv: S, params: ReputationParams) -> Result<Self, ManagerError> {
        Ok(Self {
            engine: ReputationEngine::new(kv, params)?,
            legacy: None,
            journal: None,
        })
    }

    /// Migrate users from `reader` on their first donation or read.
    pub fn with_legacy(mut self, reader: LegacyReader<L>) -> Self {
        self.legacy = Some(reader);
        self
    }

    pub fn with_journal(mut self, log: ActionLog) -> Self {
        self.journal = Some(log);
        self
    }

    pub fn engine(&self) -> &ReputationEngine<S> {
        &self.engine
    }

    pub fn journal(&self) -> Option<&ActionLog> {
        self.journal.as_ref()
    }

    pub fn state_hash(&self) -> String {
        self.engine.state_hash()
    }

    /// Donate `amount` from `user` to `post`; returns the impact granted.
    pub fn donate_at(
        &mut self,
        user: &AccountKey,
        post: &Permlink,
        amount: &Coin,
    ) -> Result<Coin, ManagerError> {
        check_user(user)?;
        check_post(post)?;
        check_amount(amount)?;
        self.migrate(user.as_str())?;
        let impact = self.apply(EngineAction::Donate {
            user: user.0.clone(),
            post: post.0.clone(),
            amount: amount.0.clone(),
        })?;
        Ok(Coin(impact.unwrap_or_else(Int::zero)))
    }

    /// Current reputation of `user`, settling a finished round first.
    pub fn get_reputation(&mut self, user: &AccountKey) -> Result<Coin, ManagerError> {
        check_user(user)?;
        self.migrate(user.as_str())?;
        let rep = self.apply(EngineAction::GetReputation { user: user.0.clone() })?;
        Ok(Coin(rep.unwrap_or_else(Int::zero)))
    }

    pub fn inc_free_score(&mut self, user: &AccountKey, score: &Int) -> Result<(), ManagerError> {
        check_user(user)?;
        self.apply(EngineAction::IncFreeScore {
            user: user.0.clone(),
            score: score.clone(),
        })?;
        Ok(())
    }

    pub fn on_stake_in(&mut self, user: &AccountKey, amount: &Coin) -> Result<(), ManagerError> {
        self.inc_free_score(user, &stake_free_score(amount))
    }

    pub fn on_stake_out(&mut self, user: &AccountKey, amount: &Coin) -> Result<(), ManagerError> {
        self.inc_free_score(user, &stake_free_score(amount).neg())
    }

    /// Block-end hook.
    pub fn end_block(&mut self, now: Time) -> Result<(), ManagerError> {
        self.apply(EngineAction::Update { now })?;
        Ok(())
    }

    pub fn current_round(&self) -> (RoundId, Time) {
        self.engine.get_current_round()
    }

    /// Settle every user and write the reputation table to `path`.
    /// Users are not migrated from the legacy store.
    pub fn export_to_file(&mut self, path: &Path) -> Result<(), ManagerError> {
        for u in self.engine.store().users() {
            self.apply(EngineAction::GetReputation { user: u })?;
        }
        let table = self.engine.store().export();
        export_table_to_file(&table, path)?;
        info!(
            path = %path.display(),
            users = table.reputations.len(),
            "reputation table written"
        );
        Ok(())
    }

    /// Export into `dir` under a file named after the current round.
    pub fn export_to_dir(&mut self, dir: &Path) -> Result<PathBuf, ManagerError> {
        let (round, _) = self.current_round();
        let path = dir.join(format!("reputation_round_{}.json", round));
        self.export_to_file(&path)?;
        Ok(path)
    }

    pub fn import_from_file(&mut self, path: &Path) -> Result<(), ManagerError> {
        let table = import_table_from_file(path)?;
        self.apply(EngineAction::ImportSnapshot { table })?;
        Ok(())
    }

    fn migrate(&mut self, u: &str) -> Result<(), ManagerError> {
        let prev = match &self.legacy {
            Some(reader) if self.engine.require_migrate(u) => reader.reputation(u),
            _ => return Ok(()),
        };
        self.apply(EngineAction::MigrateFromV1 {
            user: u.to_string(),
            prev,
        })?;
        Ok(())
    }

    fn apply(&mut self, action: EngineAction) -> Result<Option<Int>, ManagerError> {
        let result = self.engine.apply_action(&action);
        if let Some(log) = self.journal.as_mut() {
            log.append(&action)?;
        }
        Ok(result)
    }
}

fn stake_free_score(amount: &Coin) -> Int {
    mul_frac(&amount.0, STAKE_SCORE_NUM, STAKE_SCORE_DENOM)
}

fn check_user(user: &AccountKey) -> Result<(), ManagerError> {
    if user.0.is_empty() {
        warn!("rejected call with empty username");
        return Err(ManagerError::AccountNotFound(user.0.clone()));
    }
    Ok(())
}

fn check_amount(amount: &Coin) -> Result<(), ManagerError> {
    if amount.0.is_negative() {
        warn!(amount = %amount.0, "rejected negative donation");
        return Err(ManagerError::NegativeAmount(amount.0.clone()));
    }
    Ok(())
}

fn check_post(post: &Permlink) -> Result<(), ManagerError> {
    if post.0.is_empty() {
        warn!("rejected donation to empty permlink");
        return Err(ManagerError::PostNotFound(post.0.clone()));
    }
    Ok(())
}

//! Canonical company balances and holdings.
//!
//! Every company owns one [`Account`] behind its own mutex. All reads and
//! writes of a company's money and inventory happen while that mutex is held,
//! so a balance read-modify-write can never interleave with another trade for
//! the same company.

pub mod snapshot;

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::{
    models::{Company, CompanyId, InventoryItem, ResourceId},
    money::Money,
    trading::TradeError,
};

pub use snapshot::{LedgerLock, LedgerSnapshot, SnapshotStore};

/// Shortest accepted company name, in characters.
pub const MIN_COMPANY_NAME_LEN: usize = 3;
/// Longest accepted company name, in characters.
pub const MAX_COMPANY_NAME_LEN: usize = 50;

/// One company's balance and holdings.
#[derive(Debug, Clone)]
pub struct Account {
    company: Company,
    holdings: BTreeMap<ResourceId, InventoryItem>,
}

impl Account {
    fn new(company: Company) -> Self {
        Self {
            company,
            holdings: BTreeMap::new(),
        }
    }

    /// Company record as of now.
    pub fn company(&self) -> &Company {
        &self.company
    }

    /// Owned units of `resource_id`; zero when never held.
    pub fn quantity(&self, resource_id: ResourceId) -> u64 {
        self.holdings
            .get(&resource_id)
            .map(|item| item.quantity)
            .unwrap_or(0)
    }

    /// Holding for `resource_id`, or an empty one.
    pub fn holding(&self, resource_id: ResourceId) -> InventoryItem {
        self.holdings
            .get(&resource_id)
            .cloned()
            .unwrap_or_else(|| InventoryItem::empty(self.company.id, resource_id))
    }

    /// All holdings ordered by resource id.
    pub fn holdings(&self) -> impl Iterator<Item = &InventoryItem> {
        self.holdings.values()
    }

    /// Write a new balance and a new quantity together.
    ///
    /// Callers validate both values first; this never fails, so either both
    /// fields change or the caller returned before getting here.
    pub(crate) fn settle(
        &mut self,
        money: Money,
        resource_id: ResourceId,
        quantity: u64,
        at: DateTime<Utc>,
    ) -> (Company, InventoryItem) {
        self.company.money = money;
        self.company.updated_at = at;

        let company_id = self.company.id;
        let item = self
            .holdings
            .entry(resource_id)
            .or_insert_with(|| InventoryItem::empty(company_id, resource_id));
        item.quantity = quantity;
        item.updated_at = at;

        (self.company.clone(), item.clone())
    }
}

/// In-memory store of all company accounts.
pub struct Ledger {
    accounts: RwLock<BTreeMap<CompanyId, Arc<Mutex<Account>>>>,
    next_company_id: Mutex<i64>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Empty ledger; the first company gets id 1.
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(BTreeMap::new()),
            next_company_id: Mutex::new(1),
        }
    }

    /// Create a company holding `initial_money` and nothing else.
    pub fn open_company(&self, name: &str, initial_money: Money) -> Result<Company, TradeError> {
        let name = name.trim();
        let length = name.chars().count();
        if !(MIN_COMPANY_NAME_LEN..=MAX_COMPANY_NAME_LEN).contains(&length) {
            return Err(TradeError::Validation(format!(
                "company name must be between {MIN_COMPANY_NAME_LEN} and {MAX_COMPANY_NAME_LEN} characters"
            )));
        }
        if initial_money.is_negative() {
            return Err(TradeError::Validation(
                "initial money cannot be negative".to_string(),
            ));
        }

        let mut accounts = self.accounts.write();
        let mut next_id = self.next_company_id.lock();
        let id = CompanyId(*next_id);
        *next_id += 1;

        let now = Utc::now();
        let company = Company {
            id,
            name: name.to_string(),
            money: initial_money,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(id, Arc::new(Mutex::new(Account::new(company.clone()))));
        info!(company = %id, name = %company.name, money = %initial_money, "company opened");
        Ok(company)
    }

    fn account(&self, id: CompanyId) -> Result<Arc<Mutex<Account>>, TradeError> {
        self.accounts
            .read()
            .get(&id)
            .cloned()
            .ok_or(TradeError::CompanyNotFound(id))
    }

    /// Current company record.
    pub fn company(&self, id: CompanyId) -> Result<Company, TradeError> {
        Ok(self.account(id)?.lock().company.clone())
    }

    /// All companies ordered by id.
    pub fn companies(&self) -> Vec<Company> {
        let accounts: Vec<_> = self.accounts.read().values().cloned().collect();
        accounts
            .iter()
            .map(|account| account.lock().company.clone())
            .collect()
    }

    /// Every holding of a company, including emptied ones.
    pub fn inventory(&self, id: CompanyId) -> Result<Vec<InventoryItem>, TradeError> {
        let account = self.account(id)?;
        let guard = account.lock();
        Ok(guard.holdings().cloned().collect())
    }

    /// One holding; zero quantity when never held.
    pub fn holding(
        &self,
        id: CompanyId,
        resource_id: ResourceId,
    ) -> Result<InventoryItem, TradeError> {
        Ok(self.account(id)?.lock().holding(resource_id))
    }

    /// Run `f` inside the company's critical section.
    ///
    /// `f` must not call back into the ledger for the same company.
    pub fn with_account<R>(
        &self,
        id: CompanyId,
        f: impl FnOnce(&mut Account) -> Result<R, TradeError>,
    ) -> Result<R, TradeError> {
        let account = self.account(id)?;
        let mut guard = account.lock();
        f(&mut guard)
    }

    /// Copy of the whole ledger; each company is captured under its own lock.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let accounts: Vec<_> = self.accounts.read().values().cloned().collect();
        let next_company_id = *self.next_company_id.lock();

        let mut companies = Vec::with_capacity(accounts.len());
        let mut inventory = Vec::new();
        for account in accounts {
            let guard = account.lock();
            companies.push(guard.company.clone());
            inventory.extend(guard.holdings().cloned());
        }

        LedgerSnapshot {
            saved_at: Utc::now(),
            next_company_id,
            companies,
            inventory,
        }
    }

    /// Rebuild a ledger from a snapshot, re-checking its invariants.
    pub fn restore(snapshot: LedgerSnapshot) -> anyhow::Result<Self> {
        let mut accounts: BTreeMap<CompanyId, Account> = BTreeMap::new();
        for company in snapshot.companies {
            if company.money.is_negative() {
                anyhow::bail!("company {} has a negative balance", company.id);
            }
            if accounts.contains_key(&company.id) {
                anyhow::bail!("company {} appears twice", company.id);
            }
            accounts.insert(company.id, Account::new(company));
        }

        for item in snapshot.inventory {
            let account = accounts.get_mut(&item.company_id).ok_or_else(|| {
                anyhow::anyhow!(
                    "inventory row for resource {} references unknown company {}",
                    item.resource_id,
                    item.company_id
                )
            })?;
            account.holdings.insert(item.resource_id, item);
        }

        let highest_id = accounts.keys().map(|id| id.0).max().unwrap_or(0);
        let next_company_id = snapshot.next_company_id.max(highest_id + 1);

        Ok(Self {
            accounts: RwLock::new(
                accounts
                    .into_iter()
                    .map(|(id, account)| (id, Arc::new(Mutex::new(account))))
                    .collect(),
            ),
            next_company_id: Mutex::new(next_company_id),
        })
    }
}

//! Authoritative trade execution.
//!
//! [`TradeProcessor::execute_trade`] validates the request, then performs the
//! whole read-check-write of a company's balance and holding inside that
//! company's critical section. Every check happens before the first write,
//! so a rejected trade changes nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    catalog::Catalog,
    ledger::Ledger,
    models::{Company, CompanyId, Direction, InventoryItem, InventoryLine, ResourceId},
    money::{Money, MoneyError},
};

use super::TradeError;

/// Pack-denominated order for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Trading company.
    pub company_id: CompanyId,
    /// Traded resource.
    pub resource_id: ResourceId,
    /// Buy or sell.
    pub direction: Direction,
    /// Whole packs to move; must be positive.
    pub pack_count: u64,
}

/// Post-trade state returned by a successful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    /// The executed request.
    pub request: TradeRequest,
    /// Units moved.
    pub units: u64,
    /// Money paid for a buy or received for a sell.
    pub amount: Money,
    /// Company after settlement.
    pub company: Company,
    /// Holding after settlement.
    pub item: InventoryItem,
    /// Settlement time.
    pub executed_at: DateTime<Utc>,
}

/// Executes trades against the catalog and the ledger.
pub struct TradeProcessor {
    catalog: Catalog,
    ledger: Arc<Ledger>,
}

impl TradeProcessor {
    /// Processor over a catalog and a shared ledger.
    pub fn new(catalog: Catalog, ledger: Arc<Ledger>) -> Self {
        Self { catalog, ledger }
    }

    /// Catalog trades are priced from.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Backing ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Current company record.
    pub fn company(&self, company_id: CompanyId) -> Result<Company, TradeError> {
        self.ledger.company(company_id)
    }

    /// Holdings joined with catalog details, ordered by resource name.
    ///
    /// Emptied holdings stay listed with quantity zero; holdings whose resource
    /// left the catalog are omitted.
    pub fn inventory(&self, company_id: CompanyId) -> Result<Vec<InventoryLine>, TradeError> {
        let mut lines: Vec<InventoryLine> = self
            .ledger
            .inventory(company_id)?
            .into_iter()
            .filter_map(|item| {
                let resource = self.catalog.get(item.resource_id).ok()?;
                Some(InventoryLine {
                    resource_id: item.resource_id,
                    name: resource.name.clone(),
                    icon: resource.icon.clone(),
                    quantity: item.quantity,
                    price: resource.price,
                    pack_size: resource.pack_size,
                })
            })
            .collect();
        lines.sort_by(|a, b| a.name.cmp(&b.name).then(a.resource_id.cmp(&b.resource_id)));
        Ok(lines)
    }

    /// Execute one trade atomically.
    pub fn execute_trade(&self, request: &TradeRequest) -> Result<TradeReceipt, TradeError> {
        let outcome = self.settle(request);
        match &outcome {
            Ok(receipt) => info!(
                company = %request.company_id,
                resource = %request.resource_id,
                direction = %request.direction,
                packs = request.pack_count,
                units = receipt.units,
                amount = %receipt.amount,
                balance = %receipt.company.money,
                "trade executed"
            ),
            Err(err) => warn!(
                company = %request.company_id,
                resource = %request.resource_id,
                direction = %request.direction,
                packs = request.pack_count,
                %err,
                "trade rejected"
            ),
        }
        outcome
    }

    /// Run [`TradeProcessor::execute_trade`] on the blocking pool.
    pub async fn submit(self: Arc<Self>, request: TradeRequest) -> Result<TradeReceipt, TradeError> {
        tokio::task::spawn_blocking(move || self.execute_trade(&request))
            .await
            .map_err(|err| TradeError::Aborted(err.to_string()))?
    }

    fn settle(&self, request: &TradeRequest) -> Result<TradeReceipt, TradeError> {
        if request.pack_count == 0 {
            return Err(TradeError::Validation(
                "pack count must be positive".to_string(),
            ));
        }

        let resource = self.catalog.get(request.resource_id)?;
        if resource.pack_size == 0 {
            return Err(TradeError::InvalidResource {
                resource: resource.id,
                reason: "pack size must be positive".to_string(),
            });
        }
        if !resource.price.is_positive() {
            return Err(TradeError::InvalidResource {
                resource: resource.id,
                reason: format!("price {} must be positive", resource.price),
            });
        }

        let units = request
            .pack_count
            .checked_mul(resource.pack_size)
            .ok_or_else(|| TradeError::Validation("pack count is too large".to_string()))?;
        let amount = resource.price.checked_mul(request.pack_count)?;

        self.ledger.with_account(request.company_id, |account| {
            let balance = account.company().money;
            let owned = account.quantity(request.resource_id);

            let (money, quantity) = match request.direction {
                Direction::Buy => {
                    let money = balance.checked_sub(amount).map_err(|err| match err {
                        MoneyError::Underflow { .. } => TradeError::InsufficientFunds {
                            required: amount,
                            available: balance,
                        },
                        other => other.into(),
                    })?;
                    let quantity = owned.checked_add(units).ok_or_else(|| {
                        TradeError::Validation("holding would overflow".to_string())
                    })?;
                    (money, quantity)
                }
                Direction::Sell => {
                    if units > owned {
                        return Err(TradeError::InsufficientInventory {
                            required: units,
                            available: owned,
                        });
                    }
                    (balance.checked_add(amount)?, owned - units)
                }
            };

            let executed_at = Utc::now();
            let (company, item) = account.settle(money, request.resource_id, quantity, executed_at);
            Ok(TradeReceipt {
                request: *request,
                units,
                amount,
                company,
                item,
                executed_at,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;

    const WOOD: ResourceId = ResourceId(1);
    const STONE: ResourceId = ResourceId(2);

    fn catalog() -> Catalog {
        Catalog::new([
            Resource {
                id: WOOD,
                name: "Wood".to_string(),
                icon: "🪵".to_string(),
                description: String::new(),
                price: Money::from_thousandths(1_000),
                pack_size: 10,
            },
            Resource {
                id: STONE,
                name: "Stone".to_string(),
                icon: "🪨".to_string(),
                description: String::new(),
                price: Money::from_thousandths(2_500),
                pack_size: 5,
            },
            Resource {
                id: ResourceId(3),
                name: "Scrap".to_string(),
                icon: String::new(),
                description: String::new(),
                price: Money::ZERO,
                pack_size: 1,
            },
        ])
    }

    fn processor(balance: i64) -> Result<(Arc<TradeProcessor>, CompanyId), TradeError> {
        let ledger = Arc::new(Ledger::new());
        let company = ledger.open_company("Acme", Money::from_thousandths(balance))?;
        Ok((Arc::new(TradeProcessor::new(catalog(), ledger)), company.id))
    }

    fn request(company_id: CompanyId, direction: Direction, pack_count: u64) -> TradeRequest {
        TradeRequest {
            company_id,
            resource_id: WOOD,
            direction,
            pack_count,
        }
    }

    #[test]
    fn buy_moves_money_into_units() -> Result<(), TradeError> {
        let (processor, company) = processor(5_000)?;
        let receipt = processor.execute_trade(&request(company, Direction::Buy, 3))?;
        assert_eq!(receipt.units, 30);
        assert_eq!(receipt.amount, Money::from_thousandths(3_000));
        assert_eq!(receipt.company.money, Money::from_thousandths(2_000));
        assert_eq!(receipt.item.quantity, 30);
        assert_eq!(processor.company(company)?.money, Money::from_thousandths(2_000));
        Ok(())
    }

    #[test]
    fn sell_moves_units_into_money() -> Result<(), TradeError> {
        let (processor, company) = processor(5_000)?;
        processor.execute_trade(&request(company, Direction::Buy, 5))?;
        let receipt = processor.execute_trade(&request(company, Direction::Sell, 2))?;
        assert_eq!(receipt.units, 20);
        assert_eq!(receipt.company.money, Money::from_thousandths(2_000));
        assert_eq!(receipt.item.quantity, 30);
        Ok(())
    }

    #[test]
    fn rejections_leave_state_untouched() -> Result<(), TradeError> {
        let (processor, company) = processor(1_500)?;
        processor.execute_trade(&request(company, Direction::Buy, 1))?;
        let before = processor.company(company)?;
        let holding = processor.ledger().holding(company, WOOD)?;

        assert_eq!(
            processor.execute_trade(&request(company, Direction::Buy, 1)),
            Err(TradeError::InsufficientFunds {
                required: Money::from_thousandths(1_000),
                available: Money::from_thousandths(500),
            })
        );
        assert_eq!(
            processor.execute_trade(&request(company, Direction::Sell, 2)),
            Err(TradeError::InsufficientInventory {
                required: 20,
                available: 10,
            })
        );

        assert_eq!(processor.company(company)?, before);
        assert_eq!(processor.ledger().holding(company, WOOD)?, holding);
        Ok(())
    }

    #[test]
    fn partial_pack_sells_are_rejected_not_clamped() -> Result<(), TradeError> {
        let (processor, company) = processor(0)?;
        processor.ledger().with_account(company, |account| {
            Ok(account.settle(Money::ZERO, WOOD, 25, Utc::now()))
        })?;

        let err = processor
            .execute_trade(&request(company, Direction::Sell, 3))
            .unwrap_err();
        assert!(err.is_business_rejection());

        let receipt = processor.execute_trade(&request(company, Direction::Sell, 2))?;
        assert_eq!(receipt.item.quantity, 5);
        assert_eq!(receipt.company.money, Money::from_thousandths(2_000));
        Ok(())
    }

    #[test]
    fn malformed_requests_are_refused() -> Result<(), TradeError> {
        let (processor, company) = processor(10_000)?;
        assert!(matches!(
            processor.execute_trade(&request(company, Direction::Buy, 0)),
            Err(TradeError::Validation(_))
        ));
        assert_eq!(
            processor.execute_trade(&request(CompanyId(99), Direction::Buy, 1)),
            Err(TradeError::CompanyNotFound(CompanyId(99)))
        );

        let mut unknown = request(company, Direction::Buy, 1);
        unknown.resource_id = ResourceId(42);
        assert!(processor.execute_trade(&unknown).unwrap_err().is_not_found());

        let mut free = request(company, Direction::Buy, 1);
        free.resource_id = ResourceId(3);
        assert!(matches!(
            processor.execute_trade(&free),
            Err(TradeError::InvalidResource { .. })
        ));
        assert_eq!(processor.company(company)?.money, Money::from_thousandths(10_000));
        Ok(())
    }

    #[test]
    fn inventory_is_sorted_by_name_and_keeps_empty_rows() -> Result<(), TradeError> {
        let (processor, company) = processor(10_000)?;
        processor.execute_trade(&request(company, Direction::Buy, 1))?;
        processor.execute_trade(&TradeRequest {
            resource_id: STONE,
            ..request(company, Direction::Buy, 1)
        })?;
        processor.execute_trade(&request(company, Direction::Sell, 1))?;

        let lines = processor.inventory(company)?;
        let summary: Vec<_> = lines.iter().map(|l| (l.name.as_str(), l.quantity)).collect();
        assert_eq!(summary, [("Stone", 5), ("Wood", 0)]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_buys_cannot_both_spend_the_same_money() -> Result<(), TradeError> {
        let (processor, company) = processor(1_500)?;
        let first = tokio::spawn(processor.clone().submit(request(company, Direction::Buy, 1)));
        let second = tokio::spawn(processor.clone().submit(request(company, Direction::Buy, 1)));

        let outcomes = [
            first.await.map_err(|e| TradeError::Aborted(e.to_string()))?,
            second.await.map_err(|e| TradeError::Aborted(e.to_string()))?,
        ];
        let successes = outcomes.iter().filter(|o| o.is_ok()).count();
        let funds_rejections = outcomes
            .iter()
            .filter(|o| matches!(o, Err(TradeError::InsufficientFunds { .. })))
            .count();
        assert_eq!((successes, funds_rejections), (1, 1));
        assert_eq!(processor.company(company)?.money, Money::from_thousandths(500));
        assert_eq!(processor.ledger().holding(company, WOOD)?.quantity, 10);
        Ok(())
    }

    #[test]
    fn many_threads_never_overspend() -> Result<(), TradeError> {
        let (processor, company) = processor(20_000)?;
        let handles: Vec<_> = (0..40)
            .map(|i| {
                let processor = processor.clone();
                std::thread::spawn(move || {
                    let direction = if i % 4 == 3 {
                        Direction::Sell
                    } else {
                        Direction::Buy
                    };
                    processor.execute_trade(&request(company, direction, 1))
                })
            })
            .collect();

        let mut bought = 0_i64;
        let mut sold = 0_i64;
        for handle in handles {
            let outcome = handle
                .join()
                .map_err(|_| TradeError::Aborted("worker panicked".to_string()))?;
            if let Ok(receipt) = outcome {
                match receipt.request.direction {
                    Direction::Buy => bought += 1,
                    Direction::Sell => sold += 1,
                }
            }
        }

        let company = processor.company(company)?;
        let quantity = processor.ledger().holding(company.id, WOOD)?.quantity;
        assert!(!company.money.is_negative());
        assert_eq!(company.money.thousandths(), 20_000 - (bought - sold) * 1_000);
        assert_eq!(quantity as i64, (bought - sold) * 10);
        Ok(())
    }

    #[test]
    fn mixed_resources_share_one_running_balance() -> Result<(), TradeError> {
        let (processor, company) = processor(20_000)?;
        let handles: Vec<_> = (0..30)
            .map(|i| {
                let processor = processor.clone();
                std::thread::spawn(move || {
                    let resource_id = if i % 2 == 0 { WOOD } else { STONE };
                    processor.execute_trade(&TradeRequest {
                        company_id: company,
                        resource_id,
                        direction: Direction::Buy,
                        pack_count: 1,
                    })
                })
            })
            .collect();

        let mut receipts = Vec::new();
        for handle in handles {
            let outcome = handle
                .join()
                .map_err(|_| TradeError::Aborted("worker panicked".to_string()))?;
            match outcome {
                Ok(receipt) => receipts.push(receipt),
                Err(err) => assert!(matches!(err, TradeError::InsufficientFunds { .. })),
            }
        }
        assert!(!receipts.is_empty());

        // replaying receipts in balance order must walk down from the opening balance
        receipts.sort_by_key(|receipt| std::cmp::Reverse(receipt.company.money));
        let mut running = Money::from_thousandths(20_000);
        for receipt in &receipts {
            running = running.checked_sub(receipt.amount)?;
            assert_eq!(receipt.company.money, running);
        }

        let spent: i64 = receipts.iter().map(|r| r.amount.thousandths()).sum();
        assert!(spent <= 20_000);
        assert_eq!(processor.company(company)?.money.thousandths(), 20_000 - spent);

        let units = |resource_id| {
            receipts
                .iter()
                .filter(|r| r.request.resource_id == resource_id)
                .map(|r| r.units)
                .sum::<u64>()
        };
        assert_eq!(processor.ledger().holding(company, WOOD)?.quantity, units(WOOD));
        assert_eq!(processor.ledger().holding(company, STONE)?.quantity, units(STONE));
        Ok(())
    }

    #[test]
    fn stores_sharing_a_file_never_lose_a_trade() -> anyhow::Result<()> {
        use crate::ledger::SnapshotStore;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ledger.json");
        let seed = Ledger::new();
        let company = seed.open_company("Acme", Money::from_thousandths(1_500))?.id;
        SnapshotStore::new(&path).save_ledger(&seed)?;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || -> anyhow::Result<bool> {
                    let store = SnapshotStore::new(path);
                    let _lock = store.lock()?;
                    let ledger = Arc::new(store.load_ledger()?);
                    let processor = TradeProcessor::new(catalog(), ledger);
                    let outcome = processor.execute_trade(&request(company, Direction::Buy, 1));
                    store.save_ledger(processor.ledger())?;
                    Ok(outcome.is_ok())
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            let traded = handle
                .join()
                .map_err(|_| anyhow::anyhow!("worker panicked"))??;
            successes += usize::from(traded);
        }
        assert_eq!(successes, 1);

        let ledger = SnapshotStore::new(&path).load_ledger()?;
        assert_eq!(ledger.company(company)?.money, Money::from_thousandths(500));
        assert_eq!(ledger.holding(company, WOOD)?.quantity, 10);
        Ok(())
    }
}

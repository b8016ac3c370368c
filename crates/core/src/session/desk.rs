use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    catalog::Catalog,
    models::{Company, CompanyId, InventoryItem, ResourceId},
    trading::{
        BaselineShift, QuantityEditor, SubmitRejected, TradeError, TradeIntent, TradeProcessor,
        TradeReceipt, TradeRequest, TradeStatus, TradeStatusMachine,
    },
};

/// Why a desk operation did not produce a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeskError {
    /// Refused locally; the processor was never called.
    #[error(transparent)]
    Rejected(#[from] SubmitRejected),
    /// Refused by the processor or by catalog validation.
    #[error(transparent)]
    Trade(#[from] TradeError),
}

/// One company's trading session.
///
/// Caches the canonical balance and holdings, keeps one [`QuantityEditor`] per
/// resource being edited and one [`TradeStatusMachine`] per traded resource.
/// Editors share the company balance, so every balance change recomputes all
/// of their ceilings.
pub struct TradeDesk {
    company: Company,
    catalog: Catalog,
    holdings: BTreeMap<ResourceId, u64>,
    editors: BTreeMap<ResourceId, QuantityEditor>,
    statuses: BTreeMap<ResourceId, TradeStatusMachine>,
    display_window: Duration,
}

impl TradeDesk {
    /// Load the company's canonical state from the processor.
    pub fn open(
        processor: &TradeProcessor,
        company_id: CompanyId,
        display_window: Duration,
    ) -> Result<Self, TradeError> {
        let company = processor.company(company_id)?;
        let holdings = processor
            .ledger()
            .inventory(company_id)?
            .into_iter()
            .map(|item| (item.resource_id, item.quantity))
            .collect();
        Ok(Self {
            company,
            catalog: processor.catalog().clone(),
            holdings,
            editors: BTreeMap::new(),
            statuses: BTreeMap::new(),
            display_window,
        })
    }

    /// Last known company record.
    pub fn company(&self) -> &Company {
        &self.company
    }

    /// Last known owned quantity of a resource.
    pub fn quantity(&self, resource_id: ResourceId) -> u64 {
        self.holdings.get(&resource_id).copied().unwrap_or(0)
    }

    /// Resources with an open editor.
    pub fn editing(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.editors.keys().copied()
    }

    /// Open an editor at the owned quantity, or return the one already open.
    pub fn begin_edit(&mut self, resource_id: ResourceId) -> Result<&mut QuantityEditor, TradeError> {
        match self.editors.entry(resource_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let resource = self.catalog.get(resource_id)?.clone();
                let baseline = self.holdings.get(&resource_id).copied().unwrap_or(0);
                let editor = QuantityEditor::new(resource, baseline)?.with_balance(self.company.money);
                Ok(entry.insert(editor))
            }
        }
    }

    /// Open editor for a resource.
    pub fn editor(&self, resource_id: ResourceId) -> Option<&QuantityEditor> {
        self.editors.get(&resource_id)
    }

    /// Open editor for a resource, mutably.
    pub fn editor_mut(&mut self, resource_id: ResourceId) -> Option<&mut QuantityEditor> {
        self.editors.get_mut(&resource_id)
    }

    /// Discard the edit session. An in-flight request is unaffected.
    pub fn cancel(&mut self, resource_id: ResourceId) -> bool {
        self.editors.remove(&resource_id).is_some()
    }

    /// Trade the open editor currently describes.
    pub fn quote(&self, resource_id: ResourceId) -> Result<TradeIntent, DeskError> {
        let editor = self
            .editors
            .get(&resource_id)
            .ok_or(SubmitRejected::NotEditing(resource_id))?;
        Ok(editor.intent()?)
    }

    /// Status of a resource; idle when never traded.
    pub fn status(&self, resource_id: ResourceId) -> TradeStatus {
        self.statuses
            .get(&resource_id)
            .map(TradeStatusMachine::status)
            .unwrap_or(TradeStatus::Idle)
    }

    /// Mark the resource pending and build the request to send.
    pub fn submit(&mut self, resource_id: ResourceId) -> Result<TradeRequest, DeskError> {
        let intent = self.quote(resource_id)?;
        let window = self.display_window;
        self.statuses
            .entry(resource_id)
            .or_insert_with(|| TradeStatusMachine::new(resource_id, window))
            .submit(&intent)?;

        let request = intent
            .to_request(self.company.id)
            .ok_or(SubmitRejected::NothingToTrade(resource_id))?;
        debug!(resource = %resource_id, direction = %request.direction, packs = request.pack_count, "trade submitted");
        Ok(request)
    }

    /// Apply the processor's answer for a submitted resource.
    ///
    /// On success the receipt becomes the canonical state and the edit is
    /// consumed. On failure the editor is left as it was so the user can retry.
    pub fn complete(
        &mut self,
        resource_id: ResourceId,
        outcome: Result<TradeReceipt, TradeError>,
        now: Instant,
    ) -> Result<TradeReceipt, TradeError> {
        let status = self.statuses.get_mut(&resource_id);
        match outcome {
            Ok(receipt) => {
                if let Some(status) = status {
                    status.succeed(now);
                }
                self.apply_receipt(&receipt);
                Ok(receipt)
            }
            Err(err) => {
                if let Some(status) = status {
                    status.fail();
                }
                Err(err)
            }
        }
    }

    /// Submit, execute on the processor, then complete and reconcile.
    pub async fn trade(
        &mut self,
        processor: &Arc<TradeProcessor>,
        resource_id: ResourceId,
    ) -> Result<TradeReceipt, DeskError> {
        let request = self.submit(resource_id)?;
        let outcome = Arc::clone(processor).submit(request).await;
        let receipt = self.complete(resource_id, outcome, Instant::now())?;
        if let Err(err) = self.reload(processor) {
            warn!(company = %self.company.id, %err, "reconciliation after trade failed");
        }
        Ok(receipt)
    }

    /// Adopt canonical state fetched elsewhere, keeping in-progress targets.
    ///
    /// Returns the editors whose baseline moved or whose target was clamped.
    pub fn refresh(
        &mut self,
        company: Company,
        inventory: &[InventoryItem],
    ) -> Vec<(ResourceId, BaselineShift)> {
        self.company = company;
        self.holdings = inventory
            .iter()
            .map(|item| (item.resource_id, item.quantity))
            .collect();

        let money = self.company.money;
        let mut shifts = Vec::new();
        for (resource_id, editor) in self.editors.iter_mut() {
            let canonical = self.holdings.get(resource_id).copied().unwrap_or(0);
            let shift = editor.resync(canonical, money);
            if shift.changed() || shift.target_clamped {
                shifts.push((*resource_id, shift));
            }
        }
        shifts
    }

    /// Re-read the company and its holdings from the processor.
    pub fn reload(
        &mut self,
        processor: &TradeProcessor,
    ) -> Result<Vec<(ResourceId, BaselineShift)>, TradeError> {
        let company = processor.company(self.company.id)?;
        let inventory = processor.ledger().inventory(self.company.id)?;
        Ok(self.refresh(company, &inventory))
    }

    /// Expire success indicators; returns the resources that went idle.
    pub fn tick(&mut self, now: Instant) -> Vec<ResourceId> {
        self.statuses
            .iter_mut()
            .filter_map(|(resource_id, status)| status.tick(now).then_some(*resource_id))
            .collect()
    }

    fn apply_receipt(&mut self, receipt: &TradeReceipt) {
        // Receipts can arrive out of order; never step back to an older balance.
        if receipt.company.updated_at >= self.company.updated_at {
            self.company = receipt.company.clone();
        }
        let resource_id = receipt.item.resource_id;
        self.holdings.insert(resource_id, receipt.item.quantity);

        let money = self.company.money;
        for (id, editor) in self.editors.iter_mut() {
            if *id == resource_id {
                editor.commit(receipt.item.quantity, money);
            } else {
                editor.set_balance(money);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::Ledger,
        models::{Direction, Resource},
        money::Money,
    };

    const WOOD: ResourceId = ResourceId(1);
    const STONE: ResourceId = ResourceId(2);
    const WINDOW: Duration = Duration::from_millis(1_500);

    fn setup(balance: i64) -> Result<(Arc<TradeProcessor>, CompanyId), TradeError> {
        let catalog = Catalog::new([
            Resource {
                id: WOOD,
                name: "Wood".to_string(),
                icon: String::new(),
                description: String::new(),
                price: Money::from_thousandths(1_000),
                pack_size: 10,
            },
            Resource {
                id: STONE,
                name: "Stone".to_string(),
                icon: String::new(),
                description: String::new(),
                price: Money::from_thousandths(2_500),
                pack_size: 5,
            },
        ]);
        let ledger = Arc::new(Ledger::new());
        let company = ledger.open_company("Acme", Money::from_thousandths(balance))?;
        Ok((Arc::new(TradeProcessor::new(catalog, ledger)), company.id))
    }

    #[tokio::test]
    async fn buy_flow_settles_and_resets_the_editor() -> Result<(), DeskError> {
        let (processor, company) = setup(5_000)?;
        let mut desk = TradeDesk::open(&processor, company, WINDOW)?;

        let editor = desk.begin_edit(WOOD)?;
        assert_eq!(editor.buy_ceiling(), Some(50));
        editor.set_target(25);
        assert_eq!(desk.quote(WOOD)?.pack_count, 3);

        let receipt = desk.trade(&processor, WOOD).await?;
        assert_eq!(receipt.units, 30);
        assert_eq!(desk.company().money, Money::from_thousandths(2_000));
        assert_eq!(desk.quantity(WOOD), 30);
        assert_eq!(desk.status(WOOD), TradeStatus::Succeeded);

        let editor = desk.editor(WOOD).ok_or(SubmitRejected::NotEditing(WOOD))?;
        assert_eq!(editor.baseline(), 30);
        assert_eq!(editor.target(), 30);
        assert_eq!(editor.buy_ceiling(), Some(50));

        assert_eq!(desk.tick(Instant::now() + WINDOW), vec![WOOD]);
        assert_eq!(desk.status(WOOD), TradeStatus::Idle);
        Ok(())
    }

    #[test]
    fn double_submit_is_stopped_before_the_processor() -> Result<(), DeskError> {
        let (processor, company) = setup(5_000)?;
        let mut desk = TradeDesk::open(&processor, company, WINDOW)?;
        desk.begin_edit(WOOD)?.set_target(10);

        let request = desk.submit(WOOD)?;
        assert_eq!(
            desk.submit(WOOD),
            Err(DeskError::Rejected(SubmitRejected::AlreadyPending(WOOD)))
        );
        assert_eq!(processor.company(company)?.money, Money::from_thousandths(5_000));

        let outcome = processor.execute_trade(&request);
        desk.complete(WOOD, outcome, Instant::now())?;
        assert_eq!(processor.company(company)?.money, Money::from_thousandths(4_000));
        assert_eq!(desk.status(WOOD), TradeStatus::Succeeded);
        Ok(())
    }

    #[tokio::test]
    async fn failed_trade_keeps_the_target_for_a_retry() -> Result<(), DeskError> {
        let (processor, company) = setup(5_000)?;
        let mut desk = TradeDesk::open(&processor, company, WINDOW)?;
        desk.begin_edit(WOOD)?.set_target(30);

        // Spend the money behind the desk's back.
        processor.execute_trade(&TradeRequest {
            company_id: company,
            resource_id: STONE,
            direction: Direction::Buy,
            pack_count: 2,
        })?;

        let err = desk.trade(&processor, WOOD).await.unwrap_err();
        assert!(matches!(
            err,
            DeskError::Trade(TradeError::InsufficientFunds { .. })
        ));
        assert_eq!(desk.status(WOOD), TradeStatus::Idle);
        assert_eq!(desk.editor(WOOD).map(QuantityEditor::target), Some(30));
        assert_eq!(processor.ledger().holding(company, WOOD)?.quantity, 0);
        Ok(())
    }

    #[tokio::test]
    async fn a_trade_lowers_every_other_ceiling() -> Result<(), DeskError> {
        let (processor, company) = setup(5_000)?;
        let mut desk = TradeDesk::open(&processor, company, WINDOW)?;
        desk.begin_edit(STONE)?.set_target(10);
        assert_eq!(desk.editor(STONE).and_then(QuantityEditor::buy_ceiling), Some(10));

        desk.begin_edit(WOOD)?.set_target(30);
        desk.trade(&processor, WOOD).await?;

        let stone = desk.editor(STONE).ok_or(SubmitRejected::NotEditing(STONE))?;
        assert_eq!(stone.buy_ceiling(), Some(0));
        assert_eq!(stone.target(), 0);
        Ok(())
    }

    #[test]
    fn reload_moves_baselines_and_keeps_targets() -> Result<(), DeskError> {
        let (processor, company) = setup(10_000)?;
        let mut desk = TradeDesk::open(&processor, company, WINDOW)?;
        desk.begin_edit(WOOD)?.set_target(50);

        processor.execute_trade(&TradeRequest {
            company_id: company,
            resource_id: WOOD,
            direction: Direction::Buy,
            pack_count: 2,
        })?;

        let shifts = desk.reload(&processor)?;
        assert_eq!(shifts.len(), 1);
        let (resource, shift) = shifts[0];
        assert_eq!(resource, WOOD);
        assert_eq!((shift.previous_baseline, shift.baseline), (0, 20));
        assert_eq!(shift.target, 50);
        assert_eq!(desk.quote(WOOD)?.pack_count, 3);
        assert_eq!(desk.company().money, Money::from_thousandths(8_000));
        Ok(())
    }

    #[tokio::test]
    async fn selling_everything_leaves_the_partial_pack() -> Result<(), DeskError> {
        let (processor, company) = setup(0)?;
        processor.ledger().with_account(company, |account| {
            Ok(account.settle(Money::ZERO, WOOD, 25, chrono::Utc::now()))
        })?;
        let mut desk = TradeDesk::open(&processor, company, WINDOW)?;

        let editor = desk.begin_edit(WOOD)?;
        assert!(editor.can_sell_all());
        editor.sell_all();
        let receipt = desk.trade(&processor, WOOD).await?;
        assert_eq!(receipt.units, 20);
        assert_eq!(desk.quantity(WOOD), 5);
        assert_eq!(desk.company().money, Money::from_thousandths(2_000));
        Ok(())
    }

    #[test]
    fn submit_needs_an_open_edit_with_something_to_trade() -> Result<(), DeskError> {
        let (processor, company) = setup(5_000)?;
        let mut desk = TradeDesk::open(&processor, company, WINDOW)?;
        assert_eq!(
            desk.submit(WOOD),
            Err(DeskError::Rejected(SubmitRejected::NotEditing(WOOD)))
        );

        desk.begin_edit(WOOD)?;
        assert_eq!(
            desk.submit(WOOD),
            Err(DeskError::Rejected(SubmitRejected::NothingToTrade(WOOD)))
        );
        assert_eq!(desk.status(WOOD), TradeStatus::Idle);

        assert!(desk.cancel(WOOD));
        assert!(!desk.cancel(WOOD));
        assert_eq!(desk.editing().count(), 0);
        assert!(matches!(
            desk.begin_edit(ResourceId(77)),
            Err(TradeError::ResourceNotFound(_))
        ));
        Ok(())
    }
}

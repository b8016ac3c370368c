use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use ownboss_core::{
    catalog::load_seed_file,
    config::AppConfig,
    ledger::{Ledger, LedgerLock, SnapshotStore},
    models::{CompanyId, Direction, ResourceId},
    money::Money,
    trading::{Affordability, QuantityEditor, TradeIntent, TradeProcessor, TradeReceipt},
    TradeDesk,
};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Open a new company with the configured starting balance.
    OpenCompany {
        /// Company name, 3 to 50 characters.
        name: String,
        /// Starting balance such as `1,500.250`; overrides the configured one.
        #[arg(long)]
        money: Option<Money>,
    },
    /// Show a company's balance.
    Company { company: i64 },
    /// List a company's holdings.
    Inventory { company: i64 },
    /// List the resource catalog.
    Resources,
    /// Preview a trade without executing it.
    Quote(TradeArgs),
    /// Execute a trade.
    Trade(TradeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TradeArgs {
    /// Trading company id.
    company: i64,
    /// Resource id.
    resource: i64,
    #[command(flatten)]
    target: TargetArgs,
}

/// How the target quantity is chosen.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Quantity to own afterwards; clamped to what the balance allows.
    #[arg(long, allow_negative_numbers = true)]
    target: Option<i64>,
    /// Sell every whole pack owned.
    #[arg(long)]
    sell_all: bool,
    /// Buy as many packs as the balance allows.
    #[arg(long)]
    max: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

/// Catalog and ledger for one run. The ledger lock is held from load until
/// the workspace drops, so concurrent runs queue instead of overwriting
/// each other's saves.
struct Workspace {
    processor: Arc<TradeProcessor>,
    store: SnapshotStore,
    _lock: LedgerLock,
}

impl Workspace {
    fn load(config: &AppConfig) -> Result<Self> {
        let (catalog, report) = load_seed_file(&config.catalog_path)
            .with_context(|| format!("failed to load catalog {}", config.catalog_path.display()))?;
        if report.skipped > 0 || report.untradeable > 0 {
            warn!(
                skipped = report.skipped,
                untradeable = report.untradeable,
                "catalog has unusable entries"
            );
        }

        let store = SnapshotStore::new(config.ledger_path());
        let lock = store.lock()?;
        let ledger: Arc<Ledger> = Arc::new(store.load_ledger()?);
        Ok(Self {
            processor: Arc::new(TradeProcessor::new(catalog, ledger)),
            store,
            _lock: lock,
        })
    }

    fn save(&self) -> Result<()> {
        self.store.save_ledger(self.processor.ledger())
    }
}

pub async fn run(command: Command, config: &AppConfig, mode: OutputMode) -> Result<()> {
    let workspace = Workspace::load(config)?;
    let processor = &workspace.processor;

    match command {
        Command::OpenCompany { name, money } => {
            let company = processor
                .ledger()
                .open_company(&name, money.unwrap_or(config.initial_money))?;
            workspace.save()?;
            emit(mode, &company, || {
                format!(
                    "Opened company #{} \"{}\" with ${}",
                    company.id,
                    company.name,
                    company.money.to_display_string()
                )
            })
        }
        Command::Company { company } => {
            let company = processor.company(CompanyId(company))?;
            emit(mode, &company, || {
                format!(
                    "#{} {}: ${}",
                    company.id,
                    company.name,
                    company.money.to_display_string()
                )
            })
        }
        Command::Inventory { company } => {
            let lines = processor.inventory(CompanyId(company))?;
            emit(mode, &lines, || {
                if lines.is_empty() {
                    return "No holdings.".to_string();
                }
                lines
                    .iter()
                    .map(|line| {
                        format!(
                            "{:>4}  {:<20} {:>8} units  ${} per {}",
                            line.resource_id,
                            line.name,
                            line.quantity,
                            line.price.to_display_string(),
                            line.pack_size
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Resources => {
            let resources = processor.catalog().by_name();
            emit(mode, &resources, || {
                resources
                    .iter()
                    .map(|resource| {
                        format!(
                            "{:>4}  {} {:<20} ${} per {}",
                            resource.id,
                            resource.icon,
                            resource.name,
                            resource.price.to_display_string(),
                            resource.pack_size
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Quote(args) => {
            let mut desk = open_desk(processor, config, &args)?;
            let resource_id = ResourceId(args.resource);
            apply_target(desk.begin_edit(resource_id)?, &args.target)?;
            let intent = desk.quote(resource_id)?;
            let affordability = desk
                .editor(resource_id)
                .and_then(QuantityEditor::affordability);
            let quote = Quote {
                intent: &intent,
                affordability,
            };
            emit(mode, &quote, || describe_intent(&intent, affordability))
        }
        Command::Trade(args) => {
            let mut desk = open_desk(processor, config, &args)?;
            let resource_id = ResourceId(args.resource);
            apply_target(desk.begin_edit(resource_id)?, &args.target)?;

            let receipt = desk.trade(processor, resource_id).await?;
            workspace.save()?;
            info!(company = args.company, resource = args.resource, "ledger saved after trade");
            emit(mode, &receipt, || describe_receipt(&receipt))
        }
    }
}

#[derive(Serialize)]
struct Quote<'a> {
    #[serde(flatten)]
    intent: &'a TradeIntent,
    affordability: Option<Affordability>,
}

fn open_desk(processor: &TradeProcessor, config: &AppConfig, args: &TradeArgs) -> Result<TradeDesk> {
    Ok(TradeDesk::open(
        processor,
        CompanyId(args.company),
        config.success_display(),
    )?)
}

fn apply_target(editor: &mut QuantityEditor, target: &TargetArgs) -> Result<()> {
    if target.sell_all {
        if !editor.can_sell_all() {
            bail!("nothing to sell");
        }
        editor.sell_all();
    } else if target.max {
        if !editor.can_buy_max() {
            bail!("the balance does not cover another pack");
        }
        editor.set_max_buy();
    } else if let Some(requested) = target.target {
        let stored = editor.set_target(requested);
        if i128::from(stored) != i128::from(requested) {
            warn!(requested, stored, "target clamped");
        }
    }
    Ok(())
}

fn describe_intent(intent: &TradeIntent, affordability: Option<Affordability>) -> String {
    let mut text = match intent.direction {
        None => format!("Target equals holding ({}); nothing to trade.", intent.original_quantity),
        Some(direction) => format!(
            "{} {} pack(s) = {} units for ${}; holding {} -> {}",
            verb(direction),
            intent.pack_count,
            intent.units_moved(),
            intent.cost.to_display_string(),
            intent.original_quantity,
            intent.resulting_quantity()
        ),
    };
    if intent.direction.is_some() && !intent.is_submittable() {
        text.push_str(" (less than one whole pack; cannot be submitted)");
    }
    if let Some(affordability) = affordability {
        text.push_str(&format!(
            "\nAffordable: {} pack(s), up to {} units",
            affordability.max_affordable_packs, affordability.buy_ceiling_quantity
        ));
    }
    text
}

fn describe_receipt(receipt: &TradeReceipt) -> String {
    format!(
        "{} {} pack(s) = {} units for ${}. Balance ${}, holding {}.",
        match receipt.request.direction {
            Direction::Buy => "Bought",
            Direction::Sell => "Sold",
        },
        receipt.request.pack_count,
        receipt.units,
        receipt.amount.to_display_string(),
        receipt.company.money.to_display_string(),
        receipt.item.quantity
    )
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Buy => "Buy",
        Direction::Sell => "Sell",
    }
}

fn emit<T: Serialize + ?Sized>(mode: OutputMode, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    match mode {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputMode::Text => println!("{}", text()),
    }
    Ok(())
}

//! Command handlers. Each returns the JSON document the command prints.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use onclinic_core::sequence::IdentifierFormat;
use onclinic_core::{
    AppConfig, CallContext, Category, Database, InventoryItem, Reason, SequenceAllocator,
    StockAdjustment, StockLedger,
};
use serde_json::{json, Value};

pub struct ItemArgs {
    pub name: String,
    pub sku: String,
    pub opening_stock: i64,
    pub threshold: Option<i64>,
    pub expiry: Option<NaiveDate>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
}

pub fn allocate(db: &Database, config: &AppConfig, category: &str, date: NaiveDate) -> Result<Value> {
    let Some(category) = Category::parse(category) else {
        bail!("unknown category '{category}' (expected clinic-bill, pharmacy-bill, prescription or patient)");
    };

    let scope = IdentifierFormat::from(&config.sequence).scope(category, date);
    let allocation = SequenceAllocator::with_config(db, &config.sequence)
        .allocate(&scope, &CallContext::background())
        .with_context(|| format!("allocation failed for scope {scope}"))?;

    Ok(json!({
        "category": category.as_str(),
        "scope": scope.prefix(),
        "allocation": allocation,
    }))
}

pub fn add_item(db: &Database, config: &AppConfig, args: ItemArgs) -> Result<Value> {
    let mut item = InventoryItem::new(args.name, args.sku, args.opening_stock);
    item.low_stock_threshold = args.threshold;
    item.expiry_date = args.expiry;
    item.category = args.category;
    item.manufacturer = args.manufacturer;

    let item = StockLedger::with_config(db, &config.ledger)
        .create_item(&item)
        .context("failed to add item")?;
    Ok(serde_json::to_value(item)?)
}

#[allow(clippy::too_many_arguments)]
pub fn adjust(
    db: &Database,
    config: &AppConfig,
    item: &str,
    delta: i64,
    reason: &str,
    notes: Option<String>,
    bill: Option<String>,
    by: Option<String>,
) -> Result<Value> {
    let item = resolve_item(db, item)?;
    let reason = Reason::parse(reason)?;

    let adjustment = StockAdjustment {
        item_id: item.item_id,
        delta,
        reason,
        notes,
        reference_bill_id: bill,
        created_by: by,
    };
    let result = StockLedger::with_config(db, &config.ledger)
        .adjust_stock(&adjustment, &CallContext::background())
        .with_context(|| format!("failed to adjust stock of {}", item.sku))?;
    Ok(serde_json::to_value(result)?)
}

pub fn low_stock(db: &Database, config: &AppConfig) -> Result<Value> {
    let items = StockLedger::with_config(db, &config.ledger).low_stock_items()?;
    Ok(serde_json::to_value(items)?)
}

pub fn expiring(db: &Database, config: &AppConfig, months: u32, today: NaiveDate) -> Result<Value> {
    let items = StockLedger::with_config(db, &config.ledger).expiring_items(months, today)?;
    Ok(serde_json::to_value(items)?)
}

/// Without `repair`, any drift or broken chain is an error so scripts can
/// alert on the exit status.
pub fn reconcile(db: &Database, config: &AppConfig, repair: bool) -> Result<Value> {
    let ledger = StockLedger::with_config(db, &config.ledger);
    let reports = ledger.reconcile_all()?;
    let drifted: Vec<_> = reports.iter().filter(|r| !r.is_consistent()).collect();

    if drifted.is_empty() {
        return Ok(json!({ "items": reports.len(), "drifted": [] }));
    }

    if !repair {
        let names: Vec<_> = drifted.iter().map(|r| r.name.as_str()).collect();
        bail!(
            "{} item(s) out of balance with the ledger: {} (rerun with --repair)",
            drifted.len(),
            names.join(", ")
        );
    }

    let mut repaired = Vec::new();
    for report in drifted {
        repaired.push(
            ledger
                .repair_item(&report.item_id)
                .with_context(|| format!("failed to repair {}", report.name))?,
        );
    }
    Ok(json!({ "items": reports.len(), "repaired": repaired }))
}

pub fn history(db: &Database, config: &AppConfig, item: &str) -> Result<Value> {
    let item = resolve_item(db, item)?;
    let entries = StockLedger::with_config(db, &config.ledger).history(&item.item_id)?;
    Ok(json!({
        "item_id": item.item_id,
        "sku": item.sku,
        "current_stock": item.current_stock,
        "entries": entries,
    }))
}

/// Look an item up by ID, then by SKU.
fn resolve_item(db: &Database, key: &str) -> Result<InventoryItem> {
    if let Some(item) = db.get_item(key)? {
        return Ok(item);
    }
    db.get_item_by_sku(key)?
        .with_context(|| format!("no inventory item with ID or SKU '{key}'"))
}

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;

use common::InMemoryPlatform;
use stockroom_api::entities::{AdjustmentSource, Channel};
use stockroom_api::platform::{PlatformOrder, PlatformOrderLine};
use stockroom_api::services::sync::OrderIngest;

fn order(id: &str, state: &str, lines: Vec<PlatformOrderLine>) -> PlatformOrder {
    let total = lines
        .iter()
        .map(|l| l.unit_price * rust_decimal::Decimal::from(l.quantity))
        .sum();
    PlatformOrder {
        id: id.to_string(),
        state: state.to_string(),
        total,
        lines,
    }
}

fn line(item_id: Option<&str>, qty: i32) -> PlatformOrderLine {
    PlatformOrderLine {
        item_id: item_id.map(|s| s.to_string()),
        name: "line".to_string(),
        unit_price: dec!(19.99),
        quantity: qty,
    }
}

#[tokio::test]
async fn pull_corrects_local_count_from_platform() {
    let platform = Arc::new(InMemoryPlatform::with_items(vec![common::platform_item(
        "p1",
        Some("CND-1"),
        7,
    )]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    let item = common::seed_item(&state, "Candle", Some("CND-1"), 5).await;

    let tally = state.sync_service().unwrap().pull().await.unwrap();

    assert_eq!(tally.total, 1);
    assert_eq!(tally.matched, 1);
    assert_eq!(tally.updated, 1);
    assert!(tally.errors.is_empty());

    let refreshed = state.inventory.get_item(item.id).await.unwrap();
    assert_eq!(refreshed.quantity, 7);
    // SKU match stored the platform link for next time
    assert_eq!(refreshed.platform_item_id.as_deref(), Some("p1"));

    let entry = state
        .inventory
        .item_history(item.id)
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(entry.source, AdjustmentSource::PlatformSync);
    assert_eq!(entry.quantity_delta, 2);
    assert_eq!(entry.previous_quantity, 5);
    assert_eq!(entry.new_quantity, 7);
}

#[tokio::test]
async fn pull_skips_items_without_a_local_counterpart() {
    let platform = Arc::new(InMemoryPlatform::with_items(vec![common::platform_item(
        "p9",
        Some("UNKNOWN-SKU"),
        3,
    )]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;

    let tally = state.sync_service().unwrap().pull().await.unwrap();

    assert_eq!(tally.total, 1);
    assert_eq!(tally.matched, 0);
    assert_eq!(tally.skipped, 1);
    // The engine never invents local items from platform data.
    let (items, total) = state.inventory.list_items(1, 10).await.unwrap();
    assert!(items.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn pull_with_equal_counts_writes_nothing() {
    let platform = Arc::new(InMemoryPlatform::with_items(vec![common::platform_item(
        "p1",
        Some("CND-1"),
        5,
    )]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    let item = common::seed_item(&state, "Candle", Some("CND-1"), 5).await;

    let tally = state.sync_service().unwrap().pull().await.unwrap();
    assert_eq!(tally.matched, 1);
    assert_eq!(tally.updated, 0);

    // Only the intake entry is on the ledger.
    assert_eq!(state.inventory.item_history(item.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn push_creates_unlinked_items_and_links_back() {
    let platform = Arc::new(InMemoryPlatform::default());
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    let item = common::seed_item(&state, "Soap", Some("SOAP-1"), 4).await;

    let tally = state.sync_service().unwrap().push().await.unwrap();

    assert_eq!(tally.total, 1);
    assert_eq!(tally.created, 1);
    assert!(tally.errors.is_empty());

    let refreshed = state.inventory.get_item(item.id).await.unwrap();
    let link = refreshed.platform_item_id.expect("link stored after create");
    assert_eq!(
        platform.stock_updates.lock().unwrap().as_slice(),
        &[(link, 4)]
    );
    // Push mirrors outward only; local quantity is untouched.
    assert_eq!(refreshed.quantity, 4);
}

#[tokio::test]
async fn full_sync_merges_both_phases_and_checkpoints() {
    let platform = Arc::new(InMemoryPlatform::with_items(vec![common::platform_item(
        "p1",
        Some("CND-1"),
        9,
    )]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    common::seed_item(&state, "Candle", Some("CND-1"), 5).await;

    let tally = state.sync_service().unwrap().full_sync().await.unwrap();
    assert_eq!(tally.total, 2); // one pulled + one pushed
    assert!(tally.errors.is_empty());

    let status = state.sync_service().unwrap().status().await.unwrap();
    assert!(status.connected);
    assert!(status.last_sync_at.is_some());
    // Pull then push left both sides agreeing.
    assert!(status.mismatches.is_empty());
}

#[tokio::test]
async fn status_reports_live_count_mismatches() {
    let platform = Arc::new(InMemoryPlatform::with_items(vec![common::platform_item(
        "p1",
        Some("CND-1"),
        3,
    )]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    let item = common::seed_item(&state, "Candle", Some("CND-1"), 5).await;

    let status = state.sync_service().unwrap().status().await.unwrap();
    assert!(status.connected);
    assert_eq!(status.mismatches.len(), 1);
    assert_eq!(status.mismatches[0].stock_item_id, item.id);
    assert_eq!(status.mismatches[0].local_quantity, 5);
    assert_eq!(status.mismatches[0].platform_quantity, 3);
}

#[tokio::test]
async fn platform_order_depletes_stock_exactly_once() {
    let platform = Arc::new(InMemoryPlatform::with_items(vec![common::platform_item(
        "p1",
        Some("CND-1"),
        5,
    )]));
    platform.add_order(order("ord-1", "completed", vec![line(Some("p1"), 2)]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    let item = common::seed_item(&state, "Candle", Some("CND-1"), 5).await;
    state
        .inventory
        .link_platform_item(item.id, "p1")
        .await
        .unwrap();

    let sync = state.sync_service().unwrap();

    let first = sync.handle_order_event("ord-1").await.unwrap();
    let recorded_id = match first {
        OrderIngest::Recorded(id) => id,
        other => panic!("expected Recorded, got {other:?}"),
    };

    // Redelivery of the same event resolves to the same order.
    let second = sync.handle_order_event("ord-1").await.unwrap();
    assert_matches!(second, OrderIngest::AlreadyRecorded(id) if id == recorded_id);

    assert_eq!(state.inventory.get_quantity(item.id).await.unwrap(), 3);
    let orders = state.orders.list_orders(1, 10).await.unwrap();
    assert_eq!(orders.total, 1);
    assert_eq!(orders.orders[0].channel, Channel::Platform);
    assert_eq!(
        orders.orders[0].platform_order_id.as_deref(),
        Some("ord-1")
    );
}

#[tokio::test]
async fn incomplete_platform_orders_are_skipped() {
    let platform = Arc::new(InMemoryPlatform::default());
    platform.add_order(order("ord-2", "open", vec![line(Some("p1"), 1)]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;

    let outcome = state
        .sync_service()
        .unwrap()
        .handle_order_event("ord-2")
        .await
        .unwrap();
    assert_matches!(outcome, OrderIngest::Skipped(_));

    let outcome = state
        .sync_service()
        .unwrap()
        .handle_order_event("no-such-order")
        .await
        .unwrap();
    assert_matches!(outcome, OrderIngest::Skipped(_));
}

#[tokio::test]
async fn unmatched_order_lines_are_dropped_but_the_rest_records() {
    let platform = Arc::new(InMemoryPlatform::default());
    platform.add_order(order(
        "ord-3",
        "paid",
        vec![line(Some("p1"), 1), line(Some("p-unknown"), 1), line(None, 1)],
    ));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    let item = common::seed_item(&state, "Candle", Some("CND-1"), 5).await;
    state
        .inventory
        .link_platform_item(item.id, "p1")
        .await
        .unwrap();

    let outcome = state
        .sync_service()
        .unwrap()
        .handle_order_event("ord-3")
        .await
        .unwrap();
    let recorded_id = match outcome {
        OrderIngest::Recorded(id) => id,
        other => panic!("expected Recorded, got {other:?}"),
    };

    let full = state.orders.get_order(recorded_id).await.unwrap();
    assert_eq!(full.items.len(), 1);
    assert_eq!(state.inventory.get_quantity(item.id).await.unwrap(), 4);
}

#[tokio::test]
async fn platform_order_beyond_local_stock_is_skipped_not_negative() {
    let platform = Arc::new(InMemoryPlatform::default());
    platform.add_order(order("ord-4", "completed", vec![line(Some("p1"), 3)]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    let item = common::seed_item(&state, "Candle", Some("CND-1"), 1).await;
    state
        .inventory
        .link_platform_item(item.id, "p1")
        .await
        .unwrap();

    let outcome = state
        .sync_service()
        .unwrap()
        .handle_order_event("ord-4")
        .await
        .unwrap();
    assert_matches!(outcome, OrderIngest::Skipped(_));
    // Count is left for the next pull to correct; never driven negative.
    assert_eq!(state.inventory.get_quantity(item.id).await.unwrap(), 1);
}

#[tokio::test]
async fn inventory_event_reconciles_one_item() {
    let platform = Arc::new(InMemoryPlatform::with_items(vec![common::platform_item(
        "p1",
        Some("CND-1"),
        2,
    )]));
    let state = common::setup_with_platform(Arc::clone(&platform), None).await;
    let item = common::seed_item(&state, "Candle", Some("CND-1"), 5).await;

    let tally = state
        .sync_service()
        .unwrap()
        .handle_inventory_event("p1")
        .await;
    assert_eq!(tally.matched, 1);
    assert_eq!(tally.updated, 1);
    assert_eq!(state.inventory.get_quantity(item.id).await.unwrap(), 2);

    // An id the platform does not know is a skip, not a failure.
    let tally = state
        .sync_service()
        .unwrap()
        .handle_inventory_event("p-gone")
        .await;
    assert_eq!(tally.skipped, 1);
    assert!(tally.errors.is_empty());
}

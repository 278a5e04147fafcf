use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scylla_cqrs::config::Settings;
use scylla_cqrs::db;
use scylla_cqrs::domain::household::{
    self, new_id, AddRoomData, CreateHouseholdData, HouseholdError, HouseholdService, ItemData, ItemProjector,
};
use scylla_cqrs::event_sourcing::{AggregateRegistry, CommandBus, EventRegistry, ScyllaEventStore};
use scylla_cqrs::messaging::{EventHandler, KafkaEventConsumer, KafkaEventPublisher};
use scylla_cqrs::metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,scylla_cqrs=debug")))
        .init();

    tracing::info!("🚀 Starting event-sourced household inventory");

    let settings = Settings::from_env()?;
    tracing::info!(?settings, "Loaded settings");

    // === 1. Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let server_metrics = metrics.clone();
    let metrics_port = settings.metrics_port;
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(server_metrics, metrics_port)) {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 2. Registries (filled once, read-only afterwards) ===
    let mut events = EventRegistry::new();
    let mut aggregates = AggregateRegistry::new();
    household::register(&mut events, &mut aggregates)?;
    let events = Arc::new(events);
    let aggregates = Arc::new(aggregates);

    // === 3. Event store ===
    let session = db::connect(&settings).await?;
    let store = ScyllaEventStore::new(session, events.clone());
    store.ensure_schema().await?;

    // === 4. Transport ===
    let publisher = KafkaEventPublisher::connect(&settings.kafka())
        .await?
        .with_metrics(metrics.clone());

    let projector = Arc::new(ItemProjector::new());
    let handlers: Vec<Arc<dyn EventHandler>> = vec![projector.clone()];
    let consumers = KafkaEventConsumer::new(settings.kafka(), events.clone())
        .with_metrics(metrics.clone())
        .start(handlers)?;

    // === 5. Command bus ===
    let command_bus = CommandBus::new(aggregates, Arc::new(store), Arc::new(publisher))
        .with_conflict_retry(settings.dispatch_retry())
        .with_metrics(metrics.clone());
    let service = HouseholdService::new(Arc::new(command_bus));

    // === 6. Demonstrate the write path ===
    let household_id = new_id();
    let room_id = new_id();
    let item_id = new_id();

    service
        .create_household(CreateHouseholdData {
            household_id: household_id.clone(),
            user_id: new_id(),
            name: "Lake House".to_string(),
        })
        .await?;
    tracing::info!("✅ Household created: {}", household_id);

    service
        .add_room(AddRoomData {
            household_id: household_id.clone(),
            room_id: room_id.clone(),
            name: "Pantry".to_string(),
        })
        .await?;

    let item = ItemData {
        household_id: household_id.clone(),
        room_id: room_id.clone(),
        item_id: item_id.clone(),
        name: "Coffee beans".to_string(),
        barcode: "4006381333931".to_string(),
        quantity: 1,
    };
    service.add_item(item.clone()).await?;
    let outcome = service.update_item(ItemData { quantity: 3, ..item }).await?;
    tracing::info!("✅ Item updated, household at version {}", outcome.version);

    // Creating the same household again is a domain rejection, not a failure
    let duplicate = service
        .create_household(CreateHouseholdData {
            household_id: household_id.clone(),
            user_id: new_id(),
            name: "Lake House".to_string(),
        })
        .await;
    if let Err(e) = duplicate {
        match e.domain_error::<HouseholdError>() {
            Some(reason) => tracing::info!("↩️ Duplicate create rejected: {}", reason),
            None => return Err(e.into()),
        }
    }

    // === 7. Run until interrupted ===
    tracing::info!("⏳ Consumers running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    if let Some(view) = projector.item(&item_id) {
        tracing::info!(name = %view.name, quantity = view.quantity, "Projected item");
    }

    consumers.shutdown().await;
    tracing::info!("🎉 Shut down cleanly");

    Ok(())
}

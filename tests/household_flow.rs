mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{uuid, Harness, Recorder};
use scylla_cqrs::domain::household::{
    AddItem, AddRoom, CreateHousehold, HouseholdAggregate, HouseholdError, ItemProjector, UpdateItem,
    HOUSEHOLD_AGGREGATE_TYPE,
};
use scylla_cqrs::event_sourcing::{
    AggregateContext, AggregateId, AggregateRoot, AggregateType, EventRecord, EventSourcingError, EventStore,
    EventType,
};
use scylla_cqrs::messaging::EventHandler;

fn create(household_id: &str) -> CreateHousehold {
    CreateHousehold {
        household_id: household_id.to_string(),
        user_id: uuid(),
        name: "Lake House".to_string(),
    }
}

fn add_room(household_id: &str, room_id: &str, name: &str) -> AddRoom {
    AddRoom {
        household_id: household_id.to_string(),
        room_id: room_id.to_string(),
        name: name.to_string(),
    }
}

fn add_item(household_id: &str, room_id: &str, item_id: &str) -> AddItem {
    AddItem {
        household_id: household_id.to_string(),
        room_id: room_id.to_string(),
        item_id: item_id.to_string(),
        name: "Olive oil".to_string(),
        barcode: "8001234567890".to_string(),
        quantity: 1,
    }
}

#[tokio::test]
async fn test_create_then_duplicate_create() {
    let h = Harness::new();
    let bus = h.command_bus();
    let id = uuid();

    let outcome = bus.dispatch(&create(&id)).await.unwrap();
    assert_eq!(outcome.version, 1);
    assert_eq!(h.versions(HOUSEHOLD_AGGREGATE_TYPE, &id), vec![1]);
    assert_eq!(h.bus.len(), 1);

    let err = bus.dispatch(&create(&id)).await.unwrap_err();
    assert!(matches!(
        err.domain_error::<HouseholdError>(),
        Some(HouseholdError::AlreadyExists(_))
    ));
    assert_eq!(h.versions(HOUSEHOLD_AGGREGATE_TYPE, &id), vec![1]);
    assert_eq!(h.bus.len(), 1);
}

#[tokio::test]
async fn test_update_appends_next_version() {
    let h = Harness::new();
    let bus = h.command_bus();
    let id = uuid();
    bus.dispatch(&create(&id)).await.unwrap();

    bus.dispatch(&add_room(&id, &uuid(), "Garage")).await.unwrap();

    let history = h
        .store
        .get_events(&AggregateType::from(HOUSEHOLD_AGGREGATE_TYPE), &AggregateId::from(id.as_str()))
        .await
        .unwrap();
    let versions: Vec<u64> = history.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert_eq!(history[1].event_type, "RoomAddedEvent");
}

#[tokio::test]
async fn test_commands_against_missing_household_are_rejected() {
    let h = Harness::new();
    let err = h
        .command_bus()
        .dispatch(&add_room(&uuid(), &uuid(), "Attic"))
        .await
        .unwrap_err();

    assert!(err.is_rejected());
    assert!(!err.is_conflict());
}

#[tokio::test]
async fn test_projector_only_sees_item_events() {
    let h = Harness::new();
    let projector = Arc::new(ItemProjector::new());
    let rooms = Arc::new(Recorder::new("rooms", &["RoomAddedEvent"]));
    let handlers: Vec<Arc<dyn EventHandler>> = vec![projector.clone(), rooms.clone()];
    let consumers = h.bus.start_consumers(handlers);

    let bus = h.command_bus();
    let (id, room_id, item_id) = (uuid(), uuid(), uuid());
    bus.dispatch(&create(&id)).await.unwrap();
    bus.dispatch(&add_room(&id, &room_id, "Pantry")).await.unwrap();
    bus.dispatch(&add_item(&id, &room_id, &item_id)).await.unwrap();
    bus.dispatch(&UpdateItem {
        household_id: id.clone(),
        room_id: room_id.clone(),
        item_id: item_id.clone(),
        name: "Olive oil".to_string(),
        barcode: "8001234567890".to_string(),
        quantity: 4,
    })
    .await
    .unwrap();

    assert!(h.bus.wait_until_caught_up(ItemProjector::NAME, Duration::from_secs(2)).await);
    assert!(h.bus.wait_until_caught_up("rooms", Duration::from_secs(2)).await);
    consumers.shutdown().await;

    assert_eq!(projector.item(&item_id).map(|v| v.quantity), Some(4));
    assert_eq!(rooms.seen(), vec![(EventType::from("RoomAddedEvent"), 2)]);
}

#[tokio::test]
async fn test_unregistered_event_type_fails_load() {
    let h = Harness::new();
    let id = uuid();
    h.store
        .insert_record(EventRecord {
            aggregate_type: AggregateType::from(HOUSEHOLD_AGGREGATE_TYPE),
            aggregate_id: AggregateId::from(id.as_str()),
            event_type: EventType::from("UnregisteredType"),
            event_data: serde_json::json!({}),
            timestamp: 0,
            version: 1,
        })
        .unwrap();

    let err = h.command_bus().dispatch(&create(&id)).await.unwrap_err();

    assert!(matches!(err, EventSourcingError::EventTypeNotFound(ref t) if *t == "UnregisteredType"));
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let h = Harness::new();
    let bus = h.command_bus();
    let (id, room_id) = (uuid(), uuid());
    bus.dispatch(&create(&id)).await.unwrap();
    bus.dispatch(&add_room(&id, &room_id, "Cellar")).await.unwrap();
    bus.dispatch(&add_item(&id, &room_id, &uuid())).await.unwrap();
    bus.dispatch(&add_item(&id, &room_id, &uuid())).await.unwrap();

    let aggregate_type = AggregateType::from(HOUSEHOLD_AGGREGATE_TYPE);
    let aggregate_id = AggregateId::from(id.as_str());
    let history = h.store.get_events(&aggregate_type, &aggregate_id).await.unwrap();

    let replay = || {
        let ctx = AggregateContext::new(aggregate_type.clone(), aggregate_id.clone(), 0);
        let mut aggregate = HouseholdAggregate::new(&ctx);
        for event in &history {
            aggregate.apply_event(event.data.as_ref()).unwrap();
        }
        aggregate
    };
    let first = replay();
    let second = replay();
    assert_eq!(first, second);

    let rebuilt = bus.rebuild(&aggregate_type, &aggregate_id).await.unwrap();
    assert_eq!(rebuilt.downcast_ref::<HouseholdAggregate>(), Some(&first));
    assert_eq!(first.rooms.iter().map(|r| r.items.len()).sum::<usize>(), 2);
}

#[tokio::test]
async fn test_publish_failure_keeps_events_durable() {
    let h = Harness::new();
    let bus = h.command_bus();
    let id = uuid();
    h.bus.set_available(false);

    let err = bus.dispatch(&create(&id)).await.unwrap_err();
    assert!(matches!(err, EventSourcingError::Publish(_)));
    assert_eq!(h.versions(HOUSEHOLD_AGGREGATE_TYPE, &id), vec![1]);

    // The next dispatch builds on the durable event.
    h.bus.set_available(true);
    let outcome = bus.dispatch(&add_room(&id, &uuid(), "Hallway")).await.unwrap();
    assert_eq!(outcome.version, 2);
}

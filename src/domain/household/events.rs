use serde::{Deserialize, Serialize};

use crate::event_sourcing::core::{DomainEvent, EventRegistry, Result};

// ============================================================================
// Household Events
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdCreatedEvent {
    pub household_id: String,
    pub user_id: String,
    pub name: String,
}

impl DomainEvent for HouseholdCreatedEvent {
    const EVENT_TYPE: &'static str = "HouseholdCreatedEvent";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomAddedEvent {
    pub household_id: String,
    pub room_id: String,
    pub name: String,
}

impl DomainEvent for RoomAddedEvent {
    const EVENT_TYPE: &'static str = "RoomAddedEvent";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemAddedEvent {
    pub household_id: String,
    pub room_id: String,
    pub item_id: String,
    pub name: String,
    pub barcode: String,
    pub quantity: u32,
}

impl DomainEvent for ItemAddedEvent {
    const EVENT_TYPE: &'static str = "ItemAddedEvent";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdatedEvent {
    pub household_id: String,
    pub room_id: String,
    pub item_id: String,
    pub name: String,
    pub barcode: String,
    pub quantity: u32,
}

impl DomainEvent for ItemUpdatedEvent {
    const EVENT_TYPE: &'static str = "ItemUpdatedEvent";
}

pub fn register_events(registry: &mut EventRegistry) -> Result<()> {
    registry.register::<HouseholdCreatedEvent>()?;
    registry.register::<RoomAddedEvent>()?;
    registry.register::<ItemAddedEvent>()?;
    registry.register::<ItemUpdatedEvent>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::{AggregateId, AggregateType, Event, EventData, EventType};
    use std::sync::Arc;

    fn registry() -> EventRegistry {
        let mut registry = EventRegistry::new();
        register_events(&mut registry).unwrap();
        registry
    }

    /// Marshal through the wire envelope and decode it back by tag.
    fn assert_round_trips<T: DomainEvent + PartialEq>(payload: T, version: u64) {
        let data: Arc<dyn EventData> = Arc::new(payload.clone());
        let event = Event::new(
            AggregateType::from("HouseholdAggregate"),
            AggregateId::from("0f8fad5b-d9cb-469f-a165-70867728950e"),
            data,
            1_700_000_000_123,
            version,
        );

        let decoded = registry().unmarshal_event(&event.marshal().unwrap()).unwrap();

        assert_eq!(decoded.event_type, EventType::from(T::EVENT_TYPE));
        assert_eq!(decoded.aggregate_type, event.aggregate_type);
        assert_eq!(decoded.aggregate_id, event.aggregate_id);
        assert_eq!(decoded.timestamp, event.timestamp);
        assert_eq!(decoded.version, version);
        assert_eq!(decoded.data.downcast_ref::<T>(), Some(&payload));
    }

    #[test]
    fn test_household_created_round_trips() {
        assert_round_trips(
            HouseholdCreatedEvent {
                household_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
                user_id: "7c9e6679-7425-40de-944b-e07fc1f90ae7".to_string(),
                name: "Lake House".to_string(),
            },
            1,
        );
    }

    #[test]
    fn test_room_added_round_trips() {
        assert_round_trips(
            RoomAddedEvent {
                household_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
                room_id: "r-1".to_string(),
                name: "Kitchen".to_string(),
            },
            2,
        );
    }

    #[test]
    fn test_item_added_round_trips() {
        assert_round_trips(
            ItemAddedEvent {
                household_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
                room_id: "r-1".to_string(),
                item_id: "i-1".to_string(),
                name: "Flour".to_string(),
                barcode: "".to_string(),
                quantity: 0,
            },
            3,
        );
    }

    #[test]
    fn test_item_updated_round_trips() {
        assert_round_trips(
            ItemUpdatedEvent {
                household_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
                room_id: "r-1".to_string(),
                item_id: "i-1".to_string(),
                name: "Bread flour".to_string(),
                barcode: "4006381333931".to_string(),
                quantity: 12,
            },
            4,
        );
    }

    #[test]
    fn test_item_added_decodes_by_tag() {
        let mut registry = EventRegistry::new();
        register_events(&mut registry).unwrap();

        let original = ItemAddedEvent {
            household_id: "h".to_string(),
            room_id: "r".to_string(),
            item_id: "i".to_string(),
            name: "Flour".to_string(),
            barcode: "4006381333931".to_string(),
            quantity: 2,
        };
        let json = serde_json::to_value(&original).unwrap();
        assert_eq!(json["itemId"], "i");

        let decoded = registry.decode(&EventType::from("ItemAddedEvent"), json).unwrap();
        assert_eq!(decoded.downcast_ref::<ItemAddedEvent>(), Some(&original));
    }

    #[test]
    fn test_registering_twice_fails() {
        let mut registry = EventRegistry::new();
        register_events(&mut registry).unwrap();
        assert!(register_events(&mut registry).is_err());
    }
}

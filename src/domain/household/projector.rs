use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::events::{ItemAddedEvent, ItemUpdatedEvent};
use crate::event_sourcing::core::{DomainEvent, Event, EventSourcingError, EventType};
use crate::messaging::EventHandler;

// ============================================================================
// Item Projector - read model of every item across households
// ============================================================================
//
// Delivery is at-least-once and publishes from concurrent dispatches can
// interleave, so the projector remembers the household version that last
// wrote each item. An event for that item at or below it is a redelivery;
// events for other items still apply regardless of arrival order.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub household_id: String,
    pub room_id: String,
    pub item_id: String,
    pub name: String,
    pub barcode: String,
    pub quantity: u32,
}

#[derive(Debug, Default)]
struct State {
    items: HashMap<String, ItemView>,
    /// Item id -> household version of the last event applied to it.
    applied: HashMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct ItemProjector {
    state: RwLock<State>,
}

impl ItemProjector {
    pub const NAME: &'static str = "item.Projector";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(&self, item_id: &str) -> Option<ItemView> {
        self.state.read().ok()?.items.get(item_id).cloned()
    }

    pub fn items_in_room(&self, room_id: &str) -> Vec<ItemView> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut items: Vec<ItemView> = state
            .items
            .values()
            .filter(|item| item.room_id == room_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|state| state.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventHandler for ItemProjector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn events(&self) -> Vec<EventType> {
        vec![
            EventType::from(ItemAddedEvent::EVENT_TYPE),
            EventType::from(ItemUpdatedEvent::EVENT_TYPE),
        ]
    }

    async fn handle_event(&self, event: &Event) -> anyhow::Result<()> {
        let view = if let Some(e) = event.data.downcast_ref::<ItemAddedEvent>() {
            ItemView {
                household_id: e.household_id.clone(),
                room_id: e.room_id.clone(),
                item_id: e.item_id.clone(),
                name: e.name.clone(),
                barcode: e.barcode.clone(),
                quantity: e.quantity,
            }
        } else if let Some(e) = event.data.downcast_ref::<ItemUpdatedEvent>() {
            ItemView {
                household_id: e.household_id.clone(),
                room_id: e.room_id.clone(),
                item_id: e.item_id.clone(),
                name: e.name.clone(),
                barcode: e.barcode.clone(),
                quantity: e.quantity,
            }
        } else {
            return Err(EventSourcingError::UnknownEvent {
                aggregate_type: event.aggregate_type.clone(),
                event_type: event.event_type.clone(),
            }
            .into());
        };

        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow::anyhow!("item projection lock poisoned"))?;

        let last = state.applied.get(&view.item_id).copied().unwrap_or(0);
        if event.version <= last {
            tracing::debug!(
                aggregate_id = %event.aggregate_id,
                item_id = %view.item_id,
                version = event.version,
                last_applied = last,
                "Ignoring redelivered event"
            );
            return Ok(());
        }

        tracing::info!(item_id = %view.item_id, name = %view.name, event_type = %event.event_type, "Item projected");
        state.applied.insert(view.item_id.clone(), event.version);
        state.items.insert(view.item_id.clone(), view);
        Ok(())
    }
}

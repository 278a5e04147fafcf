use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::commands::{AddItem, AddRoom, CreateHousehold, UpdateItem};
use super::errors::HouseholdError;
use super::events::*;
use super::value_objects::{HouseholdName, Item, ItemId, Room, RoomId, Rooms, UserId};
use super::HOUSEHOLD_AGGREGATE_TYPE;
use crate::event_sourcing::core::{
    single_event, AggregateContext, AggregateId, AggregateRoot, AggregateType, Command, EventData,
    EventSourcingError, Result,
};

// ============================================================================
// Household Aggregate - Domain Logic
// ============================================================================
//
// Owns rooms and the items inside them. Version 0 means the household has
// not been created yet; every command but CreateHousehold requires it.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct HouseholdAggregate {
    pub id: AggregateId,
    pub user_id: Option<UserId>,
    pub name: Option<HouseholdName>,
    pub rooms: Rooms,
}

impl HouseholdAggregate {
    pub fn new(context: &AggregateContext) -> Self {
        Self {
            id: context.aggregate_id().clone(),
            user_id: None,
            name: None,
            rooms: Rooms::default(),
        }
    }

    fn aggregate_type() -> AggregateType {
        AggregateType::from(HOUSEHOLD_AGGREGATE_TYPE)
    }

    fn require_existing(&self, context: &AggregateContext) -> std::result::Result<(), HouseholdError> {
        if !context.exists() {
            return Err(HouseholdError::NotFound(self.id.to_string()));
        }
        Ok(())
    }

    fn room(&self, room_id: &str) -> std::result::Result<&Room, HouseholdError> {
        let room_id = RoomId::parse(room_id)?;
        self.rooms
            .get(&room_id)
            .ok_or_else(|| HouseholdError::RoomNotFound(room_id.to_string()))
    }

    // ========================================================================
    // Command handlers
    // ========================================================================

    fn create(
        &self,
        context: &AggregateContext,
        command: &CreateHousehold,
    ) -> std::result::Result<HouseholdCreatedEvent, HouseholdError> {
        if context.exists() {
            return Err(HouseholdError::AlreadyExists(command.household_id.clone()));
        }

        let user_id = UserId::parse(&command.user_id)?;
        let name = HouseholdName::new(&command.name)?;

        Ok(HouseholdCreatedEvent {
            household_id: self.id.to_string(),
            user_id: user_id.to_string(),
            name: name.as_str().to_string(),
        })
    }

    fn add_room(
        &self,
        context: &AggregateContext,
        command: &AddRoom,
    ) -> std::result::Result<RoomAddedEvent, HouseholdError> {
        self.require_existing(context)?;

        let room = Room::new(&command.room_id, &command.name)?;
        // Validate against a copy; state only changes through apply_event.
        self.rooms.clone().add(room.clone())?;

        Ok(RoomAddedEvent {
            household_id: self.id.to_string(),
            room_id: room.id.to_string(),
            name: room.name.as_str().to_string(),
        })
    }

    fn add_item(
        &self,
        context: &AggregateContext,
        command: &AddItem,
    ) -> std::result::Result<ItemAddedEvent, HouseholdError> {
        self.require_existing(context)?;

        let room = self.room(&command.room_id)?;
        let item = Item::new(&command.item_id, &command.name, &command.barcode, command.quantity)?;
        if room.item(&item.id).is_some() {
            return Err(HouseholdError::ItemAlreadyExists(item.id.to_string()));
        }

        Ok(ItemAddedEvent {
            household_id: self.id.to_string(),
            room_id: room.id.to_string(),
            item_id: item.id.to_string(),
            name: item.name.as_str().to_string(),
            barcode: item.barcode.as_str().to_string(),
            quantity: item.quantity.get(),
        })
    }

    fn update_item(
        &self,
        context: &AggregateContext,
        command: &UpdateItem,
    ) -> std::result::Result<ItemUpdatedEvent, HouseholdError> {
        self.require_existing(context)?;

        let room = self.room(&command.room_id)?;
        let item_id = ItemId::parse(&command.item_id)?;
        let item = room
            .item(&item_id)
            .ok_or_else(|| HouseholdError::ItemNotFound(item_id.to_string()))?
            .update(&command.name, &command.barcode, command.quantity)?;

        Ok(ItemUpdatedEvent {
            household_id: self.id.to_string(),
            room_id: room.id.to_string(),
            item_id: item.id.to_string(),
            name: item.name.as_str().to_string(),
            barcode: item.barcode.as_str().to_string(),
            quantity: item.quantity.get(),
        })
    }

    // ========================================================================
    // Event appliers
    // ========================================================================

    fn apply_created(&mut self, event: &HouseholdCreatedEvent) -> std::result::Result<(), HouseholdError> {
        self.user_id = Some(UserId::parse(&event.user_id)?);
        self.name = Some(HouseholdName::new(&event.name)?);
        self.rooms = Rooms::default();
        Ok(())
    }

    fn apply_room_added(&mut self, event: &RoomAddedEvent) -> std::result::Result<(), HouseholdError> {
        self.rooms.add(Room::new(&event.room_id, &event.name)?)
    }

    fn room_mut(&mut self, room_id: &str) -> std::result::Result<&mut Room, HouseholdError> {
        let room_id = RoomId::parse(room_id)?;
        self.rooms
            .get_mut(&room_id)
            .ok_or_else(|| HouseholdError::RoomNotFound(room_id.to_string()))
    }

    fn apply_item_added(&mut self, event: &ItemAddedEvent) -> std::result::Result<(), HouseholdError> {
        let item = Item::new(&event.item_id, &event.name, &event.barcode, event.quantity)?;
        self.room_mut(&event.room_id)?.add_item(item)
    }

    fn apply_item_updated(&mut self, event: &ItemUpdatedEvent) -> std::result::Result<(), HouseholdError> {
        let item = Item::new(&event.item_id, &event.name, &event.barcode, event.quantity)?;
        self.room_mut(&event.room_id)?.update_item(item)
    }
}

/// History that no longer satisfies the rules it was written under.
fn inconsistent_history(error: HouseholdError) -> EventSourcingError {
    EventSourcingError::Store(anyhow::Error::new(error).context("household history is inconsistent"))
}

#[async_trait]
impl AggregateRoot for HouseholdAggregate {
    fn apply_event(&mut self, event: &dyn EventData) -> Result<()> {
        let applied = if let Some(e) = event.downcast_ref::<HouseholdCreatedEvent>() {
            self.apply_created(e)
        } else if let Some(e) = event.downcast_ref::<RoomAddedEvent>() {
            self.apply_room_added(e)
        } else if let Some(e) = event.downcast_ref::<ItemAddedEvent>() {
            self.apply_item_added(e)
        } else if let Some(e) = event.downcast_ref::<ItemUpdatedEvent>() {
            self.apply_item_updated(e)
        } else {
            return Err(EventSourcingError::UnknownEvent {
                aggregate_type: Self::aggregate_type(),
                event_type: event.event_type(),
            });
        };

        applied.map_err(inconsistent_history)
    }

    async fn handle_command(
        &self,
        context: &AggregateContext,
        command: &dyn Command,
    ) -> Result<Vec<Arc<dyn EventData>>> {
        let decided = if let Some(c) = command.downcast_ref::<CreateHousehold>() {
            self.create(context, c).map(single_event)
        } else if let Some(c) = command.downcast_ref::<AddRoom>() {
            self.add_room(context, c).map(single_event)
        } else if let Some(c) = command.downcast_ref::<AddItem>() {
            self.add_item(context, c).map(single_event)
        } else if let Some(c) = command.downcast_ref::<UpdateItem>() {
            self.update_item(context, c).map(single_event)
        } else {
            return Err(EventSourcingError::UnknownCommand {
                aggregate_type: Self::aggregate_type(),
                command: command.command_name().to_string(),
            });
        };

        decided.map_err(EventSourcingError::rejected)?
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

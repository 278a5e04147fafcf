use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::commands::{AddItem, AddRoom, CreateHousehold, UpdateItem};
use crate::event_sourcing::{CommandBus, DispatchOutcome, Result};

// ============================================================================
// Household Service - application façade over the command bus
// ============================================================================
//
// Transport adapters (HTTP, CLI) hand over plain data; the service turns it
// into commands and dispatches them. Validation happens in the aggregate.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHouseholdData {
    pub household_id: String,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRoomData {
    pub household_id: String,
    pub room_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    pub household_id: String,
    pub room_id: String,
    pub item_id: String,
    pub name: String,
    #[serde(default)]
    pub barcode: String,
    pub quantity: u32,
}

/// Fresh, time-ordered identifier for a new household, room or item.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

pub struct HouseholdService {
    command_bus: Arc<CommandBus>,
}

impl HouseholdService {
    pub fn new(command_bus: Arc<CommandBus>) -> Self {
        Self { command_bus }
    }

    pub async fn create_household(&self, data: CreateHouseholdData) -> Result<DispatchOutcome> {
        self.command_bus
            .dispatch(&CreateHousehold {
                household_id: data.household_id,
                user_id: data.user_id,
                name: data.name,
            })
            .await
    }

    pub async fn add_room(&self, data: AddRoomData) -> Result<DispatchOutcome> {
        self.command_bus
            .dispatch(&AddRoom {
                household_id: data.household_id,
                room_id: data.room_id,
                name: data.name,
            })
            .await
    }

    pub async fn add_item(&self, data: ItemData) -> Result<DispatchOutcome> {
        self.command_bus
            .dispatch(&AddItem {
                household_id: data.household_id,
                room_id: data.room_id,
                item_id: data.item_id,
                name: data.name,
                barcode: data.barcode,
                quantity: data.quantity,
            })
            .await
    }

    pub async fn update_item(&self, data: ItemData) -> Result<DispatchOutcome> {
        self.command_bus
            .dispatch(&UpdateItem {
                household_id: data.household_id,
                room_id: data.room_id,
                item_id: data.item_id,
                name: data.name,
                barcode: data.barcode,
                quantity: data.quantity,
            })
            .await
    }
}

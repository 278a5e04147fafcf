use std::any::Any;

use super::HOUSEHOLD_AGGREGATE_TYPE;
use crate::event_sourcing::core::{AggregateId, AggregateType, Command};

// ============================================================================
// Household Commands - Represent user intent
// ============================================================================
//
// Fields arrive unvalidated from the outside; the aggregate validates them
// against its current state.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateHousehold {
    pub household_id: String,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AddRoom {
    pub household_id: String,
    pub room_id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AddItem {
    pub household_id: String,
    pub room_id: String,
    pub item_id: String,
    pub name: String,
    pub barcode: String,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct UpdateItem {
    pub household_id: String,
    pub room_id: String,
    pub item_id: String,
    pub name: String,
    pub barcode: String,
    pub quantity: u32,
}

macro_rules! household_command {
    ($($ty:ident),+) => {
        $(
            impl Command for $ty {
                fn aggregate_type(&self) -> AggregateType {
                    AggregateType::from(HOUSEHOLD_AGGREGATE_TYPE)
                }

                fn aggregate_id(&self) -> AggregateId {
                    AggregateId::from(self.household_id.as_str())
                }

                fn as_any(&self) -> &dyn Any {
                    self
                }

                fn command_name(&self) -> &'static str {
                    stringify!($ty)
                }
            }
        )+
    };
}

household_command!(CreateHousehold, AddRoom, AddItem, UpdateItem);

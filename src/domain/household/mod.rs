// ============================================================================
// Household Domain - rooms and the items kept in them
// ============================================================================
//
// This module contains ALL household-specific code:
// - Value objects (HouseholdName, Room, Item, ...)
// - Events (HouseholdCreated, RoomAdded, ItemAdded, ItemUpdated)
// - Commands (CreateHousehold, AddRoom, AddItem, UpdateItem)
// - Errors (HouseholdError)
// - Aggregate (HouseholdAggregate)
// - Projector (ItemProjector read model)
// - Service (HouseholdService façade)
//
// ============================================================================

pub mod aggregate;
pub mod commands;
pub mod errors;
pub mod events;
pub mod projector;
pub mod service;
pub mod value_objects;

pub use aggregate::HouseholdAggregate;
pub use commands::*;
pub use errors::HouseholdError;
pub use events::*;
pub use projector::{ItemProjector, ItemView};
pub use service::{new_id, AddRoomData, CreateHouseholdData, HouseholdService, ItemData};

use crate::event_sourcing::core::{AggregateRegistry, AggregateType, EventRegistry, Result};

pub const HOUSEHOLD_AGGREGATE_TYPE: &str = "HouseholdAggregate";

/// Start-up wiring: household events and the aggregate factory.
pub fn register(events: &mut EventRegistry, aggregates: &mut AggregateRegistry) -> Result<()> {
    register_events(events)?;
    aggregates.register(AggregateType::from(HOUSEHOLD_AGGREGATE_TYPE), |ctx| {
        Box::new(HouseholdAggregate::new(ctx))
    })?;
    Ok(())
}

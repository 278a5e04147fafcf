use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::errors::HouseholdError;

// ============================================================================
// Household Value Objects
// ============================================================================
//
// Every constructor validates; the aggregate only ever holds valid values.
// Collections are ordered maps so replayed state compares deterministically.
//
// ============================================================================

pub const MIN_HOUSEHOLD_NAME_LENGTH: usize = 3;
pub const MAX_HOUSEHOLD_NAME_LENGTH: usize = 50;
pub const MIN_ROOM_NAME_LENGTH: usize = 3;
pub const MAX_ROOM_NAME_LENGTH: usize = 50;
pub const MIN_ITEM_NAME_LENGTH: usize = 3;
pub const MAX_ITEM_NAME_LENGTH: usize = 100;

macro_rules! uuid_id {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn parse(value: &str) -> Result<Self, HouseholdError> {
                Uuid::parse_str(value)
                    .map(Self)
                    .map_err(|_| HouseholdError::InvalidId {
                        kind: $kind,
                        value: value.to_string(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(UserId, "user");
uuid_id!(RoomId, "room");
uuid_id!(ItemId, "item");

fn bounded(field: &'static str, value: &str, min: usize, max: usize) -> Result<String, HouseholdError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(HouseholdError::InvalidLength { field, min, max });
    }
    Ok(value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseholdName(String);

impl HouseholdName {
    pub fn new(name: &str) -> Result<Self, HouseholdError> {
        bounded("household name", name, MIN_HOUSEHOLD_NAME_LENGTH, MAX_HOUSEHOLD_NAME_LENGTH).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomName(String);

impl RoomName {
    /// Surrounding whitespace is not part of the name.
    pub fn new(name: &str) -> Result<Self, HouseholdError> {
        bounded("room name", name.trim(), MIN_ROOM_NAME_LENGTH, MAX_ROOM_NAME_LENGTH).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemName(String);

impl ItemName {
    pub fn new(name: &str) -> Result<Self, HouseholdError> {
        bounded("item name", name.trim(), MIN_ITEM_NAME_LENGTH, MAX_ITEM_NAME_LENGTH).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Free-form barcode; no symbology is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Barcode(String);

impl Barcode {
    pub fn new(barcode: &str) -> Self {
        Self(barcode.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(quantity: u32) -> Self {
        Self(quantity)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

// ============================================================================
// Items & Rooms
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub name: ItemName,
    pub barcode: Barcode,
    pub quantity: Quantity,
}

impl Item {
    pub fn new(id: &str, name: &str, barcode: &str, quantity: u32) -> Result<Self, HouseholdError> {
        Ok(Self {
            id: ItemId::parse(id)?,
            name: ItemName::new(name)?,
            barcode: Barcode::new(barcode),
            quantity: Quantity::new(quantity),
        })
    }

    /// Same item with new attributes.
    pub fn update(&self, name: &str, barcode: &str, quantity: u32) -> Result<Self, HouseholdError> {
        Ok(Self {
            id: self.id,
            name: ItemName::new(name)?,
            barcode: Barcode::new(barcode),
            quantity: Quantity::new(quantity),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub name: RoomName,
    pub items: BTreeMap<ItemId, Item>,
}

impl Room {
    pub fn new(id: &str, name: &str) -> Result<Self, HouseholdError> {
        Ok(Self {
            id: RoomId::parse(id)?,
            name: RoomName::new(name)?,
            items: BTreeMap::new(),
        })
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn add_item(&mut self, item: Item) -> Result<(), HouseholdError> {
        if self.items.contains_key(&item.id) {
            return Err(HouseholdError::ItemAlreadyExists(item.id.to_string()));
        }
        self.items.insert(item.id, item);
        Ok(())
    }

    pub fn update_item(&mut self, item: Item) -> Result<(), HouseholdError> {
        match self.items.get_mut(&item.id) {
            Some(existing) => {
                *existing = item;
                Ok(())
            }
            None => Err(HouseholdError::ItemNotFound(item.id.to_string())),
        }
    }
}

/// Rooms of one household; ids and names are both unique.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rooms(BTreeMap<RoomId, Room>);

impl Rooms {
    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.0.get(id)
    }

    pub fn get_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.0.get_mut(id)
    }

    pub fn find_by_name(&self, name: &RoomName) -> Option<&Room> {
        self.0.values().find(|room| &room.name == name)
    }

    pub fn add(&mut self, room: Room) -> Result<(), HouseholdError> {
        if self.0.contains_key(&room.id) {
            return Err(HouseholdError::RoomAlreadyExists(room.id.to_string()));
        }
        if self.find_by_name(&room.name).is_some() {
            return Err(HouseholdError::RoomNameTaken(room.name.as_str().to_string()));
        }
        self.0.insert(room.id, room);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.0.values()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

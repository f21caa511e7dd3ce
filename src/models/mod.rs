//! Data models
//!
//! This module contains the data structures used throughout the Slopemate
//! service. Models represent:
//! - Database entities (Group, CheckinRecord)
//! - Derived read views (MemberView)
//! - Internal data transfer objects

mod checkin;
mod group;
mod member;

pub use checkin::{
    AccommodationUpdate, CheckinRecord, CheckinStatus, Coordinates, NewCheckin,
};
pub use group::Group;
pub use member::{AccommodationView, CurrentPlace, MemberView};

//! Services layer - Business logic
//!
//! This module contains the business logic for the Slopemate service.
//! Services are responsible for:
//! - Implementing presence rules on top of the repositories
//! - Handling validation and error cases
//! - Coordinating with the place directory

pub mod presence;
pub mod registry;

pub use presence::{
    AccommodationInput, CheckInInput, CheckoutMode, CheckoutOutcome, PresenceError,
    PresenceService,
};
pub use registry::{is_valid_join_code, GroupRegistry, GroupRegistryError};

//! Presence service
//!
//! Implements the group presence rules on top of the check-in ledger:
//! - Check-in with auto-supersede: a device holds at most one active row
//!   per group, enforced inside the repository transaction
//! - Checkout in two modes: targeted (one place) and full leave (all rows)
//! - Accommodation updates that rewrite the device's most recent row and
//!   only ever toggle visibility, never clear stored data
//! - Derived member views combining a device's latest row with its latest
//!   accommodation-carrying row
//! - Lazy expiry: stale active rows are swept at the start of every read
//!
//! One asymmetry is deliberate and load-bearing: a check-in only records
//! accommodation when sharing is on at that moment, while the dedicated
//! accommodation update keeps stored fields through any number of
//! visibility toggles.

use crate::config::PresenceConfig;
use crate::db::repositories::{CheckinRepository, GroupRepository};
use crate::models::{
    AccommodationUpdate, AccommodationView, CheckinRecord, Coordinates, CurrentPlace, MemberView,
    NewCheckin,
};
use crate::places::PlaceDirectory;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Error types for presence operations
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The group or the targeted check-in does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for a check-in
#[derive(Debug, Clone, Default)]
pub struct CheckInInput {
    pub device_id: String,
    pub user_name: String,
    pub place_id: i64,
    pub place_name: Option<String>,
    pub accommodation_place_id: Option<i64>,
    pub accommodation_coords: Option<Coordinates>,
    pub accommodation_name: Option<String>,
    pub display_accommodation_to_group: bool,
    /// Epoch milliseconds; overrides "now" for replay/offline clients
    pub timestamp: Option<i64>,
}

/// Input for an accommodation update
#[derive(Debug, Clone)]
pub struct AccommodationInput {
    pub share: bool,
    pub place_id: Option<i64>,
    pub coords: Option<Coordinates>,
    pub name: Option<String>,
}

/// Which checkout variant ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Targeted,
    Full,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Targeted => "targeted",
            Self::Full => "full",
        }
    }
}

/// Result of a checkout
#[derive(Debug, Clone, Copy)]
pub struct CheckoutOutcome {
    pub mode: CheckoutMode,
    pub rows_affected: u64,
}

/// Presence service
pub struct PresenceService {
    groups: Arc<dyn GroupRepository>,
    checkins: Arc<dyn CheckinRepository>,
    places: Arc<dyn PlaceDirectory>,
    config: PresenceConfig,
}

impl PresenceService {
    /// Create a new presence service with the given repositories
    pub fn new(
        groups: Arc<dyn GroupRepository>,
        checkins: Arc<dyn CheckinRepository>,
        places: Arc<dyn PlaceDirectory>,
        config: PresenceConfig,
    ) -> Self {
        Self {
            groups,
            checkins,
            places,
            config,
        }
    }

    /// Record a device at a place, superseding any active check-in
    pub async fn check_in(
        &self,
        group_code: &str,
        input: CheckInInput,
    ) -> Result<CheckinRecord, PresenceError> {
        self.ensure_group(group_code).await?;

        let device_id = required(&input.device_id, "deviceId")?;
        let user_name = required(&input.user_name, "userName")?;

        let now = now_ms();
        let checked_in_at = input.timestamp.unwrap_or(now);
        if checked_in_at <= 0 {
            return Err(PresenceError::ValidationError(
                "timestamp must be positive epoch milliseconds".to_string(),
            ));
        }
        let max_skew = (self.config.max_timestamp_skew_seconds as i64) * 1000;
        if checked_in_at > now + max_skew {
            return Err(PresenceError::ValidationError(format!(
                "timestamp runs more than {}s ahead of server time",
                self.config.max_timestamp_skew_seconds
            )));
        }

        let place_name = self.resolve_place_name(input.place_id, input.place_name).await?;

        // A check-in records accommodation only when the client shares it
        // right now; leaving it off means the new row carries none. The
        // dedicated accommodation update behaves differently on purpose.
        let share = input.display_accommodation_to_group;
        if share {
            if let Some(coords) = &input.accommodation_coords {
                validate_coords(coords)?;
            }
        }

        let new = NewCheckin {
            group_code: group_code.to_string(),
            device_id,
            user_name,
            place_id: input.place_id,
            place_name,
            checked_in_at,
            accommodation_place_id: share.then_some(input.accommodation_place_id).flatten(),
            accommodation_coords: share.then_some(input.accommodation_coords).flatten(),
            accommodation_name: share.then(|| input.accommodation_name.clone()).flatten(),
            display_accommodation_to_group: share,
        };

        let record = self.checkins.check_in(&new).await?;
        tracing::info!(
            "Device {} checked into {} at place {}",
            record.device_id,
            group_code,
            record.place_id
        );
        Ok(record)
    }

    /// Check a device out
    ///
    /// With a place id, closes only the active check-in at that place and
    /// treats zero matches as `NotFound`. Without one, this is "leave the
    /// group": every active row is closed and the count returned, zero
    /// included.
    pub async fn check_out(
        &self,
        group_code: &str,
        device_id: &str,
        place_id: Option<i64>,
    ) -> Result<CheckoutOutcome, PresenceError> {
        self.ensure_group(group_code).await?;
        let device_id = required(device_id, "deviceId")?;
        let now = now_ms();

        match place_id {
            Some(place_id) => {
                let rows = self
                    .checkins
                    .deactivate_at_place(group_code, &device_id, place_id, now)
                    .await?;
                if rows == 0 {
                    return Err(PresenceError::NotFound(format!(
                        "no active check-in at place {} for this device",
                        place_id
                    )));
                }
                Ok(CheckoutOutcome {
                    mode: CheckoutMode::Targeted,
                    rows_affected: rows,
                })
            }
            None => {
                let rows = self
                    .checkins
                    .deactivate_all(group_code, &device_id, now)
                    .await?;
                tracing::info!("Device {} left group {} ({} rows)", device_id, group_code, rows);
                Ok(CheckoutOutcome {
                    mode: CheckoutMode::Full,
                    rows_affected: rows,
                })
            }
        }
    }

    /// Update a device's accommodation state
    ///
    /// Targets the device's most recent ledger row regardless of activity:
    /// accommodation belongs to the stay, not to the current outing.
    /// Supplied fields overwrite stored ones, absent fields survive, and
    /// `share` only controls visibility.
    pub async fn update_accommodation(
        &self,
        group_code: &str,
        device_id: &str,
        input: AccommodationInput,
    ) -> Result<CheckinRecord, PresenceError> {
        self.ensure_group(group_code).await?;
        let device_id = required(device_id, "deviceId")?;
        if let Some(coords) = &input.coords {
            validate_coords(coords)?;
        }

        let update = AccommodationUpdate {
            share: input.share,
            place_id: input.place_id,
            coords: input.coords,
            name: input.name,
            updated_at: now_ms(),
        };

        self.checkins
            .set_accommodation(group_code, &device_id, &update)
            .await?
            .ok_or_else(|| {
                PresenceError::NotFound(format!(
                    "device {} has no check-ins in group {}",
                    device_id, group_code
                ))
            })
    }

    /// All currently active check-ins in the group
    pub async fn active_checkins(
        &self,
        group_code: &str,
    ) -> Result<Vec<CheckinRecord>, PresenceError> {
        self.ensure_group(group_code).await?;
        self.sweep(group_code).await?;
        Ok(self.checkins.active_for_group(group_code).await?)
    }

    /// Check-in history within the configured window, newest first
    pub async fn checkin_history(
        &self,
        group_code: &str,
    ) -> Result<Vec<CheckinRecord>, PresenceError> {
        self.ensure_group(group_code).await?;
        self.sweep(group_code).await?;
        Ok(self.checkins.history(group_code, self.window_start()).await?)
    }

    /// Latest-known snapshot of every device seen in the window
    pub async fn members(&self, group_code: &str) -> Result<Vec<MemberView>, PresenceError> {
        self.ensure_group(group_code).await?;
        self.sweep(group_code).await?;

        let since = self.window_start();
        let devices = self.checkins.devices_in_window(group_code, since).await?;

        // One active row per device holds by construction; keep the newest
        // if the data predates that rule.
        let mut active_by_device: HashMap<String, CheckinRecord> = HashMap::new();
        for record in self.checkins.active_for_group(group_code).await? {
            active_by_device
                .entry(record.device_id.clone())
                .or_insert(record);
        }

        let mut members = Vec::with_capacity(devices.len());
        for device_id in devices {
            let Some(latest) = self.checkins.latest_for_device(group_code, &device_id).await?
            else {
                continue;
            };

            let accommodation = self
                .checkins
                .latest_with_accommodation(group_code, &device_id)
                .await?
                .filter(|row| row.display_accommodation_to_group)
                .and_then(|row| {
                    row.accommodation_place_id.map(|place_id| AccommodationView {
                        place_id,
                        coords: row.accommodation_coords,
                        name: row.accommodation_name,
                    })
                });

            let currently_at = active_by_device.get(&device_id).map(|row| CurrentPlace {
                place_id: row.place_id,
                place_name: row.place_name.clone(),
                checked_in_at: row.checked_in_at,
            });

            members.push(MemberView {
                device_id,
                user_name: latest.user_name,
                last_checked_in_at: latest.checked_in_at,
                is_checked_in: currently_at.is_some(),
                currently_at,
                accommodation,
            });
        }

        members.sort_by(|a, b| {
            b.last_checked_in_at
                .cmp(&a.last_checked_in_at)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        Ok(members)
    }

    /// Close out active rows older than the TTL that were never checked out
    ///
    /// Runs at the start of every read; there is no background scheduler,
    /// so staleness is bounded by request frequency.
    async fn sweep(&self, group_code: &str) -> Result<(), PresenceError> {
        let cutoff = now_ms() - (self.config.checkin_ttl_seconds as i64) * 1000;
        let swept = self.checkins.expire_stale(group_code, cutoff).await?;
        if swept > 0 {
            tracing::debug!("Swept {} stale check-ins in group {}", swept, group_code);
        }
        Ok(())
    }

    async fn ensure_group(&self, group_code: &str) -> Result<(), PresenceError> {
        if self.groups.exists(group_code).await? {
            Ok(())
        } else {
            Err(PresenceError::NotFound(format!(
                "group {} does not exist",
                group_code
            )))
        }
    }

    /// Prefer the client-supplied name; ask the directory otherwise
    async fn resolve_place_name(
        &self,
        place_id: i64,
        supplied: Option<String>,
    ) -> Result<String, PresenceError> {
        if let Some(name) = supplied {
            let name = name.trim().to_string();
            if !name.is_empty() {
                return Ok(name);
            }
        }

        let looked_up = match self.places.get_place(place_id).await {
            Ok(place) => place,
            Err(e) => {
                tracing::warn!("Place directory lookup failed for {}: {}", place_id, e);
                None
            }
        };

        looked_up.map(|place| place.name).ok_or_else(|| {
            PresenceError::ValidationError(
                "placeName is required when the place directory cannot resolve the place"
                    .to_string(),
            )
        })
    }

    fn window_start(&self) -> i64 {
        now_ms() - i64::from(self.config.history_window_days) * 86_400_000
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn required(value: &str, field: &str) -> Result<String, PresenceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PresenceError::ValidationError(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_coords(coords: &Coordinates) -> Result<(), PresenceError> {
    if !coords.is_valid() {
        return Err(PresenceError::ValidationError(format!(
            "malformed coordinates: lng={}, lat={}",
            coords.lng, coords.lat
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PresenceConfig;
    use crate::db::repositories::{SqlxCheckinRepository, SqlxGroupRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CheckinStatus, Group};
    use crate::places::{NullPlaceDirectory, Place};
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;

    const GROUP: &str = "314159";

    /// Fixed in-memory directory standing in for the places subsystem
    struct FixtureDirectory;

    #[async_trait]
    impl PlaceDirectory for FixtureDirectory {
        async fn get_place(&self, id: i64) -> AnyResult<Option<Place>> {
            Ok(match id {
                7 => Some(Place {
                    id: 7,
                    name: "Yamabiko Lift".to_string(),
                    lat: 36.92,
                    lng: 138.45,
                }),
                _ => None,
            })
        }
    }

    async fn setup_service_with(
        places: Arc<dyn PlaceDirectory>,
        config: PresenceConfig,
    ) -> PresenceService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let groups = SqlxGroupRepository::shared(pool.clone());
        groups
            .insert(&Group {
                code: GROUP.to_string(),
                created_at: Utc::now(),
                expires_at: None,
            })
            .await
            .expect("Failed to seed group");

        PresenceService::new(
            groups,
            SqlxCheckinRepository::shared(pool),
            places,
            config,
        )
    }

    async fn setup_service() -> PresenceService {
        setup_service_with(Arc::new(NullPlaceDirectory), PresenceConfig::default()).await
    }

    fn checkin_at(device: &str, place_id: i64) -> CheckInInput {
        CheckInInput {
            device_id: device.to_string(),
            user_name: "Dave".to_string(),
            place_id,
            place_name: Some(format!("Place {}", place_id)),
            ..CheckInInput::default()
        }
    }

    fn shared_accommodation(name: &str, place_id: i64) -> AccommodationInput {
        AccommodationInput {
            share: true,
            place_id: Some(place_id),
            coords: Some(Coordinates { lng: 138.44, lat: 36.92 }),
            name: Some(name.to_string()),
        }
    }

    #[tokio::test]
    async fn check_in_requires_existing_group() {
        let service = setup_service().await;
        let err = service
            .check_in("999999", checkin_at("dave2", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn check_in_validates_input() {
        let service = setup_service().await;

        let err = service
            .check_in(GROUP, CheckInInput { device_id: "  ".to_string(), ..checkin_at("x", 1) })
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::ValidationError(_)));

        let err = service
            .check_in(
                GROUP,
                CheckInInput {
                    timestamp: Some(now_ms() + 3_600_000),
                    ..checkin_at("dave2", 1)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::ValidationError(_)));

        let err = service
            .check_in(
                GROUP,
                CheckInInput { timestamp: Some(0), ..checkin_at("dave2", 1) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn past_timestamps_are_accepted_for_replay() {
        let service = setup_service().await;
        let yesterday = now_ms() - 86_400_000;

        let record = service
            .check_in(
                GROUP,
                CheckInInput { timestamp: Some(yesterday), ..checkin_at("dave2", 1) },
            )
            .await
            .unwrap();
        assert_eq!(record.checked_in_at, yesterday);
    }

    #[tokio::test]
    async fn place_name_falls_back_to_directory() {
        let service =
            setup_service_with(Arc::new(FixtureDirectory), PresenceConfig::default()).await;

        let record = service
            .check_in(
                GROUP,
                CheckInInput { place_name: None, ..checkin_at("dave2", 7) },
            )
            .await
            .unwrap();
        assert_eq!(record.place_name, "Yamabiko Lift");
    }

    #[tokio::test]
    async fn missing_place_name_without_directory_is_rejected() {
        let service = setup_service().await;

        let err = service
            .check_in(
                GROUP,
                CheckInInput { place_name: None, ..checkin_at("dave2", 7) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn client_supplied_place_name_wins_over_directory() {
        let service =
            setup_service_with(Arc::new(FixtureDirectory), PresenceConfig::default()).await;

        let record = service
            .check_in(
                GROUP,
                CheckInInput {
                    place_name: Some("The Top Hut".to_string()),
                    ..checkin_at("dave2", 7)
                },
            )
            .await
            .unwrap();
        assert_eq!(record.place_name, "The Top Hut");
    }

    #[tokio::test]
    async fn check_in_without_sharing_records_no_accommodation() {
        let service = setup_service().await;

        let record = service
            .check_in(
                GROUP,
                CheckInInput {
                    accommodation_place_id: Some(42),
                    accommodation_name: Some("Nozawa House".to_string()),
                    display_accommodation_to_group: false,
                    ..checkin_at("dave2", 1)
                },
            )
            .await
            .unwrap();

        assert!(record.accommodation_place_id.is_none());
        assert!(record.accommodation_name.is_none());
        assert!(!record.display_accommodation_to_group);
    }

    #[tokio::test]
    async fn repeated_check_ins_keep_one_active_row() {
        let service = setup_service().await;

        for place in 1..=5 {
            service.check_in(GROUP, checkin_at("dave2", place)).await.unwrap();
            let active = service.active_checkins(GROUP).await.unwrap();
            let mine: Vec<_> = active.iter().filter(|r| r.device_id == "dave2").collect();
            assert_eq!(mine.len(), 1);
            assert_eq!(mine[0].place_id, place);
        }
    }

    #[tokio::test]
    async fn targeted_checkout_misses_leave_active_row_alone() {
        let service = setup_service().await;
        service.check_in(GROUP, checkin_at("dave2", 5)).await.unwrap();

        // Checking out of a place the device never checked into fails and
        // leaves the actual check-in untouched.
        let err = service.check_out(GROUP, "dave2", Some(99)).await.unwrap_err();
        assert!(matches!(err, PresenceError::NotFound(_)));

        let active = service.active_checkins(GROUP).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].place_id, 5);
    }

    #[tokio::test]
    async fn targeted_checkout_closes_matching_place() {
        let service = setup_service().await;
        service.check_in(GROUP, checkin_at("dave2", 5)).await.unwrap();

        let outcome = service.check_out(GROUP, "dave2", Some(5)).await.unwrap();
        assert_eq!(outcome.mode, CheckoutMode::Targeted);
        assert_eq!(outcome.rows_affected, 1);
        assert!(service.active_checkins(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_leave_closes_everything_without_a_place_id() {
        let service = setup_service().await;
        service.check_in(GROUP, checkin_at("dave2", 1)).await.unwrap();
        service.check_in(GROUP, checkin_at("dave2", 2)).await.unwrap();

        let outcome = service.check_out(GROUP, "dave2", None).await.unwrap();
        assert_eq!(outcome.mode, CheckoutMode::Full);
        assert_eq!(outcome.rows_affected, 1);

        let members = service.members(GROUP).await.unwrap();
        let dave = members.iter().find(|m| m.device_id == "dave2").unwrap();
        assert!(!dave.is_checked_in);
        assert!(dave.currently_at.is_none());
    }

    #[tokio::test]
    async fn full_leave_with_no_active_rows_is_a_noop() {
        let service = setup_service().await;
        service.check_in(GROUP, checkin_at("dave2", 1)).await.unwrap();
        service.check_out(GROUP, "dave2", None).await.unwrap();

        let outcome = service.check_out(GROUP, "dave2", None).await.unwrap();
        assert_eq!(outcome.rows_affected, 0);
    }

    #[tokio::test]
    async fn accommodation_survives_visibility_toggles() {
        let service = setup_service().await;
        service.check_in(GROUP, checkin_at("dave2", 1)).await.unwrap();

        service
            .update_accommodation(GROUP, "dave2", shared_accommodation("Pension Schnee", 42))
            .await
            .unwrap();

        // Hide, then reveal, supplying nothing new either time.
        let hidden = service
            .update_accommodation(
                GROUP,
                "dave2",
                AccommodationInput { share: false, place_id: None, coords: None, name: None },
            )
            .await
            .unwrap();
        assert!(!hidden.display_accommodation_to_group);
        assert_eq!(hidden.accommodation_name.as_deref(), Some("Pension Schnee"));

        let revealed = service
            .update_accommodation(
                GROUP,
                "dave2",
                AccommodationInput { share: true, place_id: None, coords: None, name: None },
            )
            .await
            .unwrap();
        assert_eq!(revealed.accommodation_name.as_deref(), Some("Pension Schnee"));
        assert_eq!(revealed.accommodation_place_id, Some(42));
    }

    #[tokio::test]
    async fn accommodation_update_without_checkins_is_not_found() {
        let service = setup_service().await;
        let err = service
            .update_accommodation(GROUP, "ghost", shared_accommodation("Anywhere", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn accommodation_update_rejects_bad_coordinates() {
        let service = setup_service().await;
        service.check_in(GROUP, checkin_at("dave2", 1)).await.unwrap();

        let err = service
            .update_accommodation(
                GROUP,
                "dave2",
                AccommodationInput {
                    share: true,
                    place_id: Some(1),
                    coords: Some(Coordinates { lng: 400.0, lat: 0.0 }),
                    name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn expired_rows_read_as_expired_not_checked_out() {
        let service = setup_service().await;

        // Check in two hours ago; the TTL is one hour.
        let old = now_ms() - 2 * 3_600_000;
        service
            .check_in(
                GROUP,
                CheckInInput { timestamp: Some(old), ..checkin_at("dave2", 1) },
            )
            .await
            .unwrap();

        let history = service.checkin_history(GROUP).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status(), CheckinStatus::Expired);
        assert!(history[0].checked_out_at.is_none());

        assert!(service.active_checkins(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_checkout_reads_as_checked_out() {
        let service = setup_service().await;
        service.check_in(GROUP, checkin_at("dave2", 1)).await.unwrap();
        service.check_out(GROUP, "dave2", Some(1)).await.unwrap();

        let history = service.checkin_history(GROUP).await.unwrap();
        assert!(matches!(history[0].status(), CheckinStatus::CheckedOut { .. }));
    }

    #[tokio::test]
    async fn member_accommodation_can_come_from_an_older_row() {
        let service = setup_service().await;

        // Accommodation shared on the first check-in; the later check-in
        // carries none. The member view still reports it, from the older
        // row, under that row's visibility flag.
        service
            .check_in(
                GROUP,
                CheckInInput {
                    accommodation_place_id: Some(42),
                    accommodation_coords: Some(Coordinates { lng: 138.44, lat: 36.92 }),
                    accommodation_name: Some("Nozawa House".to_string()),
                    display_accommodation_to_group: true,
                    ..checkin_at("dave2", 1)
                },
            )
            .await
            .unwrap();
        service.check_in(GROUP, checkin_at("dave2", 2)).await.unwrap();

        let members = service.members(GROUP).await.unwrap();
        let dave = members.iter().find(|m| m.device_id == "dave2").unwrap();

        assert_eq!(dave.currently_at.as_ref().unwrap().place_id, 2);
        let accommodation = dave.accommodation.as_ref().expect("still shared");
        assert_eq!(accommodation.name.as_deref(), Some("Nozawa House"));
    }

    #[tokio::test]
    async fn dave2_scenario() {
        let service = setup_service().await;

        // Check into place A sharing Nozawa House.
        service
            .check_in(
                GROUP,
                CheckInInput {
                    accommodation_place_id: Some(42),
                    accommodation_name: Some("Nozawa House".to_string()),
                    display_accommodation_to_group: true,
                    ..checkin_at("dave2", 1)
                },
            )
            .await
            .unwrap();

        let members = service.members(GROUP).await.unwrap();
        assert_eq!(
            members[0].accommodation.as_ref().unwrap().name.as_deref(),
            Some("Nozawa House")
        );

        // Check into place B sharing Pension Schnee instead.
        service
            .check_in(
                GROUP,
                CheckInInput {
                    accommodation_place_id: Some(43),
                    accommodation_name: Some("Pension Schnee".to_string()),
                    display_accommodation_to_group: true,
                    ..checkin_at("dave2", 2)
                },
            )
            .await
            .unwrap();

        let members = service.members(GROUP).await.unwrap();
        assert_eq!(
            members[0].accommodation.as_ref().unwrap().name.as_deref(),
            Some("Pension Schnee")
        );

        // Hide accommodation: activity stays, lodging disappears from the
        // view, stored fields survive.
        service
            .update_accommodation(
                GROUP,
                "dave2",
                AccommodationInput { share: false, place_id: None, coords: None, name: None },
            )
            .await
            .unwrap();

        let members = service.members(GROUP).await.unwrap();
        let dave = &members[0];
        assert!(dave.is_checked_in);
        assert_eq!(dave.currently_at.as_ref().unwrap().place_id, 2);
        assert!(dave.accommodation.is_none());

        let history = service.checkin_history(GROUP).await.unwrap();
        let latest = &history[0];
        assert_eq!(latest.accommodation_name.as_deref(), Some("Pension Schnee"));

        // Reveal again: Pension Schnee comes back, not Nozawa House.
        service
            .update_accommodation(
                GROUP,
                "dave2",
                AccommodationInput { share: true, place_id: None, coords: None, name: None },
            )
            .await
            .unwrap();

        let members = service.members(GROUP).await.unwrap();
        assert_eq!(
            members[0].accommodation.as_ref().unwrap().name.as_deref(),
            Some("Pension Schnee")
        );
    }

    #[tokio::test]
    async fn members_are_ordered_by_recency() {
        let service = setup_service().await;

        let base = now_ms() - 10_000;
        for (i, device) in ["ana", "ben", "cleo"].iter().enumerate() {
            service
                .check_in(
                    GROUP,
                    CheckInInput {
                        timestamp: Some(base + i as i64 * 1_000),
                        ..checkin_at(device, 1)
                    },
                )
                .await
                .unwrap();
        }

        let members = service.members(GROUP).await.unwrap();
        let order: Vec<_> = members.iter().map(|m| m.device_id.as_str()).collect();
        assert_eq!(order, vec!["cleo", "ben", "ana"]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            /// Any sequence of check-ins and checkouts for one device
            /// leaves at most one active ledger row.
            #[test]
            fn at_most_one_active_row(ops in proptest::collection::vec(0u8..12, 1..12)) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let service = setup_service().await;

                    for op in ops {
                        match op {
                            0..=8 => {
                                let place = i64::from(op % 4) + 1;
                                service
                                    .check_in(GROUP, checkin_at("dave2", place))
                                    .await
                                    .unwrap();
                            }
                            9 | 10 => {
                                // Targeted checkouts may miss; that must not
                                // disturb the invariant.
                                let _ = service.check_out(GROUP, "dave2", Some(1)).await;
                            }
                            _ => {
                                service.check_out(GROUP, "dave2", None).await.unwrap();
                            }
                        }

                        let active = service.active_checkins(GROUP).await.unwrap();
                        let mine = active.iter().filter(|r| r.device_id == "dave2").count();
                        prop_assert!(mine <= 1, "device held {} active rows", mine);
                    }
                    Ok(())
                })?;
            }
        }
    }
}

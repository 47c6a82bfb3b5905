use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// Storage key the persisted session lives under.
pub const SESSION_STORAGE_KEY: &str = "userData";

/// One authenticated identity and the instant its token stops being usable.
///
/// Records are immutable once built. The token is only handed out through
/// [`SessionRecord::valid_token`], which is the single place that decides
/// whether a session may still be used.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionRecord {
    email: String,
    user_id: String,
    token: String,
    expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(
        email: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.into(),
            user_id: user_id.into(),
            token: token.into(),
            expires_at,
        }
    }

    /// Build a record whose expiry is `expires_in` after `now`.
    ///
    /// Returns `None` when the expiry instant is not representable.
    pub fn from_expires_in(
        email: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<String>,
        expires_in: Duration,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let expires_at = now.checked_add_signed(expires_in)?;
        Some(Self::new(email, user_id, token, expires_at))
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The bearer token, if it has not expired yet.
    pub fn valid_token(&self) -> Option<&str> {
        self.valid_token_at(Utc::now())
    }

    /// Same as [`valid_token`](Self::valid_token) but against an explicit instant.
    pub fn valid_token_at(&self, now: DateTime<Utc>) -> Option<&str> {
        if now < self.expires_at {
            Some(&self.token)
        } else {
            None
        }
    }

    /// Time left before expiry. Negative once the token is void.
    pub fn time_until_expiry_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Serialize into the persisted JSON form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&PersistedSession::from(self))
    }

    /// Parse a persisted JSON blob. Anything malformed is treated as absent.
    pub fn from_json(raw: &str) -> Option<Self> {
        match serde_json::from_str::<PersistedSession>(raw) {
            Ok(persisted) => Some(persisted.into()),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable persisted session");
                None
            }
        }
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("email", &self.email)
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// On-disk shape of a session.
///
/// Field names match what the web client has always written under
/// `userData`, so sessions saved by either client can be restored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub email: String,
    pub id: String,
    #[serde(rename = "_token")]
    pub token: String,
    #[serde(rename = "_tokenExpirationDate", with = "iso_millis")]
    pub token_expiration_date: DateTime<Utc>,
}

impl From<&SessionRecord> for PersistedSession {
    fn from(record: &SessionRecord) -> Self {
        Self {
            email: record.email.clone(),
            id: record.user_id.clone(),
            token: record.token.clone(),
            token_expiration_date: record.expires_at,
        }
    }
}

impl From<PersistedSession> for SessionRecord {
    fn from(persisted: PersistedSession) -> Self {
        SessionRecord::new(
            persisted.email,
            persisted.id,
            persisted.token,
            persisted.token_expiration_date,
        )
    }
}

/// ISO-8601 timestamps with millisecond resolution, e.g. `2026-10-18T12:00:00.000Z`.
mod iso_millis {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_record_has_valid_token() {
        let now = fixed_now();
        let record = SessionRecord::from_expires_in("a@x.com", "U1", "T1", Duration::seconds(3600), now).unwrap();
        assert_eq!(record.valid_token_at(now), Some("T1"));
        assert_eq!(record.expires_at(), now + Duration::seconds(3600));
    }

    #[test]
    fn test_token_void_once_expiry_passes() {
        let now = fixed_now();
        let record = SessionRecord::from_expires_in("a@x.com", "U1", "T1", Duration::seconds(60), now).unwrap();
        assert_eq!(record.valid_token_at(now + Duration::seconds(59)), Some("T1"));
        // Expiry instant itself is already void
        assert_eq!(record.valid_token_at(now + Duration::seconds(60)), None);
        assert_eq!(record.valid_token_at(now + Duration::days(1)), None);
    }

    #[test]
    fn test_valid_token_uses_wall_clock() {
        let live = SessionRecord::from_expires_in("a@x.com", "U1", "T1", Duration::minutes(5), Utc::now()).unwrap();
        assert_eq!(live.valid_token(), Some("T1"));

        let dead = SessionRecord::new("a@x.com", "U1", "T1", Utc::now() - Duration::seconds(1));
        assert_eq!(dead.valid_token(), None);
    }

    #[test]
    fn test_unrepresentable_expiry_builds_nothing() {
        let now = fixed_now();
        assert!(SessionRecord::from_expires_in("a@x.com", "U1", "T1", Duration::seconds(100_000_000_000_000), now).is_none());
        assert!(SessionRecord::from_expires_in("a@x.com", "U1", "T1", Duration::days(365 * 300_000), now).is_none());
    }

    #[test]
    fn test_time_until_expiry() {
        let now = fixed_now();
        let record = SessionRecord::from_expires_in("a@x.com", "U1", "T1", Duration::seconds(90), now).unwrap();
        assert_eq!(record.time_until_expiry_at(now), Duration::seconds(90));
        assert!(record.time_until_expiry_at(now + Duration::seconds(120)) < Duration::zero());
    }

    #[test]
    fn test_persisted_round_trip_keeps_millisecond_precision() {
        let expires_at = fixed_now() + Duration::nanoseconds(123_456_789);
        let record = SessionRecord::new("a@x.com", "U1", "T1", expires_at);

        let json = record.to_json().unwrap();
        let restored = SessionRecord::from_json(&json).unwrap();

        assert_eq!(restored.email(), "a@x.com");
        assert_eq!(restored.user_id(), "U1");
        assert_eq!(restored.valid_token_at(fixed_now()), Some("T1"));
        assert_eq!(restored.expires_at().timestamp_millis(), expires_at.timestamp_millis());
    }

    #[test]
    fn test_persisted_shape_matches_web_client() {
        let record = SessionRecord::new("a@x.com", "U1", "T1", fixed_now());
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        assert_eq!(value["email"], "a@x.com");
        assert_eq!(value["id"], "U1");
        assert_eq!(value["_token"], "T1");
        assert_eq!(value["_tokenExpirationDate"], "2026-10-18T12:00:00.000Z");
    }

    #[test]
    fn test_from_json_accepts_web_client_blob() {
        let raw = r#"{"email":"b@x.com","id":"U2","_token":"T2","_tokenExpirationDate":"2026-10-18T13:30:00.250Z"}"#;
        let record = SessionRecord::from_json(raw).unwrap();
        assert_eq!(record.email(), "b@x.com");
        assert_eq!(record.expires_at().timestamp_millis() % 1000, 250);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(SessionRecord::from_json("").is_none());
        assert!(SessionRecord::from_json("null").is_none());
        assert!(SessionRecord::from_json(r#"{"email":"a@x.com"}"#).is_none());
        assert!(SessionRecord::from_json(
            r#"{"email":"a","id":"U","_token":"T","_tokenExpirationDate":"yesterday"}"#
        )
        .is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let record = SessionRecord::new("a@x.com", "U1", "super-secret", fixed_now());
        let debug = format!("{:?}", record);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("a@x.com"));
    }
}

//! VPN authorization decisions.
//!
//! [`AuthorizationEngine::decide`] combines the time-window policies of a
//! user's groups with their TOTP enrollment state. The engine keeps no
//! session state; everything it needs comes from the directory, the
//! credential store and the clock.

use std::sync::Arc;

use chrono_tz::Tz;
use vpn_gate_common::{StatusCheckResponse, StatusErrorCode};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::AccessLedger;
use crate::logging::{mask_ip, mask_username};
use crate::models::{AccessLogEntry, Group, TwoFactorCredential};
use crate::notify::{Notifier, NotifyError};
use crate::policy::FALLBACK_TIMEZONE;
use crate::store::{CredentialStore, Directory};
use crate::totp;

/// Where a status check came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A person, e.g. the setup wizard.
    Interactive,
    /// The gateway hook, which may observe the same connection repeatedly.
    Automated,
}

#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub username: String,
    pub client_ip: String,
    /// Group names reported by the caller, merged with the directory groups.
    pub groups: Vec<String>,
    pub source: Source,
    /// Explicit notification flag. Defaults to notifying interactive callers only.
    pub notify: Option<bool>,
}

impl DecisionRequest {
    fn should_notify(&self) -> bool {
        self.notify.unwrap_or(self.source == Source::Interactive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupReason {
    UnknownUser,
    NoCredential,
    NoSecret,
    NotEnabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    TimeRestricted { message: String },
    SetupRequired { reason: SetupReason },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Status-check answer for this decision. An unknown user looks exactly
    /// like a known user without a credential.
    pub fn to_status(&self, username: &str) -> StatusCheckResponse {
        let (has_2fa, is_enabled, requires_setup) = match self {
            Decision::TimeRestricted { message } => {
                return StatusCheckResponse::failure(
                    username,
                    StatusErrorCode::TimeRestriction,
                    message.clone(),
                );
            }
            Decision::Allow => (true, true, false),
            Decision::SetupRequired { reason } => match reason {
                SetupReason::UnknownUser | SetupReason::NoCredential => (false, false, true),
                SetupReason::NoSecret => (true, false, true),
                SetupReason::NotEnabled => (true, false, false),
            },
        };

        StatusCheckResponse {
            success: true,
            username: username.to_string(),
            has_2fa,
            is_enabled,
            requires_setup,
            error: None,
            error_code: None,
        }
    }
}

/// Provisioning material returned by [`AuthorizationEngine::setup`].
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub secret: String,
    pub qr_png_base64: String,
    pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub issuer: String,
    pub fallback_timezone: Tz,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            issuer: totp::DEFAULT_ISSUER.to_string(),
            fallback_timezone: FALLBACK_TIMEZONE,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        let fallback_timezone = match config.policy.default_timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    timezone = %config.policy.default_timezone,
                    "Unknown default timezone, using {}",
                    FALLBACK_TIMEZONE.name()
                );
                FALLBACK_TIMEZONE
            }
        };

        Self {
            issuer: config.totp.issuer.clone(),
            fallback_timezone,
        }
    }
}

pub struct AuthorizationEngine {
    directory: Arc<dyn Directory>,
    credentials: Arc<dyn CredentialStore>,
    ledger: AccessLedger,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl AuthorizationEngine {
    pub fn new(
        directory: Arc<dyn Directory>,
        credentials: Arc<dyn CredentialStore>,
        ledger: AccessLedger,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            directory,
            credentials,
            ledger,
            notifier,
            clock,
            settings,
        }
    }

    /// Decide whether `request.username` may connect right now.
    ///
    /// Blocks on the stores. Async callers run it on the blocking pool.
    pub fn decide(&self, request: &DecisionRequest) -> Result<Decision> {
        let now = self.clock.now();
        let username = request.username.as_str();

        if self.directory.find_user(username)?.is_none() {
            tracing::info!(username = %username, "Unknown user, setup required");
            return Ok(Decision::SetupRequired {
                reason: SetupReason::UnknownUser,
            });
        }

        for group in self.resolve_groups(username, &request.groups)? {
            let Some(policy) = self.directory.policy_of(&group)? else {
                continue;
            };
            if !policy.time_restriction_enabled {
                continue;
            }

            let window = policy.is_access_allowed_in(now, self.settings.fallback_timezone);
            if !window.allowed {
                tracing::info!(
                    username = %username,
                    group = %group.name,
                    reason = %window.reason,
                    "Access denied by time restriction"
                );
                return Ok(Decision::TimeRestricted {
                    message: format!("Access denied by time restriction: {}", window.reason),
                });
            }
            tracing::debug!(username = %username, group = %group.name, reason = %window.reason, "Time check passed");
        }

        let credential = self.credentials.credential(username)?;
        let decision = match &credential {
            None => Decision::SetupRequired {
                reason: SetupReason::NoCredential,
            },
            Some(c) if !c.has_secret() => Decision::SetupRequired {
                reason: SetupReason::NoSecret,
            },
            Some(c) if !c.enabled => Decision::SetupRequired {
                reason: SetupReason::NotEnabled,
            },
            Some(_) => Decision::Allow,
        };

        // The verified flag records "has 2FA enabled", not a verification of this connection
        if let Some(credential) = &credential {
            let enabled = credential.enabled;
            match request.source {
                Source::Interactive => {
                    self.ledger
                        .record(username, &request.client_ip, enabled, enabled, now)?;
                }
                Source::Automated => {
                    self.ledger
                        .record_deduped(username, &request.client_ip, enabled, enabled, now)?;
                }
            }
        }

        let enabled = credential.as_ref().is_some_and(|c| c.enabled);
        if !enabled && request.should_notify() {
            self.spawn_setup_reminder(username);
        }

        tracing::info!(username = %username, decision = ?decision, source = ?request.source, "Status check decided");
        Ok(decision)
    }

    /// Directory groups first, then caller-supplied names that exist in the
    /// directory. Duplicates are dropped.
    fn resolve_groups(&self, username: &str, extra: &[String]) -> Result<Vec<Group>> {
        let mut groups = self.directory.groups_of(username)?;
        for name in extra {
            if groups.iter().any(|g| &g.name == name) {
                continue;
            }
            match self.directory.find_group(name)? {
                Some(group) => groups.push(group),
                None => tracing::debug!(group = %name, "Ignoring unknown group"),
            }
        }
        Ok(groups)
    }

    fn spawn_setup_reminder(&self, username: &str) {
        let notifier = self.notifier.clone();
        let username = username.to_string();
        tokio::spawn(async move {
            match notifier.notify_setup_required(&username).await {
                Ok(()) | Err(NotifyError::NotConfigured) => {}
                Err(e) => {
                    tracing::warn!(username = %username, "Failed to send setup reminder: {}", e)
                }
            }
        });
    }

    fn require_credential(&self, username: &str) -> Result<TwoFactorCredential> {
        if self.directory.find_user(username)?.is_none() {
            return Err(Error::NotFound("User or 2FA not found".to_string()));
        }
        self.credentials
            .credential(username)?
            .ok_or_else(|| Error::NotFound("User or 2FA not found".to_string()))
    }

    /// Check a code submitted interactively. The first success enables 2FA.
    /// Every attempt on an existing credential is recorded.
    pub fn verify_and_log(&self, username: &str, token: &str, client_ip: &str) -> Result<bool> {
        let now = self.clock.now();
        let credential = self.require_credential(username)?;

        let valid = totp::verify(&credential.secret, token, now);
        if valid && !credential.enabled && self.credentials.mark_enabled(username, now)? {
            tracing::info!(username = %username, "2FA enabled on first successful verification");
        }

        self.ledger.record(username, client_ip, valid, valid, now)?;

        tracing::info!(username = %username, valid, "2FA verification");
        Ok(valid)
    }

    /// Start or resume enrollment. A secret is generated only when none exists.
    pub fn setup(&self, username: &str) -> Result<Enrollment> {
        let now = self.clock.now();
        if self.directory.find_user(username)?.is_none() {
            return Err(Error::NotFound("User not found".to_string()));
        }

        let credential =
            self.credentials
                .set_secret_if_absent(username, &totp::generate_secret(), now)?;
        let qr_png_base64 = totp::qr_png_base64(&credential.secret, username, &self.settings.issuer)?;

        Ok(Enrollment {
            secret: credential.secret,
            qr_png_base64,
            is_enabled: credential.enabled,
        })
    }

    /// Verify a code and enable 2FA without recording an access attempt.
    pub fn enable(&self, username: &str, token: &str) -> Result<bool> {
        let now = self.clock.now();
        let credential = self.require_credential(username)?;

        if !totp::verify(&credential.secret, token, now) {
            tracing::info!(username = %username, "Rejected 2FA enable token");
            return Ok(false);
        }
        if self.credentials.mark_enabled(username, now)? {
            tracing::info!(username = %username, "2FA enabled");
        }
        Ok(true)
    }

    pub fn access_logs(&self, limit: Option<usize>) -> Result<Vec<AccessLogEntry>> {
        Ok(self.ledger.recent(limit)?)
    }

    /// Record an established tunnel reported by the gateway. Returns whether
    /// an entry was written (false when deduplicated).
    pub fn log_connection(&self, username: &str, client_ip: &str) -> Result<bool> {
        let now = self.clock.now();
        let credential = self.require_credential(username)?;

        let entry = self
            .ledger
            .record_deduped(username, client_ip, credential.enabled, true, now)?;

        tracing::info!(
            user = %mask_username(username),
            vpn_ip = %mask_ip(client_ip),
            logged = entry.is_some(),
            "Active VPN connection observed"
        );
        Ok(entry.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{parse_weekdays, TimeWindowPolicy};
    use crate::store::SqliteStore;
    use crate::test_util::{seoul, FixedClock, RecordingNotifier};
    use chrono::{Duration, NaiveTime};
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        engine: AuthorizationEngine,
        store: Arc<SqliteStore>,
        clock: Arc<FixedClock>,
        reminders: UnboundedReceiver<String>,
    }

    fn harness() -> Harness {
        let store = Arc::new(SqliteStore::new(":memory:").unwrap());
        // 2024-01-01 is a Monday
        let clock = Arc::new(FixedClock::new(seoul(2024, 1, 1, 10, 0)));
        let (notifier, reminders) = RecordingNotifier::new();
        let engine = AuthorizationEngine::new(
            store.clone(),
            store.clone(),
            AccessLedger::new(store.clone()),
            Arc::new(notifier),
            clock.clone(),
            EngineSettings::default(),
        );
        store.upsert_user("alice", clock.now()).unwrap();
        Harness {
            engine,
            store,
            clock,
            reminders,
        }
    }

    fn request(username: &str, source: Source) -> DecisionRequest {
        DecisionRequest {
            username: username.to_string(),
            client_ip: "10.0.0.1".to_string(),
            groups: vec![],
            source,
            notify: None,
        }
    }

    fn office_hours() -> TimeWindowPolicy {
        TimeWindowPolicy {
            time_restriction_enabled: true,
            start_time: NaiveTime::from_hms_opt(9, 0, 0),
            end_time: NaiveTime::from_hms_opt(18, 0, 0),
            allowed_weekdays: parse_weekdays("1,2,3,4,5"),
            ..Default::default()
        }
    }

    fn current_code(h: &Harness) -> String {
        let secret = h.store.credential("alice").unwrap().unwrap().secret;
        totp::code_at(&secret, h.clock.now()).unwrap()
    }

    async fn expect_no_reminder(rx: &mut UnboundedReceiver<String>) {
        let received = tokio::time::timeout(StdDuration::from_millis(100), rx.recv()).await;
        assert!(received.is_err(), "unexpected reminder: {received:?}");
    }

    #[tokio::test]
    async fn test_unknown_user_matches_no_credential_shape() {
        let h = harness();
        let unknown = h.engine.decide(&request("mallory", Source::Automated)).unwrap();
        let no_cred = h.engine.decide(&request("alice", Source::Automated)).unwrap();

        assert_eq!(
            unknown,
            Decision::SetupRequired {
                reason: SetupReason::UnknownUser
            }
        );
        assert_eq!(
            no_cred,
            Decision::SetupRequired {
                reason: SetupReason::NoCredential
            }
        );

        let a = unknown.to_status("x");
        let b = no_cred.to_status("x");
        assert_eq!(a, b);
        assert!(a.success && a.requires_setup && !a.has_2fa && !a.is_enabled);
        assert!(h.engine.access_logs(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alice_end_to_end() {
        let mut h = harness();

        // Not enrolled yet
        let decision = h.engine.decide(&request("alice", Source::Interactive)).unwrap();
        assert_eq!(
            decision,
            Decision::SetupRequired {
                reason: SetupReason::NoCredential
            }
        );
        let reminded = tokio::time::timeout(StdDuration::from_secs(1), h.reminders.recv())
            .await
            .unwrap();
        assert_eq!(reminded.as_deref(), Some("alice"));

        // Enrollment started but not confirmed
        let enrollment = h.engine.setup("alice").unwrap();
        assert!(!enrollment.is_enabled);
        assert!(enrollment.qr_png_base64.starts_with("iVBORw0KGgo"));
        let status = h
            .engine
            .decide(&request("alice", Source::Automated))
            .unwrap()
            .to_status("alice");
        assert!(status.success && status.has_2fa && !status.is_enabled && !status.requires_setup);

        // First valid code enables 2FA
        let code = current_code(&h);
        assert!(h.engine.verify_and_log("alice", &code, "10.0.0.1").unwrap());

        let decision = h.engine.decide(&request("alice", Source::Automated)).unwrap();
        assert_eq!(decision, Decision::Allow);
        let status = decision.to_status("alice");
        assert!(status.success && status.has_2fa && status.is_enabled && !status.requires_setup);

        // Outside office hours with a restricted group
        h.store.upsert_group("office").unwrap();
        h.store.add_member("alice", "office").unwrap();
        h.store.set_policy("office", &office_hours(), h.clock.now()).unwrap();
        h.clock.set(seoul(2024, 1, 1, 20, 0));

        let decision = h.engine.decide(&request("alice", Source::Automated)).unwrap();
        let status = decision.to_status("alice");
        assert!(!status.success);
        assert_eq!(status.error_code, Some(StatusErrorCode::TimeRestriction));
        assert!(status
            .error
            .unwrap()
            .contains("outside allowed hours (allowed: 09:00 - 18:00)"));
    }

    #[tokio::test]
    async fn test_enabled_stays_true_after_failed_verification() {
        let h = harness();
        h.engine.setup("alice").unwrap();
        let code = current_code(&h);
        assert!(h.engine.verify_and_log("alice", &code, "10.0.0.1").unwrap());
        let digit = (code.as_bytes()[0] - b'0' + 5) % 10;
        let wrong = format!("{digit}{}", &code[1..]);
        assert!(!h.engine.verify_and_log("alice", &wrong, "10.0.0.1").unwrap());

        assert!(h.store.credential("alice").unwrap().unwrap().enabled);
        let logs = h.engine.access_logs(None).unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn test_verify_unknown_user_is_not_found_without_log() {
        let h = harness();
        assert!(matches!(
            h.engine.verify_and_log("mallory", "123456", "10.0.0.1"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            h.engine.verify_and_log("alice", "123456", "10.0.0.1"),
            Err(Error::NotFound(_))
        ));
        assert!(h.engine.access_logs(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_setup_keeps_existing_secret() {
        let h = harness();
        let first = h.engine.setup("alice").unwrap();
        let second = h.engine.setup("alice").unwrap();
        assert_eq!(first.secret, second.secret);
        assert!(matches!(h.engine.setup("mallory"), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enable_does_not_log() {
        let h = harness();
        h.engine.setup("alice").unwrap();
        let code = current_code(&h);
        assert!(h.engine.enable("alice", &code).unwrap());
        assert!(h.store.credential("alice").unwrap().unwrap().enabled);
        assert!(h.engine.access_logs(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_automated_checks_are_deduplicated() {
        let h = harness();
        h.engine.setup("alice").unwrap();

        h.engine.decide(&request("alice", Source::Automated)).unwrap();
        h.clock.advance(Duration::minutes(30));
        h.engine.decide(&request("alice", Source::Automated)).unwrap();
        assert_eq!(h.engine.access_logs(None).unwrap().len(), 1);

        h.clock.advance(Duration::minutes(31));
        h.engine.decide(&request("alice", Source::Automated)).unwrap();
        assert_eq!(h.engine.access_logs(None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_interactive_checks_always_logged() {
        let h = harness();
        h.engine.setup("alice").unwrap();
        h.engine.decide(&request("alice", Source::Interactive)).unwrap();
        h.engine.decide(&request("alice", Source::Interactive)).unwrap();

        let logs = h.engine.access_logs(None).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|e| !e.two_factor_verified && !e.access_granted));
    }

    #[tokio::test]
    async fn test_time_restriction_denies_before_credential_and_skips_log() {
        let mut h = harness();
        h.engine.setup("alice").unwrap();
        h.store.upsert_group("office").unwrap();
        h.store.set_policy("office", &office_hours(), h.clock.now()).unwrap();
        h.clock.set(seoul(2024, 1, 6, 12, 0));

        // Group supplied by the caller only
        let mut req = request("alice", Source::Interactive);
        req.groups = vec!["office".to_string(), "ghost".to_string()];
        let decision = h.engine.decide(&req).unwrap();
        assert!(matches!(decision, Decision::TimeRestricted { ref message } if message.contains("Saturday")));
        assert!(h.engine.access_logs(None).unwrap().is_empty());
        expect_no_reminder(&mut h.reminders).await;
    }

    #[tokio::test]
    async fn test_group_without_restriction_is_ignored() {
        let h = harness();
        h.store.upsert_group("relaxed").unwrap();
        h.store.add_member("alice", "relaxed").unwrap();
        h.store
            .set_policy("relaxed", &TimeWindowPolicy::default(), h.clock.now())
            .unwrap();
        h.clock.set(seoul(2024, 1, 7, 3, 0));

        let decision = h.engine.decide(&request("alice", Source::Automated)).unwrap();
        assert!(!matches!(decision, Decision::TimeRestricted { .. }));
    }

    #[tokio::test]
    async fn test_notification_flag_overrides_source() {
        let mut h = harness();

        h.engine.decide(&request("alice", Source::Automated)).unwrap();
        expect_no_reminder(&mut h.reminders).await;

        let mut req = request("alice", Source::Automated);
        req.notify = Some(true);
        h.engine.decide(&req).unwrap();
        let reminded = tokio::time::timeout(StdDuration::from_secs(1), h.reminders.recv())
            .await
            .unwrap();
        assert_eq!(reminded.as_deref(), Some("alice"));

        let mut req = request("alice", Source::Interactive);
        req.notify = Some(false);
        h.engine.decide(&req).unwrap();
        expect_no_reminder(&mut h.reminders).await;

        // Unknown users are never reminded
        let mut req = request("mallory", Source::Interactive);
        req.notify = Some(true);
        h.engine.decide(&req).unwrap();
        expect_no_reminder(&mut h.reminders).await;
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_affect_decision() {
        let store = Arc::new(SqliteStore::new(":memory:").unwrap());
        let clock = Arc::new(FixedClock::new(seoul(2024, 1, 1, 10, 0)));
        store.upsert_user("alice", clock.now()).unwrap();
        let engine = AuthorizationEngine::new(
            store.clone(),
            store.clone(),
            AccessLedger::new(store.clone()),
            Arc::new(RecordingNotifier::failing()),
            clock,
            EngineSettings::default(),
        );

        let decision = engine.decide(&request("alice", Source::Interactive)).unwrap();
        assert_eq!(
            decision,
            Decision::SetupRequired {
                reason: SetupReason::NoCredential
            }
        );
    }

    #[tokio::test]
    async fn test_log_connection() {
        let h = harness();
        assert!(matches!(
            h.engine.log_connection("alice", "10.0.0.1"),
            Err(Error::NotFound(_))
        ));

        h.engine.setup("alice").unwrap();
        assert!(h.engine.log_connection("alice", "10.0.0.1").unwrap());
        assert!(!h.engine.log_connection("alice", "10.0.0.1").unwrap());

        let logs = h.engine.access_logs(None).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].access_granted);
        assert!(!logs[0].two_factor_verified);
    }

    #[test]
    fn test_status_shapes() {
        let no_secret = Decision::SetupRequired {
            reason: SetupReason::NoSecret,
        }
        .to_status("bob");
        assert!(no_secret.has_2fa && no_secret.requires_setup && !no_secret.is_enabled);

        let restricted = Decision::TimeRestricted {
            message: "closed".to_string(),
        }
        .to_status("bob");
        assert!(!restricted.success && !restricted.has_2fa && !restricted.requires_setup);
        assert_eq!(restricted.error.as_deref(), Some("closed"));
    }

    #[test]
    fn test_settings_fall_back_on_unknown_timezone() {
        let mut config = crate::test_util::test_config();
        config.policy.default_timezone = "Nowhere/City".to_string();
        assert_eq!(
            EngineSettings::from_config(&config).fallback_timezone,
            FALLBACK_TIMEZONE
        );
    }
}

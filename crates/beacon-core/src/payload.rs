//! Registration payload and its differ
//!
//! A [`RegistrationPayload`] is a snapshot of everything the registry knows
//! about this device. Updates only carry what changed since the last payload
//! the registry acknowledged, plus the identity-critical fields the registry
//! requires on every call.
//!
//! Always-send fields: `device_type`, `opt_in`, `background`, `push_address`,
//! `is_active`. Every other field is optional and is kept by
//! [`RegistrationPayload::minimize`] only when it differs from the baseline.
//! `tag_changes` is never part of a snapshot; the differ derives it when the
//! tag set changed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Quiet-time window, `HH:MM` local time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuietTime {
    /// Start of the window
    pub start: String,
    /// End of the window
    pub end: String,
}

/// Platform-specific notification settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Badge count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<i64>,
    /// Quiet-time window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_time: Option<QuietTime>,
    /// Time-sensitive notifications allowed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_sensitive: Option<bool>,
}

/// Hints that let the registry associate a new channel with a known user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityHints {
    /// Host application user id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Tag delta between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagChanges {
    /// Tags present now but not in the baseline
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub add: BTreeSet<String>,
    /// Tags present in the baseline but not now
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub remove: BTreeSet<String>,
}

impl TagChanges {
    /// Compute the delta that turns `previous` into `current`.
    pub fn between(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Self {
        Self {
            add: current.difference(previous).cloned().collect(),
            remove: previous.difference(current).cloned().collect(),
        }
    }

    /// No tags added or removed.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Snapshot of the device attributes sent to the channel registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    /// Platform identifier (always sent)
    pub device_type: String,
    /// User opted in to notifications (always sent)
    pub opt_in: bool,
    /// Background delivery enabled (always sent)
    pub background: bool,
    /// Push token, if one is registered (always sent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_address: Option<String>,
    /// App is in the foreground (always sent)
    pub is_active: bool,

    /// Device tags; `Some` means "replace the tag set"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    /// Derived by the differ; never part of a stored snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_changes: Option<TagChanges>,
    /// IANA time zone name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// ISO 639 language code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale_language: Option<String>,
    /// ISO 3166 country code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale_country: Option<String>,
    /// Host application version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    /// Beacon SDK version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,
    /// Hardware model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    /// Mobile carrier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    /// Contact the channel is associated with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    /// Platform notification settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_settings: Option<PlatformSettings>,
    /// User association hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_hints: Option<IdentityHints>,
}

fn changed<T: Clone + PartialEq>(current: &Option<T>, previous: &Option<T>) -> Option<T> {
    if current != previous {
        current.clone()
    } else {
        None
    }
}

impl RegistrationPayload {
    /// Empty snapshot for `device_type`.
    pub fn new(device_type: impl Into<String>) -> Self {
        Self {
            device_type: device_type.into(),
            ..Self::default()
        }
    }

    /// Reduce this payload to what changed since `previous`.
    ///
    /// Without a baseline the payload is returned unchanged. Otherwise the
    /// result carries the always-send fields, every optional field whose
    /// value differs from `previous`, and a [`TagChanges`] delta when both
    /// snapshots carry a tag set and it changed. Pure and deterministic.
    ///
    /// A field cleared since `previous` (`Some` to `None`) is omitted, not sent
    /// as `null`. The registry keeps its old value until the next full
    /// payload, such as the one sent after a location change.
    pub fn minimize(&self, previous: Option<&RegistrationPayload>) -> RegistrationPayload {
        let Some(previous) = previous else {
            return self.clone();
        };

        let tags = changed(&self.tags, &previous.tags);
        let tag_changes = match (&tags, &previous.tags) {
            (Some(current), Some(prev)) => {
                Some(TagChanges::between(prev, current)).filter(|delta| !delta.is_empty())
            }
            _ => None,
        };

        RegistrationPayload {
            device_type: self.device_type.clone(),
            opt_in: self.opt_in,
            background: self.background,
            push_address: self.push_address.clone(),
            is_active: self.is_active,
            tags,
            tag_changes,
            timezone: changed(&self.timezone, &previous.timezone),
            locale_language: changed(&self.locale_language, &previous.locale_language),
            locale_country: changed(&self.locale_country, &previous.locale_country),
            app_version: changed(&self.app_version, &previous.app_version),
            sdk_version: changed(&self.sdk_version, &previous.sdk_version),
            device_model: changed(&self.device_model, &previous.device_model),
            carrier: changed(&self.carrier, &previous.carrier),
            contact_id: changed(&self.contact_id, &previous.contact_id),
            platform_settings: changed(&self.platform_settings, &previous.platform_settings),
            identity_hints: changed(&self.identity_hints, &previous.identity_hints),
        }
    }

    /// The snapshot form of this payload, with differ output stripped.
    pub fn snapshot(&self) -> RegistrationPayload {
        RegistrationPayload {
            tag_changes: None,
            ..self.clone()
        }
    }

    /// Lowercase hex SHA-256 of the canonical JSON encoding of the snapshot.
    pub fn payload_hash(&self) -> String {
        // Struct fields serialize in declaration order and tags are a
        // BTreeSet, so the encoding is canonical.
        let encoded = serde_json::to_vec(&self.snapshot()).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tags(values: &[&str]) -> Option<BTreeSet<String>> {
        Some(values.iter().map(|t| t.to_string()).collect())
    }

    fn sample() -> RegistrationPayload {
        RegistrationPayload {
            opt_in: true,
            push_address: Some("token".into()),
            tags: tags(&["a", "b"]),
            timezone: Some("Europe/Berlin".into()),
            locale_language: Some("de".into()),
            app_version: Some("1.0".into()),
            ..RegistrationPayload::new("linux")
        }
    }

    #[test]
    fn minimize_without_baseline_is_identity() {
        let payload = sample();
        assert_eq!(payload.minimize(None), payload);
    }

    #[test]
    fn minimize_against_self_keeps_only_always_send() {
        let payload = sample();
        let min = payload.minimize(Some(&payload));

        assert_eq!(min.device_type, "linux");
        assert!(min.opt_in);
        assert_eq!(min.push_address.as_deref(), Some("token"));
        assert_eq!(min.tags, None);
        assert_eq!(min.tag_changes, None);
        assert_eq!(min.timezone, None);
        assert_eq!(min.locale_language, None);
        assert_eq!(min.app_version, None);
    }

    #[test]
    fn changed_tags_carry_delta() {
        let previous = sample();
        let current = RegistrationPayload {
            tags: tags(&["b", "c"]),
            ..previous.clone()
        };

        let min = current.minimize(Some(&previous));
        assert_eq!(min.tags, tags(&["b", "c"]));
        let delta = min.tag_changes.unwrap_or_default();
        assert_eq!(delta.add, ["c".to_string()].into_iter().collect());
        assert_eq!(delta.remove, ["a".to_string()].into_iter().collect());
    }

    #[test]
    fn first_tag_set_has_no_delta() {
        let previous = RegistrationPayload {
            tags: None,
            ..sample()
        };
        let current = sample();
        let min = current.minimize(Some(&previous));
        assert_eq!(min.tags, tags(&["a", "b"]));
        assert_eq!(min.tag_changes, None);
    }

    #[test]
    fn changed_scalar_is_kept() {
        let previous = sample();
        let current = RegistrationPayload {
            locale_language: Some("fr".into()),
            ..previous.clone()
        };
        let min = current.minimize(Some(&previous));
        assert_eq!(min.locale_language.as_deref(), Some("fr"));
        assert_eq!(min.timezone, None);
    }

    #[test]
    fn hash_ignores_differ_output() {
        let payload = sample();
        let with_delta = RegistrationPayload {
            tag_changes: Some(TagChanges::default()),
            ..payload.clone()
        };
        assert_eq!(payload.payload_hash(), with_delta.payload_hash());
        assert_eq!(payload.payload_hash().len(), 64);
    }

    #[test]
    fn hash_changes_with_content() {
        let payload = sample();
        let other = RegistrationPayload {
            opt_in: false,
            ..payload.clone()
        };
        assert_ne!(payload.payload_hash(), other.payload_hash());
    }

    fn opt_string() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop::sample::select(vec!["x".to_string(), "y".to_string()]))
    }

    prop_compose! {
        fn arb_payload()(
            opt_in in any::<bool>(),
            background in any::<bool>(),
            push_address in opt_string(),
            is_active in any::<bool>(),
            tag_list in prop::option::of(prop::collection::btree_set("[ab]", 0..3)),
            timezone in opt_string(),
            locale_language in opt_string(),
            app_version in opt_string(),
            carrier in opt_string(),
            contact_id in opt_string(),
            badge in prop::option::of(0i64..3),
        ) -> RegistrationPayload {
            RegistrationPayload {
                opt_in,
                background,
                push_address,
                is_active,
                tags: tag_list,
                timezone,
                locale_language,
                app_version,
                carrier,
                contact_id,
                platform_settings: badge.map(|badge| PlatformSettings {
                    badge: Some(badge),
                    ..PlatformSettings::default()
                }),
                ..RegistrationPayload::new("linux")
            }
        }
    }

    #[test]
    fn cleared_field_is_omitted_from_minimized_payload() {
        let previous = RegistrationPayload {
            timezone: Some("Europe/Berlin".into()),
            contact_id: Some("contact-1".into()),
            ..RegistrationPayload::new("linux")
        };
        let current = RegistrationPayload::new("linux");

        let min = current.minimize(Some(&previous));
        assert_eq!(min.timezone, None);
        assert_eq!(min.contact_id, None);
        let json = serde_json::to_value(&min).unwrap();
        assert!(json.get("timezone").is_none());
        assert!(json.get("contact_id").is_none());
    }

    proptest! {
        #[test]
        fn minimize_keeps_exactly_changed_fields(a in arb_payload(), b in arb_payload()) {
            let min = a.minimize(Some(&b));

            prop_assert_eq!(&min.device_type, &a.device_type);
            prop_assert_eq!(min.opt_in, a.opt_in);
            prop_assert_eq!(min.background, a.background);
            prop_assert_eq!(&min.push_address, &a.push_address);
            prop_assert_eq!(min.is_active, a.is_active);

            prop_assert_eq!(min.tags.is_some(), a.tags.is_some() && a.tags != b.tags);
            prop_assert_eq!(min.timezone.is_some(), a.timezone.is_some() && a.timezone != b.timezone);
            prop_assert_eq!(min.carrier.is_some(), a.carrier.is_some() && a.carrier != b.carrier);
            prop_assert_eq!(min.contact_id.is_some(), a.contact_id.is_some() && a.contact_id != b.contact_id);
            prop_assert_eq!(
                min.platform_settings.is_some(),
                a.platform_settings.is_some() && a.platform_settings != b.platform_settings
            );
            if min.tag_changes.is_some() {
                prop_assert!(min.tags.is_some() && b.tags.is_some());
            }
        }

        #[test]
        fn minimize_is_deterministic(a in arb_payload(), b in arb_payload()) {
            prop_assert_eq!(a.minimize(Some(&b)), a.minimize(Some(&b)));
        }
    }
}

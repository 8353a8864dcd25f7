//! Topic template resolution and subscription matching.
//!
//! Templates carry the literal sentinels `___HOSTNAME___` and `___INSTANCE___`.
//! They are re-resolved on every lookup rather than cached, so a later identity
//! change always re-derives correctly.

/// Hostname placeholder sentinel. Fixed string, no escaping.
pub const HOSTNAME_VAR: &str = "___HOSTNAME___";
/// Instance placeholder sentinel.
pub const INSTANCE_VAR: &str = "___INSTANCE___";

/// The default four-way command fan-out: exact/exact, all/exact, exact/all,
/// all/all. Any of the four, when matched, triggers the same action.
pub const DEFAULT_URL_TOPICS: [&str; 4] = [
    "/___HOSTNAME___/___INSTANCE___/url",
    "/all/___INSTANCE___/url",
    "/___HOSTNAME___/all/url",
    "/all/all/url",
];

pub const DEFAULT_INSTANCE_STATE_TOPIC: &str = "/___HOSTNAME___/___INSTANCE___/state/instance";
pub const DEFAULT_URL_STATE_TOPIC: &str = "/___HOSTNAME___/___INSTANCE___/state/url";

/// Which topic instance this process answers to. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    pub hostname: String,
    pub instance: u32,
}

impl InstanceIdentity {
    pub fn new(hostname: impl Into<String>, instance: u32) -> Self {
        Self {
            hostname: hostname.into(),
            instance,
        }
    }

    /// Identity from the local hostname and the configured instance id.
    pub fn detect(instance: u32) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        Self { hostname, instance }
    }
}

/// Substitute both sentinels literally. Order-independent and case-sensitive;
/// a template without sentinels resolves unchanged (a bare prefix is valid).
pub fn resolve(template: &str, identity: &InstanceIdentity) -> String {
    template
        .replace(HOSTNAME_VAR, &identity.hostname)
        .replace(INSTANCE_VAR, &identity.instance.to_string())
}

/// The resolved topic strings this process subscribes to. Built once per
/// connection, replacing any prior set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    entries: Vec<String>,
}

impl SubscriptionSet {
    pub fn build(prefix: &str, templates: &[String], identity: &InstanceIdentity) -> Self {
        let entries = templates
            .iter()
            .map(|t| resolve(&format!("{}{}", prefix, t), identity))
            .collect();
        Self { entries }
    }

    /// Exact string equality against each entry. Wildcard fan-out is achieved
    /// by having subscribed to all templated forms, not by pattern matching
    /// at delivery time.
    pub fn matches(&self, topic: &str) -> bool {
        self.entries.iter().any(|e| e == topic)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> InstanceIdentity {
        InstanceIdentity::new("kiosk-7", 2)
    }

    #[test]
    fn resolve_substitutes_both_sentinels() {
        let topic = resolve("tabcast/___HOSTNAME___/___INSTANCE___/url", &identity());
        assert_eq!(topic, "tabcast/kiosk-7/2/url");
    }

    #[test]
    fn default_templates_leave_no_sentinel_behind() {
        let id = identity();
        let mut all: Vec<&str> = DEFAULT_URL_TOPICS.to_vec();
        all.push(DEFAULT_INSTANCE_STATE_TOPIC);
        all.push(DEFAULT_URL_STATE_TOPIC);
        for template in all {
            let topic = resolve(template, &id);
            assert!(!topic.contains(HOSTNAME_VAR), "unresolved hostname in {}", topic);
            assert!(!topic.contains(INSTANCE_VAR), "unresolved instance in {}", topic);
        }
    }

    #[test]
    fn template_without_sentinels_passes_through() {
        assert_eq!(resolve("tabcast/static/url", &identity()), "tabcast/static/url");
    }

    #[test]
    fn four_way_set_matches_every_address_form() {
        let templates: Vec<String> = DEFAULT_URL_TOPICS.iter().map(|s| s.to_string()).collect();
        let set = SubscriptionSet::build("tabcast", &templates, &identity());

        for topic in [
            "tabcast/kiosk-7/2/url",
            "tabcast/all/2/url",
            "tabcast/kiosk-7/all/url",
            "tabcast/all/all/url",
        ] {
            assert!(set.matches(topic), "expected match for {}", topic);
        }
    }

    #[test]
    fn state_topic_is_not_in_the_command_set() {
        let templates: Vec<String> = DEFAULT_URL_TOPICS.iter().map(|s| s.to_string()).collect();
        let set = SubscriptionSet::build("tabcast", &templates, &identity());
        assert!(!set.matches("tabcast/kiosk-7/2/state/instance"));
        assert!(!set.matches("tabcast/kiosk-7/2/state/url"));
    }

    #[test]
    fn colliding_entries_still_match() {
        // A hostname of literally "all" makes two templates resolve to the
        // same topic string; matching stays a plain membership test.
        let id = InstanceIdentity::new("all", 0);
        let templates: Vec<String> = DEFAULT_URL_TOPICS.iter().map(|s| s.to_string()).collect();
        let set = SubscriptionSet::build("tabcast", &templates, &id);
        assert!(set.matches("tabcast/all/0/url"));
        assert!(set.matches("tabcast/all/all/url"));
    }
}

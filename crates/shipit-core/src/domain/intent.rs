//! Trigger-message intent parsing.

use serde::{Deserialize, Serialize};

/// Tag that requests seeding of third-party dependency images.
pub const SEED_TAG: &str = "[seed]";

/// Tag that requests a build and rollout of first-party images.
pub const APP_TAG: &str = "[app]";

/// Release activities requested by a trigger message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntentSet {
    /// Import third-party images and roll their workloads onto `latest`.
    pub seed_third_party: bool,

    /// Build first-party images and roll their workloads onto the run tag.
    pub build_first_party: bool,
}

impl IntentSet {
    /// Whether the message requested nothing at all.
    pub fn is_empty(&self) -> bool {
        !self.seed_third_party && !self.build_first_party
    }
}

/// Parse a trigger message into an [`IntentSet`].
///
/// Matching is case-sensitive substring containment. The function is total:
/// a message without any recognized tag yields an empty set.
pub fn parse_intent(message: &str) -> IntentSet {
    IntentSet {
        seed_third_party: message.contains(SEED_TAG),
        build_first_party: message.contains(APP_TAG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_only() {
        let intent = parse_intent("fix bug [app]");
        assert!(!intent.seed_third_party);
        assert!(intent.build_first_party);
    }

    #[test]
    fn test_seed_only() {
        let intent = parse_intent("release [seed]");
        assert!(intent.seed_third_party);
        assert!(!intent.build_first_party);
    }

    #[test]
    fn test_both_tags() {
        let intent = parse_intent("[app] bump everything [seed]");
        assert!(intent.seed_third_party);
        assert!(intent.build_first_party);
        assert!(!intent.is_empty());
    }

    #[test]
    fn test_no_tags() {
        let intent = parse_intent("docs: typo in README");
        assert!(intent.is_empty());
        assert_eq!(intent, IntentSet::default());
    }

    #[test]
    fn test_case_sensitive() {
        assert!(parse_intent("[APP] [Seed]").is_empty());
    }

    #[test]
    fn test_bare_words_are_not_tags() {
        assert!(parse_intent("seed the app").is_empty());
    }

    #[test]
    fn test_multiline_commit_message() {
        let intent = parse_intent("Update store-front styles\n\nTriggers: [app]\n");
        assert!(intent.build_first_party);
    }
}

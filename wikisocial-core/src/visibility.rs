//! Profile field visibility
//!
//! Computes, for an (owner, viewer) pair, which profile fields the viewer
//! may see, and gates feed items that would disclose something hidden.
//! Field sets are recomputed per request - they depend on the live viewer
//! identity and whatever privacy toggles the owner saved, so caching them
//! across requests would serve stale policy.

use crate::error::Result;
use crate::store::{PrivacyStore, RelationshipGraph};
use crate::types::{ActivityItem, ActivityPayload, ActorId, RelationshipType, Viewer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================
// Privacy levels
// ============================================

/// Audience an owner can grant a field to, from most open to owner-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    /// Anyone, including anonymous viewers
    Everyone,
    /// Any logged-in actor
    Registered,
    /// Friends of the owner
    Friends,
    /// The owner alone
    OwnerOnly,
}

impl PrivacyLevel {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Everyone => "everyone",
            PrivacyLevel::Registered => "registered",
            PrivacyLevel::Friends => "friends",
            PrivacyLevel::OwnerOnly => "owner_only",
        }
    }
}

impl std::fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "everyone" => Ok(PrivacyLevel::Everyone),
            "registered" => Ok(PrivacyLevel::Registered),
            "friends" => Ok(PrivacyLevel::Friends),
            "owner_only" => Ok(PrivacyLevel::OwnerOnly),
            _ => Err(format!("unknown privacy level: {}", s)),
        }
    }
}

/// How much access a viewer has to an owner's profile.
///
/// Ordered: a class sees a field exactly when it ranks at or above the
/// field's level, so widening access for one class can never narrow it
/// for a higher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ViewerClass {
    Anonymous,
    Registered,
    Friend,
    Owner,
}

impl ViewerClass {
    /// Whether this class satisfies `level`
    pub fn grants(&self, level: PrivacyLevel) -> bool {
        match level {
            PrivacyLevel::Everyone => true,
            PrivacyLevel::Registered => *self >= ViewerClass::Registered,
            PrivacyLevel::Friends => *self >= ViewerClass::Friend,
            PrivacyLevel::OwnerOnly => *self >= ViewerClass::Owner,
        }
    }
}

// ============================================
// Profile fields
// ============================================

/// Profile fields governed by visibility rules.
///
/// Serialized names keep the host's `up_` column prefix so stored privacy
/// rows stay compatible with the platform schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProfileField {
    #[serde(rename = "up_about")]
    About,
    #[serde(rename = "up_occupation")]
    Occupation,
    #[serde(rename = "up_schools")]
    Schools,
    #[serde(rename = "up_websites")]
    Websites,
    #[serde(rename = "up_birthday")]
    Birthday,
    #[serde(rename = "up_location_city")]
    LocationCity,
    #[serde(rename = "up_location_state")]
    LocationState,
    #[serde(rename = "up_location_country")]
    LocationCountry,
    #[serde(rename = "up_hometown_city")]
    HometownCity,
    #[serde(rename = "up_hometown_country")]
    HometownCountry,
    #[serde(rename = "up_hobbies")]
    Hobbies,
    #[serde(rename = "up_movies")]
    Movies,
    #[serde(rename = "up_music")]
    Music,
    #[serde(rename = "up_books")]
    Books,
}

impl ProfileField {
    /// Every field, in a fixed order
    pub const ALL: [ProfileField; 14] = [
        ProfileField::About,
        ProfileField::Occupation,
        ProfileField::Schools,
        ProfileField::Websites,
        ProfileField::Birthday,
        ProfileField::LocationCity,
        ProfileField::LocationState,
        ProfileField::LocationCountry,
        ProfileField::HometownCity,
        ProfileField::HometownCountry,
        ProfileField::Hobbies,
        ProfileField::Movies,
        ProfileField::Music,
        ProfileField::Books,
    ];

    /// Fields shown in the personal-info section
    pub const PERSONAL: [ProfileField; 10] = [
        ProfileField::About,
        ProfileField::Occupation,
        ProfileField::Schools,
        ProfileField::Websites,
        ProfileField::Birthday,
        ProfileField::LocationCity,
        ProfileField::LocationState,
        ProfileField::LocationCountry,
        ProfileField::HometownCity,
        ProfileField::HometownCountry,
    ];

    /// Fields shown in the interests section
    pub const INTERESTS: [ProfileField; 4] = [
        ProfileField::Hobbies,
        ProfileField::Movies,
        ProfileField::Music,
        ProfileField::Books,
    ];

    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::About => "up_about",
            ProfileField::Occupation => "up_occupation",
            ProfileField::Schools => "up_schools",
            ProfileField::Websites => "up_websites",
            ProfileField::Birthday => "up_birthday",
            ProfileField::LocationCity => "up_location_city",
            ProfileField::LocationState => "up_location_state",
            ProfileField::LocationCountry => "up_location_country",
            ProfileField::HometownCity => "up_hometown_city",
            ProfileField::HometownCountry => "up_hometown_country",
            ProfileField::Hobbies => "up_hobbies",
            ProfileField::Movies => "up_movies",
            ProfileField::Music => "up_music",
            ProfileField::Books => "up_books",
        }
    }

    /// Fields visible to everyone regardless of the default policy.
    /// The host platform has always rendered the state/region line without
    /// a privacy check, and stored rules may still narrow it.
    pub fn always_public(&self) -> bool {
        matches!(self, ProfileField::LocationState)
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProfileField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        ProfileField::ALL
            .iter()
            .find(|f| f.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown profile field: {}", s))
    }
}

// ============================================
// Visible field sets
// ============================================

/// Per-field visibility for one (owner, viewer) pair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VisibleFieldSet {
    fields: BTreeMap<ProfileField, bool>,
}

impl VisibleFieldSet {
    /// Whether `field` is visible. Fields absent from the set are hidden.
    pub fn is_visible(&self, field: ProfileField) -> bool {
        self.fields.get(&field).copied().unwrap_or(false)
    }

    /// Fields the viewer may see, in field order
    pub fn visible(&self) -> impl Iterator<Item = ProfileField> + '_ {
        self.fields
            .iter()
            .filter(|(_, v)| **v)
            .map(|(f, _)| *f)
    }

    /// All (field, visible) entries, in field order
    pub fn iter(&self) -> impl Iterator<Item = (ProfileField, bool)> + '_ {
        self.fields.iter().map(|(f, v)| (*f, *v))
    }

    /// The subset covering only `keep`, for per-section rendering
    pub fn subset(&self, keep: &[ProfileField]) -> VisibleFieldSet {
        VisibleFieldSet {
            fields: self
                .fields
                .iter()
                .filter(|(f, _)| keep.contains(f))
                .map(|(f, v)| (*f, *v))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ============================================
// Visibility filter
// ============================================

/// Computes visible-field sets and classifies viewers.
///
/// Holds the privacy settings store and the relationship graph it needs to
/// tell friends from strangers. Both handles are injected; the filter owns
/// no state of its own.
pub struct VisibilityFilter {
    privacy: Arc<dyn PrivacyStore>,
    graph: Arc<dyn RelationshipGraph>,
}

impl VisibilityFilter {
    pub fn new(privacy: Arc<dyn PrivacyStore>, graph: Arc<dyn RelationshipGraph>) -> Self {
        VisibilityFilter { privacy, graph }
    }

    /// Visible-field set for the pair.
    ///
    /// Precedence: the owner sees everything; an explicit per-field rule
    /// overrides the default; unset fields default to registered-only,
    /// or to everyone when the field is always-public.
    pub fn compute_visible_fields(&self, owner: ActorId, viewer: Viewer) -> Result<VisibleFieldSet> {
        let class = self.classify(owner, viewer)?;
        let rules = self.privacy.rules(owner)?;

        let mut fields = BTreeMap::new();
        for field in ProfileField::ALL {
            let level = match rules.get(&field) {
                Some(level) => *level,
                None if field.always_public() => PrivacyLevel::Everyone,
                None => PrivacyLevel::Registered,
            };
            fields.insert(field, class.grants(level));
        }

        tracing::trace!(
            owner = %owner,
            class = ?class,
            visible = fields.values().filter(|v| **v).count(),
            "computed visible fields"
        );

        Ok(VisibleFieldSet { fields })
    }

    /// Classify `viewer` with respect to `owner`.
    ///
    /// A viewer counts as a friend when the owner's friend list contains
    /// them; the check is a single edge lookup, not a list scan.
    pub fn classify(&self, owner: ActorId, viewer: Viewer) -> Result<ViewerClass> {
        let id = match viewer {
            Viewer::Anonymous => return Ok(ViewerClass::Anonymous),
            Viewer::Actor(id) => id,
        };
        if id == owner {
            return Ok(ViewerClass::Owner);
        }
        if self.graph.related(owner, id, RelationshipType::Friend)? {
            Ok(ViewerClass::Friend)
        } else {
            Ok(ViewerClass::Registered)
        }
    }
}

// ============================================
// Feed gating
// ============================================

/// Whether `viewer` may see `item` in a feed or board.
///
/// Private board messages are visible only to their participants. Runs
/// after aggregation and before display truncation, so gated items never
/// occupy a visible slot but still count toward totals.
pub fn can_view_item(item: &ActivityItem, viewer: Viewer) -> bool {
    match &item.payload {
        ActivityPayload::UserMessage { to, private: true, .. } => match viewer.actor_id() {
            Some(id) => id == item.actor_id || id == *to,
            None => false,
        },
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::RelationshipRecord;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    struct FakeGraph {
        friends: Mutex<Vec<(ActorId, ActorId)>>,
        changes: broadcast::Sender<crate::store::GraphChange>,
    }

    impl FakeGraph {
        fn new(friends: Vec<(u64, u64)>) -> Self {
            let (changes, _) = broadcast::channel(16);
            FakeGraph {
                friends: Mutex::new(
                    friends
                        .into_iter()
                        .map(|(a, b)| (ActorId(a), ActorId(b)))
                        .collect(),
                ),
                changes,
            }
        }
    }

    impl RelationshipGraph for FakeGraph {
        fn list(
            &self,
            _owner: ActorId,
            _rel_type: RelationshipType,
            _count: usize,
        ) -> Result<Vec<RelationshipRecord>> {
            Ok(vec![])
        }

        fn count(&self, _owner: ActorId, _rel_type: RelationshipType) -> Result<usize> {
            Ok(0)
        }

        fn related(
            &self,
            owner: ActorId,
            other: ActorId,
            rel_type: RelationshipType,
        ) -> Result<bool> {
            if rel_type != RelationshipType::Friend {
                return Ok(false);
            }
            Ok(self.friends.lock().unwrap().contains(&(owner, other)))
        }

        fn subscribe(&self) -> broadcast::Receiver<crate::store::GraphChange> {
            self.changes.subscribe()
        }
    }

    struct FakePrivacy {
        rules: HashMap<ActorId, HashMap<ProfileField, PrivacyLevel>>,
    }

    impl PrivacyStore for FakePrivacy {
        fn rules(&self, owner: ActorId) -> Result<HashMap<ProfileField, PrivacyLevel>> {
            Ok(self.rules.get(&owner).cloned().unwrap_or_default())
        }
    }

    fn filter_with(
        rules: Vec<(u64, ProfileField, PrivacyLevel)>,
        friends: Vec<(u64, u64)>,
    ) -> VisibilityFilter {
        let mut map: HashMap<ActorId, HashMap<ProfileField, PrivacyLevel>> = HashMap::new();
        for (owner, field, level) in rules {
            map.entry(ActorId(owner)).or_default().insert(field, level);
        }
        VisibilityFilter::new(
            Arc::new(FakePrivacy { rules: map }),
            Arc::new(FakeGraph::new(friends)),
        )
    }

    #[test]
    fn owner_sees_every_field() {
        let filter = filter_with(
            vec![(1, ProfileField::About, PrivacyLevel::OwnerOnly)],
            vec![],
        );
        let set = filter
            .compute_visible_fields(ActorId(1), Viewer::Actor(ActorId(1)))
            .unwrap();
        for field in ProfileField::ALL {
            assert!(set.is_visible(field), "{} hidden from owner", field);
        }
    }

    #[test]
    fn unset_fields_default_to_registered() {
        let filter = filter_with(vec![], vec![]);
        let registered = filter
            .compute_visible_fields(ActorId(1), Viewer::Actor(ActorId(2)))
            .unwrap();
        let anonymous = filter
            .compute_visible_fields(ActorId(1), Viewer::Anonymous)
            .unwrap();

        assert!(registered.is_visible(ProfileField::About));
        assert!(!anonymous.is_visible(ProfileField::About));
        // always-public field stays visible even to anonymous viewers
        assert!(anonymous.is_visible(ProfileField::LocationState));
    }

    #[test]
    fn explicit_rule_overrides_default() {
        let filter = filter_with(
            vec![
                (1, ProfileField::About, PrivacyLevel::Everyone),
                (1, ProfileField::Birthday, PrivacyLevel::Friends),
                (1, ProfileField::LocationState, PrivacyLevel::OwnerOnly),
            ],
            vec![(1, 3)],
        );

        let anonymous = filter
            .compute_visible_fields(ActorId(1), Viewer::Anonymous)
            .unwrap();
        assert!(anonymous.is_visible(ProfileField::About));
        // an explicit rule narrows even an always-public field
        assert!(!anonymous.is_visible(ProfileField::LocationState));

        let stranger = filter
            .compute_visible_fields(ActorId(1), Viewer::Actor(ActorId(2)))
            .unwrap();
        assert!(!stranger.is_visible(ProfileField::Birthday));

        let friend = filter
            .compute_visible_fields(ActorId(1), Viewer::Actor(ActorId(3)))
            .unwrap();
        assert!(friend.is_visible(ProfileField::Birthday));
    }

    #[test]
    fn visibility_is_monotonic_across_classes() {
        // anything hidden from a class is hidden from every lower class
        let classes = [
            ViewerClass::Anonymous,
            ViewerClass::Registered,
            ViewerClass::Friend,
            ViewerClass::Owner,
        ];
        let levels = [
            PrivacyLevel::Everyone,
            PrivacyLevel::Registered,
            PrivacyLevel::Friends,
            PrivacyLevel::OwnerOnly,
        ];
        for level in levels {
            for pair in classes.windows(2) {
                assert!(
                    !pair[0].grants(level) || pair[1].grants(level),
                    "{:?} grants {} but {:?} does not",
                    pair[0],
                    level,
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn classify_distinguishes_friend_from_stranger() {
        let filter = filter_with(vec![], vec![(1, 2)]);
        assert_eq!(
            filter.classify(ActorId(1), Viewer::Actor(ActorId(2))).unwrap(),
            ViewerClass::Friend
        );
        assert_eq!(
            filter.classify(ActorId(1), Viewer::Actor(ActorId(9))).unwrap(),
            ViewerClass::Registered
        );
        assert_eq!(
            filter.classify(ActorId(1), Viewer::Anonymous).unwrap(),
            ViewerClass::Anonymous
        );
    }

    #[test]
    fn private_messages_gate_to_participants() {
        let item = ActivityItem {
            actor_id: ActorId(5),
            timestamp: Utc::now(),
            payload: ActivityPayload::UserMessage {
                to: ActorId(7),
                comment: "psst".to_string(),
                private: true,
            },
        };

        assert!(can_view_item(&item, Viewer::Actor(ActorId(5))));
        assert!(can_view_item(&item, Viewer::Actor(ActorId(7))));
        assert!(!can_view_item(&item, Viewer::Actor(ActorId(8))));
        assert!(!can_view_item(&item, Viewer::Anonymous));

        let public = ActivityItem {
            actor_id: ActorId(5),
            timestamp: Utc::now(),
            payload: ActivityPayload::UserMessage {
                to: ActorId(7),
                comment: "hi".to_string(),
                private: false,
            },
        };
        assert!(can_view_item(&public, Viewer::Anonymous));
    }

    #[test]
    fn field_names_round_trip() {
        for field in ProfileField::ALL {
            let parsed: ProfileField = field.as_str().parse().unwrap();
            assert_eq!(parsed, field);
        }
        assert!("up_shoe_size".parse::<ProfileField>().is_err());
    }
}

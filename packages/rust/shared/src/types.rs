//! Content tree types.
//!
//! A page is a list of sections. Section kinds that carry images have an
//! explicit schema naming their image fields; every other field is kept
//! verbatim in a flattened map so a round-trip never loses data. Labels
//! (`id`, `title`, `name`) live in that map too and are read leniently, so a
//! numeric id or a null name does not knock a section out of its schema.
//! Sections of any other kind are carried as [`OpaqueSection`]s and never
//! touched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::image::is_valid_image_ref;

// ---------------------------------------------------------------------------
// ContentTree
// ---------------------------------------------------------------------------

/// Root of a page's structured content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentTree {
    /// Sections in document order.
    #[serde(default)]
    pub sections: Vec<ContentNode>,

    /// Any other top-level fields (page title, palette, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentTree {
    /// Parse a tree from JSON text.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the tree as pretty JSON.
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total number of image slots lacking a valid reference.
    pub fn missing_slot_count(&self) -> usize {
        self.sections
            .iter()
            .filter_map(ContentNode::as_section)
            .map(|s| s.missing_slots().len())
            .sum()
    }
}

/// A section node: either a known image-bearing kind or an opaque passthrough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentNode {
    Section(Section),
    Opaque(OpaqueSection),
}

impl ContentNode {
    pub fn as_section(&self) -> Option<&Section> {
        match self {
            Self::Section(s) => Some(s),
            Self::Opaque(_) => None,
        }
    }

    pub fn as_section_mut(&mut self) -> Option<&mut Section> {
        match self {
            Self::Section(s) => Some(s),
            Self::Opaque(_) => None,
        }
    }
}

/// Section of a kind without image fields (pricing, cta, faq, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueSection {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OpaqueSection {
    /// The image-bearing kind this section claims to be, if any. A known kind
    /// only ends up opaque when its fields do not fit the schema.
    pub fn claimed_kind(&self) -> Option<SectionKind> {
        SectionKind::from_type(&self.kind)
    }

    pub fn id(&self) -> String {
        label(&self.fields, "id")
    }
}

// ---------------------------------------------------------------------------
// Known sections
// ---------------------------------------------------------------------------

/// Image-bearing section kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Hero,
    About,
    Features,
    Gallery,
    Testimonials,
    Team,
}

impl SectionKind {
    /// Kind for a section `type` tag.
    pub fn from_type(tag: &str) -> Option<Self> {
        match tag {
            "hero" => Some(Self::Hero),
            "about" => Some(Self::About),
            "features" => Some(Self::Features),
            "gallery" => Some(Self::Gallery),
            "testimonials" => Some(Self::Testimonials),
            "team" => Some(Self::Team),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::About => "about",
            Self::Features => "features",
            Self::Gallery => "gallery",
            Self::Testimonials => "testimonials",
            Self::Team => "team",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Section {
    Hero(SingleImageSection),
    About(SingleImageSection),
    Features(FeaturesSection),
    Gallery(GallerySection),
    Testimonials(TestimonialsSection),
    Team(TeamSection),
}

/// A section with one image field (`hero`, `about`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SingleImageSection {
    #[serde(default, deserialize_with = "image_ref", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeaturesSection {
    #[serde(default)]
    pub items: Vec<FeatureItem>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureItem {
    #[serde(default, deserialize_with = "image_ref", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GallerySection {
    #[serde(default)]
    pub items: Vec<GalleryItem>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GalleryItem {
    #[serde(default, deserialize_with = "image_ref", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestimonialsSection {
    #[serde(default)]
    pub items: Vec<Testimonial>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Testimonial {
    #[serde(default, deserialize_with = "image_ref", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamSection {
    #[serde(default)]
    pub members: Vec<TeamMember>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamMember {
    #[serde(default, deserialize_with = "image_ref", skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// An image slot lacking a valid reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSlot {
    /// List index, or `None` for the section's own image field.
    pub item: Option<usize>,
    /// Item label (feature title, person name), if the slot belongs to an item.
    pub label: Option<String>,
}

impl Section {
    pub fn kind(&self) -> SectionKind {
        match self {
            Self::Hero(_) => SectionKind::Hero,
            Self::About(_) => SectionKind::About,
            Self::Features(_) => SectionKind::Features,
            Self::Gallery(_) => SectionKind::Gallery,
            Self::Testimonials(_) => SectionKind::Testimonials,
            Self::Team(_) => SectionKind::Team,
        }
    }

    /// Section `id`, rendered as text; empty if absent.
    pub fn id(&self) -> String {
        let fields = match self {
            Self::Hero(s) | Self::About(s) => &s.fields,
            Self::Features(s) => &s.fields,
            Self::Gallery(s) => &s.fields,
            Self::Testimonials(s) => &s.fields,
            Self::Team(s) => &s.fields,
        };
        label(fields, "id")
    }

    /// Current value of every image slot, in document order.
    pub fn image_refs(&self) -> Vec<Option<&str>> {
        match self {
            Self::Hero(s) | Self::About(s) => vec![s.image.as_deref()],
            Self::Features(s) => s.items.iter().map(|i| i.image.as_deref()).collect(),
            Self::Gallery(s) => s.items.iter().map(|i| i.image.as_deref()).collect(),
            Self::Testimonials(s) => s.items.iter().map(|i| i.avatar.as_deref()).collect(),
            Self::Team(s) => s.members.iter().map(|m| m.photo.as_deref()).collect(),
        }
    }

    /// Slots whose value is absent or not a valid image reference.
    pub fn missing_slots(&self) -> Vec<MissingSlot> {
        fn missing(value: Option<&str>) -> bool {
            !value.is_some_and(is_valid_image_ref)
        }

        match self {
            Self::Hero(s) | Self::About(s) => {
                if missing(s.image.as_deref()) {
                    vec![MissingSlot { item: None, label: None }]
                } else {
                    Vec::new()
                }
            }
            Self::Features(s) => s
                .items
                .iter()
                .enumerate()
                .filter(|(_, i)| missing(i.image.as_deref()))
                .map(|(idx, i)| MissingSlot { item: Some(idx), label: Some(label(&i.fields, "title")) })
                .collect(),
            Self::Gallery(s) => s
                .items
                .iter()
                .enumerate()
                .filter(|(_, i)| missing(i.image.as_deref()))
                .map(|(idx, _)| MissingSlot { item: Some(idx), label: None })
                .collect(),
            Self::Testimonials(s) => s
                .items
                .iter()
                .enumerate()
                .filter(|(_, i)| missing(i.avatar.as_deref()))
                .map(|(idx, i)| MissingSlot { item: Some(idx), label: Some(label(&i.fields, "name")) })
                .collect(),
            Self::Team(s) => s
                .members
                .iter()
                .enumerate()
                .filter(|(_, m)| missing(m.photo.as_deref()))
                .map(|(idx, m)| MissingSlot { item: Some(idx), label: Some(label(&m.fields, "name")) })
                .collect(),
        }
    }

    /// Write `url` into a slot. A slot that already holds a valid reference is
    /// left alone; returns whether the write happened.
    pub fn set_image(&mut self, item: Option<usize>, url: String) -> bool {
        let slot = match (self, item) {
            (Self::Hero(s) | Self::About(s), None) => &mut s.image,
            (Self::Features(s), Some(i)) => match s.items.get_mut(i) {
                Some(item) => &mut item.image,
                None => return false,
            },
            (Self::Gallery(s), Some(i)) => match s.items.get_mut(i) {
                Some(item) => &mut item.image,
                None => return false,
            },
            (Self::Testimonials(s), Some(i)) => match s.items.get_mut(i) {
                Some(item) => &mut item.avatar,
                None => return false,
            },
            (Self::Team(s), Some(i)) => match s.members.get_mut(i) {
                Some(member) => &mut member.photo,
                None => return false,
            },
            _ => return false,
        };

        if slot.as_deref().is_some_and(is_valid_image_ref) {
            return false;
        }
        *slot = Some(url);
        true
    }
}

// ---------------------------------------------------------------------------
// Lenient field access
// ---------------------------------------------------------------------------

/// Text of a label field. Numbers and booleans are rendered; null, missing,
/// arrays, and objects read as empty.
fn label(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Image field: only a string counts as a reference. Anything else is read as
/// an empty slot and gets filled.
fn image_ref<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"{
        "title": "Sweet Crumbs",
        "sections": [
            {"type": "hero", "id": "hero-1", "headline": "Fresh every morning"},
            {"type": "pricing", "id": "pricing-1", "plans": [{"name": "Box", "price": 12}]},
            {"type": "testimonials", "id": "t-1", "items": [
                {"name": "Ada Park", "avatar": "https://cdn.example.com/ada.jpg", "quote": "Great"},
                {"name": "Bo Chen", "quote": "Lovely"}
            ]},
            {"type": "gallery", "id": "g-1", "items": [{}, {"image": "TODO", "caption": "Ovens"}]}
        ]
    }"#;

    #[test]
    fn parses_known_and_opaque_sections() {
        let tree = ContentTree::from_json(TREE).unwrap();
        assert_eq!(tree.sections.len(), 4);
        assert!(matches!(tree.sections[0], ContentNode::Section(Section::Hero(_))));
        assert!(matches!(tree.sections[1], ContentNode::Opaque(_)));
        let ContentNode::Opaque(pricing) = &tree.sections[1] else {
            panic!("expected opaque pricing section");
        };
        assert_eq!(pricing.id(), "pricing-1");
        assert_eq!(pricing.claimed_kind(), None);
        assert_eq!(tree.extra.get("title").and_then(Value::as_str), Some("Sweet Crumbs"));
    }

    #[test]
    fn roundtrip_preserves_unknown_fields() {
        let tree = ContentTree::from_json(TREE).unwrap();
        let json = tree.to_json_pretty().unwrap();
        let reparsed = ContentTree::from_json(&json).unwrap();
        assert_eq!(tree, reparsed);
        assert!(json.contains("Fresh every morning"));
        assert!(json.contains(r#""price": 12"#));
    }

    #[test]
    fn missing_slots_ignore_valid_refs() {
        let tree = ContentTree::from_json(TREE).unwrap();
        let testimonials = tree.sections[2].as_section().unwrap();
        assert_eq!(
            testimonials.missing_slots(),
            vec![MissingSlot { item: Some(1), label: Some("Bo Chen".into()) }]
        );

        // "TODO" is not a valid reference, so both gallery slots are missing
        let gallery = tree.sections[3].as_section().unwrap();
        assert_eq!(gallery.missing_slots().len(), 2);
        assert_eq!(tree.missing_slot_count(), 4);
    }

    #[test]
    fn set_image_never_overwrites_valid_ref() {
        let mut tree = ContentTree::from_json(TREE).unwrap();
        let section = tree.sections[2].as_section_mut().unwrap();
        assert!(!section.set_image(Some(0), "https://other.example.com/x.jpg".into()));
        assert!(section.set_image(Some(1), "https://cdn.example.com/bo.jpg".into()));
        assert_eq!(
            section.image_refs(),
            vec![Some("https://cdn.example.com/ada.jpg"), Some("https://cdn.example.com/bo.jpg")]
        );
    }

    #[test]
    fn set_image_rejects_mismatched_slot() {
        let mut section = Section::Hero(SingleImageSection::default());
        assert!(!section.set_image(Some(0), "https://x.test/a.jpg".into()));
        assert!(section.set_image(None, "https://x.test/a.jpg".into()));
    }

    #[test]
    fn loosely_typed_labels_keep_the_section_typed() {
        let tree = ContentTree::from_json(
            r#"{"sections":[
                {"type":"hero","id":7},
                {"type":"testimonials","id":"t","items":[{"name":null,"quote":"Nice"}]},
                {"type":"features","id":"f","items":[{"title":42}]}
            ]}"#,
        )
        .unwrap();

        let hero = tree.sections[0].as_section().expect("hero stays typed");
        assert_eq!(hero.id(), "7");
        assert_eq!(hero.missing_slots().len(), 1);

        let testimonials = tree.sections[1].as_section().expect("testimonials stay typed");
        assert_eq!(
            testimonials.missing_slots(),
            vec![MissingSlot { item: Some(0), label: Some(String::new()) }]
        );

        let features = tree.sections[2].as_section().expect("features stay typed");
        assert_eq!(features.missing_slots()[0].label.as_deref(), Some("42"));
        assert_eq!(tree.missing_slot_count(), 3);
    }

    #[test]
    fn loosely_typed_labels_roundtrip_unchanged() {
        let tree = ContentTree::from_json(
            r#"{"sections":[{"type":"team","id":7,"members":[{"name":null,"role":"Chef"}]}]}"#,
        )
        .unwrap();
        let json: Value = serde_json::from_str(&tree.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["sections"][0]["id"], 7);
        assert!(json["sections"][0]["members"][0]["name"].is_null());
        assert_eq!(json["sections"][0]["members"][0]["role"], "Chef");
    }

    #[test]
    fn non_string_image_counts_as_missing() {
        let mut tree =
            ContentTree::from_json(r#"{"sections":[{"type":"about","id":"a","image":42}]}"#)
                .unwrap();
        let about = tree.sections[0].as_section_mut().expect("about stays typed");
        assert_eq!(about.missing_slots().len(), 1);
        assert!(about.set_image(None, "https://x.test/a.jpg".into()));
    }

    #[test]
    fn malformed_known_section_is_opaque_but_claims_its_kind() {
        let tree =
            ContentTree::from_json(r#"{"sections":[{"type":"gallery","id":"g","items":"none"}]}"#)
                .unwrap();
        let ContentNode::Opaque(gallery) = &tree.sections[0] else {
            panic!("expected opaque gallery");
        };
        assert_eq!(gallery.claimed_kind(), Some(SectionKind::Gallery));
        assert_eq!(gallery.id(), "g");
    }
}

//! Turn missing image slots into resolution tasks.
//!
//! Each task carries one request (a stock query or a portrait prompt) and the
//! slots it fills, with the identity each slot's placeholder is derived from.

use pagekit_shared::{ContentNode, ContentTree, Orientation, Section, SectionKind};
use tracing::warn;

use crate::pipeline::EnrichmentContext;
use crate::placeholder::{PlaceholderStyle, placeholder_url};

/// How a task looks for its image(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    /// Stock search first, then generation from `prompt` for unfilled slots.
    Stock {
        query: String,
        orientation: Orientation,
        prompt: String,
    },
    /// Straight to generation.
    Portrait { prompt: String },
}

impl Request {
    pub(crate) fn orientation(&self) -> Orientation {
        match self {
            Self::Stock { orientation, .. } => *orientation,
            Self::Portrait { .. } => Orientation::Portrait,
        }
    }
}

/// One image slot a task must fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlotPlan {
    pub item: Option<usize>,
    pub identity: String,
    pub style: PlaceholderStyle,
}

impl SlotPlan {
    pub(crate) fn placeholder(&self) -> String {
        placeholder_url(&self.identity, self.style)
    }
}

/// Work unit for one section or one list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TaskPlan {
    /// Position of the section in `ContentTree::sections`.
    pub node_index: usize,
    pub node_id: String,
    pub kind: SectionKind,
    pub request: Request,
    pub slots: Vec<SlotPlan>,
}

impl TaskPlan {
    /// Cache provenance for a slot: `node-id` or `node-id#item`.
    pub(crate) fn provenance(&self, item: Option<usize>) -> String {
        match item {
            Some(i) => format!("{}#{i}", self.node_id),
            None => self.node_id.clone(),
        }
    }
}

/// Tasks for every section with missing slots, in document order.
pub(crate) fn plan_tree(tree: &ContentTree, ctx: &EnrichmentContext) -> Vec<TaskPlan> {
    tree.sections
        .iter()
        .enumerate()
        .filter_map(|(idx, node)| match node {
            ContentNode::Section(section) => Some((idx, section)),
            ContentNode::Opaque(opaque) => {
                if let Some(kind) = opaque.claimed_kind() {
                    warn!(
                        index = idx,
                        id = %opaque.id(),
                        kind = %kind,
                        "section does not match its schema, leaving its images untouched"
                    );
                }
                None
            }
        })
        .flat_map(|(idx, section)| plan_section(idx, section, ctx))
        .collect()
}

fn plan_section(node_index: usize, section: &Section, ctx: &EnrichmentContext) -> Vec<TaskPlan> {
    let missing = section.missing_slots();
    if missing.is_empty() {
        return Vec::new();
    }

    let kind = section.kind();
    let node_id = section.id();
    let domain = domain_label(ctx);
    let task = |request: Request, slots: Vec<SlotPlan>| TaskPlan {
        node_index,
        node_id: node_id.clone(),
        kind,
        request,
        slots,
    };

    match kind {
        SectionKind::Hero | SectionKind::About => {
            let query = match kind {
                SectionKind::Hero => format!("{domain} business professional modern hero"),
                _ => format!("{domain} team workplace"),
            };
            let prompt = scenery_prompt(&query, ctx);
            let slot = SlotPlan {
                item: None,
                identity: format!("{kind}+{domain}"),
                style: PlaceholderStyle::Scenery(Orientation::Landscape),
            };
            vec![task(
                Request::Stock {
                    query,
                    orientation: Orientation::Landscape,
                    prompt,
                },
                vec![slot],
            )]
        }

        SectionKind::Features => missing
            .into_iter()
            .map(|m| {
                let title = m.label.unwrap_or_default();
                let title = title.trim();
                let query = join_words(&[&domain, title]);
                let identity = if title.is_empty() {
                    format!("{kind}+{domain}+{}", m.item.map_or(1, |i| i + 1))
                } else {
                    title.to_string()
                };
                task(
                    Request::Stock {
                        prompt: scenery_prompt(&query, ctx),
                        query,
                        orientation: Orientation::Squarish,
                    },
                    vec![SlotPlan {
                        item: m.item,
                        identity,
                        style: PlaceholderStyle::Scenery(Orientation::Squarish),
                    }],
                )
            })
            .collect(),

        SectionKind::Gallery => {
            let query = join_words(&[&domain, ctx.subject_name.trim(), "interior detail"]);
            let slots = missing
                .into_iter()
                .map(|m| SlotPlan {
                    item: m.item,
                    identity: format!("gallery+{domain}+{}", m.item.map_or(1, |i| i + 1)),
                    style: PlaceholderStyle::Scenery(Orientation::Landscape),
                })
                .collect();
            vec![task(
                Request::Stock {
                    prompt: scenery_prompt(&query, ctx),
                    query,
                    orientation: Orientation::Landscape,
                },
                slots,
            )]
        }

        SectionKind::Testimonials | SectionKind::Team => {
            let role = match kind {
                SectionKind::Testimonials => "customer",
                _ => "team member",
            };
            missing
                .into_iter()
                .map(|m| {
                    let name = m.label.unwrap_or_default().trim().to_string();
                    let identity = if name.is_empty() {
                        format!("{kind}+{domain}+{}", m.item.map_or(1, |i| i + 1))
                    } else {
                        name.clone()
                    };
                    let who = if name.is_empty() { "a person".to_string() } else { name };
                    let prompt = format!(
                        "Professional headshot portrait of {who}, a {domain} {role}, \
                         friendly expression, soft natural light, neutral background"
                    );
                    task(
                        Request::Portrait { prompt },
                        vec![SlotPlan {
                            item: m.item,
                            identity,
                            style: PlaceholderStyle::Avatar,
                        }],
                    )
                })
                .collect()
        }
    }
}

fn domain_label(ctx: &EnrichmentContext) -> String {
    let domain = ctx.domain.trim();
    if domain.is_empty() {
        "business".to_string()
    } else {
        domain.to_string()
    }
}

fn scenery_prompt(query: &str, ctx: &EnrichmentContext) -> String {
    let name = ctx.subject_name.trim();
    let subject = if name.is_empty() {
        String::new()
    } else {
        format!(" for {name}")
    };
    format!("High quality photograph{subject}: {query}. Natural light, no text, no logos")
}

fn join_words(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

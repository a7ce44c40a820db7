//! The integrity gate: shape rules over a changeset, aggregated per category.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use strata_core::changeset::{ChangeEdge, ChangeNode, Changeset};
use strata_core::config::PipelineConfig;
use strata_core::types::{EdgeType, NodeType};

use crate::cycles::simple_cycles_matching;
use crate::graph::PrereqGraph;

pub const CANON_VIOLATIONS: &str = "canon_violations";
pub const PREREQ_CYCLES: &str = "prereq_cycles";
pub const HIERARCHY_VIOLATIONS: &str = "hierarchy_violations";
pub const DANGLING_SKILLS: &str = "dangling_skills";
pub const SKILL_BASED_ON_TOO_FEW: &str = "skill_based_on_too_few";
pub const SKILL_BASED_ON_TOO_MANY: &str = "skill_based_on_too_many";
pub const ORPHAN_SKILLS: &str = "orphan_skills";

/// Upper bound on cycles enumerated per check.
const DEFAULT_MAX_CYCLES: usize = 1000;

/// Aggregate outcome of an integrity check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub ok: bool,
    /// Failing categories and their details. Empty iff `ok`.
    pub violations: BTreeMap<String, Vec<Value>>,
    /// Reported but non-blocking findings.
    #[serde(default)]
    pub warnings: BTreeMap<String, Vec<Value>>,
}

impl IntegrityReport {
    /// Whether `category` (violation or warning) mentions `uid`.
    pub fn mentions(&self, category: &str, uid: &str) -> bool {
        self.violations
            .get(category)
            .into_iter()
            .chain(self.warnings.get(category))
            .flatten()
            .any(|detail| detail_mentions(detail, uid))
    }
}

fn detail_mentions(detail: &Value, uid: &str) -> bool {
    match detail {
        Value::String(s) => s == uid,
        Value::Object(map) => map
            .get("uid")
            .or_else(|| map.get("nodes"))
            .is_some_and(|v| detail_mentions(v, uid)),
        Value::Array(items) => items.iter().any(|v| detail_mentions(v, uid)),
        _ => false,
    }
}

/// Configurable bounds for the rules.
#[derive(Debug, Clone)]
pub struct IntegrityRules {
    pub skill_based_on_min: usize,
    pub skill_based_on_max: Option<usize>,
    pub max_cycles: usize,
}

impl Default for IntegrityRules {
    fn default() -> Self {
        Self {
            skill_based_on_min: 1,
            skill_based_on_max: None,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

/// Runs the rules and estimates their cost.
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    rules: IntegrityRules,
    sync_threshold: Duration,
    cost_per_element: Duration,
}

impl IntegrityChecker {
    pub fn new(rules: IntegrityRules, sync_threshold: Duration, cost_per_element: Duration) -> Self {
        Self {
            rules,
            sync_threshold,
            cost_per_element,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(
            IntegrityRules {
                skill_based_on_min: cfg.skill_based_on_min,
                skill_based_on_max: cfg.skill_based_on_max,
                max_cycles: DEFAULT_MAX_CYCLES,
            },
            Duration::from_millis(cfg.integrity_sync_threshold_ms),
            Duration::from_micros(cfg.integrity_cost_per_element_us),
        )
    }

    pub fn rules(&self) -> &IntegrityRules {
        &self.rules
    }

    /// Estimated wall time of [`check`](Self::check) on `changeset`.
    pub fn estimate_cost(&self, changeset: &Changeset) -> Duration {
        self.cost_per_element
            .saturating_mul(u32::try_from(changeset.size()).unwrap_or(u32::MAX))
    }

    /// Whether the check is too expensive to run inline.
    pub fn requires_async(&self, changeset: &Changeset) -> bool {
        self.estimate_cost(changeset) > self.sync_threshold
    }

    /// Run every rule over `changeset`.
    pub fn check(&self, changeset: &Changeset) -> IntegrityReport {
        let mut violations: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        let mut warnings: BTreeMap<String, Vec<Value>> = BTreeMap::new();

        record(&mut violations, CANON_VIOLATIONS, canon_violations(changeset));
        record(&mut violations, PREREQ_CYCLES, self.prereq_cycles(changeset));
        record(&mut violations, HIERARCHY_VIOLATIONS, hierarchy_violations(changeset));

        let skills = SkillEdges::collect(changeset);
        let mut dangling = Vec::new();
        let mut too_few = Vec::new();
        let mut too_many = Vec::new();
        let mut orphans = Vec::new();
        for skill in changeset.nodes.iter().filter(|n| n.label == NodeType::Skill.as_str()) {
            let count = skills.based_on.get(skill.uid.as_str()).copied().unwrap_or(0);
            if count == 0 {
                dangling.push(Value::String(skill.uid.clone()));
            } else if count < self.rules.skill_based_on_min {
                too_few.push(json!({"uid": skill.uid, "count": count, "min": self.rules.skill_based_on_min}));
            }
            if let Some(max) = self.rules.skill_based_on_max {
                if count > max {
                    too_many.push(json!({"uid": skill.uid, "count": count, "max": max}));
                }
            }
            if !skills.consumed.contains_key(skill.uid.as_str()) {
                orphans.push(Value::String(skill.uid.clone()));
            }
        }
        record(&mut violations, DANGLING_SKILLS, dangling);
        record(&mut violations, SKILL_BASED_ON_TOO_FEW, too_few);
        record(&mut violations, SKILL_BASED_ON_TOO_MANY, too_many);
        record(&mut warnings, ORPHAN_SKILLS, orphans);

        debug!(
            nodes = changeset.nodes.len(),
            edges = changeset.edges.len(),
            violation_categories = violations.len(),
            "Integrity check complete"
        );

        IntegrityReport {
            ok: violations.is_empty(),
            violations,
            warnings,
        }
    }

    /// Cycles closed by the changeset's own PREREQ edges.
    ///
    /// Stored edges only extend paths; a cycle made of stored edges alone is
    /// not the changeset's doing and is not reported. The search is limited
    /// to nodes that lie between a proposed edge's head and some proposed
    /// edge's tail, since every reportable cycle stays inside that region.
    fn prereq_cycles(&self, changeset: &Changeset) -> Vec<Value> {
        let prereq = EdgeType::Prereq.as_str();
        let proposed: HashSet<(&str, &str)> = changeset
            .edges
            .iter()
            .filter(|e| e.rel_type == prereq)
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        if proposed.is_empty() {
            return Vec::new();
        }

        let full = PrereqGraph::from_edges(changeset.edges.iter().chain(&changeset.context_edges));
        let index = |uid: &str| full.node_index.get(uid).copied();
        let forward = full.reachable_from(proposed.iter().filter_map(|(_, to)| index(to)));
        let backward = full.reaching(proposed.iter().filter_map(|(from, _)| index(from)));
        let between = |uid: &str| index(uid).is_some_and(|i| forward[i] && backward[i]);

        let region: Vec<&ChangeEdge> = changeset
            .edges
            .iter()
            .chain(&changeset.context_edges)
            .filter(|e| e.rel_type == prereq && between(&e.from) && between(&e.to))
            .collect();
        let graph = PrereqGraph::from_edges(region);

        simple_cycles_matching(&graph, self.rules.max_cycles, |c| {
            c.edges
                .iter()
                .any(|(a, b)| proposed.contains(&(a.as_str(), b.as_str())))
        })
        .into_iter()
        .map(|c| json!({"nodes": c.nodes, "edges": c.edges}))
        .collect()
    }
}

fn record(map: &mut BTreeMap<String, Vec<Value>>, category: &str, details: Vec<Value>) {
    if !details.is_empty() {
        map.insert(category.to_string(), details);
    }
}

/// Labels and edge types outside the canon whitelist.
fn canon_violations(changeset: &Changeset) -> Vec<Value> {
    let nodes = changeset
        .nodes
        .iter()
        .filter(|n| n.label.parse::<NodeType>().is_err())
        .map(|n| json!({"kind": "node", "uid": n.uid, "label": n.label}));
    let edges = changeset
        .edges
        .iter()
        .filter(|e| e.rel_type.parse::<EdgeType>().is_err())
        .map(|e| json!({"kind": "edge", "rel_type": e.rel_type, "from": e.from, "to": e.to}));
    nodes.chain(edges).collect()
}

/// Sections, subsections and topics lacking a CONTAINS edge from their parent type.
///
/// The containing edge must be part of the changeset. When the parent node is
/// itself in the changeset its label must be one of the expected parent types;
/// a parent that already exists in the store is accepted as is.
fn hierarchy_violations(changeset: &Changeset) -> Vec<Value> {
    let labels: HashMap<&str, &str> = changeset
        .nodes
        .iter()
        .map(|n| (n.uid.as_str(), n.label.as_str()))
        .collect();

    let mut out = Vec::new();
    for node in &changeset.nodes {
        let Ok(node_type) = node.label.parse::<NodeType>() else {
            continue;
        };
        let expected = node_type.expected_parents();
        if expected.is_empty() {
            continue;
        }
        let has_parent = changeset
            .edges
            .iter()
            .filter(|e| e.rel_type == EdgeType::Contains.as_str() && e.to == node.uid)
            .any(|e| parent_acceptable(&labels, e, expected));
        if !has_parent {
            out.push(missing_parent(node, expected));
        }
    }
    out
}

fn parent_acceptable(labels: &HashMap<&str, &str>, edge: &ChangeEdge, expected: &[NodeType]) -> bool {
    match labels.get(edge.from.as_str()) {
        Some(label) => expected.iter().any(|t| t.as_str() == *label),
        None => true,
    }
}

fn missing_parent(node: &ChangeNode, expected: &[NodeType]) -> Value {
    let parents: Vec<&str> = expected.iter().map(NodeType::as_str).collect();
    json!({"uid": node.uid, "label": node.label, "expected_parents": parents})
}

/// Per-skill edge tallies.
struct SkillEdges<'a> {
    based_on: HashMap<&'a str, usize>,
    consumed: HashMap<&'a str, usize>,
}

impl<'a> SkillEdges<'a> {
    fn collect(changeset: &'a Changeset) -> Self {
        let mut based_on = HashMap::new();
        let mut consumed = HashMap::new();
        for edge in &changeset.edges {
            if edge.rel_type == EdgeType::BasedOn.as_str() {
                *based_on.entry(edge.from.as_str()).or_insert(0) += 1;
            } else if edge.rel_type == EdgeType::UsesSkill.as_str() {
                *consumed.entry(edge.to.as_str()).or_insert(0) += 1;
            }
        }
        Self { based_on, consumed }
    }
}

//! Replays a producer's `set`/`del` history into the set of nodes it has declared.
//!
//! Each action is applied as a three-phase step:
//!
//! 1. every node live before the action is provisionally deleted at the action's timestamp;
//! 2. a `set` revives or inserts one node per declared (type, location); a `del` declares nothing;
//! 3. provisional deletions that were not revived are committed.
//!
//! Nodes are never removed from the history: a node that disappears keeps its `deleted_at`, and a
//! later `set` declaring the same (type, location) brings the same entry back rather than adding
//! another one. The only exception is a node whose whole life fits inside one timestamp, which is
//! dropped at commit since it never existed for any observable instant. A node revived and dropped
//! again within one timestamp gets its previous life back instead.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::info;

use crate::{
    action::{NodeAction, NodeOp},
    bpjson::{Location, NodeType},
    producers::ProducerSet,
    timestamp::Timestamp,
};

#[derive(Clone, Debug, PartialEq)]
pub struct ReconciledNode {
    pub producer: String,
    pub node_type: NodeType,
    pub location: Location,
    /// When the node was (re)activated.
    pub created_at: Timestamp,
    /// `None` while the node is live.
    pub deleted_at: Option<Timestamp>,
    /// The label the producer used when it was an alias of `node_type`.
    pub fuzzy_original_type: Option<String>,
}

impl ReconciledNode {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Whether the node was live at `at`.
    pub fn live_at(&self, at: Timestamp) -> bool {
        self.created_at <= at && self.deleted_at.is_none_or(|deleted| at < deleted)
    }

    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(self.node_type, &self.location)
    }
}

/// Two declarations are the same node when type and every location field match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentity {
    node_type: NodeType,
    location: String,
}

impl NodeIdentity {
    pub fn new(node_type: NodeType, location: &Location) -> Self {
        NodeIdentity {
            node_type,
            location: location.identity_key(),
        }
    }
}

/// What happened while applying one action, for the diagnostics log.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub timestamp: Timestamp,
    pub unknown_types: BTreeSet<String>,
    /// `nodes[]` entries that could not be read at all.
    pub skipped: Vec<String>,
    /// Set when the whole action was ignored.
    pub ignored: Option<String>,
    pub inserted: usize,
    pub revived: usize,
    pub deleted: usize,
}

impl StepReport {
    fn new(timestamp: Timestamp) -> Self {
        StepReport {
            timestamp,
            unknown_types: BTreeSet::new(),
            skipped: Vec::new(),
            ignored: None,
            inserted: 0,
            revived: 0,
            deleted: 0,
        }
    }
}

struct Candidate {
    identity: NodeIdentity,
    node_type: NodeType,
    location: Location,
    fuzzy: Option<String>,
}

/// Turn a `set` payload into node candidates. `None` when the payload has no `nodes[]` at all, in
/// which case the action cannot be interpreted and is ignored.
fn candidates(op: &NodeOp, report: &mut StepReport) -> Option<Vec<Candidate>> {
    let doc = match op {
        NodeOp::Del => return Some(Vec::new()),
        NodeOp::Set(doc) => doc,
    };
    if doc.raw_nodes().is_none() {
        report.ignored = Some("set payload has no nodes array".to_string());
        return None;
    }
    let mut out = Vec::new();
    for descriptor in doc.descriptors() {
        let descriptor = match descriptor {
            Ok(d) => d,
            Err(e) => {
                report.skipped.push(e);
                continue;
            }
        };
        let (types, unknown) = descriptor.node_type.candidates();
        report.unknown_types.extend(unknown);
        for t in types {
            out.push(Candidate {
                identity: NodeIdentity::new(t.node_type, &descriptor.location),
                node_type: t.node_type,
                location: descriptor.location.clone(),
                fuzzy: t.fuzzy,
            });
        }
    }
    Some(out)
}

/// Every node one producer has ever declared, live or not.
#[derive(Clone, Debug, Default)]
pub struct ProducerNodes {
    owner: String,
    nodes: Vec<ReconciledNode>,
    index: HashMap<NodeIdentity, usize>,
    /// Earlier `(created_at, deleted_at)` of the nodes revived at `instant`.
    revived: HashMap<NodeIdentity, (Timestamp, Timestamp)>,
    instant: Option<Timestamp>,
}

impl PartialEq for ProducerNodes {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.nodes == other.nodes
    }
}

impl ProducerNodes {
    pub fn new(owner: &str) -> Self {
        ProducerNodes {
            owner: owner.to_string(),
            ..Default::default()
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// All nodes, in order of first declaration.
    pub fn nodes(&self) -> &[ReconciledNode] {
        &self.nodes
    }

    pub fn live(&self) -> impl Iterator<Item = &ReconciledNode> {
        self.nodes.iter().filter(|n| n.is_live())
    }

    pub fn live_at(&self, at: Timestamp) -> impl Iterator<Item = &ReconciledNode> {
        self.nodes.iter().filter(move |n| n.live_at(at))
    }

    pub fn get(&self, node_type: NodeType, location: &Location) -> Option<&ReconciledNode> {
        self.index
            .get(&NodeIdentity::new(node_type, location))
            .map(|&i| &self.nodes[i])
    }

    /// Apply one action. Actions must be applied in timestamp order.
    pub fn apply(&mut self, action: &NodeAction) -> StepReport {
        let at = action.timestamp;
        let mut report = StepReport::new(at);
        if self.instant != Some(at) {
            self.instant = Some(at);
            self.revived.clear();
        }
        let Some(candidates) = candidates(&action.op, &mut report) else {
            return report;
        };

        // Provisional deletions.
        let provisional: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_live())
            .collect();

        // Revivals and insertions.
        let mut survivors: HashSet<usize> = HashSet::new();
        for candidate in candidates {
            match self.index.get(&candidate.identity) {
                Some(&i) => {
                    let node = &mut self.nodes[i];
                    if let Some(deleted_at) = node.deleted_at {
                        self.revived
                            .entry(candidate.identity)
                            .or_insert((node.created_at, deleted_at));
                        node.created_at = at;
                        node.deleted_at = None;
                        report.revived += 1;
                    }
                    survivors.insert(i);
                }
                None => {
                    let i = self.nodes.len();
                    self.nodes.push(ReconciledNode {
                        producer: self.owner.clone(),
                        node_type: candidate.node_type,
                        location: candidate.location,
                        created_at: at,
                        deleted_at: None,
                        fuzzy_original_type: candidate.fuzzy,
                    });
                    self.index.insert(candidate.identity, i);
                    survivors.insert(i);
                    report.inserted += 1;
                }
            }
        }

        // Commit.
        let mut vanished = HashSet::new();
        for i in provisional {
            if survivors.contains(&i) {
                continue;
            }
            let node = &mut self.nodes[i];
            if node.created_at < at {
                node.deleted_at = Some(at);
                report.deleted += 1;
            } else if let Some(&(created_at, deleted_at)) = self.revived.get(&node.identity()) {
                node.created_at = created_at;
                node.deleted_at = Some(deleted_at);
            } else {
                vanished.insert(i);
            }
        }
        if !vanished.is_empty() {
            let mut i = 0;
            self.nodes.retain(|_| {
                let keep = !vanished.contains(&i);
                i += 1;
                keep
            });
            self.reindex();
        }
        report
    }

    fn reindex(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.identity(), i))
            .collect();
    }
}

/// Replay a producer's actions from scratch. The actions are ordered by timestamp first (stably).
pub fn replay(owner: &str, actions: &[NodeAction]) -> (ProducerNodes, Vec<StepReport>) {
    let mut ordered: Vec<&NodeAction> = actions.iter().collect();
    ordered.sort_by_key(|a| a.timestamp);
    let mut nodes = ProducerNodes::new(owner);
    let reports = ordered.into_iter().map(|a| nodes.apply(a)).collect();
    (nodes, reports)
}

fn log_reports(owner: &str, reports: &[StepReport]) {
    for report in reports {
        if let Some(reason) = &report.ignored {
            info!("{owner}: + action @{} ignored: {reason}", report.timestamp);
        }
        for skipped in &report.skipped {
            info!("{owner}: + unreadable node entry: {skipped}");
        }
        if !report.unknown_types.is_empty() {
            info!(
                "{owner}: + has unknown node types: {:?}",
                report.unknown_types
            );
        }
    }
}

/// Reconcile every known producer. Producers without any action end up with no nodes.
pub fn reconcile_all(
    producers: &ProducerSet,
    by_owner: &BTreeMap<String, Vec<NodeAction>>,
) -> Vec<ProducerNodes> {
    producers
        .owners()
        .map(|owner| {
            let actions = by_owner.get(owner).map(Vec::as_slice).unwrap_or_default();
            if !actions.is_empty() {
                info!("{owner}: {} node actions", actions.len());
            }
            let (nodes, reports) = replay(owner, actions);
            log_reports(owner, &reports);
            nodes
        })
        .collect()
}

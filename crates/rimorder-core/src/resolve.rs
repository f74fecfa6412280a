use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::canonical_id;
use crate::mods::ModRecord;
use crate::store::RulesDb;

/// Engine-level pins, in the order they must load: the shim loader, the base
/// game, then the official expansions in release order. Policy, not data;
/// the rules database cannot move these.
pub const FIXED_HEAD: [&str; 6] = [
    "brrainz.harmony",
    "ludeon.rimworld",
    "ludeon.rimworld.royalty",
    "ludeon.rimworld.ideology",
    "ludeon.rimworld.biotech",
    "ludeon.rimworld.anomaly",
];

/// Resolve a deterministic load order for `mods` against an optional rules
/// snapshot. Always returns a permutation of the input ids (first occurrence
/// wins for duplicate ids), in the caller's original casing. Never fails:
/// contradictory constraints fall back to input order for the cycle members.
pub fn resolve_load_order(mods: &[ModRecord], db: Option<&RulesDb>) -> Vec<String> {
    // Canonical working set in input order; duplicates collapse to their
    // first occurrence, which also owns the output casing.
    let mut order: Vec<String> = Vec::new();
    let mut records: BTreeMap<String, &ModRecord> = BTreeMap::new();
    for record in mods {
        let canon = canonical_id(&record.package_id);
        if !records.contains_key(&canon) {
            order.push(canon.clone());
            records.insert(canon, record);
        }
    }
    let present: BTreeSet<String> = order.iter().cloned().collect();

    let edges = build_graph(&order, &records, &present, db);
    let buckets = classify(&order, &present, db);
    let sorted_middle = kahn_sort(&buckets.middle, &edges);

    let mut result = Vec::with_capacity(order.len());
    result.extend(buckets.head);
    result.extend(buckets.top);
    result.extend(sorted_middle);
    result.extend(buckets.bottom);

    result
        .iter()
        .map(|canon| records[canon.as_str()].package_id.clone())
        .collect()
}

/// "Must precede" adjacency over exactly the working set. Unions the four
/// edge sources (declared after/before, rule before/after), dropping
/// self-edges and edges with an endpoint outside the set. Cycles are allowed
/// here; the sorter deals with them.
fn build_graph(
    order: &[String],
    records: &BTreeMap<String, &ModRecord>,
    present: &BTreeSet<String>,
    db: Option<&RulesDb>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut edges: BTreeMap<String, BTreeSet<String>> = order
        .iter()
        .map(|id| (id.clone(), BTreeSet::new()))
        .collect();

    for id in order {
        let record = records[id.as_str()];
        for target in &record.load_after {
            add_edge(&mut edges, present, &canonical_id(target), id);
        }
        for target in &record.load_before {
            add_edge(&mut edges, present, id, &canonical_id(target));
        }
        if let Some(rule) = db.and_then(|db| db.rules.get(id.as_str())) {
            for target in &rule.load_before {
                add_edge(&mut edges, present, id, target);
            }
            for target in &rule.load_after {
                add_edge(&mut edges, present, target, id);
            }
        }
    }
    edges
}

fn add_edge(
    edges: &mut BTreeMap<String, BTreeSet<String>>,
    present: &BTreeSet<String>,
    from: &str,
    to: &str,
) {
    if from == to || !present.contains(from) || !present.contains(to) {
        return;
    }
    if let Some(out) = edges.get_mut(from) {
        out.insert(to.to_string());
    }
}

struct Buckets {
    head: Vec<String>,
    top: Vec<String>,
    bottom: Vec<String>,
    middle: Vec<String>,
}

/// Partition the working set. Fixed-head membership beats every rule flag;
/// a rule carrying both flags goes top. Top and bottom keep input order.
fn classify(order: &[String], present: &BTreeSet<String>, db: Option<&RulesDb>) -> Buckets {
    let mut head = Vec::new();
    for id in FIXED_HEAD {
        if present.contains(id) {
            head.push(id.to_string());
        }
    }
    let head_set: BTreeSet<&str> = head.iter().map(String::as_str).collect();

    let mut top = Vec::new();
    let mut bottom = Vec::new();
    let mut middle = Vec::new();
    for id in order {
        if head_set.contains(id.as_str()) {
            continue;
        }
        match db.and_then(|db| db.rules.get(id.as_str())) {
            Some(rule) if rule.load_top => top.push(id.clone()),
            Some(rule) if rule.load_bottom => bottom.push(id.clone()),
            _ => middle.push(id.clone()),
        }
    }
    Buckets {
        head,
        top,
        bottom,
        middle,
    }
}

/// Kahn's algorithm over the middle bucket with a FIFO ready queue, seeded
/// and tie-broken by input order. Nodes stuck in a cycle never reach zero
/// in-degree and are appended afterwards, still in input order, so the sort
/// is total.
fn kahn_sort(middle: &[String], edges: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let middle_set: BTreeSet<&str> = middle.iter().map(String::as_str).collect();

    // In-degrees from middle-only edges; endpoints outside the bucket do not
    // constrain it.
    let mut in_degree: BTreeMap<&str, usize> =
        middle.iter().map(|id| (id.as_str(), 0)).collect();
    for (from, targets) in edges {
        if !middle_set.contains(from.as_str()) {
            continue;
        }
        for to in targets {
            if let Some(deg) = in_degree.get_mut(to.as_str()) {
                *deg += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = VecDeque::new();
    for id in middle {
        if in_degree.get(id.as_str()) == Some(&0) {
            queue.push_back(id.as_str());
        }
    }

    let mut sorted: Vec<String> = Vec::with_capacity(middle.len());
    while let Some(id) = queue.pop_front() {
        sorted.push(id.to_string());
        for to in edges.get(id).into_iter().flatten() {
            if !middle_set.contains(to.as_str()) {
                continue;
            }
            if let Some(deg) = in_degree.get_mut(to.as_str()) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(to);
                }
            }
        }
    }

    if sorted.len() < middle.len() {
        let placed: BTreeSet<String> = sorted.iter().cloned().collect();
        for id in middle {
            if !placed.contains(id.as_str()) {
                sorted.push(id.clone());
            }
        }
    }
    sorted
}

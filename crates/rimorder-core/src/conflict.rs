use std::collections::BTreeMap;

use serde::Serialize;

use crate::canonical_id;
use crate::store::RulesDb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    OrderViolation,
    Incompatibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One finding from an order audit. `subject` keeps the caller's casing;
/// `target` is canonical (it names a rule entry, not a caller string).
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub subject: String,
    pub target: String,
    pub message: String,
    pub severity: Severity,
}

/// Audit an arbitrary load order against the rules snapshot. Pure: the order
/// may come from anywhere, not just the resolver, and nothing is mutated.
///
/// Incompatibilities are evaluated per subject, so a pair declared
/// incompatible on both sides is reported twice, once per direction.
pub fn check_order(order: &[String], db: Option<&RulesDb>) -> Vec<Issue> {
    let Some(db) = db else {
        return Vec::new();
    };

    let mut positions: BTreeMap<String, usize> = BTreeMap::new();
    for (i, package_id) in order.iter().enumerate() {
        positions.insert(canonical_id(package_id), i);
    }

    let mut issues = Vec::new();
    for (i, package_id) in order.iter().enumerate() {
        let canon = canonical_id(package_id);
        let Some(rule) = db.rules.get(&canon) else {
            continue;
        };

        for target in &rule.load_before {
            if positions.get(target).is_some_and(|&pos| pos < i) {
                issues.push(Issue {
                    kind: IssueKind::OrderViolation,
                    subject: package_id.clone(),
                    target: target.clone(),
                    message: format!("'{package_id}' should load before '{target}'"),
                    severity: Severity::Warning,
                });
            }
        }
        for target in &rule.load_after {
            if positions.get(target).is_some_and(|&pos| pos > i) {
                issues.push(Issue {
                    kind: IssueKind::OrderViolation,
                    subject: package_id.clone(),
                    target: target.clone(),
                    message: format!("'{package_id}' should load after '{target}'"),
                    severity: Severity::Warning,
                });
            }
        }
        for target in &rule.incompatible_with {
            if positions.contains_key(target) {
                issues.push(Issue {
                    kind: IssueKind::Incompatibility,
                    subject: package_id.clone(),
                    target: target.clone(),
                    message: format!("'{package_id}' is incompatible with '{target}'"),
                    severity: Severity::Error,
                });
            }
        }
    }
    issues
}

//! Plan-graph validation and the arena the scheduler walks: ids,
//! indegree, dependents, and transitive downstream counts. No
//! component outside the scheduler holds a live handle into this
//! state.

use std::collections::{HashMap, HashSet};

use contracts::{Role, WorkPackage};

use crate::error::EngineError;

pub struct Graph {
    pub id_to_pkg: HashMap<String, WorkPackage>,
    pub indegree: HashMap<String, u32>,
    pub dependents: HashMap<String, Vec<String>>,
    pub downstream_count: HashMap<String, u32>,
}

/// Validates: unique ids, no dangling dependency ids, every QA package
/// has exactly one dependency and it is a Worker, and the graph is
/// acyclic.
pub fn validate(packages: &[WorkPackage]) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for pkg in packages {
        if !seen.insert(pkg.id.as_str()) {
            return Err(EngineError::Validation(format!("duplicate package id: {}", pkg.id)));
        }
    }

    let ids: HashSet<&str> = packages.iter().map(|p| p.id.as_str()).collect();
    let by_id: HashMap<&str, &WorkPackage> = packages.iter().map(|p| (p.id.as_str(), p)).collect();

    for pkg in packages {
        for dep in &pkg.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(EngineError::Validation(format!(
                    "package {} depends on unknown package {}",
                    pkg.id, dep
                )));
            }
        }
        if pkg.role == Role::Qa {
            if pkg.dependencies.len() != 1 {
                return Err(EngineError::Validation(format!(
                    "QA package {} must have exactly one dependency, found {}",
                    pkg.id,
                    pkg.dependencies.len()
                )));
            }
            let dep_id = &pkg.dependencies[0];
            let dep = by_id.get(dep_id.as_str()).expect("dependency existence already checked");
            if dep.role != Role::Worker {
                return Err(EngineError::Validation(format!(
                    "QA package {} depends on non-Worker package {}",
                    pkg.id, dep_id
                )));
            }
        }
    }

    detect_cycle(packages, &by_id)?;
    Ok(())
}

fn detect_cycle(packages: &[WorkPackage], by_id: &HashMap<&str, &WorkPackage>) -> Result<(), EngineError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a WorkPackage>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), EngineError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(EngineError::Validation(format!("cycle detected at package {id}")));
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(pkg) = by_id.get(id) {
            for dep in &pkg.dependencies {
                visit(dep, by_id, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    for pkg in packages {
        visit(pkg.id.as_str(), by_id, &mut marks)?;
    }
    Ok(())
}

pub fn build(packages: Vec<WorkPackage>) -> Graph {
    let mut indegree = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    for pkg in &packages {
        indegree.insert(pkg.id.clone(), pkg.dependencies.len() as u32);
        for dep in &pkg.dependencies {
            dependents.entry(dep.clone()).or_default().push(pkg.id.clone());
        }
    }

    let id_to_pkg: HashMap<String, WorkPackage> = packages.into_iter().map(|p| (p.id.clone(), p)).collect();
    let downstream_count = compute_downstream_counts(&id_to_pkg, &dependents);

    Graph {
        id_to_pkg,
        indegree,
        dependents,
        downstream_count,
    }
}

/// Transitive count of all packages reachable by following `dependents`
/// edges from each package; used only to break priority ties.
fn compute_downstream_counts(
    id_to_pkg: &HashMap<String, WorkPackage>,
    dependents: &HashMap<String, Vec<String>>,
) -> HashMap<String, u32> {
    fn count<'a>(
        id: &'a str,
        dependents: &'a HashMap<String, Vec<String>>,
        memo: &mut HashMap<&'a str, u32>,
    ) -> u32 {
        if let Some(&cached) = memo.get(id) {
            return cached;
        }
        let mut reached: HashSet<&str> = HashSet::new();
        if let Some(direct) = dependents.get(id) {
            for d in direct {
                reached.insert(d.as_str());
                let sub = count(d, dependents, memo);
                // sub counts d's own transitive set size, not its members,
                // so walk again to union members in (small graphs; clarity
                // over micro-optimization).
                let _ = sub;
            }
        }
        // Expand transitively by repeated union until fixed point.
        loop {
            let mut grew = false;
            let current: Vec<&str> = reached.iter().copied().collect();
            for r in current {
                if let Some(next) = dependents.get(r) {
                    for n in next {
                        if reached.insert(n.as_str()) {
                            grew = true;
                        }
                    }
                }
            }
            if !grew {
                break;
            }
        }
        let result = reached.len() as u32;
        memo.insert(id, result);
        result
    }

    let mut memo = HashMap::new();
    id_to_pkg
        .keys()
        .map(|id| (id.clone(), count(id, dependents, &mut memo)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Difficulty, TaskType};
    use std::collections::HashMap as StdHashMap;

    fn pkg(id: &str, role: Role, deps: Vec<&str>) -> WorkPackage {
        WorkPackage {
            id: id.to_string(),
            role,
            name: id.to_string(),
            description: String::new(),
            acceptance_criteria: vec![],
            inputs: StdHashMap::new(),
            outputs_schema: None,
            dependencies: deps.into_iter().map(String::from).collect(),
            estimated_tokens: 100,
            importance: 3,
            task_type: TaskType::Writing,
            difficulty: Difficulty::Medium,
            tier_profile_override: None,
            qa_checks: vec![],
            qa_policy: None,
            cheapest_viable_chosen: false,
        }
    }

    #[test]
    fn rejects_qa_with_multiple_dependencies() {
        let packages = vec![
            pkg("w1", Role::Worker, vec![]),
            pkg("w2", Role::Worker, vec![]),
            pkg("q1", Role::Qa, vec!["w1", "w2"]),
        ];
        assert!(validate(&packages).is_err());
    }

    #[test]
    fn rejects_qa_depending_on_qa() {
        let packages = vec![
            pkg("w1", Role::Worker, vec![]),
            pkg("q1", Role::Qa, vec!["w1"]),
            pkg("q2", Role::Qa, vec!["q1"]),
        ];
        assert!(validate(&packages).is_err());
    }

    #[test]
    fn rejects_dangling_dependency() {
        let packages = vec![pkg("w1", Role::Worker, vec!["ghost"])];
        assert!(validate(&packages).is_err());
    }

    #[test]
    fn rejects_cycle() {
        let packages = vec![
            pkg("a", Role::Worker, vec!["b"]),
            pkg("b", Role::Worker, vec!["a"]),
        ];
        assert!(validate(&packages).is_err());
    }

    #[test]
    fn accepts_valid_chain() {
        let packages = vec![
            pkg("w1", Role::Worker, vec![]),
            pkg("q1", Role::Qa, vec!["w1"]),
        ];
        assert!(validate(&packages).is_ok());
        let graph = build(packages);
        assert_eq!(graph.indegree["w1"], 0);
        assert_eq!(graph.indegree["q1"], 1);
        assert_eq!(graph.downstream_count["w1"], 1);
        assert_eq!(graph.downstream_count["q1"], 0);
    }
}

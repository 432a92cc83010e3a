use std::collections::{HashMap, HashSet};

use super::{Employee, EmployeeId};

/// Manager-reporting links as an adjacency map: employee id -> direct manager id.
///
/// Links are validated when they are set, so reads never have to guard
/// against cycles.
#[derive(Debug, Default, Clone)]
pub struct ManagerGraph {
    edges: HashMap<EmployeeId, Option<EmployeeId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    UnknownEmployee(EmployeeId),
    SelfManaged(EmployeeId),
    Cycle { chain: Vec<EmployeeId> },
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::UnknownEmployee(id) => write!(f, "Unknown employee: {}", id),
            LinkError::SelfManaged(id) => write!(f, "Employee {} cannot manage themselves", id),
            LinkError::Cycle { chain } => {
                write!(f, "Manager link would create a cycle: {}", chain.join(" -> "))
            }
        }
    }
}

impl std::error::Error for LinkError {}

impl ManagerGraph {
    pub fn from_employees<'a>(employees: impl IntoIterator<Item = &'a Employee>) -> Self {
        let edges = employees
            .into_iter()
            .map(|e| (e.id.clone(), e.direct_manager_id.clone()))
            .collect();
        Self { edges }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    pub fn manager_of(&self, id: &str) -> Option<&str> {
        self.edges.get(id).and_then(|m| m.as_deref())
    }

    /// Check that pointing `employee` at `manager` keeps the graph acyclic.
    ///
    /// Walks up the chain starting at `manager`; reaching `employee` means
    /// the new link would close a loop.
    pub fn validate_link(&self, employee: &str, manager: Option<&str>) -> Result<(), LinkError> {
        if !self.contains(employee) {
            return Err(LinkError::UnknownEmployee(employee.to_string()));
        }
        let Some(manager) = manager else {
            return Ok(());
        };
        if !self.contains(manager) {
            return Err(LinkError::UnknownEmployee(manager.to_string()));
        }
        if manager == employee {
            return Err(LinkError::SelfManaged(employee.to_string()));
        }

        let mut chain = vec![employee.to_string(), manager.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([manager]);
        let mut current = manager;

        while let Some(next) = self.manager_of(current) {
            chain.push(next.to_string());
            if next == employee {
                return Err(LinkError::Cycle { chain });
            }
            // Stored data should already be acyclic; stop rather than spin if it isn't.
            if !seen.insert(next) {
                break;
            }
            current = next;
        }

        Ok(())
    }

    /// Record a link after validating it.
    pub fn set_link(&mut self, employee: &str, manager: Option<&str>) -> Result<(), LinkError> {
        self.validate_link(employee, manager)?;
        self.edges
            .insert(employee.to_string(), manager.map(str::to_string));
        Ok(())
    }

    /// Add a node that has no reports yet, with an optional manager.
    pub fn insert(&mut self, employee: &str, manager: Option<&str>) -> Result<(), LinkError> {
        let mut candidate = self.clone();
        candidate.edges.entry(employee.to_string()).or_insert(None);
        candidate.set_link(employee, manager)?;
        *self = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(links: &[(&str, Option<&str>)]) -> ManagerGraph {
        let mut g = ManagerGraph::default();
        for (id, _) in links {
            g.edges.insert(id.to_string(), None);
        }
        for (id, manager) in links {
            g.set_link(id, *manager).unwrap();
        }
        g
    }

    #[test]
    fn test_valid_chain() {
        let g = graph(&[("CEO", None), ("M1", Some("CEO")), ("E1", Some("M1"))]);
        assert_eq!(g.manager_of("E1"), Some("M1"));
        assert_eq!(g.manager_of("CEO"), None);
    }

    #[test]
    fn test_self_link_rejected() {
        let g = graph(&[("E1", None)]);
        assert_eq!(
            g.validate_link("E1", Some("E1")),
            Err(LinkError::SelfManaged("E1".into()))
        );
    }

    #[test]
    fn test_transitive_cycle_rejected() {
        let g = graph(&[("CEO", None), ("M1", Some("CEO")), ("E1", Some("M1"))]);

        let err = g.validate_link("CEO", Some("E1")).unwrap_err();
        assert_eq!(
            err,
            LinkError::Cycle {
                chain: vec!["CEO".into(), "E1".into(), "M1".into(), "CEO".into()]
            }
        );
    }

    #[test]
    fn test_unknown_manager_rejected() {
        let g = graph(&[("E1", None)]);
        assert_eq!(
            g.validate_link("E1", Some("NOPE")),
            Err(LinkError::UnknownEmployee("NOPE".into()))
        );
    }

    #[test]
    fn test_clearing_manager_is_always_valid() {
        let g = graph(&[("M1", None), ("E1", Some("M1"))]);
        assert!(g.validate_link("E1", None).is_ok());
    }

    #[test]
    fn test_insert_new_node() {
        let mut g = graph(&[("M1", None)]);
        g.insert("E9", Some("M1")).unwrap();
        assert_eq!(g.manager_of("E9"), Some("M1"));
    }

    #[test]
    fn test_reassigning_within_tree() {
        let mut g = graph(&[("A", None), ("B", Some("A")), ("C", Some("B"))]);
        // Moving C directly under A is fine
        g.set_link("C", Some("A")).unwrap();
        // Now B under C is fine too since C no longer sits under B
        g.set_link("B", Some("C")).unwrap();
        assert_eq!(g.manager_of("B"), Some("C"));
    }
}

//! Publish-time validation of a definition graph.
//!
//! A definition may only be published when its nodes form a well-shaped DAG:
//! one start, at least one end, every edge pointing at a known node, every
//! node reachable from the start and able to reach an end, no cycles, and
//! every approval node carrying a usable assignment rule. Errors name the
//! first offending node in `sort_order`.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::CoreError;
use crate::status::NodeKind;
use crate::workflow::expression::Condition;
use crate::workflow::node::FlowNode;

/// Validate a node set for publication.
///
/// Definitions containing parallel or join nodes are refused with
/// [`CoreError::Unsupported`]; every other failure is
/// [`CoreError::BadDefinition`].
pub fn validate_definition(nodes: &[FlowNode]) -> Result<(), CoreError> {
    let ordered = in_sort_order(nodes);

    check_supported_kinds(&ordered)?;
    let index = index_codes(&ordered)?;
    check_start_and_end(&ordered)?;
    check_edges(&ordered, &index)?;
    check_conditions(&ordered)?;
    check_assignments(&ordered)?;
    check_reachable(&ordered, &index)?;
    check_co_reachable(&ordered, &index)?;
    check_acyclic(&ordered, &index)?;
    Ok(())
}

fn in_sort_order(nodes: &[FlowNode]) -> Vec<&FlowNode> {
    let mut ordered: Vec<&FlowNode> = nodes.iter().collect();
    // Stable: ties keep insertion order.
    ordered.sort_by_key(|n| n.sort_order);
    ordered
}

fn bad(node: &FlowNode, reason: &str) -> CoreError {
    CoreError::BadDefinition(format!("Node '{}' {reason}", node.code))
}

fn check_supported_kinds(nodes: &[&FlowNode]) -> Result<(), CoreError> {
    if let Some(node) = nodes
        .iter()
        .find(|n| matches!(n.kind, NodeKind::Parallel | NodeKind::Join))
    {
        return Err(CoreError::Unsupported(format!(
            "Node '{}' is a {} node; parallel and join nodes are not supported",
            node.code, node.kind
        )));
    }
    Ok(())
}

fn index_codes<'a>(nodes: &[&'a FlowNode]) -> Result<HashMap<&'a str, usize>, CoreError> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if node.code.trim().is_empty() {
            return Err(CoreError::BadDefinition(format!(
                "Node '{}' has an empty code",
                node.name
            )));
        }
        if index.insert(node.code.as_str(), i).is_some() {
            return Err(bad(node, "has a duplicate code"));
        }
    }
    Ok(index)
}

fn check_start_and_end(nodes: &[&FlowNode]) -> Result<(), CoreError> {
    let starts: Vec<_> = nodes.iter().filter(|n| n.kind == NodeKind::Start).collect();
    match starts.len() {
        0 => {
            return Err(CoreError::BadDefinition(
                "Definition has no start node".to_string(),
            ))
        }
        1 => {}
        _ => return Err(bad(starts[1], "is a second start node; exactly one is allowed")),
    }
    if !nodes.iter().any(|n| n.kind == NodeKind::End) {
        return Err(CoreError::BadDefinition(
            "Definition has no end node".to_string(),
        ));
    }
    Ok(())
}

fn check_edges(nodes: &[&FlowNode], index: &HashMap<&str, usize>) -> Result<(), CoreError> {
    for node in nodes {
        for next_ref in &node.next_refs {
            let Some(&target) = index.get(next_ref.next.as_str()) else {
                return Err(bad(
                    node,
                    &format!("points at unknown node '{}'", next_ref.next),
                ));
            };
            if nodes[target].kind == NodeKind::Start {
                return Err(bad(node, "points back at the start node"));
            }
        }

        match node.kind {
            NodeKind::End if !node.next_refs.is_empty() => {
                return Err(bad(node, "is an end node but has outgoing edges"));
            }
            NodeKind::Start | NodeKind::Approval if node.next_refs.len() != 1 => {
                return Err(bad(node, "must have exactly one outgoing edge"));
            }
            NodeKind::Condition if node.next_refs.is_empty() => {
                return Err(bad(node, "is a condition node without branches"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_conditions(nodes: &[&FlowNode]) -> Result<(), CoreError> {
    for node in nodes {
        for next_ref in &node.next_refs {
            let condition = Condition::parse(&next_ref.condition)?;
            if node.kind != NodeKind::Condition && !condition.is_unconditional() {
                return Err(bad(
                    node,
                    "carries a branch condition but is not a condition node",
                ));
            }
        }
    }
    Ok(())
}

fn check_assignments(nodes: &[&FlowNode]) -> Result<(), CoreError> {
    for node in nodes.iter().filter(|n| n.kind == NodeKind::Approval) {
        match &node.assignment {
            Some(rule) if !rule.is_empty() => {}
            _ => return Err(bad(node, "is an approval node without an assignment rule")),
        }
    }
    Ok(())
}

/// Breadth-first search from the start node over forward edges.
fn check_reachable(nodes: &[&FlowNode], index: &HashMap<&str, usize>) -> Result<(), CoreError> {
    let start = nodes
        .iter()
        .position(|n| n.kind == NodeKind::Start)
        .ok_or_else(|| CoreError::BadDefinition("Definition has no start node".to_string()))?;

    let mut seen = vec![false; nodes.len()];
    let mut queue = VecDeque::from([start]);
    seen[start] = true;
    while let Some(current) = queue.pop_front() {
        for next_ref in &nodes[current].next_refs {
            let target = index[next_ref.next.as_str()];
            if !seen[target] {
                seen[target] = true;
                queue.push_back(target);
            }
        }
    }

    match seen.iter().position(|s| !s) {
        Some(i) => Err(bad(nodes[i], "is not reachable from the start node")),
        None => Ok(()),
    }
}

/// Reverse breadth-first search from every end node.
fn check_co_reachable(nodes: &[&FlowNode], index: &HashMap<&str, usize>) -> Result<(), CoreError> {
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (from, node) in nodes.iter().enumerate() {
        for next_ref in &node.next_refs {
            incoming[index[next_ref.next.as_str()]].push(from);
        }
    }

    let mut seen = vec![false; nodes.len()];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for (i, node) in nodes.iter().enumerate() {
        if node.kind == NodeKind::End {
            seen[i] = true;
            queue.push_back(i);
        }
    }
    while let Some(current) = queue.pop_front() {
        for &from in &incoming[current] {
            if !seen[from] {
                seen[from] = true;
                queue.push_back(from);
            }
        }
    }

    match seen.iter().position(|s| !s) {
        Some(i) => Err(bad(nodes[i], "cannot reach any end node")),
        None => Ok(()),
    }
}

/// Kahn's topological sort; whatever is left over sits on or behind a cycle.
fn check_acyclic(nodes: &[&FlowNode], index: &HashMap<&str, usize>) -> Result<(), CoreError> {
    let mut in_degree = vec![0usize; nodes.len()];
    for node in nodes {
        // Parallel edges to the same target count once.
        let targets: HashSet<usize> = node
            .next_refs
            .iter()
            .map(|r| index[r.next.as_str()])
            .collect();
        for target in targets {
            in_degree[target] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = vec![false; nodes.len()];
    while let Some(current) = queue.pop_front() {
        visited[current] = true;
        let targets: HashSet<usize> = nodes[current]
            .next_refs
            .iter()
            .map(|r| index[r.next.as_str()])
            .collect();
        for target in targets {
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                queue.push_back(target);
            }
        }
    }

    match visited.iter().position(|v| !v) {
        Some(i) => Err(bad(nodes[i], "is part of a cycle")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ApprovalPolicy;
    use crate::workflow::assignment::AssignmentRule;
    use crate::workflow::node::NextRef;
    use assert_matches::assert_matches;

    fn approval(code: &str, next: &str, order: i32) -> FlowNode {
        FlowNode::new(code, code, NodeKind::Approval)
            .with_next(NextRef::to(next))
            .with_assignment(AssignmentRule::FixedUsers { user_ids: vec![1] })
            .with_order(order)
    }

    fn linear() -> Vec<FlowNode> {
        vec![
            FlowNode::new("start", "Start", NodeKind::Start).with_next(NextRef::to("mgr")),
            approval("mgr", "end", 1),
            FlowNode::new("end", "End", NodeKind::End).with_order(2),
        ]
    }

    fn branching() -> Vec<FlowNode> {
        vec![
            FlowNode::new("start", "Start", NodeKind::Start).with_next(NextRef::to("amount")),
            FlowNode::new("amount", "Amount?", NodeKind::Condition)
                .with_next(NextRef::when("amount > 1000", "cfo"))
                .with_next(NextRef::when("default", "mgr"))
                .with_order(1),
            approval("cfo", "end", 2),
            approval("mgr", "end", 3).with_policy(ApprovalPolicy::AnyOf),
            FlowNode::new("end", "End", NodeKind::End).with_order(4),
        ]
    }

    #[test]
    fn linear_definition_is_valid() {
        assert!(validate_definition(&linear()).is_ok());
    }

    #[test]
    fn branching_definition_is_valid() {
        assert!(validate_definition(&branching()).is_ok());
    }

    #[test]
    fn missing_start_is_rejected() {
        let nodes: Vec<_> = linear().into_iter().skip(1).collect();
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("no start")
        );
    }

    #[test]
    fn two_starts_are_rejected() {
        let mut nodes = linear();
        nodes.push(FlowNode::new("start2", "Again", NodeKind::Start).with_next(NextRef::to("end")));
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("start2")
        );
    }

    #[test]
    fn missing_end_is_rejected() {
        let nodes = vec![
            FlowNode::new("start", "Start", NodeKind::Start).with_next(NextRef::to("mgr")),
            approval("mgr", "start", 1),
        ];
        assert_matches!(validate_definition(&nodes), Err(CoreError::BadDefinition(_)));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let mut nodes = linear();
        nodes[1].next_refs = vec![NextRef::to("nowhere")];
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("nowhere")
        );
    }

    #[test]
    fn unreachable_node_is_reported() {
        let mut nodes = linear();
        nodes.push(approval("orphan", "end", 5));
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("'orphan'") && msg.contains("reachable")
        );
    }

    #[test]
    fn dead_end_is_reported() {
        let nodes = vec![
            FlowNode::new("start", "Start", NodeKind::Start).with_next(NextRef::to("split")),
            FlowNode::new("split", "Split", NodeKind::Condition)
                .with_next(NextRef::when("x > 1", "end"))
                .with_next(NextRef::when("default", "loop_a"))
                .with_order(1),
            approval("loop_a", "loop_b", 2),
            approval("loop_b", "loop_a", 3),
            FlowNode::new("end", "End", NodeKind::End).with_order(4),
        ];
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("'loop_a'") && msg.contains("end node")
        );
    }

    #[test]
    fn cycle_is_reported() {
        // a -> b -> cond -> (a | end): every node reaches end, but there is a loop.
        let nodes = vec![
            FlowNode::new("start", "Start", NodeKind::Start).with_next(NextRef::to("a")),
            approval("a", "b", 1),
            approval("b", "cond", 2),
            FlowNode::new("cond", "Again?", NodeKind::Condition)
                .with_next(NextRef::when("retry", "a"))
                .with_next(NextRef::when("default", "end"))
                .with_order(3),
            FlowNode::new("end", "End", NodeKind::End).with_order(4),
        ];
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("'a'") && msg.contains("cycle")
        );
    }

    #[test]
    fn approval_without_rule_is_rejected() {
        let mut nodes = linear();
        nodes[1].assignment = Some(AssignmentRule::FixedUsers { user_ids: vec![] });
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("assignment")
        );
    }

    #[test]
    fn parallel_nodes_are_unsupported() {
        let mut nodes = linear();
        nodes.push(FlowNode::new("fork", "Fork", NodeKind::Parallel).with_order(9));
        assert_matches!(validate_definition(&nodes), Err(CoreError::Unsupported(_)));
    }

    #[test]
    fn condition_on_approval_edge_is_rejected() {
        let mut nodes = linear();
        nodes[1].next_refs = vec![NextRef::when("x > 1", "end")];
        assert_matches!(validate_definition(&nodes), Err(CoreError::BadDefinition(_)));
    }

    #[test]
    fn malformed_expression_is_rejected() {
        let mut nodes = branching();
        nodes[1].next_refs[0].condition = "amount >".into();
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("amount >")
        );
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let mut nodes = linear();
        nodes.push(approval("mgr", "end", 7));
        assert_matches!(
            validate_definition(&nodes),
            Err(CoreError::BadDefinition(msg)) if msg.contains("duplicate")
        );
    }
}

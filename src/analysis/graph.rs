//! Transaction-flow graph
//!
//! Native transfers are folded into a directed graph rooted at the center
//! address. Repeated transfers over the same directed pair collapse into one
//! edge carrying the cumulative amount and a transfer count. Amounts stay in
//! lamports until the snapshot is rendered.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use super::models::{NATIVE_DECIMALS, NormalizedTx, TransferEvent, to_display_units};
use crate::{Error, Result};

/// Role of a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The center address
    Main,
    /// Any counterpart
    External,
}

/// Direction of a flow relative to the center address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    /// Value entering the center address
    Inflow,
    /// Value leaving the center address
    Outflow,
}

/// Graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Address
    pub id: String,
    /// Short display label
    pub label: String,
    /// Node role
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Whether this is the center address
    #[serde(rename = "isMain")]
    pub is_main: bool,
}

/// Aggregated directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Sender
    pub from: String,
    /// Receiver
    pub to: String,
    /// Cumulative amount in SOL
    pub weight: f64,
    /// Cumulative amount in lamports
    pub amount_minor: u64,
    /// Number of transfers folded into this edge
    pub count: u64,
    /// Edge kind
    #[serde(rename = "type")]
    pub kind: String,
}

/// One transfer as seen from the center address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Sender
    pub from_address: String,
    /// Receiver
    pub to_address: String,
    /// Amount in SOL
    pub amount: f64,
    /// Amount in lamports
    pub amount_minor: u64,
    /// Asset symbol
    pub token: String,
    /// Transaction signature
    pub signature: String,
    /// Block time
    pub timestamp: Option<DateTime<Utc>>,
    /// Direction, absent for pass-through transfers
    #[serde(rename = "type")]
    pub direction: Option<FlowDirection>,
}

/// Totals over the graph and its flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    /// Node count
    pub total_nodes: usize,
    /// Edge count
    pub total_edges: usize,
    /// Sum of edge amounts in SOL
    pub total_volume: f64,
    /// Sum of edge amounts in lamports
    pub total_volume_minor: u64,
    /// Inflow count
    pub inflow_count: usize,
    /// Outflow count
    pub outflow_count: usize,
    /// Inflow sum in SOL
    pub total_inflow: f64,
    /// Outflow sum in SOL
    pub total_outflow: f64,
}

/// Rendered graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes in first-reference order, center first
    pub nodes: Vec<GraphNode>,
    /// Edges in first-observation order
    pub edges: Vec<GraphEdge>,
    /// One entry per folded transfer
    #[serde(rename = "transaction_flows")]
    pub flows: Vec<Flow>,
    /// Totals
    pub summary: GraphSummary,
}

impl GraphSnapshot {
    /// Graph holding only the center node.
    #[must_use]
    pub fn empty(center: &str) -> Self {
        // An empty builder cannot overflow.
        FlowGraphBuilder::new(center)
            .snapshot()
            .unwrap_or_else(|_| Self {
                nodes: Vec::new(),
                edges: Vec::new(),
                flows: Vec::new(),
                summary: GraphSummary::default(),
            })
    }

    /// Flows entering the center address.
    pub fn inflows(&self) -> impl Iterator<Item = &Flow> {
        self.flows
            .iter()
            .filter(|f| f.direction == Some(FlowDirection::Inflow))
    }

    /// Flows leaving the center address.
    pub fn outflows(&self) -> impl Iterator<Item = &Flow> {
        self.flows
            .iter()
            .filter(|f| f.direction == Some(FlowDirection::Outflow))
    }
}

#[derive(Debug)]
struct NodeData {
    address: String,
    kind: NodeKind,
}

#[derive(Debug)]
struct EdgeData {
    amount: u64,
    count: u64,
}

#[derive(Debug)]
struct FlowRecord {
    transfer: TransferEvent,
    signature: String,
    direction: Option<FlowDirection>,
}

/// Incremental builder for a [`GraphSnapshot`].
#[derive(Debug)]
pub struct FlowGraphBuilder {
    center: String,
    graph: DiGraph<NodeData, EdgeData>,
    node_indices: HashMap<String, NodeIndex>,
    flows: Vec<FlowRecord>,
}

impl FlowGraphBuilder {
    /// Start a graph around `center`.
    #[must_use]
    pub fn new(center: &str) -> Self {
        let mut builder = Self {
            center: center.to_string(),
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            flows: Vec::new(),
        };
        builder.ensure_node(center);
        builder
    }

    fn ensure_node(&mut self, address: &str) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(address) {
            return idx;
        }
        let kind = if address == self.center {
            NodeKind::Main
        } else {
            NodeKind::External
        };
        let idx = self.graph.add_node(NodeData {
            address: address.to_string(),
            kind,
        });
        self.node_indices.insert(address.to_string(), idx);
        idx
    }

    /// Fold one transfer into the graph.
    ///
    /// Token transfers and transfers missing an endpoint are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aggregation`] when the transfer has no signature or
    /// the edge amount would overflow.
    pub fn add_transfer(&mut self, transfer: &TransferEvent) -> Result<()> {
        if !transfer.is_native() || !transfer.has_endpoints() {
            return Ok(());
        }
        let signature = transfer.require_signature()?.to_string();

        let from = self.ensure_node(&transfer.from_address);
        let to = self.ensure_node(&transfer.to_address);
        match self.graph.find_edge(from, to) {
            Some(edge) => {
                let data = &mut self.graph[edge];
                data.amount = data.amount.checked_add(transfer.amount).ok_or_else(|| {
                    Error::Aggregation(format!(
                        "edge {} -> {} amount overflow",
                        transfer.from_address, transfer.to_address
                    ))
                })?;
                data.count += 1;
            }
            None => {
                self.graph.add_edge(
                    from,
                    to,
                    EdgeData {
                        amount: transfer.amount,
                        count: 1,
                    },
                );
            }
        }

        let direction = if transfer.from_address == self.center {
            Some(FlowDirection::Outflow)
        } else if transfer.to_address == self.center {
            Some(FlowDirection::Inflow)
        } else {
            None
        };
        self.flows.push(FlowRecord {
            transfer: transfer.clone(),
            signature,
            direction,
        });
        Ok(())
    }

    /// Fold every transfer of a transaction.
    ///
    /// # Errors
    ///
    /// See [`FlowGraphBuilder::add_transfer`].
    pub fn add_transaction(&mut self, tx: &NormalizedTx) -> Result<()> {
        tx.transfers.iter().try_for_each(|t| self.add_transfer(t))
    }

    /// Render the current state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aggregation`] if the total volume overflows.
    pub fn snapshot(&self) -> Result<GraphSnapshot> {
        let overflow = || Error::Aggregation("total volume overflow".to_string());

        let nodes: Vec<GraphNode> = self
            .graph
            .node_weights()
            .map(|node| GraphNode {
                id: node.address.clone(),
                label: short_label(&node.address),
                kind: node.kind,
                is_main: node.kind == NodeKind::Main,
            })
            .collect();

        let mut total_volume_minor = 0u64;
        let mut edges = Vec::with_capacity(self.graph.edge_count());
        for edge in self.graph.edge_indices() {
            let (Some((from, to)), Some(data)) =
                (self.graph.edge_endpoints(edge), self.graph.edge_weight(edge))
            else {
                continue;
            };
            total_volume_minor = total_volume_minor
                .checked_add(data.amount)
                .ok_or_else(overflow)?;
            edges.push(GraphEdge {
                from: self.graph[from].address.clone(),
                to: self.graph[to].address.clone(),
                weight: to_display_units(data.amount, NATIVE_DECIMALS),
                amount_minor: data.amount,
                count: data.count,
                kind: "transfer".to_string(),
            });
        }

        let mut summary = GraphSummary {
            total_nodes: nodes.len(),
            total_edges: edges.len(),
            total_volume: to_display_units(total_volume_minor, NATIVE_DECIMALS),
            total_volume_minor,
            ..GraphSummary::default()
        };
        let mut inflow_minor = 0u64;
        let mut outflow_minor = 0u64;
        let flows = self
            .flows
            .iter()
            .map(|record| -> Result<Flow> {
                let amount = record.transfer.amount;
                match record.direction {
                    Some(FlowDirection::Inflow) => {
                        summary.inflow_count += 1;
                        inflow_minor = inflow_minor.checked_add(amount).ok_or_else(overflow)?;
                    }
                    Some(FlowDirection::Outflow) => {
                        summary.outflow_count += 1;
                        outflow_minor = outflow_minor.checked_add(amount).ok_or_else(overflow)?;
                    }
                    None => {}
                }
                Ok(Flow {
                    from_address: record.transfer.from_address.clone(),
                    to_address: record.transfer.to_address.clone(),
                    amount: to_display_units(amount, NATIVE_DECIMALS),
                    amount_minor: amount,
                    token: record.transfer.token.clone(),
                    signature: record.signature.clone(),
                    timestamp: record.transfer.timestamp,
                    direction: record.direction,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        summary.total_inflow = to_display_units(inflow_minor, NATIVE_DECIMALS);
        summary.total_outflow = to_display_units(outflow_minor, NATIVE_DECIMALS);

        Ok(GraphSnapshot {
            nodes,
            edges,
            flows,
            summary,
        })
    }
}

fn short_label(address: &str) -> String {
    let prefix: String = address.chars().take(8).collect();
    format!("{prefix}...")
}

/// Build the flow graph of `transactions` around `center`.
///
/// # Errors
///
/// Returns [`Error::Aggregation`] when a folded transfer has no signature or
/// an amount overflows.
pub fn build_graph(center: &str, transactions: &[NormalizedTx]) -> Result<GraphSnapshot> {
    let mut builder = FlowGraphBuilder::new(center);
    for tx in transactions {
        builder.add_transaction(tx)?;
    }
    builder.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::models::NATIVE_TOKEN;
    use pretty_assertions::assert_eq;

    const CENTER: &str = "CenterAddr1111111111111111111111111111111111";

    fn sol(from: &str, to: &str, amount: u64, signature: &str) -> TransferEvent {
        TransferEvent {
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount,
            token: NATIVE_TOKEN.to_string(),
            decimals: Some(NATIVE_DECIMALS),
            signature: Some(signature.to_string()),
            timestamp: None,
        }
    }

    fn tx(transfers: Vec<TransferEvent>) -> NormalizedTx {
        NormalizedTx {
            signature: transfers.first().and_then(|t| t.signature.clone()),
            transfers,
            ..NormalizedTx::default()
        }
    }

    #[test]
    fn empty_input_yields_center_only() {
        let snapshot = build_graph(CENTER, &[]).unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].kind, NodeKind::Main);
        assert!(snapshot.nodes[0].is_main);
        assert_eq!(snapshot.nodes[0].label, "CenterAd...");
        assert!(snapshot.edges.is_empty());
        assert_eq!(snapshot.summary.total_volume_minor, 0);
        assert_eq!(GraphSnapshot::empty(CENTER), snapshot);
    }

    #[test]
    fn repeated_pair_collapses_into_one_edge() {
        let txs = vec![
            tx(vec![sol(CENTER, "B", 1_000, "s1")]),
            tx(vec![sol(CENTER, "B", 2_500, "s2")]),
        ];
        let snapshot = build_graph(CENTER, &txs).unwrap();
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.edges[0].amount_minor, 3_500);
        assert_eq!(snapshot.edges[0].count, 2);
        assert_eq!(snapshot.flows.len(), 2);
        assert_eq!(snapshot.summary.outflow_count, 2);
    }

    #[test]
    fn alternating_directions_produce_distinct_edges() {
        let txs = vec![
            tx(vec![sol(CENTER, "B", 1_500_000_000, "s1")]),
            tx(vec![sol("B", CENTER, 1_500_000_000, "s2")]),
        ];
        let snapshot = build_graph(CENTER, &txs).unwrap();
        assert_eq!(snapshot.edges.len(), 2);
        assert!(snapshot.edges.iter().all(|e| e.count == 1));
        assert_eq!(snapshot.edges[0].from, CENTER);
        assert_eq!(snapshot.edges[1].from, "B");
        assert_eq!(snapshot.summary.total_volume_minor, 3_000_000_000);
        assert!((snapshot.summary.total_volume - 3.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.summary.inflow_count, 1);
        assert_eq!(snapshot.summary.outflow_count, 1);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let transfers = [
            sol("A", "B", 7, "s1"),
            sol("A", "B", 11, "s2"),
            sol("A", "B", 13, "s3"),
        ];
        let forward = build_graph(CENTER, &[tx(transfers.to_vec())]).unwrap();
        let mut reversed = transfers.to_vec();
        reversed.reverse();
        let backward = build_graph(CENTER, &[tx(reversed)]).unwrap();

        assert_eq!(forward.edges[0].amount_minor, backward.edges[0].amount_minor);
        assert_eq!(forward.edges[0].count, backward.edges[0].count);
        assert_eq!(forward.edges[0].amount_minor, 31);
    }

    #[test]
    fn pass_through_flows_are_untagged() {
        let txs = vec![tx(vec![
            sol("A", "B", 500, "s1"),
            sol(CENTER, "A", 200, "s1"),
            sol("B", CENTER, 100, "s1"),
        ])];
        let snapshot = build_graph(CENTER, &txs).unwrap();
        assert_eq!(snapshot.flows[0].direction, None);
        assert_eq!(snapshot.summary.total_volume_minor, 800);

        let tagged: u64 = snapshot
            .inflows()
            .chain(snapshot.outflows())
            .map(|f| f.amount_minor)
            .sum();
        assert_eq!(tagged, 300);
        assert!(tagged <= snapshot.summary.total_volume_minor);
    }

    #[test]
    fn center_keeps_main_kind_and_nodes_are_unique() {
        let txs = vec![tx(vec![
            sol("A", CENTER, 1, "s1"),
            sol(CENTER, "A", 1, "s1"),
            sol("A", "C", 1, "s1"),
        ])];
        let snapshot = build_graph(CENTER, &txs).unwrap();
        let ids: Vec<_> = snapshot.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec![CENTER, "A", "C"]);
        assert_eq!(
            snapshot.nodes.iter().filter(|n| n.kind == NodeKind::Main).count(),
            1
        );
    }

    #[test]
    fn ignores_token_and_partial_transfers() {
        let mut token = sol(CENTER, "B", 10, "s1");
        token.token = "MINT".to_string();
        let partial = sol("", "B", 10, "s1");
        let snapshot = build_graph(CENTER, &[tx(vec![token, partial])]).unwrap();
        assert!(snapshot.edges.is_empty());
        assert!(snapshot.flows.is_empty());
    }

    #[test]
    fn missing_signature_is_an_aggregation_fault() {
        let mut transfer = sol(CENTER, "B", 10, "s1");
        transfer.signature = None;
        let err = build_graph(CENTER, &[tx(vec![transfer])]).unwrap_err();
        assert!(matches!(err, Error::Aggregation(_)));
    }

    #[test]
    fn edge_overflow_is_an_aggregation_fault() {
        let txs = vec![tx(vec![
            sol(CENTER, "B", u64::MAX, "s1"),
            sol(CENTER, "B", 1, "s2"),
        ])];
        assert!(matches!(
            build_graph(CENTER, &txs),
            Err(Error::Aggregation(_))
        ));
    }

    #[test]
    fn snapshot_serializes_frontend_shape() {
        let snapshot = build_graph(CENTER, &[tx(vec![sol(CENTER, "B", 10, "s1")])]).unwrap();
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["nodes"][0]["type"], "main");
        assert_eq!(value["nodes"][0]["isMain"], true);
        assert_eq!(value["edges"][0]["type"], "transfer");
        assert_eq!(value["transaction_flows"][0]["type"], "outflow");
    }
}

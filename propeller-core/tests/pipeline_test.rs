// End-to-end pipeline behaviors not already covered by in-module unit tests.
#[cfg(test)]
mod tests {
    use propeller_core::cfg::{ControlFlowGraph, Edge, EdgeId, EdgeKind, Node, NodeFlags, NodeId};
    use propeller_core::options::PropellerOptions;
    use propeller_core::s3_chains::ChainBuilder;
    use propeller_core::s4_clustering::ChainClustering;
    use propeller_core::{FunctionId, Program};
    use smallvec::SmallVec;

    fn node(id: u32, size: u64, addr: u64) -> Node {
        Node {
            id: NodeId(id),
            name: format!("b{id}"),
            size,
            address: addr,
            flags: NodeFlags::default(),
            freq: 0,
            out_intra: SmallVec::new(),
            in_intra: SmallVec::new(),
            call_outs: SmallVec::new(),
            call_ins: SmallVec::new(),
            ft_edge: None,
        }
    }

    fn edge(id: u32, src: u32, sink: u32, kind: EdgeKind, weight: u64) -> Edge {
        Edge { id: EdgeId(id), src: NodeId(src), sink: NodeId(sink), kind, weight, sink_function: None }
    }

    fn wire(cfg: &mut ControlFlowGraph) {
        for e in cfg.edges.clone() {
            cfg.nodes[e.src.0 as usize].out_intra.push(e.id);
            cfg.nodes[e.sink.0 as usize].in_intra.push(e.id);
            if e.kind == EdgeKind::IntraFallthrough {
                cfg.nodes[e.src.0 as usize].ft_edge = Some(e.id);
            }
        }
    }

    // Scenario 4 — a long, heavily fallthrough-connected chain (well past
    // chain_split_threshold = 128 at 64 bytes/block) still produces a
    // complete, size-preserving layout: once the chain exceeds the
    // threshold only prefix-only merges are considered for it, but nothing
    // stops it from absorbing the rest of the function via those prefix
    // merges.
    #[test]
    fn scenario_four_long_function_suppresses_splits() {
        let n = 6;
        let mut nodes: Vec<Node> = (0..n).map(|i| node(i as u32, 64, 0x1000 + i as u64 * 64)).collect();
        for node in &mut nodes {
            node.freq = 1000;
        }
        let edges: Vec<Edge> = (0..n - 1)
            .map(|i| edge(i as u32, i as u32, i as u32 + 1, EdgeKind::IntraFallthrough, 1000))
            .collect();
        let mut cfg = ControlFlowGraph { name: "long".into(), entry: NodeId(0), nodes, edges };
        wire(&mut cfg);

        let options = PropellerOptions::default();
        let layout = ChainBuilder::run(&cfg, &options).unwrap();
        assert_eq!(layout, (0..n as u32).map(NodeId).collect::<Vec<_>>());
        assert_eq!(layout.len(), n);
    }

    // Scenario 5 — after the merge loop is dry, a zero-weight static
    // fallthrough edge between two otherwise-unconnected hot chains still
    // gets attached.
    #[test]
    fn scenario_five_fallthrough_attachment_after_merge_loop() {
        let mut nodes = vec![
            node(0, 8, 0x1000), // B0
            node(1, 8, 0x1008), // B1 (unrelated, breaks B0-B2 forced adjacency)
            node(2, 8, 0x1010), // B2
            node(3, 8, 0x1018), // B3
            node(4, 8, 0x1020), // B4
        ];
        for n in &mut nodes {
            n.freq = 50;
        }
        let edges = vec![
            edge(0, 0, 2, EdgeKind::IntraBranch, 100), // B0 -> B2, hot, forms chain [B0,B2]
            edge(1, 2, 3, EdgeKind::IntraFallthrough, 0), // B2 -> B3, zero weight, static fallthrough
            edge(2, 3, 4, EdgeKind::IntraBranch, 100), // B3 -> B4, forms chain [B3,B4]
        ]; // B1 touches no edge at all; stays a lone singleton chain
        let mut cfg = ControlFlowGraph { name: "f".into(), entry: NodeId(0), nodes, edges };
        wire(&mut cfg);

        let options = PropellerOptions::default();
        let layout = ChainBuilder::run(&cfg, &options).unwrap();
        let pos = |id: u32| layout.iter().position(|&n| n == NodeId(id)).unwrap();
        assert!(pos(0) < pos(2));
        assert!(pos(2) < pos(3));
        assert!(pos(3) < pos(4));
        assert_eq!(layout.len(), 5);
    }

    // Boundary: empty-profile singleton chains (every node frequency and
    // every edge weight zero) produce one chain per node; with only
    // fallthrough edges present they still attach via attach_fallthroughs,
    // so assert purely on completeness and entry-first placement.
    #[test]
    fn boundary_zero_weight_cfg_is_still_a_complete_permutation() {
        let nodes = vec![node(0, 8, 0x1000), node(1, 8, 0x1008), node(2, 8, 0x1010)];
        let edges = vec![
            edge(0, 0, 1, EdgeKind::IntraBranch, 0),
            edge(1, 1, 2, EdgeKind::IntraBranch, 0),
        ];
        let mut cfg = ControlFlowGraph { name: "f".into(), entry: NodeId(0), nodes, edges };
        wire(&mut cfg);

        let options = PropellerOptions::default();
        let layout = ChainBuilder::run(&cfg, &options).unwrap();
        let mut sorted = layout.clone();
        sorted.sort_by_key(|n| n.0);
        assert_eq!(sorted, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(layout[0], NodeId(0));
    }

    // Boundary: single-block function participates in S4 purely through
    // whatever call edges its Program carries; as a CFG alone its layout is
    // trivially [entry].
    #[test]
    fn boundary_single_block_layout_is_just_the_entry() {
        let cfg = ControlFlowGraph { name: "leaf".into(), entry: NodeId(0), nodes: vec![node(0, 4, 0x2000)], edges: vec![] };
        let options = PropellerOptions::default();
        let layout = ChainBuilder::run(&cfg, &options).unwrap();
        assert_eq!(layout, vec![NodeId(0)]);
    }

    // Idempotence: running S3 again on a CFG whose weights already reflect
    // its current (optimal, single-chain) layout is a no-op.
    #[test]
    fn s3_is_idempotent_on_an_already_optimal_layout() {
        let mut nodes = vec![node(0, 8, 0x1000), node(1, 8, 0x1008), node(2, 8, 0x1010)];
        for n in &mut nodes {
            n.freq = 10;
        }
        let edges = vec![
            edge(0, 0, 1, EdgeKind::IntraFallthrough, 10),
            edge(1, 1, 2, EdgeKind::IntraFallthrough, 10),
        ];
        let mut cfg = ControlFlowGraph { name: "f".into(), entry: NodeId(0), nodes, edges };
        wire(&mut cfg);

        let options = PropellerOptions::default();
        let first = ChainBuilder::run(&cfg, &options).unwrap();
        let second = ChainBuilder::run(&cfg, &options).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![NodeId(0), NodeId(1), NodeId(2)]);
    }

    // Idempotence: S4 on a call graph with zero inter-function weight
    // yields pure density order, stable across repeated runs.
    #[test]
    fn s4_with_zero_weight_call_graph_is_pure_density_order() {
        let hot = ControlFlowGraph { name: "hot".into(), entry: NodeId(0), nodes: vec![{ let mut n = node(0, 8, 0x1000); n.freq = 100; n }], edges: vec![] };
        let cold = ControlFlowGraph { name: "cold".into(), entry: NodeId(0), nodes: vec![node(0, 8, 0x2000)], edges: vec![] };
        let program = Program::new(vec![hot, cold]);

        let cg = propeller_core::callgraph::CallGraph::build(&program);
        let mut stats = propeller_core::Stats::default();
        let first = ChainClustering::run(&program, &cg, &mut stats);
        let mut stats2 = propeller_core::Stats::default();
        let second = ChainClustering::run(&program, &cg, &mut stats2);
        assert_eq!(first, second);
        assert_eq!(first, vec![FunctionId(0), FunctionId(1)]);
    }
}

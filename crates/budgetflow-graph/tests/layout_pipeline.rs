use budgetflow_core::{
    GraphDocument, GraphEdge, GraphNode, InputMetadata, LAYER_COUNT, NodeId, NodeType,
};
use budgetflow_graph::{
    Bounds, GraphModel, LayoutConfig, LayoutDocument, LayoutEngine, LayoutParams, LayoutSession,
    SectionKey,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Three ministries, each with 2 bureaus, 2 divisions per bureau and 5 projects
/// per division. Projects fund a shared pool of 12 recipients. Also carries one
/// orphan bureau, one dangling edge and one backward edge.
fn budget_document() -> GraphDocument {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut seq = 0usize;
    let mut edge = |edges: &mut Vec<GraphEdge>, s: &str, t: &str, v: f64| {
        seq += 1;
        edges.push(GraphEdge::new(format!("e{seq}"), s, t, v));
    };

    for m in 0..3 {
        let ministry = format!("m{m}");
        let ministry_name = format!("Ministry {m}");
        let mut ministry_total = 0.0;
        for b in 0..2 {
            let bureau = format!("{ministry}-b{b}");
            let mut bureau_total = 0.0;
            for d in 0..2 {
                let division = format!("{bureau}-d{d}");
                let mut division_total = 0.0;
                for p in 0..5 {
                    let project = format!("{division}-p{p}");
                    let amount = 1e9 * ((m + 1) * (p + 1) * (b + d + 1)) as f64;
                    nodes.push(
                        GraphNode::new(&project, NodeType::Project, &project, amount)
                            .with_owner(&ministry_name),
                    );
                    edge(&mut edges, &division, &project, amount);
                    let recipient = format!("r{}", (m * 7 + p * 3 + d) % 12);
                    edge(&mut edges, &project, &recipient, amount);
                    division_total += amount;
                }
                nodes.push(
                    GraphNode::new(&division, NodeType::Division, &division, division_total)
                        .with_owner(&ministry_name),
                );
                edge(&mut edges, &bureau, &division, division_total);
                bureau_total += division_total;
            }
            nodes.push(GraphNode::new(&bureau, NodeType::Bureau, &bureau, bureau_total));
            edge(&mut edges, &ministry, &bureau, bureau_total);
            ministry_total += bureau_total;
        }
        nodes.push(GraphNode::new(&ministry, NodeType::Ministry, &ministry_name, ministry_total));
    }

    let mut recipient_totals: BTreeMap<String, f64> = BTreeMap::new();
    for e in edges.iter().filter(|e| e.target_id.as_str().starts_with('r')) {
        *recipient_totals.entry(e.target_id.to_string()).or_default() += e.value;
    }
    for (id, amount) in recipient_totals {
        nodes.push(GraphNode::new(&id, NodeType::Recipient, &id, amount));
    }

    nodes.push(GraphNode::new("orphan", NodeType::Bureau, "Orphan", 5e9));
    edge(&mut edges, "m0", "ghost", 1.0);
    edge(&mut edges, "m0-b0-d0-p0", "m0", 1.0);

    GraphDocument {
        metadata: InputMetadata {
            fiscal_year: Some(2023),
            generated_at: Some("2024-04-01T00:00:00Z".into()),
            source_files: vec!["budget.csv".into()],
        },
        nodes,
        edges,
    }
}

fn model() -> GraphModel {
    GraphModel::from_document(budget_document())
}

fn layer_totals(doc: &LayoutDocument) -> [f64; LAYER_COUNT] {
    let mut totals = [0.0; LAYER_COUNT];
    for node in &doc.nodes {
        totals[node.layer()] += node.amount;
    }
    totals
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0), "{a} != {b}");
}

#[test]
fn test_layout_is_deterministic() {
    let engine = LayoutEngine::default();
    let params = LayoutParams::top_n(Some(2), Some(5));
    let first = serde_json::to_string(&engine.layout(&model(), &params).unwrap()).unwrap();
    let second = serde_json::to_string(&engine.layout(&model(), &params).unwrap()).unwrap();
    assert_eq!(first, second);

    let dynamic = LayoutParams::dynamic(5e9).with_zoom(0.5);
    let first = serde_json::to_string(&engine.layout(&model(), &dynamic).unwrap()).unwrap();
    let second = serde_json::to_string(&engine.layout(&model(), &dynamic).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_bounds_enclose_every_node_tightly() {
    let doc = LayoutEngine::default()
        .layout(&model(), &LayoutParams::top_n(Some(3), Some(4)))
        .unwrap();
    let mut expected: Option<Bounds> = None;
    for node in &doc.nodes {
        let rect = node.rect();
        assert!(doc.bounds.contains(&rect), "{} escapes bounds", node.id);
        expected = Some(expected.map_or(rect, |b| b.union(&rect)));
    }
    assert_eq!(Some(doc.bounds), expected);
    assert_eq!(doc.metadata.canvas, doc.bounds);
}

#[test]
fn test_amounts_are_conserved_per_layer() {
    let engine = LayoutEngine::default();
    let full = engine.layout(&model(), &LayoutParams::default()).unwrap();
    let expected = layer_totals(&full);

    for params in [
        LayoutParams::top_n(Some(1), Some(2)),
        LayoutParams::top_n(Some(0), Some(0)),
        LayoutParams::dynamic(2e10),
        LayoutParams::dynamic(2e10).with_zoom(1.0),
    ] {
        let doc = engine.layout(&model(), &params).unwrap();
        let totals = layer_totals(&doc);
        for layer in 0..LAYER_COUNT {
            assert_close(totals[layer], expected[layer]);
        }
        let flow: f64 = doc.edges.iter().map(|e| e.value).sum();
        let full_flow: f64 = full.edges.iter().map(|e| e.value).sum();
        assert_close(flow, full_flow);
    }
}

#[test]
fn test_aggregates_account_for_their_members() {
    let doc = LayoutEngine::default()
        .layout(&model(), &LayoutParams::top_n(Some(2), Some(3)))
        .unwrap();
    let source = model();
    for node in doc.nodes.iter().filter(|n| n.is_aggregate) {
        assert_eq!(node.aggregated_count, node.aggregated_ids.len());
        let members: f64 = node
            .aggregated_ids
            .iter()
            .map(|id| source.get_node(id).map_or(0.0, |n| n.amount))
            .sum();
        assert_close(node.amount, members);
        assert!(node.aggregated_ids.iter().all(|id| doc.node(id).is_none()));
    }
}

#[test]
fn test_edges_are_unique_per_pair() {
    for params in [LayoutParams::top_n(Some(1), Some(1)), LayoutParams::dynamic(3e10)] {
        let doc = LayoutEngine::default().layout(&model(), &params).unwrap();
        let mut seen = HashSet::new();
        for edge in &doc.edges {
            assert!(
                seen.insert((edge.source_id.clone(), edge.target_id.clone())),
                "duplicate {} -> {}",
                edge.source_id,
                edge.target_id
            );
            assert!(doc.node(&edge.source_id).is_some());
            assert!(doc.node(&edge.target_id).is_some());
        }
    }
}

#[test]
fn test_sections_never_overlap() {
    let doc = LayoutEngine::default()
        .layout(&model(), &LayoutParams::top_n(Some(3), Some(6)))
        .unwrap();
    let mut spans: BTreeMap<usize, Vec<(f64, f64, String)>> = BTreeMap::new();
    for node in &doc.nodes {
        spans.entry(node.layer()).or_default().push((
            node.y - node.height / 2.0,
            node.y + node.height / 2.0,
            node.id.to_string(),
        ));
    }
    for (layer, mut spans) in spans {
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in spans.windows(2) {
            assert!(
                pair[1].0 >= pair[0].1 - 1e-9,
                "layer {layer}: {} overlaps {}",
                pair[0].2,
                pair[1].2
            );
        }
    }
}

#[test]
fn test_ministries_render_as_contiguous_bands() {
    let doc = LayoutEngine::default()
        .layout(&model(), &LayoutParams::default())
        .unwrap();
    let mut bands: BTreeMap<NodeId, (f64, f64)> = BTreeMap::new();
    for node in doc.nodes.iter().filter(|n| n.layer() < 4) {
        let Some(owner) = &node.owner_key else { continue };
        let rect = node.rect();
        let band = bands.entry(owner.clone()).or_insert((rect.min_y, rect.max_y));
        band.0 = band.0.min(rect.min_y);
        band.1 = band.1.max(rect.max_y);
    }
    let mut bands: Vec<_> = bands.into_values().collect();
    assert_eq!(bands.len(), 3);
    bands.sort_by(|a, b| a.0.total_cmp(&b.0));
    for pair in bands.windows(2) {
        assert!(pair[1].0 >= pair[0].1);
    }
}

#[test]
fn test_section_bands_are_reported_and_enclose_their_nodes() {
    for params in [LayoutParams::default(), LayoutParams::dynamic(1e9).with_zoom(1.0)] {
        let doc = LayoutEngine::default().layout(&model(), &params).unwrap();
        let sections = &doc.metadata.sections;
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[3].key, SectionKey::Unowned);
        for pair in sections.windows(2) {
            assert!(pair[1].top >= pair[0].top + pair[0].height);
        }

        for node in doc.nodes.iter().filter(|n| n.layer() < 4) {
            let key = match &node.owner_key {
                Some(owner) => SectionKey::Owner(owner.clone()),
                None => SectionKey::Unowned,
            };
            let band = sections.iter().find(|s| s.key == key).expect("band for node");
            let rect = node.rect();
            assert!(rect.min_y >= band.top - 1e-9, "{} above its band", node.id);
            assert!(rect.max_y <= band.top + band.height + 1e-9, "{} below its band", node.id);
        }
    }

    let json = serde_json::to_value(
        LayoutEngine::default()
            .layout(&model(), &LayoutParams::default())
            .unwrap(),
    )
    .unwrap();
    assert_eq!(json["metadata"]["sections"][3]["key"]["kind"], "unowned");
}

#[test]
fn test_data_problems_are_counted_not_fatal() {
    let doc = LayoutEngine::default()
        .layout(&model(), &LayoutParams::default())
        .unwrap();
    assert_eq!(doc.metadata.dropped_edge_count, 2);
    assert_eq!(doc.metadata.unowned_count, 1);
    let orphan = doc.node(&NodeId::from("orphan")).expect("unowned node still rendered");
    assert_eq!(orphan.owner_key, None);
    assert_eq!(doc.metadata.fiscal_year, Some(2023));
    assert_eq!(doc.metadata.source_files, vec!["budget.csv".to_string()]);
}

#[test]
fn test_recipients_track_their_sources() {
    let doc = LayoutEngine::default()
        .layout(&model(), &LayoutParams::default())
        .unwrap();
    let r = doc.node(&NodeId::from("r0")).unwrap();
    assert!(r.owner_key.is_some());
    assert!(!r.source_owners.is_empty());
    let mut sorted = r.source_owners.clone();
    sorted.sort();
    assert_eq!(sorted, r.source_owners);
}

#[test]
fn test_viewport_culls_but_keeps_canvas() {
    let engine = LayoutEngine::default();
    let full = engine.layout(&model(), &LayoutParams::dynamic(1e10)).unwrap();
    let viewport = Bounds::new(-100.0, -50.0, 100.0, 50.0);
    let culled = engine
        .layout(&model(), &LayoutParams::dynamic(1e10).with_viewport(viewport))
        .unwrap();

    assert!(culled.nodes.len() < full.nodes.len());
    assert_eq!(culled.metadata.culled_node_count, full.nodes.len() - culled.nodes.len());
    assert_eq!(culled.metadata.canvas, full.bounds);
    let padded = viewport.padded(0.5);
    assert!(culled.nodes.iter().all(|n| n.rect().intersects(&padded)));
}

#[test]
fn test_deeper_zoom_shows_more_nodes() {
    let engine = LayoutEngine::default();
    let model = model();
    let mut last_visible = 0;
    for zoom in [0.0, 1.0, 2.0, 3.0] {
        let doc = engine
            .layout(&model, &LayoutParams::dynamic(5e10).with_zoom(zoom))
            .unwrap();
        let real = doc.nodes.iter().filter(|n| !n.is_aggregate).count();
        assert!(real >= last_visible, "zoom {zoom} hid nodes");
        last_visible = real;
    }
}

#[test]
fn test_output_uses_wire_field_names() {
    let doc = LayoutEngine::default()
        .layout(&model(), &LayoutParams::top_n(Some(1), None))
        .unwrap();
    let json = serde_json::to_value(&doc).unwrap();
    let node = &json["nodes"][0];
    let node_keys = [
        "id",
        "layerIndex",
        "type",
        "displayName",
        "x",
        "y",
        "width",
        "height",
        "isAggregate",
    ];
    for key in node_keys {
        assert!(node.get(key).is_some(), "missing {key}");
    }
    for key in ["minX", "maxX", "minY", "maxY"] {
        assert!(json["bounds"].get(key).is_some());
    }
    assert!(json["metadata"]["nodeCount"].is_u64());
    assert!(json["metadata"]["droppedEdgeCount"].is_u64());
}

#[test]
fn test_session_matches_direct_view() {
    let engine = LayoutEngine::new(LayoutConfig::default());
    let session = LayoutSession::new(Arc::new(model()), engine.clone());
    let params = LayoutParams::dynamic(1e10).with_zoom(1.0);

    let cached = session.view(&params).unwrap();
    let direct = engine.layout(session.model(), &params).unwrap();
    assert_eq!(*cached, direct);
}

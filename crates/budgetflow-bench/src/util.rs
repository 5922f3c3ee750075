use budgetflow_core::{GraphDocument, GraphEdge, GraphNode, NodeType};

/// Fan-out per layer for [`generate_synthetic_budget`].
#[derive(Debug, Clone, Copy)]
pub struct BudgetShape {
    pub ministries: usize,
    pub bureaus_per_ministry: usize,
    pub divisions_per_bureau: usize,
    pub projects_per_division: usize,
    pub recipients: usize,
    /// Recipients funded by each project.
    pub fan_in: usize,
}

impl BudgetShape {
    /// Roughly 33k nodes: 16 ministries, 5.1k projects, 27k recipients.
    pub fn national() -> Self {
        Self {
            ministries: 16,
            bureaus_per_ministry: 8,
            divisions_per_bureau: 5,
            projects_per_division: 8,
            recipients: 27_000,
            fan_in: 6,
        }
    }
}

/// Deterministic amount spread over several orders of magnitude.
fn amount_for(seed: usize) -> f64 {
    let mixed = (seed as u64)
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    let exponent = 4 + (mixed >> 60) as i32 % 9;
    let mantissa = 1.0 + ((mixed >> 32) & 0xFFFF) as f64 / 65_536.0 * 9.0;
    mantissa * 10f64.powi(exponent)
}

pub fn generate_synthetic_budget(shape: BudgetShape) -> GraphDocument {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut recipient_totals = vec![0.0; shape.recipients.max(1)];
    let mut project_seq = 0usize;

    for m in 0..shape.ministries {
        let ministry = format!("m{m}");
        let ministry_name = format!("Ministry {m}");
        let mut ministry_total = 0.0;
        for b in 0..shape.bureaus_per_ministry {
            let bureau = format!("{ministry}.b{b}");
            let mut bureau_total = 0.0;
            for d in 0..shape.divisions_per_bureau {
                let division = format!("{bureau}.d{d}");
                let mut division_total = 0.0;
                for p in 0..shape.projects_per_division {
                    let project = format!("{division}.p{p}");
                    let amount = amount_for(project_seq);
                    let share = amount / shape.fan_in.max(1) as f64;
                    for k in 0..shape.fan_in {
                        let r = (project_seq * 7919 + k * 104_729) % recipient_totals.len();
                        recipient_totals[r] += share;
                        edges.push(GraphEdge::new(
                            format!("{project}>r{r}"),
                            &project,
                            format!("r{r}"),
                            share,
                        ));
                    }
                    edges.push(GraphEdge::new(
                        format!("{division}>{p}"),
                        &division,
                        &project,
                        amount,
                    ));
                    nodes.push(
                        GraphNode::new(&project, NodeType::Project, &project, amount)
                            .with_owner(&ministry_name),
                    );
                    division_total += amount;
                    project_seq += 1;
                }
                edges.push(GraphEdge::new(
                    format!("{bureau}>{d}"),
                    &bureau,
                    &division,
                    division_total,
                ));
                nodes.push(GraphNode::new(
                    &division,
                    NodeType::Division,
                    &division,
                    division_total,
                ));
                bureau_total += division_total;
            }
            edges.push(GraphEdge::new(format!("{ministry}>{b}"), &ministry, &bureau, bureau_total));
            nodes.push(GraphNode::new(&bureau, NodeType::Bureau, &bureau, bureau_total));
            ministry_total += bureau_total;
        }
        nodes.push(GraphNode::new(&ministry, NodeType::Ministry, &ministry_name, ministry_total));
    }

    for (r, amount) in recipient_totals.into_iter().enumerate() {
        let id = format!("r{r}");
        nodes.push(GraphNode::new(&id, NodeType::Recipient, &id, amount));
    }

    GraphDocument {
        nodes,
        edges,
        ..GraphDocument::default()
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Node ids are the model's own short strings ("ds", "resnet", ...)
pub type NodeId = String;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: Summary,
    pub graph: MethodGraph,
    pub code: String,
    pub variants: Vec<Variant>,
    pub reasoning: Vec<ReasoningItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub datasets: Vec<String>,
    pub preprocessing: Vec<String>,
    pub model_architecture: Vec<String>,
    pub training_procedure: Vec<String>,
    pub hyperparameters: BTreeMap<String, HyperValue>,
    pub evaluation: Vec<String>,
    pub missing_details: Vec<String>,
    pub overall_confidence: u8,
}

/// Hyperparameter values are kept as the model wrote them; no unit parsing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperValue {
    Number(serde_json::Number),
    Text(String),
    Flag(bool),
    Structured(serde_json::Value),
}

impl fmt::Display for HyperValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HyperValue::Number(n) => write!(f, "{}", n),
            HyperValue::Text(s) => write!(f, "{}", s),
            HyperValue::Flag(b) => write!(f, "{}", b),
            HyperValue::Structured(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub group: NodeGroup,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: NodeId,
    pub target: NodeId,
    // On the wire this is `value`, matching what the model is asked to emit
    #[serde(rename = "value")]
    pub weight: f64,
}

/// Pipeline stage of a node. The set is open: anything unrecognised is kept
/// verbatim in `Other` and drawn with a fallback colour.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeGroup {
    Dataset,
    Preprocessing,
    Model,
    Training,
    Evaluation,
    Other(String),
}

impl NodeGroup {
    pub const KNOWN: [NodeGroup; 5] = [
        NodeGroup::Dataset,
        NodeGroup::Preprocessing,
        NodeGroup::Model,
        NodeGroup::Training,
        NodeGroup::Evaluation,
    ];

    pub fn parse(s: &str) -> Self {
        match s {
            "dataset" => NodeGroup::Dataset,
            "preprocessing" => NodeGroup::Preprocessing,
            "model" => NodeGroup::Model,
            "training" => NodeGroup::Training,
            "evaluation" => NodeGroup::Evaluation,
            other => NodeGroup::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeGroup::Dataset => "dataset",
            NodeGroup::Preprocessing => "preprocessing",
            NodeGroup::Model => "model",
            NodeGroup::Training => "training",
            NodeGroup::Evaluation => "evaluation",
            NodeGroup::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool { !matches!(self, NodeGroup::Other(_)) }

    pub fn display_name(&self) -> &str {
        match self {
            NodeGroup::Dataset => "Dataset",
            NodeGroup::Preprocessing => "Preprocessing",
            NodeGroup::Model => "Model",
            NodeGroup::Training => "Training",
            NodeGroup::Evaluation => "Evaluation",
            NodeGroup::Other(s) => s,
        }
    }
}

impl Serialize for NodeGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeGroup::parse(&s))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariantKind,
    pub description: String,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    // Free text such as "+2.5%" or "-15% FLOPs"; not guaranteed numeric
    pub expected_accuracy_impact: String,
    pub expected_compute_impact: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantKind {
    #[serde(rename = "Hybrid Fusion")]
    HybridFusion,
    #[serde(rename = "Speed Demon")]
    SpeedDemon,
    #[serde(rename = "Untested Territory")]
    UntestedTerritory,
    #[serde(rename = "Efficiency Mod")]
    EfficiencyMod,
}

impl VariantKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Hybrid Fusion" => Some(VariantKind::HybridFusion),
            "Speed Demon" => Some(VariantKind::SpeedDemon),
            "Untested Territory" => Some(VariantKind::UntestedTerritory),
            "Efficiency Mod" => Some(VariantKind::EfficiencyMod),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantKind::HybridFusion => "Hybrid Fusion",
            VariantKind::SpeedDemon => "Speed Demon",
            VariantKind::UntestedTerritory => "Untested Territory",
            VariantKind::EfficiencyMod => "Efficiency Mod",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    pub topic: String,
    pub explanation: String,
    pub is_assumption: bool,
    pub confidence_score: u8,
}

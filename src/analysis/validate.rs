//! Second phase of response handling: generic JSON value -> typed result.
//!
//! Fails closed. A missing field, a wrong type, a duplicate node id or a link
//! to an unknown node rejects the whole response; nothing is defaulted.
//! Out-of-range confidences and unknown node groups only produce warnings.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use super::error::{ValidationError, ValidationErrorKind};
use super::result::{
    AnalysisResult, GraphLink, GraphNode, HyperValue, MethodGraph, NodeGroup, ReasoningItem, Summary, Variant,
    VariantKind,
};

pub const REQUIRED_KEYS: [&str; 5] = ["summary", "graph", "code", "variants", "reasoning"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationReport {
    pub result: AnalysisResult,
    pub warnings: Vec<ValidationWarning>,
}

pub fn validate(parsed: &Value) -> Result<AnalysisResult, ValidationError> {
    validate_report(parsed).map(|report| report.result)
}

pub fn validate_report(parsed: &Value) -> Result<ValidationReport, ValidationError> {
    let mut checker = Checker::default();
    let result = checker.result(parsed)?;
    for w in &checker.warnings {
        log::warn!("analysis result: {} ({})", w.message, w.path);
    }
    Ok(ValidationReport { result, warnings: checker.warnings })
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() { key.to_string() } else { format!("{}.{}", parent, key) }
}

fn index(parent: &str, i: usize) -> String { format!("{}[{}]", parent, i) }

fn wrong_type(path: &str, expected: &'static str) -> ValidationError {
    ValidationError::new(path, ValidationErrorKind::WrongType { expected })
}

fn object<'a>(v: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    v.as_object().ok_or_else(|| wrong_type(path, "an object"))
}

fn array<'a>(v: &'a Value, path: &str) -> Result<&'a Vec<Value>, ValidationError> {
    v.as_array().ok_or_else(|| wrong_type(path, "an array"))
}

fn field<'a>(obj: &'a Map<String, Value>, parent: &str, key: &str) -> Result<&'a Value, ValidationError> {
    obj.get(key).ok_or_else(|| ValidationError::new(join(parent, key), ValidationErrorKind::Missing))
}

fn string(obj: &Map<String, Value>, parent: &str, key: &str) -> Result<String, ValidationError> {
    let v = field(obj, parent, key)?;
    v.as_str().map(str::to_string).ok_or_else(|| wrong_type(&join(parent, key), "a string"))
}

fn flag(obj: &Map<String, Value>, parent: &str, key: &str) -> Result<bool, ValidationError> {
    let v = field(obj, parent, key)?;
    v.as_bool().ok_or_else(|| wrong_type(&join(parent, key), "a boolean"))
}

fn string_list(obj: &Map<String, Value>, parent: &str, key: &str) -> Result<Vec<String>, ValidationError> {
    let path = join(parent, key);
    let items = array(field(obj, parent, key)?, &path)?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| item.as_str().map(str::to_string).ok_or_else(|| wrong_type(&index(&path, i), "a string")))
        .collect()
}

#[derive(Default)]
struct Checker {
    warnings: Vec<ValidationWarning>,
}

impl Checker {
    fn warn(&mut self, path: String, message: String) {
        self.warnings.push(ValidationWarning { path, message });
    }

    fn result(&mut self, parsed: &Value) -> Result<AnalysisResult, ValidationError> {
        let root = object(parsed, "$")?;
        // Report every absent top-level key before looking inside any of them
        for key in REQUIRED_KEYS {
            field(root, "", key)?;
        }
        let graph = self.graph(field(root, "", "graph")?)?;
        let summary = self.summary(field(root, "", "summary")?)?;
        let code = string(root, "", "code")?;
        let variants = self.variants(field(root, "", "variants")?)?;
        let reasoning = self.reasoning(field(root, "", "reasoning")?)?;
        Ok(AnalysisResult { summary, graph, code, variants, reasoning })
    }

    fn summary(&mut self, v: &Value) -> Result<Summary, ValidationError> {
        let p = "summary";
        let obj = object(v, p)?;
        let hp_path = join(p, "hyperparameters");
        let hp_obj = object(field(obj, p, "hyperparameters")?, &hp_path)?;
        // Keys are unique by construction of the JSON map
        let hyperparameters: BTreeMap<String, HyperValue> = hp_obj
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::Number(n) => HyperValue::Number(n.clone()),
                    Value::String(s) => HyperValue::Text(s.clone()),
                    Value::Bool(b) => HyperValue::Flag(*b),
                    other => HyperValue::Structured(other.clone()),
                };
                (k.clone(), value)
            })
            .collect();
        Ok(Summary {
            datasets: string_list(obj, p, "datasets")?,
            preprocessing: string_list(obj, p, "preprocessing")?,
            model_architecture: string_list(obj, p, "model_architecture")?,
            training_procedure: string_list(obj, p, "training_procedure")?,
            hyperparameters,
            evaluation: string_list(obj, p, "evaluation")?,
            missing_details: string_list(obj, p, "missing_details")?,
            overall_confidence: self.confidence(obj, p, "overall_confidence")?,
        })
    }

    fn graph(&mut self, v: &Value) -> Result<MethodGraph, ValidationError> {
        let p = "graph";
        let obj = object(v, p)?;
        let nodes_path = join(p, "nodes");
        let raw_nodes = array(field(obj, p, "nodes")?, &nodes_path)?;
        let mut nodes = Vec::with_capacity(raw_nodes.len());
        let mut seen: HashSet<String> = HashSet::new();
        for (i, raw) in raw_nodes.iter().enumerate() {
            let np = index(&nodes_path, i);
            let n = object(raw, &np)?;
            let id = string(n, &np, "id")?;
            if !seen.insert(id.clone()) {
                return Err(ValidationError::new(join(&np, "id"), ValidationErrorKind::DuplicateNodeId(id)));
            }
            let group = NodeGroup::parse(&string(n, &np, "group")?);
            if !group.is_known() {
                self.warn(join(&np, "group"), format!("unknown node group \"{}\" rendered with fallback style", group.as_str()));
            }
            let label = string(n, &np, "label")?;
            nodes.push(GraphNode { id, group, label });
        }

        let links_path = join(p, "links");
        let raw_links = array(field(obj, p, "links")?, &links_path)?;
        let mut links = Vec::with_capacity(raw_links.len());
        for (i, raw) in raw_links.iter().enumerate() {
            let lp = index(&links_path, i);
            let l = object(raw, &lp)?;
            let source = string(l, &lp, "source")?;
            let target = string(l, &lp, "target")?;
            for (end, id) in [("source", &source), ("target", &target)] {
                if !seen.contains(id.as_str()) {
                    return Err(ValidationError::new(join(&lp, end), ValidationErrorKind::DanglingLink(id.clone())));
                }
            }
            let weight = field(l, &lp, "value")?
                .as_f64()
                .ok_or_else(|| wrong_type(&join(&lp, "value"), "a number"))?;
            links.push(GraphLink { source, target, weight });
        }
        Ok(MethodGraph { nodes, links })
    }

    fn variants(&mut self, v: &Value) -> Result<Vec<Variant>, ValidationError> {
        let p = "variants";
        let items = array(v, p)?;
        let mut out = Vec::with_capacity(items.len());
        for (i, raw) in items.iter().enumerate() {
            let vp = index(p, i);
            let o = object(raw, &vp)?;
            let type_str = string(o, &vp, "type")?;
            let kind = VariantKind::parse(&type_str)
                .ok_or_else(|| ValidationError::new(join(&vp, "type"), ValidationErrorKind::UnknownVariantType(type_str)))?;
            let code_snippet = match o.get("code_snippet") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => return Err(wrong_type(&join(&vp, "code_snippet"), "a string")),
            };
            out.push(Variant {
                name: string(o, &vp, "name")?,
                kind,
                description: string(o, &vp, "description")?,
                rationale: string(o, &vp, "rationale")?,
                code_snippet,
                expected_accuracy_impact: string(o, &vp, "expected_accuracy_impact")?,
                expected_compute_impact: string(o, &vp, "expected_compute_impact")?,
            });
        }
        Ok(out)
    }

    fn reasoning(&mut self, v: &Value) -> Result<Vec<ReasoningItem>, ValidationError> {
        let p = "reasoning";
        let items = array(v, p)?;
        let mut out = Vec::with_capacity(items.len());
        for (i, raw) in items.iter().enumerate() {
            let rp = index(p, i);
            let o = object(raw, &rp)?;
            out.push(ReasoningItem {
                topic: string(o, &rp, "topic")?,
                explanation: string(o, &rp, "explanation")?,
                is_assumption: flag(o, &rp, "is_assumption")?,
                confidence_score: self.confidence(o, &rp, "confidence_score")?,
            });
        }
        Ok(out)
    }

    // Integer percentage in [0, 100]. Out-of-range or fractional values are
    // clamped/rounded with a warning rather than rejected.
    fn confidence(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) -> Result<u8, ValidationError> {
        let path = join(parent, key);
        let raw = field(obj, parent, key)?.as_f64().ok_or_else(|| wrong_type(&path, "a number"))?;
        let mut value = raw;
        if value.fract() != 0.0 {
            value = value.round();
            self.warn(path.clone(), format!("confidence {} is not an integer, rounded", raw));
        }
        if !(0.0..=100.0).contains(&value) {
            self.warn(path.clone(), format!("confidence {} is outside 0-100, clamped", raw));
            value = value.clamp(0.0, 100.0);
        }
        Ok(value as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "summary": {
                "datasets": ["CIFAR-10"],
                "preprocessing": [],
                "model_architecture": ["ResNet-18"],
                "training_procedure": [],
                "hyperparameters": {"learning_rate": 0.1, "optimizer": "SGD"},
                "evaluation": [],
                "missing_details": [],
                "overall_confidence": 85
            },
            "graph": {
                "nodes": [
                    {"id": "ds", "group": "dataset", "label": "CIFAR-10"},
                    {"id": "net", "group": "model", "label": "ResNet-18"}
                ],
                "links": [{"source": "ds", "target": "net", "value": 1}]
            },
            "code": "import torch",
            "variants": [],
            "reasoning": [{"topic": "lr", "explanation": "stated", "is_assumption": false, "confidence_score": 90}]
        })
    }

    #[test]
    fn accepts_complete_document() {
        let report = validate_report(&minimal()).unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.result.graph.nodes.len(), 2);
        assert_eq!(report.result.summary.hyperparameters["optimizer"], HyperValue::Text("SGD".into()));
    }

    #[test]
    fn missing_top_level_key_names_it() {
        let mut v = minimal();
        v.as_object_mut().unwrap().remove("reasoning");
        let err = validate(&v).unwrap_err();
        assert_eq!(err.path, "reasoning");
        assert_eq!(err.kind, ValidationErrorKind::Missing);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let mut v = minimal();
        v["graph"]["nodes"][1]["id"] = json!("ds");
        let err = validate(&v).unwrap_err();
        assert_eq!(err.path, "graph.nodes[1].id");
        assert_eq!(err.kind, ValidationErrorKind::DuplicateNodeId("ds".into()));
    }

    #[test]
    fn unknown_group_is_kept_with_warning() {
        let mut v = minimal();
        v["graph"]["nodes"][0]["group"] = json!("deployment");
        let report = validate_report(&v).unwrap();
        assert_eq!(report.result.graph.nodes[0].group, NodeGroup::Other("deployment".into()));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path, "graph.nodes[0].group");
    }

    #[test]
    fn confidence_out_of_range_is_clamped_with_warning() {
        let mut v = minimal();
        v["summary"]["overall_confidence"] = json!(140);
        v["reasoning"][0]["confidence_score"] = json!(-3);
        let report = validate_report(&v).unwrap();
        assert_eq!(report.result.summary.overall_confidence, 100);
        assert_eq!(report.result.reasoning[0].confidence_score, 0);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn unknown_variant_type_is_rejected() {
        let mut v = minimal();
        v["variants"] = json!([{
            "name": "x", "type": "Moonshot", "description": "d", "rationale": "r",
            "expected_accuracy_impact": "+1%", "expected_compute_impact": "0%"
        }]);
        let err = validate(&v).unwrap_err();
        assert_eq!(err.path, "variants[0].type");
    }

    #[test]
    fn link_without_value_fails_closed() {
        let mut v = minimal();
        v["graph"]["links"][0].as_object_mut().unwrap().remove("value");
        let err = validate(&v).unwrap_err();
        assert_eq!(err.path, "graph.links[0].value");
    }

    #[test]
    fn non_object_root_is_rejected() {
        let err = validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.path, "$");
    }
}

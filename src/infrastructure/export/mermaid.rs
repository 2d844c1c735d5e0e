use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use crate::domain::models::{Situation, Snapshot};

const MAX_LABEL_LEN: usize = 50;

/// Node id Mermaid accepts: lowercase alphanumerics and underscores,
/// starting with a letter.
pub fn sanitize_node_id(text: &str) -> String {
    let mut id = String::with_capacity(text.len());
    let mut pending_underscore = false;
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_underscore && !id.is_empty() {
                id.push('_');
            }
            pending_underscore = false;
            id.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '_' {
            pending_underscore = true;
        }
    }
    if id.is_empty() {
        return "node".to_string();
    }
    // Reserved word in flowcharts
    if id == "end" {
        return "end_node".to_string();
    }
    if !id.starts_with(|c: char| c.is_ascii_alphabetic()) {
        id.insert_str(0, "node_");
    }
    id
}

fn label(text: &str) -> String {
    let text = text.replace('"', "'").replace(['\n', '\r'], " ");
    if text.chars().count() <= MAX_LABEL_LEN {
        return text;
    }
    let truncated: String = text.chars().take(MAX_LABEL_LEN - 3).collect();
    format!("{truncated}...")
}

fn node_line(node_id: &str, situation: &Situation) -> String {
    let text = label(&format!("{}: {}", situation.id, situation.description));
    if situation.is_ending {
        format!("    {node_id}([\"{text}\"])")
    } else if situation.bridgeable {
        format!("    {node_id}{{{{\"{text}\"}}}}")
    } else {
        format!("    {node_id}[\"{text}\"]")
    }
}

/// Render every situation in `snapshot` as a top-down flowchart with one
/// labelled edge per resolved choice.
pub fn render_mermaid(snapshot: &Snapshot) -> String {
    let mut out = String::from("flowchart TD\n");
    let situations: Vec<&Situation> = snapshot.situations().collect();
    if situations.is_empty() {
        out.push_str("    empty[\"No situations\"]\n");
        return out;
    }

    let mut taken: HashSet<String> = HashSet::new();
    let mut node_ids: HashMap<&str, String> = HashMap::new();
    for situation in &situations {
        let base = sanitize_node_id(&situation.id);
        let mut candidate = base.clone();
        let mut counter = 1;
        while taken.contains(&candidate) {
            candidate = format!("{base}_{counter}");
            counter += 1;
        }
        taken.insert(candidate.clone());
        node_ids.insert(situation.id.as_str(), candidate);
    }

    for situation in &situations {
        let _ = writeln!(out, "{}", node_line(&node_ids[situation.id.as_str()], situation));
    }
    for situation in &situations {
        let from = &node_ids[situation.id.as_str()];
        for choice in &situation.choices {
            let Some(to) = choice
                .next_situation_id
                .as_deref()
                .and_then(|target| node_ids.get(target))
            else {
                continue;
            };
            let _ = writeln!(out, "    {from} -->|\"{}\"| {to}", label(&choice.text));
        }
    }
    out
}

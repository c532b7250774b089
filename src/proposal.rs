//! Pure helpers over the opaque proposal payload. The backend's JSON is
//! passed through untouched; only a handful of well-known fields are
//! inspected here, and anything malformed reads as "no data".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Feasibility verdict carried by some proposals. `feasible` is None when
/// the backend did not say either way.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Feasibility {
    pub feasible: Option<bool>,
    pub reasons: Vec<String>,
}

/// A completed generation as surfaced to the caller: the stored payload
/// plus whatever could be pre-extracted from it.
#[derive(Debug, Clone)]
pub struct ReadyProposal {
    pub filename: String,
    pub proposal_json: String,
    pub report_html: Option<String>,
    pub feasibility: Feasibility,
}

/// Renderable HTML for a proposal: the backend's `reportHtml`, else its
/// `html`, else a document built from `rfp.generatedProposal`.
pub fn extract_html(proposal: &Value) -> Option<String> {
    if let Some(html) = proposal.get("reportHtml").and_then(Value::as_str) {
        return Some(html.to_string());
    }
    if let Some(html) = proposal.get("html").and_then(Value::as_str) {
        return Some(html.to_string());
    }
    proposal
        .get("rfp")
        .and_then(|rfp| rfp.get("generatedProposal"))
        .map(|gp| build_html_from_proposal(gp, proposal))
}

/// `extract_html` over a raw JSON string; malformed input is simply no HTML.
pub fn extract_html_str(proposal_json: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(proposal_json).ok()?;
    extract_html(&parsed)
}

pub fn extract_feasibility(proposal: &Value) -> Feasibility {
    let feasible = match proposal.get("feasible") {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => Some(s.eq_ignore_ascii_case("true")),
        _ => None,
    };
    let reasons = proposal
        .get("feasibilityReasons")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|r| match r {
                    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                    Value::Null => None,
                    Value::String(_) => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default();
    Feasibility { feasible, reasons }
}

pub fn extract_feasibility_str(proposal_json: &str) -> Feasibility {
    serde_json::from_str::<Value>(proposal_json)
        .map(|v| extract_feasibility(&v))
        .unwrap_or_default()
}

// Table/paragraph cell text: strings verbatim, everything else via its
// JSON rendering (numbers, bools) so amounts don't pick up quotes.
fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_list(out: &mut String, heading: &str, items: &[Value]) {
    out.push_str(&format!("<h3>{heading}</h3><ul>"));
    for item in items {
        out.push_str(&format!("<li>{}</li>", cell(item)));
    }
    out.push_str("</ul>");
}

/// Deterministically turn a generated-proposal object into a styled,
/// self-contained HTML document, so save/share produce the same content
/// the review screen shows. Partially populated proposals yield a valid
/// document with only the present sections; a non-object payload falls
/// back to a JSON dump.
pub fn build_html_from_proposal(gp: &Value, parsed: &Value) -> String {
    let gp_map = match gp.as_object() {
        Some(m) => m,
        None => {
            return format!(
                "<html><body><pre>{}</pre></body></html>",
                serde_json::to_string(gp).unwrap_or_default()
            )
        }
    };
    let client_name = parsed
        .get("rfp")
        .and_then(|rfp| rfp.get("clientName"))
        .and_then(Value::as_str)
        .unwrap_or("Client");

    let mut out = String::new();
    out.push_str(concat!(
        "<html><head><meta charset=\"utf-8\">",
        "<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\n",
        "<style>\n",
        "body{font-family:sans-serif;padding:16px;color:#222;line-height:1.5}\n",
        "h1{color:#003366;font-size:22px}h2{color:#003366;font-size:18px;margin-top:20px}\n",
        "h3{font-size:15px;margin-top:14px}\n",
        "table{width:100%;border-collapse:collapse;margin:10px 0}\n",
        "th,td{border:1px solid #ccc;padding:8px;text-align:left;font-size:13px}\n",
        "th{background:#003366;color:#fff}\n",
        "ul{padding-left:20px}li{margin:4px 0}\n",
        ".label{font-weight:bold}\n",
        "</style></head><body>\n",
        "<h1>Request for Proposal (RFP) Response</h1>\n",
    ));
    out.push_str(&format!(
        "<p><span class=\"label\">Client:</span> {client_name}</p>"
    ));

    if let Some(es) = gp_map.get("executive_summary").and_then(Value::as_object) {
        out.push_str("<h2>1. Executive Summary</h2>");
        if let Some(v) = es.get("overview").and_then(Value::as_str) {
            out.push_str(&format!("<p><span class='label'>Overview:</span> {v}</p>"));
        }
        if let Some(v) = es.get("value_proposition").and_then(Value::as_str) {
            out.push_str(&format!(
                "<p><span class='label'>Value Proposition:</span> {v}</p>"
            ));
        }
    }

    if let Some(ur) = gp_map
        .get("understanding_of_requirements")
        .and_then(Value::as_object)
    {
        out.push_str("<h2>2. Understanding of Client Requirements</h2>");
        if let Some(v) = ur.get("project_overview").and_then(Value::as_str) {
            out.push_str(&format!("<p>{v}</p>"));
        }
        if let Some(list) = ur.get("key_objectives").and_then(Value::as_array) {
            push_list(&mut out, "Key Objectives", list);
        }
        if let Some(list) = ur.get("in_scope").and_then(Value::as_array) {
            push_list(&mut out, "In Scope", list);
        }
    }

    if let Some(reqs) = gp_map.get("requirement_mapping").and_then(Value::as_array) {
        out.push_str("<h2>3. Requirement Mapping</h2>");
        out.push_str(
            "<table><tr><th>ID</th><th>Description</th><th>Service</th><th>Technology</th><th>Status</th></tr>",
        );
        for r in reqs.iter().filter_map(Value::as_object) {
            let field = |key: &str| r.get(key).map(cell).unwrap_or_default();
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                field("requirement_id"),
                field("description"),
                field("mapped_service"),
                field("mapped_technology"),
                field("status"),
            ));
        }
        out.push_str("</table>");
    }

    if let Some(sa) = gp_map
        .get("solution_architecture")
        .and_then(Value::as_object)
    {
        out.push_str("<h2>4. Solution Architecture</h2>");
        if let Some(v) = sa.get("architecture_overview").and_then(Value::as_str) {
            out.push_str(&format!("<p>{v}</p>"));
        }
        if let Some(list) = sa.get("components").and_then(Value::as_array) {
            push_list(&mut out, "Components", list);
        }
        if let Some(list) = sa.get("security_considerations").and_then(Value::as_array) {
            push_list(&mut out, "Security", list);
        }
    }

    if let Some(dp) = gp_map.get("delivery_plan").and_then(Value::as_object) {
        out.push_str("<h2>5. Delivery Plan</h2>");
        if let Some(phases) = dp.get("phases").and_then(Value::as_array) {
            out.push_str("<table><tr><th>Phase</th><th>Duration</th><th>Deliverables</th></tr>");
            for p in phases.iter().filter_map(Value::as_object) {
                let deliverables = p
                    .get("deliverables")
                    .and_then(Value::as_array)
                    .map(|d| d.iter().map(cell).collect::<Vec<_>>().join(", "))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "<tr><td>{}</td><td>{} weeks</td><td>{}</td></tr>",
                    p.get("phase_name").map(cell).unwrap_or_default(),
                    p.get("duration_weeks").map(cell).unwrap_or_default(),
                    deliverables,
                ));
            }
            out.push_str("</table>");
        }
    }

    if let Some(pr) = gp_map.get("pricing").and_then(Value::as_object) {
        out.push_str("<h2>6. Pricing</h2>");
        if let Some(total) = pr.get("total_cost") {
            out.push_str(&format!(
                "<p><span class='label'>Total Cost:</span> {}</p>",
                cell(total)
            ));
        }
        if let Some(items) = pr.get("line_items").and_then(Value::as_array) {
            out.push_str("<table><tr><th>Item</th><th>Amount</th></tr>");
            for item in items.iter().filter_map(Value::as_object) {
                let description = item
                    .get("description")
                    .or_else(|| item.get("item"))
                    .map(cell)
                    .unwrap_or_default();
                let amount = item
                    .get("amount")
                    .or_else(|| item.get("cost"))
                    .map(cell)
                    .unwrap_or_default();
                out.push_str(&format!("<tr><td>{description}</td><td>{amount}</td></tr>"));
            }
            out.push_str("</table>");
        }
    }

    if let Some(tc) = gp_map.get("team_composition").and_then(Value::as_object) {
        out.push_str("<h2>7. Team Composition</h2>");
        if let Some(roles) = tc.get("roles").and_then(Value::as_array) {
            out.push_str("<table><tr><th>Role</th><th>Count</th><th>Rate</th></tr>");
            for r in roles.iter().filter_map(Value::as_object) {
                let rate = r
                    .get("monthly_rate")
                    .or_else(|| r.get("rate"))
                    .map(cell)
                    .unwrap_or_default();
                out.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    r.get("role").map(cell).unwrap_or_default(),
                    r.get("count").map(cell).unwrap_or_default(),
                    rate,
                ));
            }
            out.push_str("</table>");
        }
    }

    out.push_str(
        "<hr><p style='text-align:center;color:#888;font-size:12px'>Generated by BidForge AI</p>",
    );
    out.push_str("</body></html>");
    out
}

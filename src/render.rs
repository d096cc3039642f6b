//! Plain-text rendering of decoded records.

use std::fmt::Write;

use crate::types::{CostSet, Institution, InstitutionRef, ProcedureRecord, RequirementSet, Step};

/// Title, link, extra information and step counts.
pub fn procedure_summary(procedure: &ProcedureRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Procedure: {}", title_or(&procedure.title, "Untitled procedure"));
    if let Some(category) = &procedure.category {
        let _ = writeln!(out, "Category: {category}");
    }
    if let Some(description) = &procedure.description {
        let _ = writeln!(out, "Description: {description}");
    }
    let _ = writeln!(
        out,
        "URL: {}",
        procedure.url.as_deref().unwrap_or("No URL available")
    );
    let _ = writeln!(
        out,
        "Additional Information: {}",
        procedure
            .additional_info
            .as_deref()
            .unwrap_or("No additional information available")
    );
    let _ = writeln!(out, "Number of blocks: {}", procedure.blocks.len());
    let _ = writeln!(out, "Total steps: {}", procedure.step_count());
    out
}

/// Numbered step list.
pub fn steps(steps: &[Step]) -> String {
    if steps.is_empty() {
        return "No steps available for this procedure.\n".to_string();
    }
    let mut out = String::from("Procedure Steps:\n\n");
    for (i, step) in steps.iter().enumerate() {
        let n = i + 1;
        let fallback = format!("Step {n}");
        let _ = writeln!(out, "Step {n}: {}", title_or(&step.title, &fallback));
        let _ = writeln!(
            out,
            "Description: {}",
            step.description.as_deref().unwrap_or("No description available")
        );
        if let Some(name) = step.institution.as_ref().and_then(|i| i.name.as_deref()) {
            let _ = writeln!(out, "Institution: {name}");
        }
        if let Some(url) = step.online.as_ref().and_then(|o| o.url.as_deref()) {
            let _ = writeln!(out, "Online: {url}");
        }
        out.push('\n');
    }
    out
}

/// A single step with its institution and online access.
pub fn step_detail(procedure_id: u64, number: usize, step: &Step) -> String {
    let mut out = String::new();
    let fallback = format!("Step {number}");
    let _ = writeln!(
        out,
        "Step {number} of procedure {procedure_id}: {}",
        title_or(&step.title, &fallback)
    );
    let _ = writeln!(
        out,
        "Description: {}",
        step.description.as_deref().unwrap_or("No description available")
    );
    if let Some(inst) = &step.institution {
        let _ = writeln!(
            out,
            "Institution: {} (institution {})",
            inst.name.as_deref().unwrap_or("Unnamed institution"),
            inst.id
        );
    }
    if let Some(url) = step.online.as_ref().and_then(|o| o.url.as_deref()) {
        let _ = writeln!(out, "Online: {url}");
    }
    out
}

pub fn requirements(set: &RequirementSet) -> String {
    if set.items.is_empty() {
        return "No specific requirements listed for this procedure.\n".to_string();
    }
    let mut out = String::from("Procedure Requirements:\n\n");
    for (i, item) in set.items.iter().enumerate() {
        let n = i + 1;
        let fallback = format!("Requirement {n}");
        let _ = writeln!(out, "{n}. {}", title_or(&item.name, &fallback));
        let _ = writeln!(
            out,
            "   Description: {}",
            item.description.as_deref().unwrap_or("No description available")
        );
        if let Some(cost) = item.cost {
            let _ = writeln!(out, "   Cost: {}", amount(cost));
        }
        out.push('\n');
    }
    out
}

/// Reply when a procedure has no requirements record.
pub fn no_requirements(procedure_id: u64) -> String {
    format!("No requirements found for procedure with ID {procedure_id}.\n")
}

/// Total plus per-item breakdown.
pub fn costs(set: &CostSet) -> String {
    let currency = set.currency.as_deref().unwrap_or("");
    let mut out = String::from("Procedure Costs:\n\n");
    let total = set
        .total_cost
        .map(amount)
        .unwrap_or_else(|| "Not specified".to_string());
    let _ = writeln!(out, "{}", format!("Total Cost: {total} {currency}").trim_end());

    if !set.items.is_empty() {
        out.push_str("\nCost Breakdown:\n");
        for (i, item) in set.items.iter().enumerate() {
            let n = i + 1;
            let fallback = format!("Item {n}");
            let value = item
                .amount
                .map(amount)
                .unwrap_or_else(|| "Amount not specified".to_string());
            let line = format!("{n}. {}: {value} {currency}", title_or(&item.name, &fallback));
            let _ = writeln!(out, "{}", line.trim_end());
        }
    }
    out
}

/// Reply when a procedure has no costs record.
pub fn no_costs(procedure_id: u64) -> String {
    format!("No cost information found for procedure with ID {procedure_id}.\n")
}

pub fn institution(institution: &Institution) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Institution: {}",
        title_or(&institution.name, "Unnamed institution")
    );
    let fields = [
        ("Description", &institution.description),
        ("Address", &institution.address),
        ("Phone", &institution.phone),
        ("Email", &institution.email),
        ("Website", &institution.website),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            let _ = writeln!(out, "{label}: {value}");
        }
    }
    out
}

/// Institutions a procedure's steps are handled by.
pub fn institution_refs(refs: &[InstitutionRef]) -> String {
    if refs.is_empty() {
        return "No institutions are listed for this procedure.\n".to_string();
    }
    let mut out = String::from("Institutions involved:\n\n");
    for (i, inst) in refs.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} (institution {})",
            i + 1,
            inst.name.as_deref().unwrap_or("Unnamed institution"),
            inst.id
        );
    }
    out
}

pub fn timeline(procedure: &ProcedureRecord) -> String {
    format!(
        "No specific timeline information is published for this procedure. \
         It consists of {} steps across {} blocks.\n",
        procedure.step_count(),
        procedure.blocks.len()
    )
}

/// Whole amounts without decimals, others with two.
fn amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn title_or<'a>(title: &'a str, fallback: &'a str) -> &'a str {
    if title.trim().is_empty() { fallback } else { title }
}

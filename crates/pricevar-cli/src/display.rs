//! Terminal rendering of a skill output.
//!
//! Pages are read back through their slot names, so the terminal shows
//! exactly what the layout engine would receive.

use pricevar_core::Page;
use pricevar_skill::SkillOutput;
use serde_json::Value;

const MAX_WARNINGS: usize = 10;

// ── KPI slots per page ──

const OVERVIEW_KPIS: &[(&str, &str)] = &[
    ("kpi1_value", "Total Variance"),
    ("kpi2_value", "Price Compliance Rate"),
    ("kpi3_value", "Suppliers"),
    ("kpi4_value", "Avg Variance Rate"),
    ("kpi5_value", "Total Invoice Value"),
];

const CONTRACT_KPIS: &[(&str, &str)] = &[
    ("kpi1_value", "Total Contract Variance"),
    ("kpi2_value", "Contracts"),
    ("kpi3_value", "Top Contract Variance"),
];

// ── Public API ──

/// Print the whole report to stdout.
pub fn print_report(output: &SkillOutput) {
    println!("=== Price Variance Analysis ({:?}) ===", output.status);
    for pill in &output.parameter_pills {
        println!("  {}", pill.value);
    }
    println!();

    for (i, page) in output.visualizations.iter().enumerate() {
        let kpis = if i == 0 { OVERVIEW_KPIS } else { CONTRACT_KPIS };
        print_page(page, kpis);
    }

    if let Some(narrative) = &output.narrative {
        println!("Summary");
        for line in narrative.lines() {
            println!("  {line}");
        }
        println!();
    }

    if !output.warnings.is_empty() {
        println!("Warnings");
        for w in output.warnings.iter().take(MAX_WARNINGS) {
            println!("  - {w}");
        }
        let remaining = output.warnings.len().saturating_sub(MAX_WARNINGS);
        if remaining > 0 {
            println!("  ... and {remaining} more");
        }
        println!();
    }

    println!("{}", output.final_prompt);
}

// ── Page rendering ──

fn print_page(page: &Page, kpis: &[(&str, &str)]) {
    println!("{}", page.title);
    if let Some(sub) = slot_str(page, "sub_headline") {
        println!("{sub}");
    }
    println!();

    for (slot, label) in kpis {
        if let Some(value) = slot_str(page, slot) {
            println!("  {:<26} {}", label, value);
        }
    }
    println!();

    if let Some(title) = slot_str(page, "chart_title") {
        println!("{title}");
    }
    let columns = column_names(page);
    let rows = table_rows(page);
    if rows.is_empty() {
        println!("  (no rows)");
    } else {
        print!("{}", render_table(&columns, &rows));
    }
    println!();
}

fn slot_str<'a>(page: &'a Page, slot: &str) -> Option<&'a str> {
    page.get(slot).and_then(Value::as_str)
}

fn column_names(page: &Page) -> Vec<String> {
    page.get("col_defs")
        .and_then(Value::as_array)
        .map(|defs| {
            defs.iter()
                .filter_map(|d| d["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn table_rows(page: &Page) -> Vec<Vec<String>> {
    page.get("data")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Left-aligned text table, two-space gutters, header underlined.
pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect();
        format!("  {}\n", padded.join("  ").trim_end())
    };

    let mut out = line(columns);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(&rule));
    for row in rows {
        out.push_str(&line(row));
    }
    out
}

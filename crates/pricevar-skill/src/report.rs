//! Final-output text and parameter pills.
//!
//! The final template uses single-brace placeholders with an optional
//! format spec: `{name}`, `{rate:.1f}`, `{count:,}`. Doubled braces are
//! literal. Placeholders with no matching field are left as written.

use pricevar_core::{Analysis, SupplierAggregate, format_currency};
use serde::Serialize;

use crate::request::SkillRequest;

pub const FINAL_PROMPT_TEMPLATE: &str = "Based on the price variance analysis:

**Key Findings:**
- Total variance impact of {total_variance} indicates opportunities for cost savings through improved price compliance
- Average variance rate of {avg_variance_rate:.1f}% across {total_transactions:,} transactions
- Price compliance rate stands at {compliance_rate:.1f}%
- Top supplier {top_supplier} accounts for {top_supplier_variance} in variance

**Top Opportunities:**
{top_opportunities}

**Recommendations:**
1. Focus negotiation efforts on suppliers with highest variance impact
2. Review contracts with consistent overpayments for renegotiation opportunities
3. Implement automated price compliance alerts for high-variance categories
4. Consider consolidating spend with compliant suppliers";

const NO_OPPORTUNITIES: &str = "- No specific opportunities identified";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Count(u64),
}

/// Named values substituted into the final template.
#[derive(Debug, Clone, Default)]
pub struct FinalFields {
    values: Vec<(&'static str, FieldValue)>,
}

impl FinalFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &'static str, value: FieldValue) -> Self {
        self.values.retain(|(n, _)| *n != name);
        self.values.push((name, value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// The seven fields the host platform expects.
    pub fn from_analysis(analysis: &Analysis, opportunity_count: usize) -> Self {
        let kpi = &analysis.kpi;
        let top = analysis.top_supplier();
        Self::new()
            .set(
                "total_variance",
                FieldValue::Text(format_currency(kpi.total_variance)),
            )
            .set(
                "avg_variance_rate",
                FieldValue::Number(kpi.avg_variance_rate_pct),
            )
            .set(
                "total_transactions",
                FieldValue::Count(kpi.total_transactions),
            )
            .set("compliance_rate", FieldValue::Number(kpi.compliance_rate_pct))
            .set(
                "top_supplier",
                FieldValue::Text(top.map_or("N/A", |s| s.supplier_name.as_str()).to_string()),
            )
            .set(
                "top_supplier_variance",
                FieldValue::Text(format_currency(top.map(|s| s.total_variance))),
            )
            .set(
                "top_opportunities",
                FieldValue::Text(top_opportunities(&analysis.suppliers, opportunity_count)),
            )
    }
}

/// Bullet list of the first `n` suppliers.
pub fn top_opportunities(suppliers: &[SupplierAggregate], n: usize) -> String {
    if suppliers.is_empty() || n == 0 {
        return NO_OPPORTUNITIES.to_string();
    }
    suppliers
        .iter()
        .take(n)
        .map(|s| {
            format!(
                "- {}: {} variance ({:.1}% above contract)",
                s.supplier_name,
                format_currency(s.total_variance),
                s.variance_pct
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_final_prompt(template: &str, fields: &FinalFields) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let brace = &rest[pos..pos + 1];
        let after = &rest[pos + 1..];

        if after.starts_with(brace) {
            out.push_str(brace);
            rest = &after[1..];
            continue;
        }
        if brace == "}" {
            out.push('}');
            rest = after;
            continue;
        }

        let Some(close) = after.find('}') else {
            out.push_str(&rest[pos..]);
            return out;
        };
        let inner = &after[..close];
        let (name, spec) = inner.split_once(':').unwrap_or((inner, ""));
        match fields.get(name) {
            Some(value) => out.push_str(&format_field(value, spec)),
            None => {
                out.push('{');
                out.push_str(inner);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn format_field(value: &FieldValue, spec: &str) -> String {
    let grouped = spec.contains(',');
    let precision = spec
        .split_once('.')
        .and_then(|(_, p)| p.trim_end_matches('f').parse::<usize>().ok());

    let number = match value {
        FieldValue::Text(s) => return s.clone(),
        FieldValue::Number(v) if v.is_finite() => *v,
        FieldValue::Number(_) => 0.0,
        FieldValue::Count(n) if precision.is_none() => {
            let s = n.to_string();
            return if grouped { group_thousands(&s) } else { s };
        }
        FieldValue::Count(n) => *n as f64,
    };
    let s = match precision {
        Some(p) => format!("{number:.p$}"),
        None => number.to_string(),
    };
    if grouped { group_thousands(&s) } else { s }
}

/// Insert `,` separators into the integer part of a plain decimal string.
fn group_thousands(s: &str) -> String {
    let (sign, body) = s.strip_prefix('-').map_or(("", s), |b| ("-", b));
    let (int, frac) = body.split_once('.').map_or((body, None), |(i, f)| (i, Some(f)));
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// A `key: label` pair describing one analysis parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterPill {
    pub key: String,
    pub value: String,
}

impl ParameterPill {
    fn new(key: &str, value: String) -> Self {
        Self {
            key: key.to_string(),
            value,
        }
    }
}

/// The filters pill appears only when the filters reached the queries.
pub fn parameter_pills(request: &SkillRequest, filters_applied: bool) -> Vec<ParameterPill> {
    let period = if request.time_periods.is_empty() {
        "All Time".to_string()
    } else {
        request
            .time_periods
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut pills = vec![
        ParameterPill::new("metric", "Metric: priceVarianceAmount".into()),
        ParameterPill::new("breakouts", "Breakouts: supplierName, contractName".into()),
        ParameterPill::new("period", format!("Time Period: {period}")),
    ];
    if filters_applied && let Some(filters) = request.other_filters.display() {
        pills.push(ParameterPill::new("filters", format!("Filters: {filters}")));
    }
    pills
}

#[cfg(test)]
mod tests {
    use pricevar_core::{KpiFallback, OtherFilters, SupplierRow, derive_metrics};

    use super::*;

    fn supplier(name: &str, variance: f64, pct: f64) -> SupplierRow {
        SupplierRow {
            supplier_name: name.into(),
            total_variance: variance,
            variance_pct: Some(pct),
            avg_invoice_price: Some(110.0),
            avg_catalog_price: Some(120.0),
            avg_expected_price: Some(100.0),
            compliance_rate: Some(40.0),
            transaction_count: 10,
            total_quantity: Some(100.0),
        }
    }

    #[test]
    fn python_style_specs() {
        let fields = FinalFields::new()
            .set("rate", FieldValue::Number(12.345))
            .set("n", FieldValue::Count(45680))
            .set("name", FieldValue::Text("TopCo".into()));
        assert_eq!(
            render_final_prompt("{name}: {rate:.1f}% of {n:,} rows", &fields),
            "TopCo: 12.3% of 45,680 rows"
        );
        assert_eq!(render_final_prompt("{n}", &fields), "45680");
    }

    #[test]
    fn braces_and_unknown_placeholders() {
        let fields = FinalFields::new().set("a", FieldValue::Text("x".into()));
        assert_eq!(
            render_final_prompt("{{a}} {a} {missing} {b:.2f} }", &fields),
            "{a} x {missing} {b:.2f} }"
        );
        assert_eq!(render_final_prompt("open {a", &fields), "open {a");
    }

    #[test]
    fn grouping_keeps_sign_and_fraction() {
        assert_eq!(group_thousands("-1234567.50"), "-1,234,567.50");
        assert_eq!(group_thousands("999"), "999");
        assert_eq!(
            format_field(&FieldValue::Number(1234.5), ",.1f"),
            "1,234.5"
        );
    }

    #[test]
    fn opportunities_list_top_three() {
        let analysis = derive_metrics(
            vec![
                supplier("A", 5_000.0, 10.0),
                supplier("B", 4_000.0, 8.25),
                supplier("C", 3_000.0, 6.0),
                supplier("D", 2_000.0, 4.0),
            ],
            None,
            Vec::new(),
            &KpiFallback::default(),
        );
        let text = top_opportunities(&analysis.suppliers, 3);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "- A: $5K variance (10.0% above contract)");
        assert!(!text.contains("- D"));
        assert_eq!(top_opportunities(&[], 3), NO_OPPORTUNITIES);
    }

    #[test]
    fn final_template_renders_every_field() {
        let analysis = derive_metrics(
            vec![supplier("TopCo", 1_500.0, 10.0)],
            None,
            Vec::new(),
            &KpiFallback::default(),
        );
        let fields = FinalFields::from_analysis(&analysis, 3);
        let text = render_final_prompt(FINAL_PROMPT_TEMPLATE, &fields);
        assert!(!text.contains('{'), "unrendered placeholder in:\n{text}");
        assert!(text.contains("Top supplier TopCo accounts for $2K in variance"));
        assert!(text.contains("across 10 transactions"));
    }

    #[test]
    fn pills_cover_period_and_filters() {
        let request = SkillRequest::default();
        let pills = parameter_pills(&request, false);
        assert_eq!(pills.len(), 3);
        assert_eq!(pills[2].value, "Time Period: All Time");

        let request = SkillRequest::default()
            .with_periods(["2024", "q1 2025"])
            .with_filters(OtherFilters::text("West"));
        let pills = parameter_pills(&request, true);
        assert_eq!(pills[2].value, "Time Period: 2024, q1 2025");
        assert_eq!(pills[3].key, "filters");
        assert_eq!(pills[3].value, "Filters: West");
    }

    #[test]
    fn ignored_filters_get_no_pill() {
        let request = SkillRequest::default().with_filters(OtherFilters::text("West"));
        let pills = parameter_pills(&request, false);
        assert!(pills.iter().all(|p| p.key != "filters"));
    }
}

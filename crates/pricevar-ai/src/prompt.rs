//! Prompt templates and `{{facts}}` substitution.

use pricevar_core::FactGroup;

/// Placeholder spellings replaced by the serialized fact groups.
const FACTS_PLACEHOLDERS: &[&str] = &["{{facts}}", "{{ facts }}"];

pub const DEFAULT_MAX_PROMPT: &str =
    "Answer user question in 30 words or less using following facts:\n{{facts}}";

pub const DEFAULT_INSIGHT_PROMPT: &str = r#"Write a short headline followed by a 60 word or less paragraph about using facts below.
Use the structure from the price variance example below to learn how I typically write summary.
Base your summary solely on the provided facts, avoiding assumptions or judgments.
Ensure clarity and accuracy.
Use markdown formatting for a structured and clear presentation.

###
Example:
Facts:
[{"title": "Overall Metrics", "facts": [{"fact_type": "overall_metrics", "metric": "Total Variance Impact", "value": "$6.2M", "context": "across 20 suppliers"}, {"fact_type": "overall_metrics", "metric": "Price Compliance Rate", "value": "60.7%", "context": "from 45,680 transactions"}]}, {"title": "Supplier Variance", "facts": [{"fact_type": "supplier_variance", "supplier": "EcoBox Packaging", "variance_amount": "$491K", "variance_pct": "12.5%", "compliance_rate": "58.2%", "transaction_count": 2140, "rank": 1}, {"fact_type": "supplier_variance", "supplier": "Elite Source", "variance_amount": "$428K", "variance_pct": "11.8%", "compliance_rate": "62.1%", "transaction_count": 1985, "rank": 2}]}, {"title": "Contract Analysis - EcoBox Packaging", "facts": [{"fact_type": "contract_detail", "supplier": "EcoBox Packaging", "contract": "Service Level Agreement #11", "variance_amount": "$64K", "rank": 1}]}]

Summary:
## Price Variance Analysis ##
**Variance Overview:**
Total price variance of $6.2M identified across 20 suppliers with 60.7% price compliance rate, representing significant cost recovery opportunity.

**Top Opportunities:**
EcoBox Packaging leads with $491K variance (12.5% above contract), followed by Elite Source at $428K (11.8%). Low compliance rates indicate systematic pricing issues requiring immediate supplier engagement.

**Key Drivers:**
Service Level Agreement #11 represents the highest single contract variance at $64K. Focus negotiations on top variance suppliers for immediate cost savings and compliance improvement.

###

Facts:
{{facts}}

Summary:"#;

/// Replace every `{{facts}}` placeholder with the JSON form of `groups`.
pub fn render_facts_prompt(
    template: &str,
    groups: &[FactGroup],
) -> Result<String, serde_json::Error> {
    let facts = serde_json::to_string(groups)?;
    Ok(FACTS_PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |acc, p| acc.replace(p, &facts)))
}

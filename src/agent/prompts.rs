//! Prompt text for the research tasks.

/// Prompt asking for grid / network / temperature weights.
pub fn generate_scoring_prompt(location: &str, schema: &str) -> String {
    format!(
        r#"I want to build a data center in {location}, France.
I need to decide how much three site factors matter there: electrical grid connectivity, network latency, and ambient temperature.
Build a small weighting model and give each factor a weight between 0 and 1. The three weights must sum to exactly 1.
Match this JSON schema: {schema}
Return only JSON that matches the schema. Do not include intermediate reasoning, only the final JSON object.
Use the `return_scores` tool to validate the final object when tools are available."#
    )
}

/// Prompt asking for a sourced risk briefing.
pub fn generate_information_prompt(location: &str, schema: &str) -> String {
    format!(
        r#"I am a foreign operator planning to install a data center in France.
Sites can be hard to secure because of local "not in my backyard" opposition, and permitting can be slowed by regulation.
My team has mapped {location} as the installation site.
Fill in the following JSON schema: {schema}
Every entry must be sourced. Do not describe a "potential risk"; describe a risk that has actually occurred for similar projects, with its source.
Use the `return_information` tool to validate the final object when tools are available."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_prompt_mentions_location_and_schema() {
        let prompt = generate_scoring_prompt("Fresnay-sur-Sarthe", "{\"title\":\"Scorer\"}");
        assert!(prompt.contains("Fresnay-sur-Sarthe, France"));
        assert!(prompt.contains("\"title\":\"Scorer\""));
        assert!(prompt.contains("return_scores"));
        assert!(prompt.contains("sum to exactly 1"));
    }

    #[test]
    fn test_information_prompt_requires_sources() {
        let prompt = generate_information_prompt("Marseille", "{}");
        assert!(prompt.contains("Marseille"));
        assert!(prompt.contains("sourced"));
        assert!(prompt.contains("return_information"));
    }
}

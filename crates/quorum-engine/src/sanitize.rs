//! Output guard against raw-JSON leakage. Planner and evaluator payloads
//! have historically leaked verbatim into synthesized prose; any answer
//! that trips the detector is replaced with a natural-language apology
//! built from the key findings.

/// Substrings that mark planner/tool JSON leaking into prose.
const JSON_PATTERNS: &[&str] = &["\"limit\"", "\": 10", "\": {", "\"}", "\"arguments\"", "\"mcp_tool\""];

/// True when the text looks like it contains raw JSON fragments.
pub fn contains_json_fragments(text: &str) -> bool {
    if JSON_PATTERNS.iter().any(|p| text.contains(p)) {
        return true;
    }
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('"') {
        return true;
    }
    // A line opening with a brace is planner output, not prose.
    text.lines()
        .any(|line| line.trim_start().starts_with('{'))
}

/// Scan a candidate answer; on detection, replace it with an apology plus a
/// best-effort summary from the key findings.
pub fn sanitize_answer_text(text: String, key_findings: &[String]) -> String {
    if !contains_json_fragments(&text) {
        return text;
    }

    let mut replacement = String::from(
        "I ran into a formatting problem while writing up the answer, so here is a short summary of what I found.",
    );
    if key_findings.is_empty() {
        replacement.push_str(" I wasn't able to extract clear findings this time — could you rephrase the question and I'll take another pass?");
    } else {
        for finding in key_findings {
            replacement.push_str("\n- ");
            replacement.push_str(finding);
        }
    }
    replacement
}

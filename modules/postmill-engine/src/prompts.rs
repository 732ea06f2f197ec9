//! Prompt rendering for the LLM-backed generation and judging capabilities.

use std::fmt::Write as _;

use postmill_common::{Candidate, CreativityContext, SourceContent};

use crate::personas::PersonaProfile;

pub fn generation_system_prompt(
    persona: Option<&PersonaProfile>,
    ctx: &CreativityContext,
    rules: &str,
) -> String {
    let mut out = String::from(
        "You write short-form social posts that a busy professional would stop scrolling for.\n\n",
    );

    match persona {
        Some(p) => out.push_str(&p.render()),
        None => {
            let _ = writeln!(out, "PERSONA: {}", ctx.persona_id);
        }
    }

    if !ctx.few_shot_examples.is_empty() {
        out.push_str("\nEXAMPLES IN THIS VOICE (study them, never copy them):\n");
        for example in &ctx.few_shot_examples {
            let _ = writeln!(out, "---\n{example}\n---");
        }
    }

    if let Some(style) = &ctx.style_reference {
        let _ = writeln!(out, "\nSTYLE INFLUENCE:\n{style}");
    }
    if let Some(tone) = &ctx.tone_perturbation {
        let _ = writeln!(out, "\nTONE FOR THIS POST:\n{tone}");
    }
    if let Some(brk) = &ctx.structural_break {
        let _ = writeln!(out, "\nSPECIAL CONSTRAINT FOR THIS POST:\n{brk}");
    }

    let _ = write!(
        out,
        "
{rules}
FORMAT RULES:
1. The first two lines carry the post; they are all a reader sees before \"see more\".
2. No markdown: no **bold**, no [text](url) links.
3. At most two emojis, and only where natural. No hashtags.
4. Be specific: exact numbers, concrete scenarios, real examples.
5. Every variant must differ in substance, not just wording.
"
    );
    out
}

pub fn generation_user_prompt(
    source: &SourceContent,
    ctx: &CreativityContext,
    variant_count: u32,
    persona_name: &str,
) -> String {
    let mut out = String::from("SOURCE CONTENT TO REACT TO:\n");
    let _ = writeln!(out, "Title: {}", source.title);
    if !source.source.is_empty() {
        let _ = writeln!(out, "Source: {}", source.source);
    }
    let _ = writeln!(out, "Summary: {}", source.summary);

    out.push_str("\nANGLE GUIDANCE:\n");
    if !source.suggested_angle.is_empty() {
        let _ = writeln!(out, "- Suggested angle: {}", source.suggested_angle);
    }
    if !source.company_connection.is_empty() {
        let _ = writeln!(out, "- Company connection: {}", source.company_connection);
    }
    if !source.target_icp.is_empty() {
        let _ = writeln!(out, "- Target audience: {}", source.target_icp);
    }
    let _ = writeln!(out, "- Key message to weave in: {}", ctx.content_angle);

    out.push_str("\nCREATIVITY PARAMETERS:\n");
    let _ = writeln!(out, "- Hook pattern: {} ({})", ctx.hook_pattern, ctx.hook_description);
    let _ = writeln!(out, "- Structure: {} ({})", ctx.structure, ctx.structure_description);
    if let Some(guidance) = &ctx.structure_guidance {
        let _ = writeln!(out, "- Structure guidance: {guidance}");
    }
    for anti in &ctx.structure_anti_patterns {
        let _ = writeln!(out, "- Avoid: {anti}");
    }

    let plural = if variant_count == 1 { "" } else { "s" };
    let _ = write!(
        out,
        "
TASK:
Write {variant_count} distinct post variant{plural} in the voice of {persona_name}.
Each must hook in the first two lines, include at least one specific number,
stay between 150 and 300 words, and break none of the writing rules.

Reply with ONLY a JSON array, no markdown and no commentary:
[
  {{
    \"content\": \"the full post text\",
    \"hook_type\": \"{hook}\",
    \"what_makes_it_different\": \"one line on the angle\"
  }}
]
",
        hook = ctx.hook_pattern,
    );
    out
}

pub fn judge_system_prompt(criteria: &str, rules: &str) -> String {
    format!(
        "You are a strict quality judge for short-form social posts.
Find the ONE post that would genuinely stop a reader from scrolling. Most posts are mediocre; score them that way.

{criteria}
{rules}
Be right, not nice.
"
    )
}

pub fn judge_user_prompt(candidates: &[Candidate], source_digest: &str) -> String {
    let mut out = format!("SOURCE:\n{source_digest}\n\nCANDIDATES ({} total):\n", candidates.len());
    for (i, c) in candidates.iter().enumerate() {
        let _ = write!(
            out,
            "
=== CANDIDATE {i} ===
Persona: {}
Hook type: {}
Structure: {}

{}
",
            c.persona_id, c.hook_type, c.structure, c.content
        );
    }
    out.push_str(
        "
TASK:
1. Score EVERY candidate, in the order given, on all five criteria (0-10 each).
2. Pick the winner by weighted total and explain why it won.
3. If the winner could be better, say how.

Reply with ONLY JSON, no markdown and no commentary:
{
  \"scores\": [
    {
      \"hook_strength\": 0,
      \"rule_compliance\": 0,
      \"distinctiveness\": 0,
      \"relevance\": 0,
      \"persona_fit\": 0,
      \"weighted_total\": 0.0,
      \"notes\": \"specific feedback\"
    }
  ],
  \"winner_index\": 0,
  \"rationale\": \"why this one won\",
  \"improvement_notes\": \"optional\"
}
",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, sample_context};

    #[test]
    fn system_prompt_includes_optional_sections_only_when_drawn() {
        let mut ctx = sample_context("witty");
        ctx.style_reference = None;
        ctx.tone_perturbation = Some("Write it like a field report.".into());
        let prompt = generation_system_prompt(None, &ctx, "RULES");
        assert!(prompt.contains("PERSONA: witty"));
        assert!(prompt.contains("TONE FOR THIS POST:\nWrite it like a field report."));
        assert!(!prompt.contains("STYLE INFLUENCE"));
        assert!(prompt.contains("RULES"));
    }

    #[test]
    fn user_prompt_names_count_and_hook() {
        let ctx = sample_context("professional");
        let source = SourceContent::new("Rates cut", "The central bank cut rates by 50bp.");
        let prompt = generation_user_prompt(&source, &ctx, 3, "The Operator");
        assert!(prompt.contains("Write 3 distinct post variants in the voice of The Operator"));
        assert!(prompt.contains(&format!("\"hook_type\": \"{}\"", ctx.hook_pattern)));
        assert!(prompt.contains("Title: Rates cut"));
        assert!(!prompt.contains("Target audience"));
    }

    #[test]
    fn judge_prompt_lists_candidates_in_order() {
        let candidates = vec![candidate(0, 0, "alpha"), candidate(2, 1, "beta")];
        let prompt = judge_user_prompt(&candidates, "Title: X\nSummary: Y");
        let a = prompt.find("=== CANDIDATE 0 ===").unwrap();
        let b = prompt.find("=== CANDIDATE 1 ===").unwrap();
        assert!(a < b);
        assert!(prompt.contains("CANDIDATES (2 total)"));
        assert!(prompt[b..].contains("beta"));
    }
}

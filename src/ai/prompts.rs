use crate::core::model::Language;

pub const OPTIMIZER_PROMPT: &str = r#"
You are Orion, a senior prompt engineer.
Your goal is to critique the user's prompt and rewrite it so a large language model produces better results.

INSTRUCTIONS:
1. Write a short, direct `critique` of the original prompt: ambiguity, missing context, missing output format.
2. Produce `optimizedPrompt`: a complete rewrite applying established techniques (role assignment, explicit constraints, step-by-step reasoning, output formatting, few-shot examples where useful).
3. **Preserve every variable marker** exactly as written, e.g. `[TOPIC]`, `{{AUDIENCE}}`, `<TONE>`. Never fill them in.
4. List the techniques you applied in `techniquesUsed`.
5. Report spelling and grammar problems of the ORIGINAL prompt in `grammarIssues` (empty array if none).
6. Give the original prompt a `score` from 0 to 100.
7. Return ONLY the JSON object. No Markdown fences, no commentary.
"#;

pub const JUDGE_PROMPT: &str = r#"
You are an impartial evaluator of language model output.
You will receive a PROMPT and the RESPONSE a model produced for it.

INSTRUCTIONS:
1. `qualityScore`: 0 to 100, how well the response fulfils the prompt (accuracy, completeness, clarity).
2. `biasDetected`: true if the response contains stereotypes, one-sided framing or unfair generalisations.
3. `biasAnalysis`: one or two sentences explaining the bias verdict.
4. `tone`: a short label for the response's tone (e.g. "formal", "friendly", "technical").
5. Return ONLY the JSON object.
"#;

fn language_directive(language: Language) -> String {
    format!(
        "Write `critique`, `techniquesUsed`, grammar `explanation`s and all free-text analysis in {}. \
         Keep `optimizedPrompt` in the language of the original prompt.",
        language.display_name()
    )
}

pub fn optimizer_instruction(language: Language) -> String {
    format!("{}\n{}", OPTIMIZER_PROMPT.trim(), language_directive(language))
}

pub fn optimizer_request(prompt: &str) -> String {
    format!("ORIGINAL PROMPT:\n\"\"\"\n{prompt}\n\"\"\"")
}

pub fn judge_instruction(language: Language) -> String {
    format!(
        "{}\nWrite `biasAnalysis` and `tone` in {}.",
        JUDGE_PROMPT.trim(),
        language.display_name()
    )
}

pub fn judge_request(prompt: &str, response: &str) -> String {
    format!("PROMPT:\n\"\"\"\n{prompt}\n\"\"\"\n\nRESPONSE:\n\"\"\"\n{response}\n\"\"\"")
}

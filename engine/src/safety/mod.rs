//! Generated-Code Safety Filter
//!
//! Deny-list screening of LLM-generated snippets before they reach the
//! sandbox, plus the deterministic fallback snippets substituted when
//! generation fails or keeps tripping the filter.
//!
//! This filter is a textual heuristic, not a security boundary; actual
//! isolation is enforced by the sandbox validator downstream.

use regex::Regex;

/// Textual patterns that disqualify a snippet: process/system invocation,
/// filesystem access, network calls, dynamic evaluation, serialization
/// loaders.
const PROHIBITED_PATTERNS: &[&str] = &[
    r"os\.system",
    r"subprocess\.",
    r"eval\(",
    r"exec\(",
    r"__import__",
    r"open\(",
    r"file\(",
    r"requests\.",
    r"urllib\.",
    r"socket\.",
    r"pickle\.",
];

/// Module names that must not appear on an import line.
const PROHIBITED_IMPORTS: &[&str] = &[
    "os", "sys", "subprocess", "socket", "pickle", "shelve", "marshal", "requests", "urllib",
    "http",
];

/// Why a snippet was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyRejection {
    #[error("Contains prohibited pattern: {0}")]
    ProhibitedPattern(String),

    #[error("Contains prohibited import: {0}")]
    ProhibitedImport(String),
}

/// Compiled deny-list filter. Build once and reuse; compilation is the
/// expensive part.
pub struct SafetyFilter {
    patterns: Vec<(Regex, &'static str)>,
}

impl SafetyFilter {
    pub fn new() -> Self {
        let patterns = PROHIBITED_PATTERNS
            .iter()
            .map(|p| {
                let re = Regex::new(&format!("(?i){}", p)).expect("deny-list pattern must compile");
                (re, *p)
            })
            .collect();
        Self { patterns }
    }

    /// Check a snippet against the deny-list.
    pub fn check(&self, code: &str) -> Result<(), SafetyRejection> {
        for (re, source) in &self.patterns {
            if re.is_match(code) {
                tracing::warn!(pattern = source, "Generated code contains prohibited pattern");
                return Err(SafetyRejection::ProhibitedPattern(source.to_string()));
            }
        }

        for line in code.lines() {
            let lowered = line.to_lowercase();
            if !lowered.contains("import") {
                continue;
            }
            for module in PROHIBITED_IMPORTS {
                if lowered
                    .split(|c: char| !c.is_alphanumeric() && c != '_')
                    .any(|token| token == *module)
                {
                    tracing::warn!(module, "Generated code contains prohibited import");
                    return Err(SafetyRejection::ProhibitedImport(module.to_string()));
                }
            }
        }

        Ok(())
    }
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Skill keyword to language mapping. First match wins; unknown skills
/// default to Python.
const SKILL_LANGUAGE_MAP: &[(&str, &str)] = &[
    // Python skills
    ("machine learning", "python"),
    ("data science", "python"),
    ("tensorflow", "python"),
    ("pytorch", "python"),
    ("pandas", "python"),
    ("numpy", "python"),
    ("django", "python"),
    ("flask", "python"),
    ("python", "python"),
    ("scikit-learn", "python"),
    ("keras", "python"),
    // JavaScript skills
    ("react", "javascript"),
    ("vue", "javascript"),
    ("angular", "javascript"),
    ("node.js", "javascript"),
    ("nodejs", "javascript"),
    ("express", "javascript"),
    ("next.js", "javascript"),
    ("nextjs", "javascript"),
    ("javascript", "javascript"),
    ("typescript", "javascript"),
    // Java skills
    ("java", "java"),
    ("spring boot", "java"),
    ("spring", "java"),
    ("android", "java"),
    // SQL skills
    ("sql", "sql"),
    ("database", "sql"),
    ("postgresql", "sql"),
    ("mysql", "sql"),
    ("mongodb", "sql"),
];

/// Pick the programming language a snippet for this skill should use.
pub fn detect_language(skill: &str) -> &'static str {
    let skill_lower = skill.to_lowercase();
    let skill_lower = skill_lower.trim();

    for (keyword, language) in SKILL_LANGUAGE_MAP {
        if skill_lower == *keyword {
            return language;
        }
    }
    for (keyword, language) in SKILL_LANGUAGE_MAP {
        if skill_lower.contains(keyword) {
            return language;
        }
    }

    tracing::debug!(skill, "No language mapping found, defaulting to python");
    "python"
}

/// Deterministic safe snippet for a language, used whenever generation fails
/// or the safety filter rejects the model's output twice.
pub fn fallback_snippet(language: &str) -> &'static str {
    match language {
        "javascript" => {
            "// Simple JavaScript example\n\
             const numbers = [1, 2, 3, 4, 5];\n\
             const squared = numbers.map(n => n ** 2);\n\
             console.log('Squared numbers:', squared);\n"
        }
        "java" => {
            "// Simple Java example\n\
             public class Example {\n\
             \x20   public static void main(String[] args) {\n\
             \x20       int[] numbers = {1, 2, 3, 4, 5};\n\
             \x20       System.out.println(\"Sum: \" + sum(numbers));\n\
             \x20   }\n\
             \x20   static int sum(int[] arr) {\n\
             \x20       int total = 0;\n\
             \x20       for (int n : arr) total += n;\n\
             \x20       return total;\n\
             \x20   }\n\
             }\n"
        }
        "sql" => {
            "-- Simple SQL example\n\
             SELECT name, COUNT(*) as total\n\
             FROM users\n\
             GROUP BY name\n\
             HAVING COUNT(*) > 1\n\
             ORDER BY total DESC;\n"
        }
        _ => {
            "# Simple Python example\n\
             numbers = [1, 2, 3, 4, 5]\n\
             squared = [n**2 for n in numbers]\n\
             print(f\"Squared numbers: {squared}\")\n"
        }
    }
}

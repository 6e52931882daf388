// Standardizer prompt templates.

pub const STANDARDIZE_SYSTEM: &str = "\
You are a precise CV normaliser. \
Convert free-form CV text into a fixed JSON structure. \
List skills and responsibilities in order of prominence in the CV, most prominent first. \
Never invent skills or responsibilities that the text does not support.";

pub const STANDARDIZE_PROMPT: &str = r#"Normalise the following CV into a structured JSON object.

CV TEXT:
{cv_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "title": "string: the candidate's current or most recent job title",
  "skills": ["string: one concrete skill, tool or technology per entry"],
  "responsibilities": ["string: one responsibility or duty per entry, as a short sentence"],
  "experience": {
    "total_years": number,
    "summary": "string: two or three sentences summarising the career"
  }
}

RULES:
1. Every field is required. Use [] for empty lists, never null.
2. Skills are short noun phrases ("PostgreSQL", "Team leadership"), not sentences.
3. Order skills and responsibilities by prominence, most prominent first.
4. total_years is the sum of professional experience in years; estimate from dates if needed.
5. Return ONLY the JSON object: nothing else, no code fences."#;

//! Built-in prompt templates and card schemas.
//!
//! Templates accept `{question}` and `{schema}`; the combine template also
//! accepts `{inputs}`. Configuration may override any of them.

pub const DEFAULT_GENERATE_TEMPLATE: &str = "\
You are an expert educator creating study material.

Write thorough, factually careful notes that answer the question below.
Cover definitions, key relationships, and common misconceptions. Plain
text only; no markdown headings.

Question: {question}

The notes will later be distilled into flashcards with this JSON schema:
{schema}
";

pub const DEFAULT_COMBINE_TEMPLATE: &str = "\
You are an expert editor merging several drafts into one set of flashcards.

Question: {question}

Below are independent drafts from different authors, each delimited by a
header line. Merge them: keep every fact that appears in any draft, drop
duplicates, and prefer the clearest phrasing.

{inputs}

Respond with ONLY a JSON object conforming exactly to this schema, no
commentary and no markdown fences:
{schema}
";

pub const BASIC_CARD_SCHEMA: &str = r#"{
  "title": "string",
  "topic": "string",
  "difficulty": "string",
  "cards": [
    {
      "card_type": "basic",
      "tags": ["string"],
      "front": "string",
      "back": "string"
    }
  ]
}"#;

pub const MCQ_CARD_SCHEMA: &str = r#"{
  "title": "string",
  "topic": "string",
  "difficulty": "string",
  "cards": [
    {
      "card_type": "mcq",
      "tags": ["string"],
      "front": "string",
      "back": "string",
      "options": ["string", "string", "string", "string"],
      "correct_answer": "A"
    }
  ]
}"#;

/// Schema text for a card type name. Unknown names get the basic schema.
#[must_use]
pub fn schema_for_card_type(card_type: &str) -> &'static str {
    match card_type {
        "mcq" => MCQ_CARD_SCHEMA,
        _ => BASIC_CARD_SCHEMA,
    }
}
